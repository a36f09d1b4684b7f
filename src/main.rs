use std::path::{Path, PathBuf};

use structopt::StructOpt;

use microfacet_closure::{
    bxdf::{GgxAlbedoTable, MicrofacetBsdf},
    core::{color::Color, coord::Coordinate, rng::Rng},
    loader,
};

#[derive(StructOpt)]
#[structopt(name = "microfacet-closure", about = "Inspects GGX microfacet closures")]
enum Command {
    /// Estimates the directional albedo of a closure with its own sampling routine
    Furnace {
        #[structopt(parse(from_os_str))]
        closure: PathBuf,
        /// samples per view angle
        #[structopt(short, long, default_value = "262144")]
        samples: u32,
        /// number of view angles between 0 and 85 degrees
        #[structopt(short, long, default_value = "10")]
        angles: u32,
    },
    /// Renders the evaluated lobe for one view direction as a lat-long image
    Lobe {
        #[structopt(parse(from_os_str))]
        closure: PathBuf,
        #[structopt(short, long, parse(from_os_str))]
        output: PathBuf,
        /// image width, the height is half of it
        #[structopt(long, default_value = "512")]
        size: u32,
        /// view angle from the normal in degrees
        #[structopt(long, default_value = "45")]
        theta: f32,
    },
    /// Dumps the built-in albedo table as JSON
    Table {
        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Command::from_args() {
        Command::Furnace {
            closure,
            samples,
            angles,
        } => furnace(&closure, samples, angles),
        Command::Lobe {
            closure,
            output,
            size,
            theta,
        } => lobe(&closure, &output, size, theta),
        Command::Table { output } => table(output.as_deref()),
    }
}

/// Frame around the closure normal and a view direction `theta_deg` away from it.
fn view_frame(path: &Path, theta_deg: f32) -> anyhow::Result<(Coordinate, glam::Vec3A)> {
    let (probe, _) = loader::load_closure(path, glam::Vec3A::Z)?;
    let frame = Coordinate::from_z(probe.normal());
    let (sin_theta, cos_theta) = theta_deg.to_radians().sin_cos();
    let wo = frame.to_world(glam::Vec3A::new(sin_theta, 0.0, cos_theta));
    Ok((frame, wo))
}

fn furnace(path: &Path, samples: u32, angles: u32) -> anyhow::Result<()> {
    let angles = angles.max(1);
    let num_cpus = num_cpus::get() as u32;
    let samples_per_cpu = (samples / num_cpus).max(1);

    let total = angles as u64 * (samples_per_cpu * num_cpus) as u64;
    let progress_bar = indicatif::ProgressBar::new(total);
    progress_bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (eta: {eta})")
            .progress_chars("#>-"),
    );

    let mut rows = Vec::with_capacity(angles as usize);
    for k in 0..angles {
        let theta = if angles > 1 {
            85.0 * k as f32 / (angles - 1) as f32
        } else {
            0.0
        };
        let (frame, wo) = view_frame(path, theta)?;
        let (bsdf, _) = loader::load_closure(path, wo)?;
        let ng = frame.normal();

        let sums = crossbeam::scope(|scope| {
            let handles = (0..num_cpus)
                .map(|t| {
                    let progress_bar = progress_bar.clone();
                    let bsdf = &bsdf;
                    let seed = (k * num_cpus + t) as u64;
                    scope.spawn(move |_| {
                        estimate_albedo(bsdf, ng, wo, samples_per_cpu, seed, &progress_bar)
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        })
        .map_err(|_| anyhow::anyhow!("furnace - worker thread panicked"))?;

        let mut sum = Color::BLACK;
        let mut valid = 0u64;
        for res in sums {
            let (s, v) = res.map_err(|_| anyhow::anyhow!("furnace - worker thread panicked"))?;
            sum += s;
            valid += v;
        }
        let albedo = sum / (samples_per_cpu * num_cpus) as f32;
        rows.push((theta, albedo, bsdf.weight(), valid));
    }
    progress_bar.finish();

    println!(
        "{:>6} {:>6} {:>26} {:>26} {:>8}",
        "theta", "mu", "albedo", "weighted", "valid"
    );
    for (theta, albedo, weight, valid) in rows {
        let weighted = albedo * weight;
        println!(
            "{:>6.1} {:>6.3} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8}",
            theta,
            theta.to_radians().cos(),
            albedo.r,
            albedo.g,
            albedo.b,
            weighted.r,
            weighted.g,
            weighted.b,
            valid
        );
        if albedo.max_channel() > 1.01 {
            log::warn!("albedo exceeds 1 at theta = {:.1}: {:?}", theta, albedo);
        }
    }
    Ok(())
}

/// Sum of `bxdf / pdf` over `samples` draws and the number of draws that produced a direction.
fn estimate_albedo(
    bsdf: &MicrofacetBsdf,
    ng: glam::Vec3A,
    wo: glam::Vec3A,
    samples: u32,
    seed: u64,
    progress_bar: &indicatif::ProgressBar,
) -> (Color, u64) {
    const CHUNK: u32 = 4096;

    let mut rng = Rng::with_seed(seed);
    let mut sum = Color::BLACK;
    let mut valid = 0u64;
    for i in 0..samples {
        let (rand_u, rand_v) = rng.uniform_2d();
        if let Some(sample) = bsdf.sample(ng, wo, rand_u, rand_v, None) {
            sum += sample.bxdf / sample.pdf;
            valid += 1;
        }
        if (i + 1) % CHUNK == 0 {
            progress_bar.inc(CHUNK as u64);
        }
    }
    progress_bar.inc((samples % CHUNK) as u64);
    (sum, valid)
}

fn lobe(path: &Path, output: &Path, size: u32, theta: f32) -> anyhow::Result<()> {
    let (frame, wo) = view_frame(path, theta)?;
    let (bsdf, _) = loader::load_closure(path, wo)?;

    let width = size.max(2);
    let height = width / 2;
    let mut image = image::RgbImage::new(width, height);
    for j in 0..height {
        let theta = std::f32::consts::PI * (j as f32 + 0.5) / height as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for i in 0..width {
            let phi = 2.0 * std::f32::consts::PI * (i as f32 + 0.5) / width as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            let local = glam::Vec3A::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta);
            let (value, _) = bsdf.eval(wo, frame.to_world(local));
            let value = value * bsdf.weight();
            let to_byte = |c: f32| ((c / (1.0 + c)).powf(1.0 / 2.2) * 255.0).min(255.0) as u8;
            image.put_pixel(
                i,
                j,
                image::Rgb([to_byte(value.r), to_byte(value.g), to_byte(value.b)]),
            );
        }
    }

    image
        .save(output)
        .map_err(|e| anyhow::anyhow!("lobe - can't save '{}': {}", output.display(), e))?;
    log::info!("lobe written to '{}'", output.display());
    Ok(())
}

fn table(output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&GgxAlbedoTable::shared().to_json())?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            log::info!("albedo table written to '{}'", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
