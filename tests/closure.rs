use microfacet_closure::{
    bxdf::{
        albedo_scaling_float, util, AlbedoTable, BxdfDirType, BxdfLobeType, BxdfSampleType,
        FresnelExtra, GgxAlbedoTable, MetallicExtra, MicrofacetBsdf, MicrofacetParams,
        RayDifferentials, SINGULAR_PDF,
    },
    core::{color::Color, rng::Rng},
};

fn params(alpha_x: f32, alpha_y: f32, ior: f32) -> MicrofacetParams {
    MicrofacetParams {
        alpha_x,
        alpha_y,
        ior,
        ..Default::default()
    }
}

fn view(theta_deg: f32) -> glam::Vec3A {
    let (sin_theta, cos_theta) = theta_deg.to_radians().sin_cos();
    glam::Vec3A::new(sin_theta, 0.0, cos_theta)
}

/// One closure of every reflecting kind, set up for `wo`.
fn reflecting_closures(alpha_x: f32, alpha_y: f32, wo: glam::Vec3A) -> Vec<MicrofacetBsdf> {
    let table = GgxAlbedoTable::shared();
    let base = params(alpha_x, alpha_y, 1.5);
    let extra = FresnelExtra::new(Color::new(0.8, 0.6, 0.4), Color::new(0.9, 0.5, 0.1));
    let metal = MetallicExtra {
        metal_base: Color::new(0.9, 0.6, 0.3),
        metal_edge: Color::WHITE,
        metal_falloff: 0.3,
        dielectric: 0.0,
    };
    vec![
        MicrofacetBsdf::ggx_setup(&base).0,
        MicrofacetBsdf::ggx_isotropic_setup(&base).0,
        MicrofacetBsdf::multi_ggx_setup(&base, Color::new(0.9, 0.5, 0.2), wo, table).0,
        MicrofacetBsdf::ggx_fresnel_setup(&base, extra, wo).0,
        MicrofacetBsdf::multi_ggx_fresnel_setup(&base, extra, wo, table).0,
        MicrofacetBsdf::ggx_fresnel_v2_setup(&base, metal, 0.6, 0.4, wo, table).0,
        MicrofacetBsdf::ggx_clearcoat_setup(&base, extra, wo).0,
        MicrofacetBsdf::ggx_clearcoat_v2_setup(&base, extra, wo, table).0,
    ]
}

fn relative_eq(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps * a.abs().max(b.abs()).max(1e-6)
}

#[test]
fn plain_closure_at_normal_incidence() {
    let (bsdf, _) = MicrofacetBsdf::ggx_setup(&params(0.5, 0.5, 1.5));
    let n = glam::Vec3A::Z;
    let (value, pdf) = bsdf.eval_reflect(n, n);
    // D(m = n) = 1 / (pi alpha^2), no masking
    let expected = std::f32::consts::FRAC_1_PI;
    assert!(relative_eq(pdf, expected, 1e-5), "pdf {}", pdf);
    assert!(relative_eq(value.r, expected, 1e-5));
    assert_eq!(value.r, value.g);
    assert_eq!(value.g, value.b);
}

#[test]
fn index_matched_refraction_passes_straight_through() {
    let (bsdf, _) = MicrofacetBsdf::ggx_refraction_setup(&params(0.5, 0.5, 1.0));
    let n = glam::Vec3A::Z;
    let sample = bsdf.sample(n, n, 0.3, 0.6, None).unwrap();
    assert_eq!(sample.ty, BxdfSampleType::singular_transmit());
    assert!((sample.wi + n).length() < 1e-5);
    assert_eq!(sample.pdf, SINGULAR_PDF);
    assert_eq!(sample.bxdf, Color::gray(SINGULAR_PDF));
}

#[test]
fn total_internal_reflection_yields_no_sample() {
    // seen from the optically denser side the relative index is 1 / 1.5
    let (bsdf, _) = MicrofacetBsdf::ggx_refraction_setup(&params(1e-4, 1e-4, 1.0 / 1.5));
    let n = glam::Vec3A::Z;
    let wo = view(60.0);
    for &(u, v) in &[(0.3, 0.6), (0.0, 0.0), (0.9, 0.1)] {
        assert!(bsdf.sample(n, wo, u, v, None).is_none());
    }
    // below the critical angle light still gets through
    let through = bsdf.sample(n, view(20.0), 0.3, 0.6, None).unwrap();
    assert_eq!(through.ty.dir, BxdfDirType::Transmit);
}

#[test]
fn near_mirror_reflection_is_singular() {
    let n = glam::Vec3A::Z;
    let wo = view(30.0);
    let (plain, _) = MicrofacetBsdf::ggx_setup(&params(1e-4, 1e-4, 1.5));
    let sample = plain.sample(n, wo, 0.3, 0.6, None).unwrap();
    assert_eq!(sample.ty, BxdfSampleType::singular_reflect());
    assert_eq!(sample.pdf, SINGULAR_PDF);
    assert_eq!(sample.bxdf, Color::gray(SINGULAR_PDF));
    let mirrored = glam::Vec3A::new(-wo.x, -wo.y, wo.z);
    assert!((sample.wi - mirrored).length() < 1e-3);

    let cspec0 = Color::new(0.9, 0.5, 0.1);
    let extra = FresnelExtra::new(Color::WHITE, cspec0);
    let (fresnel, _) = MicrofacetBsdf::ggx_fresnel_setup(&params(1e-4, 1e-4, 1.5), extra, wo);
    let sample = fresnel.sample(n, wo, 0.3, 0.6, None).unwrap();
    assert!(sample.ty.is_singular());
    let tint = sample.bxdf / sample.pdf;
    assert!(tint.r >= cspec0.r - 1e-4 && tint.r <= 1.0 + 1e-4);
    assert!(tint.b >= cspec0.b - 1e-4 && tint.b <= 1.0 + 1e-4);
}

#[test]
fn eval_is_non_negative_and_finite() {
    let mut rng = Rng::with_seed(1);
    for _ in 0..200 {
        let (alpha_x, alpha_y) = rng.uniform_2d();
        let wo = rng.uniform_on_hemisphere(glam::Vec3A::Z);
        for bsdf in reflecting_closures(alpha_x, alpha_y, wo) {
            for _ in 0..20 {
                let wi = rng.uniform_on_sphere();
                let (value, pdf) = bsdf.eval_reflect(wo, wi);
                assert!(value.is_finite() && pdf.is_finite());
                assert!(pdf >= 0.0 && value.min_channel() >= 0.0);
                if wi.z <= 0.0 {
                    assert_eq!(pdf, 0.0);
                }
            }
        }
    }
}

#[test]
fn reflections_stay_above_the_geometric_normal() {
    let mut rng = Rng::with_seed(2);
    let ng = glam::Vec3A::new(0.4, 0.0, 1.0).normalize();
    for _ in 0..100 {
        let (alpha_x, alpha_y) = rng.uniform_2d();
        let wo = rng.uniform_on_hemisphere(glam::Vec3A::Z);
        for bsdf in reflecting_closures(alpha_x, alpha_y, wo) {
            for _ in 0..20 {
                let (u, v) = rng.uniform_2d();
                if let Some(sample) = bsdf.sample(ng, wo, u, v, None) {
                    assert_eq!(sample.ty.dir, BxdfDirType::Reflect);
                    assert!(sample.wi.dot(ng) > 0.0);
                    assert!(sample.wi.z > 0.0);
                    assert!(sample.pdf > 0.0 && sample.bxdf.is_finite());
                }
            }
        }
    }
}

#[test]
fn transmissions_cross_the_surface() {
    let mut rng = Rng::with_seed(3);
    let n = glam::Vec3A::Z;
    for &ior in &[1.5f32, 1.0 / 1.1, 2.4] {
        let mut transmitted = 0;
        for _ in 0..2000 {
            let alpha = rng.uniform_1d();
            let (bsdf, _) = MicrofacetBsdf::ggx_refraction_setup(&params(alpha, alpha, ior));
            let wo = rng.uniform_on_hemisphere(n);
            let (u, v) = rng.uniform_2d();
            if let Some(sample) = bsdf.sample(n, wo, u, v, None) {
                assert_eq!(sample.ty.dir, BxdfDirType::Transmit);
                assert!(sample.wi.dot(n) < 0.0);
                assert!(sample.pdf > 0.0 && sample.bxdf.min_channel() >= 0.0);
                transmitted += 1;
            }
        }
        // views past the critical angle of 1 / 1.1 reflect totally
        assert!(transmitted > 500, "ior {}: {}", ior, transmitted);
    }
}

#[test]
fn samples_agree_with_eval() {
    let mut rng = Rng::with_seed(4);
    let mut checked = 0;
    for _ in 0..50 {
        let alpha_x = 0.05 + 0.95 * rng.uniform_1d();
        let alpha_y = 0.05 + 0.95 * rng.uniform_1d();
        let wo = view(80.0 * rng.uniform_1d());
        let mut closures = reflecting_closures(alpha_x, alpha_y, wo);
        closures.push(MicrofacetBsdf::ggx_refraction_setup(&params(alpha_x, alpha_y, 1.45)).0);
        closures.push(MicrofacetBsdf::ggx_refraction_setup(&params(alpha_x, alpha_y, 0.7)).0);
        for bsdf in closures {
            for _ in 0..10 {
                let (u, v) = rng.uniform_2d();
                let sample = match bsdf.sample(glam::Vec3A::Z, wo, u, v, None) {
                    Some(sample) => sample,
                    None => continue,
                };
                assert_eq!(sample.ty.lobe, BxdfLobeType::Glossy);
                let (value, pdf) = bsdf.eval(wo, sample.wi);
                assert!(relative_eq(pdf, sample.pdf, 2e-3), "{} {}", pdf, sample.pdf);
                assert!(relative_eq(value.r, sample.bxdf.r, 2e-3));
                assert!(relative_eq(value.g, sample.bxdf.g, 2e-3));
                assert!(relative_eq(value.b, sample.bxdf.b, 2e-3));
                checked += 1;
            }
        }
    }
    assert!(checked > 3000);
}

#[test]
fn reflection_pdf_integrates_to_at_most_one() {
    let mut rng = Rng::with_seed(5);
    let wo = view(30.0);
    let (bsdf, _) = MicrofacetBsdf::ggx_setup(&params(0.5, 0.3, 1.5));
    let count = 200_000;
    let mut integral = 0.0f64;
    for _ in 0..count {
        let wi = rng.uniform_on_hemisphere(glam::Vec3A::Z);
        let (_, pdf) = bsdf.eval_reflect(wo, wi);
        integral += pdf as f64 * 2.0 * std::f64::consts::PI;
    }
    let integral = integral / count as f64;
    assert!(integral > 0.9 && integral < 1.01, "{}", integral);
}

/// White-furnace estimate `E[bxdf / pdf]` with the closure's own sampler.
fn furnace(bsdf: &MicrofacetBsdf, wo: glam::Vec3A, count: u32, rng: &mut Rng) -> Color {
    let mut sum = Color::BLACK;
    for _ in 0..count {
        let (u, v) = rng.uniform_2d();
        if let Some(sample) = bsdf.sample(glam::Vec3A::Z, wo, u, v, None) {
            sum += sample.bxdf / sample.pdf;
        }
    }
    sum / count as f32
}

#[test]
fn table_matches_the_sampler() {
    let mut rng = Rng::with_seed(6);
    let table = GgxAlbedoTable::shared();
    for &(alpha, theta) in &[(0.25f32, 20.0f32), (0.5, 45.0), (0.9, 70.0)] {
        let wo = view(theta);
        let (bsdf, _) = MicrofacetBsdf::ggx_setup(&params(alpha, alpha, 1.5));
        let estimate = furnace(&bsdf, wo, 50_000, &mut rng);
        let expected = table.directional_albedo(wo.z, alpha.sqrt());
        assert!(
            (estimate.r - expected).abs() < 0.02,
            "alpha {} theta {}: {} vs {}",
            alpha,
            theta,
            estimate.r,
            expected
        );
    }
}

#[test]
fn multi_scatter_compensation_restores_white_furnace() {
    let mut rng = Rng::with_seed(7);
    let table = GgxAlbedoTable::shared();
    for &(alpha, theta) in &[(0.4f32, 10.0f32), (0.8, 40.0), (1.0, 60.0)] {
        let wo = view(theta);
        let base = params(alpha, alpha, 1.5);
        let (bsdf, _) = MicrofacetBsdf::multi_ggx_setup(&base, Color::WHITE, wo, table);
        let estimate = furnace(&bsdf, wo, 50_000, &mut rng) * bsdf.weight();
        assert!(
            (estimate.g - 1.0).abs() < 0.03,
            "alpha {} theta {}: {}",
            alpha,
            theta,
            estimate.g
        );
    }
}

#[test]
fn compensation_grows_with_roughness() {
    let table = GgxAlbedoTable::shared();
    let n = glam::Vec3A::Z;
    for k in 0..=8 {
        let wo = view(10.0 * k as f32);
        let mut last = 1.0;
        for i in 0..=40 {
            let alpha = i as f32 / 40.0;
            let scale = albedo_scaling_float(table, wo, n, alpha, alpha, 1.0);
            assert!(scale.is_finite() && scale >= last - 1e-5);
            last = scale;
            for j in 0..10 {
                let fss = j as f32 / 10.0;
                let scale = albedo_scaling_float(table, wo, n, alpha, alpha, fss);
                assert!(scale.is_finite() && scale >= 1.0);
            }
            assert_eq!(albedo_scaling_float(table, wo, n, alpha, alpha, 0.0), 1.0);
        }
    }
}

#[test]
fn partial_fresnel_compensation_grows_with_roughness() {
    let table = GgxAlbedoTable::shared();
    let n = glam::Vec3A::Z;
    for k in 0..=17 {
        let wo = view(5.0 * k as f32);
        for j in 1..10 {
            let fss = j as f32 / 10.0;
            let mut last = 1.0;
            for i in 0..=100 {
                let alpha = i as f32 / 100.0;
                let scale = albedo_scaling_float(table, wo, n, alpha, alpha, fss);
                assert!(
                    scale >= last - 1e-6,
                    "theta {} fss {} alpha {}: {} -> {}",
                    5 * k,
                    fss,
                    alpha,
                    last,
                    scale
                );
                last = scale;
            }
        }
    }
}

#[test]
fn setup_is_idempotent() {
    let raw = MicrofacetParams {
        alpha_x: 4.0,
        alpha_y: -1.0,
        ior: 1.5,
        weight: Color::new(0.5, -0.5, 1.5),
        ..Default::default()
    };
    let wo = view(30.0);
    let extra = FresnelExtra::new(Color::new(2.0, 0.5, -1.0), Color::new(-0.1, 0.4, 1.1));
    let (first, _) = MicrofacetBsdf::ggx_fresnel_setup(&raw, extra, wo);
    assert_eq!(first.alpha(), (1.0, 0.0));
    assert!(first.weight().min_channel() >= 0.0);

    let mut again_params = first.params();
    again_params.sample_weight = raw.sample_weight;
    let (second, _) = MicrofacetBsdf::ggx_fresnel_setup(&again_params, extra, wo);
    assert_eq!(second.alpha(), first.alpha());
    assert_eq!(second.weight(), first.weight());
    assert_eq!(second.fresnel_color(), first.fresnel_color());
    assert_eq!(second.sample_weight(), first.sample_weight());
}

#[test]
fn blur_never_narrows() {
    let (mut bsdf, _) = MicrofacetBsdf::ggx_setup(&params(0.1, 0.5, 1.5));
    bsdf.blur(0.0);
    assert_eq!(bsdf.alpha(), (0.1, 0.5));
    let mut last = bsdf.alpha();
    for &r in &[0.7f32, 0.3, 0.05] {
        bsdf.blur(r);
        let alpha = bsdf.alpha();
        assert!(alpha.0 >= last.0 && alpha.1 >= last.1);
        last = alpha;
    }
    assert_eq!(bsdf.alpha(), (0.7, 0.7));

    // a blurred mirror becomes glossy
    let (mut mirror, _) = MicrofacetBsdf::ggx_setup(&params(0.0, 0.0, 1.5));
    assert!(mirror.is_singular());
    mirror.blur(0.2);
    assert!(!mirror.is_singular());
    let sample = mirror.sample(glam::Vec3A::Z, view(30.0), 0.3, 0.6, None).unwrap();
    assert_eq!(sample.ty, BxdfSampleType::glossy_reflect());
}

#[test]
fn differentials_are_transported_on_request() {
    let n = glam::Vec3A::Z;
    let wo = view(40.0);
    let d = RayDifferentials {
        dx: glam::Vec3A::new(0.01, 0.0, 0.0),
        dy: glam::Vec3A::new(0.0, 0.01, 0.0),
    };

    let (mirror, _) = MicrofacetBsdf::ggx_setup(&params(0.0, 0.0, 1.5));
    assert!(mirror.sample(n, wo, 0.5, 0.5, None).unwrap().differentials.is_none());
    let sample = mirror.sample(n, wo, 0.5, 0.5, Some(&d)).unwrap();
    let reflected = sample.differentials.unwrap();
    // reflection about +z keeps x/y derivatives mirrored
    assert!((reflected.dx - glam::Vec3A::new(-0.01, 0.0, 0.0)).length() < 1e-4);
    assert!((reflected.dy - glam::Vec3A::new(0.0, -0.01, 0.0)).length() < 1e-4);

    let (glass, _) = MicrofacetBsdf::ggx_refraction_setup(&params(0.0, 0.0, 1.5));
    let sample = glass.sample(n, wo, 0.5, 0.5, Some(&d)).unwrap();
    let refracted = sample.differentials.unwrap();
    let expected = util::fresnel_dielectric(1.5, n, wo, Some(&d)).differentials.unwrap().1;
    assert!((refracted.dx - expected.dx).length() < 1e-4);
    assert!((refracted.dy - expected.dy).length() < 1e-4);
}

#[test]
fn transmission_eval_rejects_same_side() {
    let (bsdf, _) = MicrofacetBsdf::ggx_refraction_setup(&params(0.4, 0.4, 1.5));
    let wo = view(30.0);
    assert_eq!(bsdf.eval_transmit(wo, view(50.0)), (Color::BLACK, 0.0));
    assert_eq!(bsdf.eval_transmit(-wo, -view(50.0)), (Color::BLACK, 0.0));
    let (value, pdf) = bsdf.eval_transmit(wo, -view(15.0));
    assert!(pdf > 0.0 && value.r > 0.0);
}
