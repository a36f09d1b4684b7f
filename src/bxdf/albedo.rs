use std::{convert::TryInto, path::Path};

use crate::core::{color::saturatef, loader::InputParams};

use super::util;

/// Lower bound of every albedo taken into the compensation.
pub(crate) const MIN_ALBEDO: f32 = 1e-4;

/// Single-scatter albedo of the white GGX closure, the input of the multi-scatter compensation.
///
/// `roughness` is `(alpha_x * alpha_y)^(1/4)`. Implementations return values in `[0, 1]`.
/// The compensation factor grows with roughness for every Fresnel average as long as
/// `average_albedo` never increases and `escaped_energy` never decreases with roughness.
pub trait AlbedoTable {
    /// Albedo `E(mu)` for a view direction with cosine `mu` against the normal.
    fn directional_albedo(&self, mu: f32, roughness: f32) -> f32;

    /// Cosine-weighted hemispherical average `E_avg = 2 * int E(mu) mu dmu`.
    fn average_albedo(&self, roughness: f32) -> f32;

    /// `E_avg * (1 - E(mu)) / E(mu)`, the view-dependent part of the compensation.
    fn escaped_energy(&self, mu: f32, roughness: f32) -> f32 {
        let e = self.directional_albedo(mu, roughness).max(MIN_ALBEDO);
        saturatef(self.average_albedo(roughness)) * (1.0 - e) / e
    }
}

lazy_static! {
    static ref SHARED_GGX_ALBEDO: GgxAlbedoTable = {
        let begin_time = std::time::Instant::now();
        let table = GgxAlbedoTable::compute(
            GgxAlbedoTable::DEFAULT_RESOLUTION,
            GgxAlbedoTable::DEFAULT_RESOLUTION,
            GgxAlbedoTable::DEFAULT_STRATA,
        );
        log::debug!(
            "built {}x{} GGX albedo table in {:?}",
            table.rough_res,
            table.mu_res,
            begin_time.elapsed()
        );
        table
    };
}

#[derive(Debug, Clone)]
pub struct GgxAlbedoTable {
    rough_res: usize,
    mu_res: usize,
    /// roughness-major, `directional[i * mu_res + j]`
    directional: Vec<f32>,
    average: Vec<f32>,
    /// `E_avg * (1 - E) / E` per grid point, same layout as `directional`
    escaped: Vec<f32>,
}

impl GgxAlbedoTable {
    pub const DEFAULT_RESOLUTION: usize = 32;
    pub const DEFAULT_STRATA: usize = 24;

    /// Table shared by the whole process, built on first use.
    pub fn shared() -> &'static GgxAlbedoTable {
        &SHARED_GGX_ALBEDO
    }

    /// Integrates the single-scatter closure with `strata * strata` stratified VNDF samples per
    /// grid point.
    pub fn compute(rough_res: usize, mu_res: usize, strata: usize) -> Self {
        let rough_res = rough_res.max(2);
        let mu_res = mu_res.max(2);
        let strata = strata.max(1);

        let mut directional = Vec::with_capacity(rough_res * mu_res);
        for i in 0..rough_res {
            let roughness = i as f32 / (rough_res - 1) as f32;
            let alpha = roughness * roughness;
            for j in 0..mu_res {
                let mu = (j as f32 / (mu_res - 1) as f32).max(1e-3);
                directional.push(single_scatter_albedo(mu, alpha, strata));
            }
        }
        let average = (0..rough_res)
            .map(|i| average_of_row(&directional[i * mu_res..(i + 1) * mu_res]))
            .collect();

        let mut table = Self {
            rough_res,
            mu_res,
            directional,
            average,
            escaped: Vec::new(),
        };
        table.enforce_contract();
        table
    }

    /// Builds a table from externally fitted values.
    /// `directional` is roughness-major with `rough_res * mu_res` entries.
    pub fn from_tables(
        rough_res: usize,
        mu_res: usize,
        directional: Vec<f32>,
        average: Vec<f32>,
    ) -> anyhow::Result<Self> {
        if rough_res < 2 || mu_res < 2 {
            anyhow::bail!(format!(
                "albedo table - resolution {}x{} is too small, need at least 2x2",
                rough_res, mu_res
            ));
        }
        if directional.len() != rough_res * mu_res {
            anyhow::bail!(format!(
                "albedo table - directional albedo has {} entries, expected {}",
                directional.len(),
                rough_res * mu_res
            ));
        }
        if average.len() != rough_res {
            anyhow::bail!(format!(
                "albedo table - average albedo has {} entries, expected {}",
                average.len(),
                rough_res
            ));
        }
        if directional.iter().chain(average.iter()).any(|v| !v.is_finite()) {
            anyhow::bail!("albedo table - contains non-finite values");
        }

        let mut table = Self {
            rough_res,
            mu_res,
            directional,
            average,
            escaped: Vec::new(),
        };
        if table.enforce_contract() {
            log::warn!("albedo table - values were clamped to [0, 1] or made monotonic in roughness");
        }
        Ok(table)
    }

    /// Expects `{ "directional": [[E(mu) per mu] per roughness], "average": [E_avg per roughness] }`.
    pub fn from_json(value: &serde_json::Value) -> anyhow::Result<Self> {
        let mut params: InputParams = value.try_into()?;
        params.set_name("albedo table".into());
        let rows = params.get_float_2darray("directional", None, None)?;
        let rough_res = rows.len();
        let average = params.get_float_array("average", Some(rough_res))?;
        params.check_unused_keys();

        let mu_res = rows.first().map_or(0, |row| row.len());
        Self::from_tables(rough_res, mu_res, rows.concat(), average)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            anyhow::anyhow!("albedo table - can't open '{}': {}", path.display(), e)
        })?;
        let reader = std::io::BufReader::new(file);
        let json: serde_json::Value = serde_json::from_reader(reader)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .directional
            .chunks(self.mu_res)
            .map(|row| serde_json::Value::from(row.to_vec()))
            .collect::<Vec<_>>();
        serde_json::json!({
            "directional": rows,
            "average": self.average,
        })
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.rough_res, self.mu_res)
    }

    /// Clamps into `[MIN_ALBEDO, 1]`, makes `E_avg` non-increasing and `E_avg * (1 - E) / E`
    /// non-decreasing along roughness, then rebuilds `E` from the two.
    /// Returns whether any input value moved.
    fn enforce_contract(&mut self) -> bool {
        let mut changed = false;
        let mut fix = |value: &mut f32, fixed: f32| {
            if (fixed - *value).abs() > 1e-6 {
                changed = true;
            }
            *value = fixed;
        };

        let mut escaped = vec![0.0; self.directional.len()];
        for i in 0..self.rough_res {
            let upper = if i > 0 { self.average[i - 1] } else { 1.0 };
            let e_avg = self.average[i].max(MIN_ALBEDO).min(upper);
            fix(&mut self.average[i], e_avg);
            for j in 0..self.mu_res {
                let k = i * self.mu_res + j;
                let e = self.directional[k].max(MIN_ALBEDO).min(1.0);
                let lower = if i > 0 { escaped[k - self.mu_res] } else { 0.0 };
                let q = (e_avg * (1.0 - e) / e).max(lower);
                escaped[k] = q;
                fix(&mut self.directional[k], e_avg / (q + e_avg));
            }
        }
        self.escaped = escaped;
        changed
    }

    /// Cell index and offset of `x` in `[0, 1]` on a grid of `res` points.
    fn cell(x: f32, res: usize) -> (usize, f32) {
        let x = saturatef(x) * (res - 1) as f32;
        let i = (x as usize).min(res - 2);
        (i, x - i as f32)
    }

    /// Bilinear lookup with clamped coordinates. Rows are blended along `mu` first, so a grid
    /// that is monotonic along roughness stays monotonic between grid points.
    fn lookup(&self, values: &[f32], mu: f32, roughness: f32) -> f32 {
        let (j, s) = Self::cell(mu, self.mu_res);
        let (i, t) = Self::cell(roughness, self.rough_res);
        let row = |i: usize| {
            let row = &values[i * self.mu_res..(i + 1) * self.mu_res];
            row[j] * (1.0 - s) + row[j + 1] * s
        };
        let lower = row(i);
        lower + (row(i + 1) - lower) * t
    }
}

impl AlbedoTable for GgxAlbedoTable {
    fn directional_albedo(&self, mu: f32, roughness: f32) -> f32 {
        let e_avg = self.average_albedo(roughness);
        e_avg / (self.escaped_energy(mu, roughness) + e_avg)
    }

    fn average_albedo(&self, roughness: f32) -> f32 {
        let (i, t) = Self::cell(roughness, self.rough_res);
        self.average[i] + (self.average[i + 1] - self.average[i]) * t
    }

    fn escaped_energy(&self, mu: f32, roughness: f32) -> f32 {
        self.lookup(&self.escaped, mu, roughness)
    }
}

/// `E(mu)` of the white closure, estimated with VNDF samples weighted by `G2 / G1`.
fn single_scatter_albedo(mu: f32, alpha: f32, strata: usize) -> f32 {
    let alpha2 = alpha * alpha;
    if alpha2 <= 1e-7 {
        return 1.0;
    }

    let wo = glam::Vec3A::new((1.0 - mu * mu).max(0.0).sqrt(), 0.0, mu);
    let lambda_o = util::ggx_lambda(mu, alpha2);
    let mut sum = 0.0;
    for a in 0..strata {
        for b in 0..strata {
            let rand_u = (a as f32 + 0.5) / strata as f32;
            let rand_v = (b as f32 + 0.5) / strata as f32;
            let m = util::ggx_vndf_sample(wo, alpha, alpha, rand_u, rand_v);
            let wi = util::reflect_n(wo, m);
            if wi.z <= 0.0 || m.dot(wo) <= 0.0 {
                continue;
            }
            let lambda_i = util::ggx_lambda(wi.z, alpha2);
            sum += (1.0 + lambda_o) / (1.0 + lambda_o + lambda_i);
        }
    }
    sum / (strata * strata) as f32
}

/// `2 * int_0^1 E(mu) mu dmu` over an evenly spaced row, trapezoid rule.
fn average_of_row(row: &[f32]) -> f32 {
    let n = row.len();
    let step = 1.0 / (n - 1) as f32;
    let mut sum = 0.0;
    for (j, e) in row.iter().enumerate() {
        let weight = if j == 0 || j == n - 1 { 0.5 } else { 1.0 };
        sum += weight * e * (j as f32 * step);
    }
    2.0 * sum * step
}
