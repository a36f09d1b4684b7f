use rand::SeedableRng;

/// Random source for callers of the closure (integrators, the inspection tool, tests).
/// The closure itself only consumes the numbers it is handed.
pub struct Rng {
    rng: rand::rngs::SmallRng,
}

impl Rng {
    pub fn new() -> Self {
        Self {
            rng: rand::rngs::SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: rand::rngs::SmallRng::seed_from_u64(seed),
        }
    }

    /// Uniform in `[0, 1)`.
    pub fn uniform_1d(&mut self) -> f32 {
        rand::Rng::gen(&mut self.rng)
    }

    pub fn uniform_2d(&mut self) -> (f32, f32) {
        (self.uniform_1d(), self.uniform_1d())
    }

    pub fn uniform_on_sphere(&mut self) -> glam::Vec3A {
        let (rand_x, rand_y) = self.uniform_2d();
        let phi = rand_x * 2.0 * std::f32::consts::PI;
        let (sin_phi, cos_phi) = phi.sin_cos();
        let cos_theta = 1.0 - 2.0 * rand_y;
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        glam::Vec3A::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
    }

    /// Uniform direction on the hemisphere around `n`.
    pub fn uniform_on_hemisphere(&mut self, n: glam::Vec3A) -> glam::Vec3A {
        let dir = self.uniform_on_sphere();
        if dir.dot(n) < 0.0 {
            -dir
        } else {
            dir
        }
    }
}

impl Default for Rng {
    fn default() -> Self {
        Self::new()
    }
}
