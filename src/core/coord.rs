/// Orthonormal shading frame whose z axis is the closure normal.
#[derive(Copy, Clone, Debug)]
pub struct Coordinate {
    local_to_world: glam::Mat3A,
    world_to_local: glam::Mat3A,
}

impl Coordinate {
    /// Frame with its x axis following the projection of `t` onto the plane of `n`.
    /// Falls back to `from_z` when the tangent is (nearly) parallel to the normal.
    pub fn from_tangent_normal(t: glam::Vec3A, n: glam::Vec3A) -> Self {
        let z_world = n;
        let y_world = z_world.cross(t);
        let len_sqr = y_world.length_squared();
        if !(len_sqr > 1e-12) {
            return Self::from_z(n);
        }
        let y_world = y_world / len_sqr.sqrt();
        let x_world = y_world.cross(z_world);

        Self::from_cols(x_world, y_world, z_world)
    }

    /// Arbitrary frame around `z_world` (Duff et al., branchless ONB).
    pub fn from_z(z_world: glam::Vec3A) -> Self {
        let sign = if z_world.z >= 0.0 { 1.0 } else { -1.0 };
        let a = -1.0 / (sign + z_world.z);
        let b = z_world.x * z_world.y * a;
        let x_world = glam::Vec3A::new(
            1.0 + sign * z_world.x * z_world.x * a,
            sign * b,
            -sign * z_world.x,
        );
        let y_world = glam::Vec3A::new(b, sign + z_world.y * z_world.y * a, -z_world.y);

        Self::from_cols(x_world, y_world, z_world)
    }

    fn from_cols(x: glam::Vec3A, y: glam::Vec3A, z: glam::Vec3A) -> Self {
        let local_to_world = glam::Mat3A::from_cols(x, y, z);
        let world_to_local = local_to_world.transpose();
        Self {
            local_to_world,
            world_to_local,
        }
    }

    pub fn to_local(&self, world: glam::Vec3A) -> glam::Vec3A {
        self.world_to_local * world
    }

    pub fn to_world(&self, local: glam::Vec3A) -> glam::Vec3A {
        self.local_to_world * local
    }

    pub fn normal(&self) -> glam::Vec3A {
        self.local_to_world.z_axis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_orthonormal(coord: &Coordinate) {
        let x = coord.to_world(glam::Vec3A::X);
        let y = coord.to_world(glam::Vec3A::Y);
        let z = coord.to_world(glam::Vec3A::Z);
        assert!((x.length() - 1.0).abs() < 1e-5);
        assert!((y.length() - 1.0).abs() < 1e-5);
        assert!(x.dot(y).abs() < 1e-5);
        assert!(x.dot(z).abs() < 1e-5);
        assert!((x.cross(y) - z).length() < 1e-5);
    }

    #[test]
    fn from_z_is_orthonormal() {
        for n in [
            glam::Vec3A::Z,
            -glam::Vec3A::Z,
            glam::Vec3A::new(1.0, 2.0, -0.5).normalize(),
            glam::Vec3A::new(0.0, 1.0, 0.0),
        ] {
            let coord = Coordinate::from_z(n);
            assert_orthonormal(&coord);
            assert!((coord.normal() - n).length() < 1e-6);
        }
    }

    #[test]
    fn tangent_frame_follows_tangent() {
        let n = glam::Vec3A::Z;
        let t = glam::Vec3A::new(1.0, 0.0, 0.3);
        let coord = Coordinate::from_tangent_normal(t, n);
        assert_orthonormal(&coord);
        let local_t = coord.to_local(t);
        assert!(local_t.y.abs() < 1e-6);
        assert!(local_t.x > 0.0);
    }

    #[test]
    fn parallel_tangent_falls_back() {
        let coord = Coordinate::from_tangent_normal(glam::Vec3A::Z, glam::Vec3A::Z);
        assert_orthonormal(&coord);
    }
}
