use std::f32::consts::{FRAC_1_PI, PI};

use crate::core::color::Color;

use super::RayDifferentials;

pub fn reflect_n(i: glam::Vec3A, n: glam::Vec3A) -> glam::Vec3A {
    2.0 * i.dot(n) * n - i
}

/// GTR2 / GGX distribution, `cos_m` is the cosine between the macro normal and `m`.
pub fn ggx_ndf(cos_m: f32, alpha2: f32) -> f32 {
    let denom = 1.0 + (alpha2 - 1.0) * cos_m * cos_m;
    alpha2 * FRAC_1_PI / (denom * denom).max(f32::MIN_POSITIVE)
}

/// GTR1 (Berry) distribution used by the clearcoat lobe.
pub fn gtr1_ndf(cos_m: f32, alpha2: f32) -> f32 {
    if alpha2 >= 1.0 {
        return FRAC_1_PI;
    }
    let alpha2 = alpha2.max(1e-7);
    let t = 1.0 + (alpha2 - 1.0) * cos_m * cos_m;
    (alpha2 - 1.0) / (PI * alpha2.ln() * t).min(-f32::MIN_POSITIVE)
}

/// Anisotropic GGX, `m` given in the tangent frame.
pub fn ggx_ndf_aniso(m: glam::Vec3A, alpha_x: f32, alpha_y: f32) -> f32 {
    let slope_x = m.x / alpha_x;
    let slope_y = m.y / alpha_y;
    let t = slope_x * slope_x + slope_y * slope_y + m.z * m.z;
    1.0 / (PI * alpha_x * alpha_y * t * t).max(f32::MIN_POSITIVE)
}

/// Smith Λ for the isotropic GGX distribution.
pub fn ggx_lambda(cos_n: f32, alpha2: f32) -> f32 {
    let cos2 = (cos_n * cos_n).max(1e-12);
    let tan2 = (1.0 - cos2).max(0.0) / cos2;
    0.5 * ((1.0 + alpha2 * tan2).sqrt() - 1.0)
}

/// Smith Λ for the anisotropic GGX distribution, `w` given in the tangent frame.
pub fn ggx_lambda_aniso(w: glam::Vec3A, alpha_x: f32, alpha_y: f32) -> f32 {
    let ax = alpha_x * w.x;
    let ay = alpha_y * w.y;
    let z2 = (w.z * w.z).max(1e-12);
    0.5 * ((1.0 + (ax * ax + ay * ay) / z2).sqrt() - 1.0)
}

/// Samples a microfacet normal from the distribution of normals visible from `wo`.
/// Both `wo` and the result are in the tangent frame; `wo.z` must be positive.
pub fn ggx_vndf_sample(
    wo: glam::Vec3A,
    alpha_x: f32,
    alpha_y: f32,
    rand_u: f32,
    rand_v: f32,
) -> glam::Vec3A {
    // stretch the view so the distribution becomes the unit hemisphere
    let vh = glam::Vec3A::new(alpha_x * wo.x, alpha_y * wo.y, wo.z);
    let vh_len = vh.length();
    if !(vh_len > 0.0) {
        return glam::Vec3A::Z;
    }
    let vh = vh / vh_len;

    let len_sqr = vh.x * vh.x + vh.y * vh.y;
    let t1 = if len_sqr > 1e-7 {
        glam::Vec3A::new(-vh.y, vh.x, 0.0) / len_sqr.sqrt()
    } else {
        glam::Vec3A::X
    };
    let t2 = vh.cross(t1);

    // uniform point on the projected disk, warped onto the visible half
    let r = rand_u.sqrt();
    let phi = 2.0 * PI * rand_v;
    let (sin_phi, cos_phi) = phi.sin_cos();
    let p1 = r * cos_phi;
    let p2 = r * sin_phi;
    let s = 0.5 * (1.0 + vh.z);
    let p2 = (1.0 - s) * (1.0 - p1 * p1).max(0.0).sqrt() + s * p2;
    let nh = p1 * t1 + p2 * t2 + (1.0 - p1 * p1 - p2 * p2).max(0.0).sqrt() * vh;

    let ne = glam::Vec3A::new(alpha_x * nh.x, alpha_y * nh.y, nh.z.max(0.0));
    let ne_len = ne.length();
    if ne_len > 1e-12 {
        ne / ne_len
    } else {
        glam::Vec3A::Z
    }
}

/// Unpolarized dielectric Fresnel reflectance. Returns 1 under total internal reflection.
pub fn fresnel_dielectric_cos(cos_i: f32, ior: f32) -> f32 {
    let c = cos_i.abs();
    let g = ior * ior - 1.0 + c * c;
    if g > 0.0 {
        let g = g.sqrt();
        let a = (g - c) / (g + c);
        let b = (c * (g + c) - 1.0) / (c * (g - c) + 1.0);
        0.5 * a * a * (1.0 + b * b)
    } else {
        1.0
    }
}

pub struct FresnelRefraction {
    pub reflect: glam::Vec3A,
    pub transmit: glam::Vec3A,
    pub fresnel: f32,
    /// `i` arrived from the back side of `n`
    pub inside: bool,
    /// (reflected, transmitted), present when input differentials were given
    pub differentials: Option<(RayDifferentials, RayDifferentials)>,
}

/// Reflects and refracts `i` (pointing away from the surface) about `n`.
/// `ior` is the relative index of the side `n` points away from.
pub fn fresnel_dielectric(
    ior: f32,
    n: glam::Vec3A,
    i: glam::Vec3A,
    differentials: Option<&RayDifferentials>,
) -> FresnelRefraction {
    let cos = n.dot(i);
    let (cos, ior_ratio, nn, inside) = if cos > 0.0 {
        (cos, 1.0 / ior, n, false)
    } else {
        (-cos, ior, -n, true)
    };

    let reflect = (2.0 * cos) * nn - i;
    let reflect_diff = |d: glam::Vec3A| (2.0 * nn.dot(d)) * nn - d;

    let arg = 1.0 - ior_ratio * ior_ratio * (1.0 - cos * cos);
    if arg < 0.0 {
        return FresnelRefraction {
            reflect,
            transmit: glam::Vec3A::ZERO,
            fresnel: 1.0,
            inside,
            differentials: differentials.map(|d| {
                (
                    RayDifferentials {
                        dx: reflect_diff(d.dx),
                        dy: reflect_diff(d.dy),
                    },
                    RayDifferentials::default(),
                )
            }),
        };
    }

    let dnp = arg.sqrt().max(1e-7);
    let nk = ior_ratio * cos - dnp;
    let transmit = -(ior_ratio * i) + nk * nn;
    let transmit_diff = |d: glam::Vec3A| {
        -(ior_ratio * d) + ((ior_ratio - ior_ratio * ior_ratio * cos / dnp) * d.dot(nn)) * nn
    };

    let eta = 1.0 / ior_ratio;
    let cos_t = -nn.dot(transmit);
    let p_para = (cos - eta * cos_t) / (cos + eta * cos_t);
    let p_perp = (eta * cos - cos_t) / (eta * cos + cos_t);
    let fresnel = 0.5 * (p_para * p_para + p_perp * p_perp);

    FresnelRefraction {
        reflect,
        transmit,
        fresnel,
        inside,
        differentials: differentials.map(|d| {
            (
                RayDifferentials {
                    dx: reflect_diff(d.dx),
                    dy: reflect_diff(d.dy),
                },
                RayDifferentials {
                    dx: transmit_diff(d.dx),
                    dy: transmit_diff(d.dy),
                },
            )
        }),
    }
}

/// Real dielectric Fresnel remapped from `[F0_real, 1]` onto `[f0, 1]`.
pub fn interpolate_fresnel_color(l: glam::Vec3A, h: glam::Vec3A, ior: f32, f0: Color) -> Color {
    let real_f = fresnel_dielectric_cos(l.dot(h), ior);
    let real_f0 = fresnel_dielectric_cos(1.0, ior);
    Color::lerp(f0, Color::WHITE, inverse_lerp(real_f0, 1.0, real_f))
}

/// Hemispherical average of Schlick's approximation: `f0 + (1 - f0) / 21`.
pub fn schlick_fresnel_fss(f0: Color) -> Color {
    Color::lerp(f0, Color::WHITE, 1.0 / 21.0)
}

/// Hemispherical average of `lerp(base, edge, (1 - cos)^exponent)`.
pub fn metallic_fresnel_fss(base: Color, edge: Color, exponent: f32) -> Color {
    let s = 2.0 / ((exponent + 1.0) * (exponent + 2.0));
    Color::lerp(base, edge, s)
}

/// Polynomial fit of the hemispherical average of `fresnel_dielectric_cos`.
pub fn dielectric_fresnel_fss(ior: f32) -> f32 {
    let fss = if ior < 1.0 {
        0.997118 + ior * (0.1014 - ior * (0.965241 + ior * 0.130607))
    } else {
        (ior - 1.0) / (4.08567 + 1.00071 * ior)
    };
    fss.max(0.0).min(1.0)
}

pub fn inverse_lerp(a: f32, b: f32, x: f32) -> f32 {
    let range = b - a;
    if range.abs() > 1e-7 {
        (x - a) / range
    } else {
        0.0
    }
}
