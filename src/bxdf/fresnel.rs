use crate::core::color::Color;

use super::util;

/// Plain tag of a configured closure, for callers that only need to branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrofacetType {
    Plain,
    Fresnel,
    FresnelV2,
    Clearcoat,
    ClearcoatV2,
    Refraction,
    MultiPlain,
    MultiFresnel,
}

/// Colored specular payload shared by the Fresnel and clearcoat closures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FresnelExtra {
    pub color: Color,
    /// specular color at normal incidence
    pub cspec0: Color,
    /// reflection color towards the normal, cached at setup
    pub fresnel_color: Color,
}

impl FresnelExtra {
    pub fn new(color: Color, cspec0: Color) -> Self {
        Self {
            color,
            cspec0,
            fresnel_color: Color::WHITE,
        }
    }
}

/// Metallic/dielectric blend payload of the v2 Fresnel closure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetallicExtra {
    pub metal_base: Color,
    pub metal_edge: Color,
    /// exponent applied to `1 - cos`; the raw falloff before setup
    pub metal_falloff: f32,
    pub dielectric: f32,
}

#[enum_dispatch::enum_dispatch(MicrofacetVariant)]
pub trait MicrofacetVariantT {
    fn ty(&self) -> MicrofacetType;

    /// Tint of light leaving along `l` after reflecting off a microfacet with normal `h`.
    fn reflection_color(&self, ior: f32, l: glam::Vec3A, h: glam::Vec3A) -> Color;

    fn is_refractive(&self) -> bool {
        false
    }

    /// Clearcoat uses GTR1 for the distribution and a fixed roughness for masking.
    fn is_clearcoat(&self) -> bool {
        false
    }

    fn extra(&self) -> Option<&FresnelExtra> {
        None
    }

    fn extra_mut(&mut self) -> Option<&mut FresnelExtra> {
        None
    }
}

#[enum_dispatch::enum_dispatch]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MicrofacetVariant {
    GgxPlain,
    GgxFresnel,
    GgxFresnelV2,
    GgxClearcoat,
    GgxClearcoatV2,
    GgxRefraction,
    MultiGgx,
    MultiGgxFresnel,
}

macro_rules! impl_extra_access {
    () => {
        fn extra(&self) -> Option<&FresnelExtra> {
            Some(&self.extra)
        }

        fn extra_mut(&mut self) -> Option<&mut FresnelExtra> {
            Some(&mut self.extra)
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GgxPlain;

impl MicrofacetVariantT for GgxPlain {
    fn ty(&self) -> MicrofacetType {
        MicrofacetType::Plain
    }

    fn reflection_color(&self, _ior: f32, _l: glam::Vec3A, _h: glam::Vec3A) -> Color {
        Color::WHITE
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgxFresnel {
    pub extra: FresnelExtra,
}

impl MicrofacetVariantT for GgxFresnel {
    fn ty(&self) -> MicrofacetType {
        MicrofacetType::Fresnel
    }

    fn reflection_color(&self, ior: f32, l: glam::Vec3A, h: glam::Vec3A) -> Color {
        util::interpolate_fresnel_color(l, h, ior, self.extra.cspec0)
    }

    impl_extra_access!();
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgxFresnelV2 {
    pub extra: MetallicExtra,
}

impl MicrofacetVariantT for GgxFresnelV2 {
    fn ty(&self) -> MicrofacetType {
        MicrofacetType::FresnelV2
    }

    fn reflection_color(&self, ior: f32, l: glam::Vec3A, h: glam::Vec3A) -> Color {
        let cos_hl = h.dot(l);
        // F0 and F90 already carry the metallic factor and the albedo scaling
        let blend = (1.0 - cos_hl).max(0.0).powf(self.extra.metal_falloff);
        let metallic = Color::lerp(self.extra.metal_base, self.extra.metal_edge, blend);
        let dielectric = self.extra.dielectric * util::fresnel_dielectric_cos(cos_hl, ior);
        metallic + Color::gray(dielectric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgxClearcoat {
    pub extra: FresnelExtra,
}

impl GgxClearcoat {
    pub const F0: f32 = 0.04;
    /// alpha^2 used for masking, from the fixed clearcoat alpha of 0.25
    pub const MASKING_ALPHA2: f32 = 0.0625;
}

impl MicrofacetVariantT for GgxClearcoat {
    fn ty(&self) -> MicrofacetType {
        MicrofacetType::Clearcoat
    }

    fn reflection_color(&self, ior: f32, l: glam::Vec3A, h: glam::Vec3A) -> Color {
        util::interpolate_fresnel_color(l, h, ior, Color::gray(Self::F0))
    }

    fn is_clearcoat(&self) -> bool {
        true
    }

    impl_extra_access!();
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgxClearcoatV2 {
    pub extra: FresnelExtra,
}

impl MicrofacetVariantT for GgxClearcoatV2 {
    fn ty(&self) -> MicrofacetType {
        MicrofacetType::ClearcoatV2
    }

    fn reflection_color(&self, ior: f32, l: glam::Vec3A, h: glam::Vec3A) -> Color {
        Color::gray(util::fresnel_dielectric_cos(h.dot(l), ior))
    }

    impl_extra_access!();
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GgxRefraction;

impl MicrofacetVariantT for GgxRefraction {
    fn ty(&self) -> MicrofacetType {
        MicrofacetType::Refraction
    }

    fn reflection_color(&self, _ior: f32, _l: glam::Vec3A, _h: glam::Vec3A) -> Color {
        Color::WHITE
    }

    fn is_refractive(&self) -> bool {
        true
    }
}

/// Plain closure whose weight carries the multiple-scattering compensation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MultiGgx;

impl MicrofacetVariantT for MultiGgx {
    fn ty(&self) -> MicrofacetType {
        MicrofacetType::MultiPlain
    }

    fn reflection_color(&self, _ior: f32, _l: glam::Vec3A, _h: glam::Vec3A) -> Color {
        Color::WHITE
    }
}

/// Fresnel closure whose weight carries the multiple-scattering compensation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiGgxFresnel {
    pub extra: FresnelExtra,
}

impl MicrofacetVariantT for MultiGgxFresnel {
    fn ty(&self) -> MicrofacetType {
        MicrofacetType::MultiFresnel
    }

    fn reflection_color(&self, ior: f32, l: glam::Vec3A, h: glam::Vec3A) -> Color {
        util::interpolate_fresnel_color(l, h, ior, self.extra.cspec0)
    }

    impl_extra_access!();
}
