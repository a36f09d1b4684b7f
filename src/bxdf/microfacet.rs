use crate::core::{
    color::{saturatef, Color},
    coord::Coordinate,
};

use super::{
    albedo::MIN_ALBEDO, util, AlbedoTable, BxdfSample, BxdfSampleType, ClosureFlags, FresnelExtra, GgxClearcoat,
    GgxClearcoatV2, GgxFresnel, GgxFresnelV2, GgxPlain, GgxRefraction, MetallicExtra,
    MicrofacetType, MicrofacetVariant, MicrofacetVariantT, MultiGgx, MultiGgxFresnel,
    RayDifferentials,
};

/// Density reported for near-mirror events, both as pdf and as the value multiplier.
pub const SINGULAR_PDF: f32 = 1e6;

/// `alpha_x * alpha_y` at or below which the closure is treated as a mirror.
const SINGULAR_ALPHA2: f32 = 1e-7;
/// `|ior - 1|` below which transmission does not bend and is treated as singular.
const SINGULAR_IOR_EPS: f32 = 1e-4;

/// Raw material inputs, clamped and normalized by the setup calls.
#[derive(Debug, Clone, Copy)]
pub struct MicrofacetParams {
    pub normal: glam::Vec3A,
    /// only used when `alpha_x != alpha_y`
    pub tangent: glam::Vec3A,
    pub alpha_x: f32,
    pub alpha_y: f32,
    pub ior: f32,
    pub weight: Color,
    pub sample_weight: f32,
}

impl Default for MicrofacetParams {
    fn default() -> Self {
        Self {
            normal: glam::Vec3A::Z,
            tangent: glam::Vec3A::X,
            alpha_x: 0.5,
            alpha_y: 0.5,
            ior: 1.5,
            weight: Color::WHITE,
            sample_weight: 1.0,
        }
    }
}

/// A configured GGX closure. Created by one of the setup functions and only read afterwards,
/// apart from `blur`.
#[derive(Debug, Clone, Copy)]
pub struct MicrofacetBsdf {
    normal: glam::Vec3A,
    tangent: glam::Vec3A,
    alpha_x: f32,
    alpha_y: f32,
    ior: f32,
    weight: Color,
    sample_weight: f32,
    variant: MicrofacetVariant,
}

/// Per-channel multi-scatter compensation `1 + Fms * (1 - E) / E` for a closure with roughness
/// `(alpha_x, alpha_y)` seen from `wo`.
pub fn albedo_scaling<T: AlbedoTable + ?Sized>(
    table: &T,
    wo: glam::Vec3A,
    normal: glam::Vec3A,
    alpha_x: f32,
    alpha_y: f32,
    fss: Color,
) -> Color {
    let (escaped, e_avg) = albedo_terms(table, wo, normal, alpha_x, alpha_y);
    fss.map(|fss| compensation(fss, escaped, e_avg))
}

/// Single channel version of `albedo_scaling`.
pub fn albedo_scaling_float<T: AlbedoTable + ?Sized>(
    table: &T,
    wo: glam::Vec3A,
    normal: glam::Vec3A,
    alpha_x: f32,
    alpha_y: f32,
    fss: f32,
) -> f32 {
    let (escaped, e_avg) = albedo_terms(table, wo, normal, alpha_x, alpha_y);
    compensation(fss, escaped, e_avg)
}

fn albedo_terms<T: AlbedoTable + ?Sized>(
    table: &T,
    wo: glam::Vec3A,
    normal: glam::Vec3A,
    alpha_x: f32,
    alpha_y: f32,
) -> (f32, f32) {
    let mu = wo.dot(normal);
    let roughness = (alpha_x * alpha_y).max(0.0).sqrt().sqrt();
    let escaped = table.escaped_energy(mu, roughness).max(0.0);
    let e_avg = saturatef(table.average_albedo(roughness));
    (escaped, e_avg)
}

/// `1 + Fms * (1 - E) / E` with `Fms = Fss * E_avg / (1 - Fss * (1 - E_avg))`, written as
/// `1 + Fss / (1 - Fss * (1 - E_avg)) * escaped`. Neither factor decreases with roughness.
fn compensation(fss: f32, escaped: f32, e_avg: f32) -> f32 {
    let fss = saturatef(fss);
    let denom = (1.0 - fss * (1.0 - e_avg)).max(MIN_ALBEDO);
    1.0 + fss / denom * escaped
}

fn checked(value: Color, pdf: f32) -> (Color, f32) {
    if value.is_finite() && pdf.is_finite() && pdf >= 0.0 {
        (value, pdf)
    } else {
        (Color::BLACK, 0.0)
    }
}

impl MicrofacetBsdf {
    fn from_params(params: &MicrofacetParams, variant: MicrofacetVariant) -> Self {
        let ior = if params.ior.is_finite() && params.ior > 0.0 {
            params.ior
        } else {
            1.0
        };
        Self {
            normal: params.normal.normalize_or_zero(),
            tangent: params.tangent.normalize_or_zero(),
            alpha_x: saturatef(params.alpha_x),
            alpha_y: saturatef(params.alpha_y),
            ior,
            weight: params.weight.max(0.0),
            sample_weight: params.sample_weight.max(0.0),
            variant,
        }
    }

    fn isotropic(mut self) -> Self {
        self.alpha_y = self.alpha_x;
        self
    }

    fn flags() -> ClosureFlags {
        ClosureFlags::BSDF | ClosureFlags::HAS_EVAL
    }

    /// Caches the tint towards the normal and folds its average into the sample weight.
    fn fold_fresnel_color(&mut self, wo: glam::Vec3A) {
        let average_fresnel = self.variant.reflection_color(self.ior, wo, self.normal);
        self.sample_weight *= average_fresnel.avg();
        if let Some(extra) = self.variant.extra_mut() {
            extra.fresnel_color = average_fresnel;
        }
    }

    fn scaling<T: AlbedoTable + ?Sized>(&self, table: &T, wo: glam::Vec3A, fss: Color) -> Color {
        albedo_scaling(table, wo, self.normal, self.alpha_x, self.alpha_y, fss)
    }

    fn scaling_float<T: AlbedoTable + ?Sized>(&self, table: &T, wo: glam::Vec3A, fss: f32) -> f32 {
        albedo_scaling_float(table, wo, self.normal, self.alpha_x, self.alpha_y, fss)
    }

    pub fn ggx_setup(params: &MicrofacetParams) -> (Self, ClosureFlags) {
        (Self::from_params(params, GgxPlain.into()), Self::flags())
    }

    pub fn ggx_isotropic_setup(params: &MicrofacetParams) -> (Self, ClosureFlags) {
        let bsdf = Self::from_params(params, GgxPlain.into()).isotropic();
        (bsdf, Self::flags())
    }

    /// `color` is the single-scatter albedo the compensation is computed for.
    pub fn multi_ggx_setup<T: AlbedoTable + ?Sized>(
        params: &MicrofacetParams,
        color: Color,
        wo: glam::Vec3A,
        table: &T,
    ) -> (Self, ClosureFlags) {
        let mut bsdf = Self::from_params(params, MultiGgx.into());
        let scale = bsdf.scaling(table, wo, color.saturate());
        bsdf.weight *= scale;
        (bsdf, Self::flags())
    }

    pub fn ggx_fresnel_setup(
        params: &MicrofacetParams,
        extra: FresnelExtra,
        wo: glam::Vec3A,
    ) -> (Self, ClosureFlags) {
        let extra = saturate_extra(extra);
        let mut bsdf = Self::from_params(params, GgxFresnel { extra }.into());
        bsdf.fold_fresnel_color(wo);
        (bsdf, Self::flags())
    }

    pub fn multi_ggx_fresnel_setup<T: AlbedoTable + ?Sized>(
        params: &MicrofacetParams,
        extra: FresnelExtra,
        wo: glam::Vec3A,
        table: &T,
    ) -> (Self, ClosureFlags) {
        let extra = saturate_extra(extra);
        let mut bsdf = Self::from_params(params, MultiGgxFresnel { extra }.into());
        let scale = bsdf.scaling(table, wo, util::schlick_fresnel_fss(extra.cspec0));
        bsdf.weight *= scale;
        bsdf.fold_fresnel_color(wo);
        (bsdf, Self::flags())
    }

    /// `extra.metal_falloff` is the raw falloff in `(0, 1]`; `metallic` and `dielectric` weight
    /// the two Fresnel terms, each compensated for multiple scattering on its own.
    pub fn ggx_fresnel_v2_setup<T: AlbedoTable + ?Sized>(
        params: &MicrofacetParams,
        mut extra: MetallicExtra,
        metallic: f32,
        dielectric: f32,
        wo: glam::Vec3A,
        table: &T,
    ) -> (Self, ClosureFlags) {
        let mut bsdf = Self::from_params(params, GgxPlain.into());

        if metallic > 0.0 {
            extra.metal_base = extra.metal_base.saturate();
            extra.metal_edge = extra.metal_edge.saturate();
            let falloff = extra.metal_falloff;
            let falloff = if falloff.is_nan() { 1.0 } else { falloff };
            extra.metal_falloff = 1.0 / falloff.max(1e-3).min(1.0);
            let metal_fss =
                util::metallic_fresnel_fss(extra.metal_base, extra.metal_edge, extra.metal_falloff);
            let metal_scale = bsdf.scaling(table, wo, metal_fss) * metallic;
            extra.metal_base *= metal_scale;
            extra.metal_edge *= metal_scale;
        } else {
            extra.metal_falloff = 0.0;
            extra.metal_base = Color::BLACK;
            extra.metal_edge = Color::BLACK;
        }

        extra.dielectric = if dielectric > 0.0 {
            let dielectric_fss = util::dielectric_fresnel_fss(bsdf.ior);
            dielectric * bsdf.scaling_float(table, wo, dielectric_fss)
        } else {
            0.0
        };

        bsdf.variant = GgxFresnelV2 { extra }.into();
        bsdf.fold_fresnel_color(wo);
        (bsdf, Self::flags())
    }

    pub fn ggx_clearcoat_setup(
        params: &MicrofacetParams,
        extra: FresnelExtra,
        wo: glam::Vec3A,
    ) -> (Self, ClosureFlags) {
        let extra = saturate_extra(extra);
        let mut bsdf = Self::from_params(params, GgxClearcoat { extra }.into()).isotropic();
        bsdf.fold_fresnel_color(wo);
        (bsdf, Self::flags())
    }

    pub fn ggx_clearcoat_v2_setup<T: AlbedoTable + ?Sized>(
        params: &MicrofacetParams,
        extra: FresnelExtra,
        wo: glam::Vec3A,
        table: &T,
    ) -> (Self, ClosureFlags) {
        let extra = saturate_extra(extra);
        let mut bsdf = Self::from_params(params, GgxClearcoatV2 { extra }.into()).isotropic();
        let scale = bsdf.scaling_float(table, wo, util::dielectric_fresnel_fss(bsdf.ior));
        bsdf.weight *= scale;
        bsdf.fold_fresnel_color(wo);
        (bsdf, Self::flags())
    }

    pub fn ggx_refraction_setup(params: &MicrofacetParams) -> (Self, ClosureFlags) {
        let bsdf = Self::from_params(params, GgxRefraction.into()).isotropic();
        (bsdf, Self::flags())
    }

    pub fn normal(&self) -> glam::Vec3A {
        self.normal
    }

    pub fn alpha(&self) -> (f32, f32) {
        (self.alpha_x, self.alpha_y)
    }

    pub fn ior(&self) -> f32 {
        self.ior
    }

    pub fn weight(&self) -> Color {
        self.weight
    }

    pub fn sample_weight(&self) -> f32 {
        self.sample_weight
    }

    pub fn variant(&self) -> &MicrofacetVariant {
        &self.variant
    }

    pub fn ty(&self) -> MicrofacetType {
        self.variant.ty()
    }

    /// Tint towards the normal cached at setup, for variants carrying a color payload.
    pub fn fresnel_color(&self) -> Option<Color> {
        self.variant.extra().map(|extra| extra.fresnel_color)
    }

    /// The inputs that reproduce this closure's geometry, roughness and weights.
    pub fn params(&self) -> MicrofacetParams {
        MicrofacetParams {
            normal: self.normal,
            tangent: self.tangent,
            alpha_x: self.alpha_x,
            alpha_y: self.alpha_y,
            ior: self.ior,
            weight: self.weight,
            sample_weight: self.sample_weight,
        }
    }

    pub fn is_singular(&self) -> bool {
        self.alpha_x * self.alpha_y <= SINGULAR_ALPHA2
    }

    fn is_isotropic(&self) -> bool {
        self.alpha_x == self.alpha_y
    }

    /// Widens the roughness to at least `roughness`.
    pub fn blur(&mut self, roughness: f32) {
        let roughness = saturatef(roughness);
        self.alpha_x = self.alpha_x.max(roughness);
        self.alpha_y = self.alpha_y.max(roughness);
    }

    fn frame(&self) -> Coordinate {
        if self.is_isotropic() {
            Coordinate::from_z(self.normal)
        } else {
            Coordinate::from_tangent_normal(self.tangent, self.normal)
        }
    }

    /// Distribution value at `m` and Smith Λ of both directions.
    fn microfacet_terms(
        &self,
        wo: glam::Vec3A,
        wi: glam::Vec3A,
        m: glam::Vec3A,
        cos_no: f32,
        cos_ni: f32,
    ) -> (f32, f32, f32) {
        if self.is_isotropic() {
            let alpha2 = self.alpha_x * self.alpha_y;
            let cos_nm = self.normal.dot(m);
            if self.variant.is_clearcoat() {
                let masking_alpha2 = GgxClearcoat::MASKING_ALPHA2;
                (
                    util::gtr1_ndf(cos_nm, alpha2),
                    util::ggx_lambda(cos_no, masking_alpha2),
                    util::ggx_lambda(cos_ni, masking_alpha2),
                )
            } else {
                (
                    util::ggx_ndf(cos_nm, alpha2),
                    util::ggx_lambda(cos_no, alpha2),
                    util::ggx_lambda(cos_ni, alpha2),
                )
            }
        } else {
            let frame = Coordinate::from_tangent_normal(self.tangent, self.normal);
            (
                util::ggx_ndf_aniso(frame.to_local(m), self.alpha_x, self.alpha_y),
                util::ggx_lambda_aniso(frame.to_local(wo), self.alpha_x, self.alpha_y),
                util::ggx_lambda_aniso(frame.to_local(wi), self.alpha_x, self.alpha_y),
            )
        }
    }

    /// Value (cosine of `wi` included) and pdf of reflecting `wo` into `wi`.
    pub fn eval_reflect(&self, wo: glam::Vec3A, wi: glam::Vec3A) -> (Color, f32) {
        if self.variant.is_refractive() || self.is_singular() {
            return (Color::BLACK, 0.0);
        }
        let cos_no = self.normal.dot(wo);
        let cos_ni = self.normal.dot(wi);
        if !(cos_no > 0.0 && cos_ni > 0.0) {
            return (Color::BLACK, 0.0);
        }
        let m = (wi + wo).normalize_or_zero();
        if m == glam::Vec3A::ZERO {
            return (Color::BLACK, 0.0);
        }

        let (d, lambda_o, lambda_i) = self.microfacet_terms(wo, wi, m, cos_no, cos_ni);
        let common = d * 0.25 / cos_no;
        let fresnel = self.variant.reflection_color(self.ior, wi, m);
        checked(
            fresnel * (common / (1.0 + lambda_o + lambda_i)),
            common / (1.0 + lambda_o),
        )
    }

    /// Value (cosine of `wi` included) and pdf of refracting `wo` into `wi` below the surface.
    pub fn eval_transmit(&self, wo: glam::Vec3A, wi: glam::Vec3A) -> (Color, f32) {
        if !self.variant.is_refractive()
            || self.is_singular()
            || (self.ior - 1.0).abs() < SINGULAR_IOR_EPS
        {
            return (Color::BLACK, 0.0);
        }
        let cos_no = self.normal.dot(wo);
        let cos_ni = self.normal.dot(wi);
        if !(cos_no > 0.0 && cos_ni < 0.0) {
            return (Color::BLACK, 0.0);
        }

        let ht = -(self.ior * wi + wo);
        let ht_len2 = ht.length_squared();
        if !(ht_len2 > 1e-12) {
            return (Color::BLACK, 0.0);
        }
        let m = ht / ht_len2.sqrt();
        // ht points away from the normal when ior < 1
        let m = if self.normal.dot(m) < 0.0 { -m } else { m };
        let cos_mo = m.dot(wo);
        let cos_mi = m.dot(wi);
        if !(cos_mo > 0.0 && cos_mi < 0.0) {
            return (Color::BLACK, 0.0);
        }

        let (value, pdf) = self.transmit_terms(m, cos_no, cos_ni, cos_mo, cos_mi, ht_len2);
        checked(value, pdf)
    }

    fn transmit_terms(
        &self,
        m: glam::Vec3A,
        cos_no: f32,
        cos_ni: f32,
        cos_mo: f32,
        cos_mi: f32,
        ht_len2: f32,
    ) -> (Color, f32) {
        let alpha2 = self.alpha_x * self.alpha_y;
        let d = util::ggx_ndf(self.normal.dot(m), alpha2);
        let lambda_o = util::ggx_lambda(cos_no, alpha2);
        let lambda_i = util::ggx_lambda(cos_ni, alpha2);

        let common = (cos_mi * cos_mo).abs() * d * self.ior * self.ior / (cos_no * ht_len2);
        (
            Color::gray(common / (1.0 + lambda_o + lambda_i)),
            common / (1.0 + lambda_o),
        )
    }

    /// Evaluates the lobe on the side of the surface `wi` lies on.
    pub fn eval(&self, wo: glam::Vec3A, wi: glam::Vec3A) -> (Color, f32) {
        if self.normal.dot(wi) >= 0.0 {
            self.eval_reflect(wo, wi)
        } else {
            self.eval_transmit(wo, wi)
        }
    }

    /// Importance samples the visible normals seen from `wo`. `ng` is the geometric normal used
    /// to reject directions that leak through the surface. Returns `None` when no valid
    /// direction was produced.
    pub fn sample(
        &self,
        ng: glam::Vec3A,
        wo: glam::Vec3A,
        rand_u: f32,
        rand_v: f32,
        differentials: Option<&RayDifferentials>,
    ) -> Option<BxdfSample> {
        let cos_no = self.normal.dot(wo);
        if !(cos_no > 0.0) {
            return None;
        }

        let frame = self.frame();
        let local_m = util::ggx_vndf_sample(
            frame.to_local(wo),
            self.alpha_x,
            self.alpha_y,
            rand_u,
            rand_v,
        );
        let m = frame.to_world(local_m);

        let sample = if self.variant.is_refractive() {
            self.sample_transmit(ng, wo, m, cos_no, differentials)
        } else {
            self.sample_reflect(ng, wo, m, cos_no, differentials)
        }?;

        if sample.bxdf.is_finite() && sample.pdf.is_finite() && sample.pdf > 0.0 {
            Some(sample)
        } else {
            None
        }
    }

    fn sample_reflect(
        &self,
        ng: glam::Vec3A,
        wo: glam::Vec3A,
        m: glam::Vec3A,
        cos_no: f32,
        differentials: Option<&RayDifferentials>,
    ) -> Option<BxdfSample> {
        let cos_mo = m.dot(wo);
        if !(cos_mo > 0.0) {
            return None;
        }
        let wi = 2.0 * cos_mo * m - wo;
        let cos_ni = self.normal.dot(wi);
        if !(ng.dot(wi) > 0.0 && cos_ni > 0.0) {
            return None;
        }

        let differentials = differentials.map(|d| RayDifferentials {
            dx: 2.0 * m.dot(d.dx) * m - d.dx,
            dy: 2.0 * m.dot(d.dy) * m - d.dy,
        });
        let fresnel = self.variant.reflection_color(self.ior, wi, m);

        if self.is_singular() {
            return Some(BxdfSample {
                wi,
                ty: BxdfSampleType::singular_reflect(),
                bxdf: fresnel * SINGULAR_PDF,
                pdf: SINGULAR_PDF,
                differentials,
            });
        }

        let (d, lambda_o, lambda_i) = self.microfacet_terms(wo, wi, m, cos_no, cos_ni);
        let common = d * 0.25 / cos_no;
        Some(BxdfSample {
            wi,
            ty: BxdfSampleType::glossy_reflect(),
            bxdf: fresnel * (common / (1.0 + lambda_o + lambda_i)),
            pdf: common / (1.0 + lambda_o),
            differentials,
        })
    }

    fn sample_transmit(
        &self,
        ng: glam::Vec3A,
        wo: glam::Vec3A,
        m: glam::Vec3A,
        cos_no: f32,
        differentials: Option<&RayDifferentials>,
    ) -> Option<BxdfSample> {
        let refraction = util::fresnel_dielectric(self.ior, m, wo, differentials);
        if refraction.inside || refraction.fresnel >= 1.0 {
            return None;
        }
        let wi = refraction.transmit;
        let cos_ni = self.normal.dot(wi);
        if !(ng.dot(wi) < 0.0 && cos_ni < 0.0) {
            return None;
        }
        let differentials = refraction.differentials.map(|(_, transmit)| transmit);

        if self.is_singular() || (self.ior - 1.0).abs() < SINGULAR_IOR_EPS {
            return Some(BxdfSample {
                wi,
                ty: BxdfSampleType::singular_transmit(),
                bxdf: Color::gray(SINGULAR_PDF),
                pdf: SINGULAR_PDF,
                differentials,
            });
        }

        let cos_mo = m.dot(wo);
        let cos_mi = m.dot(wi);
        let ht = self.ior * cos_mi + cos_mo;
        let ht_len2 = ht * ht;
        if !(ht_len2 > 1e-12) {
            return None;
        }
        let (bxdf, pdf) = self.transmit_terms(m, cos_no, cos_ni, cos_mo, cos_mi, ht_len2);
        Some(BxdfSample {
            wi,
            ty: BxdfSampleType::glossy_transmit(),
            bxdf,
            pdf,
            differentials,
        })
    }
}

fn saturate_extra(extra: FresnelExtra) -> FresnelExtra {
    FresnelExtra {
        color: extra.color.saturate(),
        cspec0: extra.cspec0.saturate(),
        fresnel_color: extra.fresnel_color,
    }
}
