pub mod util;

mod albedo;
mod fresnel;
mod microfacet;

pub use albedo::*;
pub use fresnel::*;
pub use microfacet::*;

use bitflags::bitflags;

use crate::core::color::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BxdfLobeType {
    Glossy,
    /// near-mirror event, carries `SINGULAR_PDF` instead of a real density
    Singular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BxdfDirType {
    Reflect,
    Transmit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BxdfSampleType {
    pub lobe: BxdfLobeType,
    pub dir: BxdfDirType,
}

impl BxdfSampleType {
    pub fn glossy_reflect() -> Self {
        Self {
            lobe: BxdfLobeType::Glossy,
            dir: BxdfDirType::Reflect,
        }
    }

    pub fn singular_reflect() -> Self {
        Self {
            lobe: BxdfLobeType::Singular,
            dir: BxdfDirType::Reflect,
        }
    }

    pub fn glossy_transmit() -> Self {
        Self {
            lobe: BxdfLobeType::Glossy,
            dir: BxdfDirType::Transmit,
        }
    }

    pub fn singular_transmit() -> Self {
        Self {
            lobe: BxdfLobeType::Singular,
            dir: BxdfDirType::Transmit,
        }
    }

    pub fn is_singular(&self) -> bool {
        self.lobe == BxdfLobeType::Singular
    }
}

/// Screen-space derivatives of a direction.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RayDifferentials {
    pub dx: glam::Vec3A,
    pub dy: glam::Vec3A,
}

#[derive(Debug, Clone, Copy)]
pub struct BxdfSample {
    pub wi: glam::Vec3A,
    pub ty: BxdfSampleType,
    /// value with the cosine of `wi` folded in, same convention as `eval_*`
    pub bxdf: Color,
    pub pdf: f32,
    /// transported differentials of `wi`, only when view differentials were given
    pub differentials: Option<RayDifferentials>,
}

bitflags! {
    /// Capabilities reported by a setup call.
    pub struct ClosureFlags: u32 {
        const BSDF = 1;
        const HAS_EVAL = 1 << 1;
    }
}
