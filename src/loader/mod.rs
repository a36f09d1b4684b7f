use std::{convert::TryInto, path::Path};

use crate::{
    bxdf::{
        AlbedoTable, ClosureFlags, FresnelExtra, GgxAlbedoTable, MetallicExtra, MicrofacetBsdf,
        MicrofacetParams,
    },
    core::{color::Color, loader::InputParams},
};

/// Loads a closure description from a JSON file and sets it up for the view direction `wo`.
///
/// An optional `albedo_table` key names a table file (relative to the description) used instead
/// of the built-in one.
pub fn load_closure<P: AsRef<Path>>(
    path: P,
    wo: glam::Vec3A,
) -> anyhow::Result<(MicrofacetBsdf, ClosureFlags)> {
    let path = path.as_ref();
    let json_file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("can't open '{}': {}", path.display(), e))?;
    let json_reader = std::io::BufReader::new(json_file);
    let json_value: serde_json::Value = serde_json::from_reader(json_reader)?;

    let mut params: InputParams = (&json_value).try_into()?;
    params.set_name("closure".into());
    if params.contains_key("albedo_table") {
        let table_path = params.get_str("albedo_table")?;
        let table_path = match path.parent() {
            Some(dir) => dir.join(table_path),
            None => table_path.into(),
        };
        let table = GgxAlbedoTable::load(&table_path)?;
        log::info!("using albedo table '{}'", table_path.display());
        closure_from_params(&mut params, wo, &table)
    } else {
        closure_from_params(&mut params, wo, GgxAlbedoTable::shared())
    }
}

pub fn closure_from_params<T: AlbedoTable + ?Sized>(
    params: &mut InputParams,
    wo: glam::Vec3A,
    table: &T,
) -> anyhow::Result<(MicrofacetBsdf, ClosureFlags)> {
    params.set_name("closure".into());
    let ty = params.get_str("type")?;
    params.set_name(format!("closure-{}", ty).into());

    let base = load_base_params(params)?;
    let res = match ty.as_str() {
        "ggx" => MicrofacetBsdf::ggx_setup(&base),
        "ggx_isotropic" => MicrofacetBsdf::ggx_isotropic_setup(&base),
        "multi_ggx" => {
            let color = params.get_color_or("color", Color::WHITE)?;
            MicrofacetBsdf::multi_ggx_setup(&base, color, wo, table)
        }
        "ggx_fresnel" => MicrofacetBsdf::ggx_fresnel_setup(&base, load_fresnel_extra(params)?, wo),
        "multi_ggx_fresnel" => {
            let extra = load_fresnel_extra(params)?;
            MicrofacetBsdf::multi_ggx_fresnel_setup(&base, extra, wo, table)
        }
        "ggx_fresnel_v2" => {
            let extra = MetallicExtra {
                metal_base: params.get_color_or("metal_base", Color::WHITE)?,
                metal_edge: params.get_color_or("metal_edge", Color::WHITE)?,
                metal_falloff: params.get_float_or("metal_falloff", 0.2)?,
                dielectric: 0.0,
            };
            let metallic = params.get_float_or("metallic", 0.0)?;
            let dielectric = params.get_float_or("dielectric", 1.0)?;
            MicrofacetBsdf::ggx_fresnel_v2_setup(&base, extra, metallic, dielectric, wo, table)
        }
        "ggx_clearcoat" => {
            MicrofacetBsdf::ggx_clearcoat_setup(&base, load_fresnel_extra(params)?, wo)
        }
        "ggx_clearcoat_v2" => {
            let extra = load_fresnel_extra(params)?;
            MicrofacetBsdf::ggx_clearcoat_v2_setup(&base, extra, wo, table)
        }
        "ggx_refraction" => MicrofacetBsdf::ggx_refraction_setup(&base),
        _ => anyhow::bail!(format!("{}: unknown type '{}'", params.name(), ty)),
    };

    params.check_unused_keys();

    Ok(res)
}

/// `roughness` is the GGX alpha; `roughness_x` / `roughness_y` override it per axis.
fn load_base_params(params: &mut InputParams) -> anyhow::Result<MicrofacetParams> {
    let defaults = MicrofacetParams::default();
    let roughness = params.get_float_or("roughness", defaults.alpha_x)?;
    let alpha_x = params.get_float_or("roughness_x", roughness)?;
    let alpha_y = params.get_float_or("roughness_y", roughness)?;

    let normal = params.get_vec3_or("normal", defaults.normal)?;
    if normal.length_squared() == 0.0 {
        anyhow::bail!(format!("{} - 'normal' can't be zero", params.name()));
    }

    Ok(MicrofacetParams {
        normal: normal.normalize(),
        tangent: params.get_vec3_or("tangent", defaults.tangent)?,
        alpha_x,
        alpha_y,
        ior: params.get_float_or("ior", defaults.ior)?,
        weight: params.get_color_or("weight", defaults.weight)?,
        sample_weight: params.get_float_or("sample_weight", defaults.sample_weight)?,
    })
}

fn load_fresnel_extra(params: &mut InputParams) -> anyhow::Result<FresnelExtra> {
    let color = params.get_color_or("color", Color::WHITE)?;
    let cspec0 = params.get_color_or("specular", Color::gray(0.04))?;
    Ok(FresnelExtra::new(color, cspec0))
}
