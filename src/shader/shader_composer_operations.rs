//! Shader Composer Operations - Pure functions for shader composition
//!
//! Composition is a pure function of (templates, slot, normalized feature
//! config, lighting descriptor). Identical inputs give byte-identical source,
//! which is what lets the resource cache key built programs by version.

use super::feature_config::{feature_tag, normalize_feature_config, FeatureConfig, ShadowMode};
use super::lighting::{LightKind, LightingDescriptor};
use super::shader_composer_data::{
    BuiltProgram, ComposeKey, ComposedShader, ProgramSlot, ShaderComposerData, FRAGMENT_ENTRY,
    VERTEX_ENTRY,
};
use super::shader_templates::{load_templates, template_source, TemplateId, TemplateSet};
use super::uniform_layout::{push_uniform, wgsl_struct, UniformKind, UniformLayout};
use crate::error::{SurfaceError, SurfaceResult};
use crate::gpu::{
    GpuBackend, ProgramDesc, SampleKind, TargetFormat, TextureBinding, TextureUnit,
    UniformLocation, SAMPLER_BINDING, UNIFORM_BINDING,
};
use std::path::PathBuf;
use std::sync::Arc;

const UNIFORM_STRUCT: &str = "SurfaceUniforms";

// Uniform names shared by the composer and the orchestrator
pub const DEPTH_PROJECTION: &str = "depth_projection";
pub const PROJECTION_MODELVIEW: &str = "projection_modelview";
pub const HEIGHT_COLOR_PLANE: &str = "height_color_plane";
pub const AMBIENT: &str = "ambient";
pub const LIGHT_VIEW_PROJECTION: &str = "light_view_projection";
pub const CONTOUR_LINE_FACTOR: &str = "contour_line_factor";
pub const DEM_TRANSFORM: &str = "dem_transform";
pub const DEM_DIST_SCALE: &str = "dem_dist_scale";
pub const BASE_PLANE: &str = "base_plane";

pub fn light_position_name(index: usize) -> String {
    format!("light_position_{}", index)
}

pub fn light_color_name(index: usize) -> String {
    format!("light_color_{}", index)
}

/// Create a composer, reading templates for the given source version
pub fn create_shader_composer(
    template_directory: Option<PathBuf>,
    source_version: u64,
) -> SurfaceResult<ShaderComposerData> {
    let templates = load_templates(template_directory.as_deref())?;

    Ok(ShaderComposerData {
        template_directory,
        templates,
        templates_version: Some(source_version),
        compositions: Default::default(),
        compositions_made: 0,
    })
}

/// Re-read templates when the source version moved
///
/// Returns whether templates were reloaded. On failure the previous templates
/// stay in place and the next call retries.
pub fn refresh_templates(composer: &mut ShaderComposerData, source_version: u64) -> SurfaceResult<bool> {
    if composer.templates_version == Some(source_version) {
        return Ok(false);
    }

    let templates = load_templates(composer.template_directory.as_deref())?;
    composer.templates = templates;
    composer.templates_version = Some(source_version);
    composer.compositions.clear();

    log::info!(
        "[shader_composer::refresh_templates] Templates reloaded at source version {}",
        source_version
    );
    Ok(true)
}

/// Uniform block of a surface variant
pub fn surface_uniform_layout(config: FeatureConfig, lighting: &LightingDescriptor) -> UniformLayout {
    let config = normalize_feature_config(config);
    let mut layout = UniformLayout::default();

    push_uniform(&mut layout, DEPTH_PROJECTION, UniformKind::Mat4);
    push_uniform(&mut layout, PROJECTION_MODELVIEW, UniformKind::Mat4);
    push_uniform(&mut layout, HEIGHT_COLOR_PLANE, UniformKind::Vec4);

    if config.illuminate {
        push_uniform(&mut layout, AMBIENT, UniformKind::Vec4);
        for index in 0..lighting.lights.len() {
            push_uniform(&mut layout, light_position_name(index), UniformKind::Vec4);
            push_uniform(&mut layout, light_color_name(index), UniformKind::Vec4);
        }
    }
    if config.shadow == ShadowMode::Mapped {
        push_uniform(&mut layout, LIGHT_VIEW_PROJECTION, UniformKind::Mat4);
    }
    if config.contour_lines {
        push_uniform(&mut layout, CONTOUR_LINE_FACTOR, UniformKind::Vec4);
    }
    if config.dem_deviation {
        push_uniform(&mut layout, DEM_TRANSFORM, UniformKind::Mat4);
        push_uniform(&mut layout, DEM_DIST_SCALE, UniformKind::Vec4);
    }

    layout
}

fn texture_binding(unit: TextureUnit) -> TextureBinding {
    TextureBinding {
        unit,
        binding: unit.binding(),
        sample: unit.sample_kind(),
    }
}

/// Texture units read by a surface variant
pub fn surface_textures(config: FeatureConfig) -> Vec<TextureBinding> {
    let config = normalize_feature_config(config);
    let mut units = vec![TextureUnit::HeightColorMap, TextureUnit::DepthImage];
    if config.contour_lines {
        units.push(TextureUnit::ContourElevation);
    }
    if config.shadow == ShadowMode::Mapped {
        units.push(TextureUnit::ShadowMap);
    }
    if config.dem_deviation {
        units.push(TextureUnit::Dem);
    }
    units.sort();
    units.into_iter().map(texture_binding).collect()
}

/// Uniform struct and resource declarations
fn program_header(label: &str, layout: &UniformLayout, textures: &[TextureBinding]) -> String {
    let mut source = format!("// {}\n\n", label);
    source.push_str(&wgsl_struct(layout, UNIFORM_STRUCT));
    source.push('\n');
    source.push_str(&format!(
        "@group(0) @binding({}) var<uniform> u: {};\n",
        UNIFORM_BINDING, UNIFORM_STRUCT
    ));
    if textures.iter().any(|t| t.sample == SampleKind::Filtered1D) {
        source.push_str(&format!(
            "@group(0) @binding({}) var height_color_sampler: sampler;\n",
            SAMPLER_BINDING
        ));
    }
    for texture in textures {
        let wgsl_type = match texture.sample {
            SampleKind::Filtered1D => "texture_1d<f32>",
            SampleKind::Unfiltered2D => "texture_2d<f32>",
        };
        source.push_str(&format!(
            "@group(0) @binding({}) var {}: {};\n",
            texture.binding,
            texture.unit.wgsl_name(),
            wgsl_type
        ));
    }
    source
}

/// Generated fragment entry point calling the selected blocks in order
fn surface_fragment_entry(config: FeatureConfig, lighting: &LightingDescriptor) -> String {
    let mut source = String::new();
    source.push_str("@fragment\n");
    source.push_str(&format!(
        "fn {}(in: VertexOutput) -> @location(0) vec4<f32> {{\n",
        FRAGMENT_ENTRY
    ));
    source.push_str("    var base_color = height_color(in.height_tex_coord);\n");
    if config.dem_deviation {
        source.push_str("    base_color = dem_deviation_color(in.camera_position);\n");
    }
    source.push_str("    var color = base_color.rgb;\n");

    if config.illuminate {
        source.push_str("    let point = in.camera_position.xyz / in.camera_position.w;\n");
        source.push_str("    let normal = surface_normal(point);\n");
        source.push_str("    var direct = vec3<f32>(0.0);\n");
        for (index, kind) in lighting.lights.iter().enumerate() {
            let position = light_position_name(index);
            let color = light_color_name(index);
            match kind {
                LightKind::Point => source.push_str(&format!(
                    "    direct += accumulate_point_light(u.{}, u.{}, point, normal);\n",
                    position, color
                )),
                LightKind::Directional => source.push_str(&format!(
                    "    direct += accumulate_directional_light(u.{}, u.{}, normal);\n",
                    position, color
                )),
            }
        }
        if config.shadow == ShadowMode::Mapped {
            source.push_str("    direct *= shadow_factor(in.camera_position);\n");
        }
        source.push_str("    color = base_color.rgb * (u.ambient.rgb + direct);\n");
    }

    if config.contour_lines {
        source.push_str("    color = apply_contour_lines(color, in.clip_position.xy);\n");
    }

    source.push_str("    return vec4<f32>(color, base_color.a);\n");
    source.push_str("}\n");
    source
}

/// Compose the surface program for a feature config and lighting descriptor
pub fn compose_surface(
    templates: &TemplateSet,
    config: FeatureConfig,
    lighting: &LightingDescriptor,
) -> ComposedShader {
    let config = normalize_feature_config(config);
    let lighting = if config.illuminate {
        lighting.clone()
    } else {
        LightingDescriptor::default()
    };

    let label = format!(
        "surface[{}; {} lights]",
        feature_tag(config),
        lighting.lights.len()
    );
    let uniforms = surface_uniform_layout(config, &lighting);
    let textures = surface_textures(config);

    let mut source = program_header(&label, &uniforms, &textures);
    let mut append = |id: TemplateId| {
        source.push('\n');
        source.push_str(template_source(templates, id));
    };

    append(TemplateId::SurfaceVertex);
    append(TemplateId::FragmentPreamble);
    if config.illuminate {
        append(TemplateId::Illumination);
    }
    if config.shadow == ShadowMode::Mapped {
        append(TemplateId::Shadow);
    }
    if config.contour_lines {
        append(TemplateId::ContourLines);
    }
    if config.dem_deviation {
        append(TemplateId::DemDeviation);
    }

    source.push('\n');
    source.push_str(&surface_fragment_entry(config, &lighting));

    ComposedShader {
        label,
        source,
        uniforms,
        textures,
        target: TargetFormat::Output,
    }
}

/// Compose one of the fixed auxiliary programs rendering into R32Float targets
pub fn compose_auxiliary(templates: &TemplateSet, slot: ProgramSlot) -> SurfaceResult<ComposedShader> {
    let (label, fragment) = match slot {
        ProgramSlot::ContourElevation => ("contour_elevation", TemplateId::ContourElevation),
        ProgramSlot::ShadowDepth => ("shadow_depth", TemplateId::ShadowDepth),
        ProgramSlot::Surface => {
            return Err(SurfaceError::Internal {
                message: "surface program is not an auxiliary pass".to_string(),
            })
        }
    };

    let mut uniforms = UniformLayout::default();
    push_uniform(&mut uniforms, DEPTH_PROJECTION, UniformKind::Mat4);
    push_uniform(&mut uniforms, PROJECTION_MODELVIEW, UniformKind::Mat4);
    push_uniform(&mut uniforms, HEIGHT_COLOR_PLANE, UniformKind::Vec4);
    if slot == ProgramSlot::ContourElevation {
        push_uniform(&mut uniforms, BASE_PLANE, UniformKind::Vec4);
    }
    let textures = vec![texture_binding(TextureUnit::DepthImage)];

    let mut source = program_header(label, &uniforms, &textures);
    source.push('\n');
    source.push_str(template_source(templates, TemplateId::SurfaceVertex));
    source.push('\n');
    source.push_str(template_source(templates, fragment));

    Ok(ComposedShader {
        label: label.to_string(),
        source,
        uniforms,
        textures,
        target: TargetFormat::R32Float,
    })
}

/// Composition for a slot, memoized per slot
///
/// Auxiliary slots ignore `config` and `lighting`.
pub fn compose(
    composer: &mut ShaderComposerData,
    slot: ProgramSlot,
    config: FeatureConfig,
    lighting: &LightingDescriptor,
    source_version: u64,
) -> SurfaceResult<Arc<ComposedShader>> {
    refresh_templates(composer, source_version)?;

    let key = match slot {
        ProgramSlot::Surface => {
            let config = normalize_feature_config(config);
            ComposeKey {
                slot,
                config,
                lighting: if config.illuminate {
                    lighting.clone()
                } else {
                    LightingDescriptor::default()
                },
            }
        }
        _ => ComposeKey {
            slot,
            config: FeatureConfig::default(),
            lighting: LightingDescriptor::default(),
        },
    };

    if let Some((cached_key, composed)) = composer.compositions.get(&slot) {
        if *cached_key == key {
            return Ok(Arc::clone(composed));
        }
    }

    let composed = Arc::new(match slot {
        ProgramSlot::Surface => compose_surface(&composer.templates, key.config, &key.lighting),
        _ => compose_auxiliary(&composer.templates, slot)?,
    });
    composer.compositions_made += 1;
    composer
        .compositions
        .insert(slot, (key, Arc::clone(&composed)));

    Ok(composed)
}

/// Compile and link a composed program, recording its uniform locations
pub fn build_program<B: GpuBackend + ?Sized>(
    backend: &mut B,
    composed: &ComposedShader,
) -> SurfaceResult<BuiltProgram> {
    let desc = ProgramDesc {
        label: &composed.label,
        source: &composed.source,
        vertex_entry: VERTEX_ENTRY,
        fragment_entry: FRAGMENT_ENTRY,
        uniform_block_size: composed.uniforms.size,
        textures: &composed.textures,
        target: composed.target,
    };

    let handle = backend.build_program(&desc).map_err(|e| {
        log::error!(
            "[shader_composer::build_program] Failed to build {}: {}",
            composed.label,
            e
        );
        SurfaceError::from(e)
    })?;

    log::info!(
        "[shader_composer::build_program] Built {} ({} bytes of WGSL, {} uniforms)",
        composed.label,
        composed.source.len(),
        composed.uniforms.entries.len()
    );

    Ok(BuiltProgram {
        handle,
        label: composed.label.clone(),
        uniform_locations: composed
            .uniforms
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.name.clone(),
                    UniformLocation {
                        offset: entry.offset,
                    },
                )
            })
            .collect(),
        textures: composed.textures.clone(),
    })
}
