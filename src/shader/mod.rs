//! Shader Module - Data-Oriented Programming (DOP) style
//!
//! Assembles one WGSL program per feature variant from template blocks.
//!
//! - feature_config.rs: variant toggles and their enumeration
//! - lighting.rs: light snapshot and the descriptor composition depends on
//! - uniform_layout.rs: uniform block layout and WGSL struct generation
//! - shader_templates.rs: built-in and directory-overridden template text
//! - shader_composer_data.rs: composer state, composed and built programs
//! - shader_composer_operations.rs: composition and program building

pub mod feature_config;
pub mod lighting;
pub mod shader_composer_data;
pub mod shader_composer_operations;
pub mod shader_templates;
pub mod uniform_layout;

pub use feature_config::{
    all_feature_configs, feature_tag, normalize_feature_config, FeatureConfig, ShadowMode,
};
pub use lighting::{
    create_lighting_state, describe_lighting, enabled_lights, LightKind, LightSource,
    LightingDescriptor, LightingState, MAX_LIGHTS,
};
pub use shader_composer_data::{
    BuiltProgram, ComposeKey, ComposedShader, ProgramSlot, ShaderComposerData, ShaderKey,
    FRAGMENT_ENTRY, VERTEX_ENTRY,
};
pub use shader_templates::{
    builtin_templates, extract_entry_points, load_templates, template_paths, validate_template,
    TemplateId, TemplateSet,
};
pub use uniform_layout::{UniformEntry, UniformKind, UniformLayout};

pub use shader_composer_operations::{
    // Initialization
    create_shader_composer,
    refresh_templates,

    // Composition
    compose,
    compose_auxiliary,
    compose_surface,
    surface_textures,
    surface_uniform_layout,

    // Building
    build_program,
};
