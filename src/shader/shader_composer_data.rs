//! Shader Composer Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in shader_composer_operations.rs

use super::feature_config::FeatureConfig;
use super::lighting::LightingDescriptor;
use super::shader_templates::TemplateSet;
use super::uniform_layout::UniformLayout;
use crate::gpu::{ProgramHandle, TargetFormat, TextureBinding, UniformLocation};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Entry points every composed program exposes
pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Program slots of one rendering context; each holds at most one live program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramSlot {
    Surface,
    ContourElevation,
    ShadowDepth,
}

/// Cache key of a built program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    pub config: FeatureConfig,
    pub lighting_version: u32,
    pub source_version: u64,
}

/// Inputs a composition depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComposeKey {
    pub slot: ProgramSlot,
    pub config: FeatureConfig,
    pub lighting: LightingDescriptor,
}

/// Complete program source plus everything needed to build and drive it
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedShader {
    pub label: String,
    pub source: String,
    pub uniforms: UniformLayout,
    pub textures: Vec<TextureBinding>,
    pub target: TargetFormat,
}

/// A program on the GPU and where its uniforms live
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltProgram {
    pub handle: ProgramHandle,
    pub label: String,
    pub uniform_locations: HashMap<String, UniformLocation>,
    pub textures: Vec<TextureBinding>,
}

/// Composer state shared by every rendering context
#[derive(Debug)]
pub struct ShaderComposerData {
    /// Override directory for template files
    pub template_directory: Option<PathBuf>,

    pub templates: TemplateSet,

    /// Source version the templates were last read at
    pub templates_version: Option<u64>,

    /// Last composition per slot
    pub compositions: HashMap<ProgramSlot, (ComposeKey, Arc<ComposedShader>)>,

    /// Compositions produced since creation
    pub compositions_made: u64,
}
