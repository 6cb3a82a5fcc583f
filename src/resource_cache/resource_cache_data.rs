//! Resource Cache Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in resource_cache_operations.rs

use crate::gpu::{MeshHandle, TextureHandle, TextureUnit};
use crate::shader::{BuiltProgram, ProgramSlot, ShaderKey};
use std::collections::HashMap;

/// What a GPU object was last synchronized from
///
/// A cached object is usable iff its stamp equals the stamp of the logical
/// resource at the point of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncStamp {
    /// Version of the logical resource (ramp version, frame number, DEM version)
    pub generation: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedTexture {
    pub handle: TextureHandle,
    pub stamp: SyncStamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedMesh {
    pub handle: MeshHandle,
    pub width: u32,
    pub height: u32,
}

/// Program slot state
#[derive(Debug, Clone, PartialEq)]
pub enum CachedProgram {
    Built { key: ShaderKey, program: BuiltProgram },
    /// Last build for `key` failed; the next request rebuilds
    Invalid { key: ShaderKey, diagnostic: String },
}

/// Counters for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub texture_uploads: u64,
    pub texture_hits: u64,
    pub mesh_builds: u64,
    pub mesh_hits: u64,
    pub program_builds: u64,
    pub program_hits: u64,
    pub build_failures: u64,
}

/// GPU objects of one rendering context
///
/// Owns every handle it holds; nothing here is shared with another context.
#[derive(Debug, Default)]
pub struct ResourceCacheData {
    pub textures: HashMap<TextureUnit, CachedTexture>,
    pub grid_mesh: Option<CachedMesh>,
    pub programs: HashMap<ProgramSlot, CachedProgram>,
    pub stats: CacheStats,
}
