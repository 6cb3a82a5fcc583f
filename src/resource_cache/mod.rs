//! Resource Cache Module - Data-Oriented Programming (DOP) style
//!
//! One cache per rendering context. Each GPU object carries the stamp of the
//! logical resource it mirrors and is resynchronized only on mismatch.
//!
//! - resource_cache_data.rs: cached handles, stamps and counters
//! - resource_cache_operations.rs: the ensure/release protocol

pub mod resource_cache_data;
pub mod resource_cache_operations;

pub use resource_cache_data::{
    CacheStats, CachedMesh, CachedProgram, CachedTexture, ResourceCacheData, SyncStamp,
};

pub use resource_cache_operations::{
    // Initialization
    create_resource_cache,

    // Textures
    ensure_color_ramp_texture,
    ensure_dem_texture,
    ensure_depth_texture,
    ensure_render_target,

    // Geometry
    ensure_grid_mesh,

    // Programs
    ensure_shader,
    shader_key,

    // Queries
    built_program,
    cache_stats,
    cached_texture,

    // Teardown
    release_all,
};
