//! Surface Module - Data-Oriented Programming (DOP) style
//!
//! The per-frame orchestrator and its state machine.
//!
//! - surface_data.rs: scene (shared), context (per GPU context) and frame data
//! - surface_operations.rs: scene setup, context lifecycle and frame rendering

pub mod surface_data;
pub mod surface_operations;

pub use surface_data::{
    FrameStats, FrameView, MappingStamp, SurfaceContext, SurfaceScene, SurfaceSettings,
    SurfaceState,
};

pub use surface_operations::{
    // Scene
    attach_dem,
    create_scene,
    create_scene_with_ramp,
    detach_dem,
    reload_color_ramp,
    set_features,
    set_ramp_entries,
    settings_from_config,
    watch_shader_sources,

    // Context lifecycle
    create_context,
    initialize_context,
    teardown_context,

    // Frame
    render_frame,
    resolve_feature_config,
};

#[cfg(feature = "native")]
pub use surface_operations::watch_shader_events;
