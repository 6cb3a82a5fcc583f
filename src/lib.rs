// Topo Surface - Data-Oriented Programming (DOP) Architecture
//
// Renders a live depth-sensor surface as a shaded, false-colored mesh.
// - *_data modules hold plain data, *_operations modules transform it
// - GPU objects are mirrored per rendering context and stamped with the
//   version of the logical resource they came from
// - Shader variants are composed from WGSL template blocks per feature set

// Core modules
pub mod config;
pub mod error;

// Logical resources
pub mod color_ramp;
pub mod height_mapping;
pub mod providers;

// GPU and shader systems
pub mod gpu;
pub mod resource_cache;
pub mod shader;
pub mod source_watcher;

// Orchestration
pub mod surface;

pub use config::{load_config, SurfaceConfig};
pub use error::{ErrorContext, SurfaceError, SurfaceResult};

// === Logical Data ===
pub use color_ramp::{ColorRampData, RampFormat, RampStop};
pub use height_mapping::{BasePlane, HeightPlaneMapping};
pub use providers::{DemGrid, DemProvider, DepthFrame, DepthImageProvider, StaticDepthProvider};

// === GPU ===
pub use gpu::{GpuBackend, GpuBackendError, WgpuBackend};
pub use resource_cache::{CacheStats, ResourceCacheData};
pub use shader::{FeatureConfig, LightSource, LightingState, ShadowMode};
pub use source_watcher::{PollingSourceWatcher, SourceVersion, VersionSource};

#[cfg(feature = "native")]
pub use source_watcher::NotifySourceWatcher;

// === Orchestration ===
pub use surface::{
    create_context, create_scene, initialize_context, render_frame, teardown_context,
    FrameStats, FrameView, SurfaceContext, SurfaceScene, SurfaceState,
};
