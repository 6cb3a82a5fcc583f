//! Surface Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in surface_operations.rs

use crate::color_ramp::ColorRampData;
use crate::height_mapping::{BasePlane, HeightPlaneMapping};
use crate::providers::DemProvider;
use crate::resource_cache::ResourceCacheData;
use crate::shader::{FeatureConfig, ShaderComposerData};
use crate::source_watcher::SourceVersion;
use cgmath::Matrix4;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of one rendering context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Ready,
    Rendering { frame: u64 },
    TornDown,
    /// GPU resources ran out; only teardown is allowed
    Faulted,
}

/// Camera state of the frame being drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub viewport: (u32, u32),
    pub projection: Matrix4<f64>,
    pub modelview: Matrix4<f64>,
}

/// Per-scene rendering options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSettings {
    /// Requested features; DEM and shadow availability are resolved per frame
    pub features: FeatureConfig,
    pub contour_line_spacing: f64,
    pub dem_dist_scale: f64,
    pub shadow_map_size: u32,
    pub clear_color: [f32; 4],
    pub watch_poll_interval: Duration,
}

/// Logical data shared by every rendering context
///
/// Contexts only read from here while rendering, except for the composer
/// memo which is guarded by its mutex.
pub struct SurfaceScene {
    pub ramp: RwLock<ColorRampData>,
    pub composer: Mutex<ShaderComposerData>,
    pub source_version: SourceVersion,
    pub settings: RwLock<SurfaceSettings>,
    pub dem_provider: RwLock<Option<Arc<dyn DemProvider + Send + Sync>>>,
}

/// Inputs the height mapping was computed from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappingStamp {
    pub base_plane: BasePlane,
    pub ramp_version: u32,
    pub entry_count: usize,
}

/// Per-GPU-context state; never shared between contexts
pub struct SurfaceContext<B> {
    pub label: String,
    pub backend: B,
    pub cache: ResourceCacheData,
    pub state: SurfaceState,
    pub mapping: Option<(MappingStamp, HeightPlaneMapping)>,
    pub frames_rendered: u64,
}

/// What one frame did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Index of this frame in the context
    pub frame: u64,
    pub depth_frame_number: u64,
    pub features: FeatureConfig,
    pub passes: u32,
    pub texture_uploads: u64,
    pub program_builds: u64,
    pub mapping_recomputed: bool,
}
