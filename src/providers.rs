//! External data sources consumed by the surface renderer
//!
//! Depth acquisition, calibration and DEM loading live outside this crate.
//! These traits are the whole contract; `StaticDepthProvider` and
//! `StaticDemProvider` serve fixed data for tests and demos.

use crate::error::{SurfaceError, SurfaceResult};
use crate::height_mapping::BasePlane;
use cgmath::Matrix4;
use std::sync::Arc;

/// One depth image, row-major, one value per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    /// Strictly increasing per new image from a given provider
    pub frame_number: u64,
    pub depths: Arc<[f32]>,
}

/// Source of depth images and their calibration
pub trait DepthImageProvider {
    fn current_frame(&self) -> SurfaceResult<DepthFrame>;

    /// Camera-space reference plane heights are measured from
    fn base_plane(&self) -> BasePlane;

    /// Maps `(pixel_x, pixel_y, depth, 1)` into camera space
    fn depth_projection(&self) -> Matrix4<f64>;
}

/// Digital elevation model sampled on a regular grid
#[derive(Debug, Clone, PartialEq)]
pub struct DemGrid {
    pub width: u32,
    pub height: u32,
    /// Bumped whenever the elevations change
    pub version: u64,
    pub elevations: Arc<[f32]>,
    /// Maps camera space into DEM grid space (x, y in cells, z elevation)
    pub camera_to_dem: Matrix4<f64>,
}

pub trait DemProvider {
    fn current_dem(&self) -> SurfaceResult<DemGrid>;
}

/// Reject frames whose payload does not match their dimensions
pub fn validate_depth_frame(frame: &DepthFrame) -> SurfaceResult<()> {
    if frame.width < 2 || frame.height < 2 {
        return Err(SurfaceError::InvalidConfig {
            field: "depth_frame.size".to_string(),
            value: format!("{}x{}", frame.width, frame.height),
            reason: "depth image needs at least 2x2 pixels".to_string(),
        });
    }
    let expected = frame.width as usize * frame.height as usize;
    if frame.depths.len() != expected {
        return Err(SurfaceError::InvalidConfig {
            field: "depth_frame.depths".to_string(),
            value: frame.depths.len().to_string(),
            reason: format!("expected {} depth values", expected),
        });
    }
    Ok(())
}

pub fn validate_dem(dem: &DemGrid) -> SurfaceResult<()> {
    let expected = dem.width as usize * dem.height as usize;
    if expected == 0 || dem.elevations.len() != expected {
        return Err(SurfaceError::InvalidConfig {
            field: "dem.elevations".to_string(),
            value: dem.elevations.len().to_string(),
            reason: format!("expected {} elevations for {}x{}", expected, dem.width, dem.height),
        });
    }
    Ok(())
}

/// Serves one fixed frame; `replace_frame` swaps in a new image
#[derive(Debug)]
pub struct StaticDepthProvider {
    frame: parking_lot::RwLock<DepthFrame>,
    base_plane: BasePlane,
    depth_projection: Matrix4<f64>,
}

impl StaticDepthProvider {
    pub fn new(frame: DepthFrame, base_plane: BasePlane, depth_projection: Matrix4<f64>) -> Self {
        Self {
            frame: parking_lot::RwLock::new(frame),
            base_plane,
            depth_projection,
        }
    }

    /// Flat image at constant depth
    pub fn flat(
        width: u32,
        height: u32,
        depth: f32,
        base_plane: BasePlane,
        depth_projection: Matrix4<f64>,
    ) -> Self {
        let depths: Vec<f32> = vec![depth; width as usize * height as usize];
        Self::new(
            DepthFrame {
                width,
                height,
                frame_number: 1,
                depths: depths.into(),
            },
            base_plane,
            depth_projection,
        )
    }

    /// Install new depths as the next frame
    pub fn replace_frame(&self, width: u32, height: u32, depths: Vec<f32>) {
        let mut frame = self.frame.write();
        frame.width = width;
        frame.height = height;
        frame.frame_number += 1;
        frame.depths = depths.into();
    }
}

impl DepthImageProvider for StaticDepthProvider {
    fn current_frame(&self) -> SurfaceResult<DepthFrame> {
        Ok(self.frame.read().clone())
    }

    fn base_plane(&self) -> BasePlane {
        self.base_plane
    }

    fn depth_projection(&self) -> Matrix4<f64> {
        self.depth_projection
    }
}

#[derive(Debug)]
pub struct StaticDemProvider {
    pub dem: DemGrid,
}

impl DemProvider for StaticDemProvider {
    fn current_dem(&self) -> SurfaceResult<DemGrid> {
        Ok(self.dem.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::height_mapping::create_base_plane;
    use cgmath::{SquareMatrix, Vector3};

    fn provider() -> StaticDepthProvider {
        let plane = create_base_plane(Vector3::new(0.0, 0.0, 1.0), 0.0).expect("plane");
        StaticDepthProvider::flat(4, 3, 1.0, plane, Matrix4::identity())
    }

    #[test]
    fn test_replace_frame_advances_frame_number() {
        let provider = provider();
        let first = provider.current_frame().expect("frame");
        provider.replace_frame(4, 3, vec![2.0; 12]);
        let second = provider.current_frame().expect("frame");

        assert!(second.frame_number > first.frame_number);
        assert_eq!(second.depths[0], 2.0);
    }

    #[test]
    fn test_frame_validation() {
        let provider = provider();
        let frame = provider.current_frame().expect("frame");
        assert!(validate_depth_frame(&frame).is_ok());

        let short = DepthFrame {
            depths: vec![0.0; 5].into(),
            ..frame.clone()
        };
        assert!(validate_depth_frame(&short).is_err());

        let thin = DepthFrame {
            width: 1,
            height: 12,
            ..frame
        };
        assert!(validate_depth_frame(&thin).is_err());
    }
}
