//! Height to texture-coordinate mapping
//!
//! Folds the camera-space base plane and the color ramp's key range into one
//! affine plane equation, so the vertex stage turns a camera-space position
//! into a ramp texture coordinate with a single dot product.

use crate::error::{SurfaceError, SurfaceResult};
use cgmath::{InnerSpace, Point3, Vector3};

/// Camera-space reference plane `normal . p = offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasePlane {
    /// Unit normal pointing "up" out of the sand surface
    pub normal: Vector3<f64>,
    pub offset: f64,
}

/// Affine map `tex = a*x + b*y + c*z + d` from camera space to ramp texture space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightPlaneMapping {
    pub coefficients: [f32; 4],
}

/// Create a base plane, normalizing the normal vector
pub fn create_base_plane(normal: Vector3<f64>, offset: f64) -> SurfaceResult<BasePlane> {
    let length = normal.magnitude();
    if !(length.is_finite() && length > 0.0) {
        return Err(SurfaceError::InvalidConfig {
            field: "base_plane.normal".to_string(),
            value: format!("{:?}", normal),
            reason: "normal must be a finite non-zero vector".to_string(),
        });
    }

    Ok(BasePlane {
        normal: normal / length,
        offset: offset / length,
    })
}

/// Signed height of a camera-space point above the base plane
pub fn height_above(plane: &BasePlane, point: Point3<f64>) -> f64 {
    plane.normal.dot(Vector3::new(point.x, point.y, point.z)) - plane.offset
}

/// Compute the mapping for a ramp spanning `[min_key, max_key]` with `entry_count` texels
///
/// `min_key` lands on the center of the first texel (`0.5 / n`) and `max_key`
/// on the center of the last one (`1 - 0.5 / n`).
pub fn compute_height_mapping(
    plane: &BasePlane,
    min_key: f64,
    max_key: f64,
    entry_count: usize,
) -> SurfaceResult<HeightPlaneMapping> {
    if entry_count == 0 {
        return Err(SurfaceError::InvalidConfig {
            field: "ramp_entries".to_string(),
            value: "0".to_string(),
            reason: "lookup table needs at least one entry".to_string(),
        });
    }
    if !(max_key > min_key) {
        return Err(SurfaceError::InvalidConfig {
            field: "color_ramp".to_string(),
            value: format!("[{}, {}]", min_key, max_key),
            reason: "key range must be non-empty".to_string(),
        });
    }

    let n = entry_count as f64;
    let scale = (n - 1.0) / ((max_key - min_key) * n);
    let bias = 0.5 / n - scale * min_key;

    Ok(HeightPlaneMapping {
        coefficients: [
            (plane.normal.x * scale) as f32,
            (plane.normal.y * scale) as f32,
            (plane.normal.z * scale) as f32,
            (bias - plane.offset * scale) as f32,
        ],
    })
}

/// Evaluate the mapping for a camera-space point
pub fn map_point(mapping: &HeightPlaneMapping, point: Point3<f64>) -> f64 {
    let [a, b, c, d] = mapping.coefficients;
    a as f64 * point.x + b as f64 * point.y + c as f64 * point.z + d as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1.0e-5;

    fn point_at_height(plane: &BasePlane, height: f64) -> Point3<f64> {
        // Arbitrary in-plane offset plus the normal scaled to the wanted height
        let tangent = plane.normal.cross(Vector3::unit_x());
        let tangent = if tangent.magnitude2() > 1.0e-12 {
            tangent.normalize()
        } else {
            plane.normal.cross(Vector3::unit_y()).normalize()
        };
        let p = plane.normal * (plane.offset + height) + tangent * 3.7;
        Point3::new(p.x, p.y, p.z)
    }

    #[test]
    fn test_base_plane_is_normalized() {
        let plane = create_base_plane(Vector3::new(0.0, 0.0, 2.0), -200.0)
            .expect("valid plane");
        assert!((plane.normal.magnitude() - 1.0).abs() < 1.0e-12);
        assert!((plane.offset + 100.0).abs() < 1.0e-12);
    }

    #[test]
    fn test_zero_normal_rejected() {
        assert!(create_base_plane(Vector3::new(0.0, 0.0, 0.0), 1.0).is_err());
    }

    #[test]
    fn test_range_ends_land_on_texel_centers() {
        let planes = [
            create_base_plane(Vector3::new(0.0, 0.0, 1.0), -95.0),
            create_base_plane(Vector3::new(0.1, -0.2, 0.97), 12.5),
            create_base_plane(Vector3::new(-1.0, 0.3, 0.0), 0.0),
        ];

        for plane in planes {
            let plane = plane.expect("valid plane");
            for &entries in &[1usize, 2, 256, 1024] {
                let mapping =
                    compute_height_mapping(&plane, -20.0, 15.0, entries).expect("mapping");
                let n = entries as f64;

                let low = map_point(&mapping, point_at_height(&plane, -20.0));
                let high = map_point(&mapping, point_at_height(&plane, 15.0));
                assert!((low - 0.5 / n).abs() < TOLERANCE, "low {} for n={}", low, n);
                assert!(
                    (high - (1.0 - 0.5 / n)).abs() < TOLERANCE,
                    "high {} for n={}",
                    high,
                    n
                );
            }
        }
    }

    #[test]
    fn test_midpoint_maps_to_half() {
        let plane = create_base_plane(Vector3::new(0.0, 0.0, 1.0), 0.0).expect("valid plane");
        let mapping = compute_height_mapping(&plane, 0.0, 10.0, 256).expect("mapping");
        let mid = map_point(&mapping, Point3::new(4.0, -2.0, 5.0));
        assert!((mid - 0.5).abs() < TOLERANCE);
        assert!((height_above(&plane, Point3::new(4.0, -2.0, 5.0)) - 5.0).abs() < 1.0e-12);
    }

    #[test]
    fn test_degenerate_inputs_rejected() {
        let plane = create_base_plane(Vector3::new(0.0, 0.0, 1.0), 0.0).expect("valid plane");
        assert!(compute_height_mapping(&plane, 0.0, 10.0, 0).is_err());
        assert!(compute_height_mapping(&plane, 5.0, 5.0, 256).is_err());
        assert!(compute_height_mapping(&plane, 6.0, 5.0, 256).is_err());
    }
}
