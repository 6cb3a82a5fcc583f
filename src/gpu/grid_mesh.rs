//! Depth-image grid geometry
//!
//! One vertex per depth pixel center; the vertex stage looks the depth up
//! itself, so the grid only depends on the image size.

/// Vertex positions in depth-image pixel space, row-major
pub fn grid_vertices(width: u32, height: u32) -> Vec<[f32; 2]> {
    let mut vertices = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            vertices.push([x as f32 + 0.5, y as f32 + 0.5]);
        }
    }
    vertices
}

/// Triangle-list indices, two triangles per grid cell
pub fn grid_indices(width: u32, height: u32) -> Vec<u32> {
    if width < 2 || height < 2 {
        return Vec::new();
    }

    let mut indices = Vec::with_capacity(((width - 1) * (height - 1) * 6) as usize);
    for y in 0..height - 1 {
        for x in 0..width - 1 {
            let i00 = y * width + x;
            let i10 = i00 + 1;
            let i01 = i00 + width;
            let i11 = i01 + 1;
            indices.extend_from_slice(&[i00, i10, i11, i00, i11, i01]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_sizes() {
        assert_eq!(grid_vertices(640, 480).len(), 640 * 480);
        assert_eq!(grid_indices(640, 480).len(), 639 * 479 * 6);
        assert!(grid_indices(1, 480).is_empty());
    }

    #[test]
    fn test_grid_indices_in_range() {
        let indices = grid_indices(5, 4);
        assert!(indices.iter().all(|&i| i < 20));
        assert_eq!(&indices[..6], &[0, 1, 6, 0, 6, 5]);
    }

    #[test]
    fn test_vertices_at_pixel_centers() {
        let vertices = grid_vertices(3, 2);
        assert_eq!(vertices[0], [0.5, 0.5]);
        assert_eq!(vertices[4], [1.5, 1.5]);
    }
}
