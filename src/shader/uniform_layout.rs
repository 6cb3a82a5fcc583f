//! Uniform block layout shared by a composed program and its draw calls
//!
//! Every member is a `vec4<f32>` or `mat4x4<f32>`, so members pack at
//! 16-byte aligned offsets in declaration order under WGSL uniform rules.

use crate::gpu::UniformLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Vec4,
    Mat4,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformEntry {
    pub name: String,
    pub kind: UniformKind,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct UniformLayout {
    pub entries: Vec<UniformEntry>,
    /// Total block size in bytes
    pub size: u32,
}

fn kind_size(kind: UniformKind) -> u32 {
    match kind {
        UniformKind::Vec4 => 16,
        UniformKind::Mat4 => 64,
    }
}

fn wgsl_type(kind: UniformKind) -> &'static str {
    match kind {
        UniformKind::Vec4 => "vec4<f32>",
        UniformKind::Mat4 => "mat4x4<f32>",
    }
}

/// Append a member at the end of the block
pub fn push_uniform(layout: &mut UniformLayout, name: impl Into<String>, kind: UniformKind) {
    layout.entries.push(UniformEntry {
        name: name.into(),
        kind,
        offset: layout.size,
    });
    layout.size += kind_size(kind);
}

pub fn uniform_location(layout: &UniformLayout, name: &str) -> Option<UniformLocation> {
    layout
        .entries
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| UniformLocation {
            offset: entry.offset,
        })
}

/// WGSL struct declaration for the block
pub fn wgsl_struct(layout: &UniformLayout, struct_name: &str) -> String {
    let mut source = format!("struct {} {{\n", struct_name);
    for entry in &layout.entries {
        source.push_str(&format!("    {}: {},\n", entry.name, wgsl_type(entry.kind)));
    }
    source.push_str("}\n");
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_sequential() {
        let mut layout = UniformLayout::default();
        push_uniform(&mut layout, "depth_projection", UniformKind::Mat4);
        push_uniform(&mut layout, "height_color_plane", UniformKind::Vec4);
        push_uniform(&mut layout, "dem_transform", UniformKind::Mat4);

        assert_eq!(layout.size, 144);
        assert_eq!(
            uniform_location(&layout, "height_color_plane"),
            Some(UniformLocation { offset: 64 })
        );
        assert_eq!(
            uniform_location(&layout, "dem_transform"),
            Some(UniformLocation { offset: 80 })
        );
        assert_eq!(uniform_location(&layout, "ambient"), None);
    }

    #[test]
    fn test_wgsl_struct_lists_members_in_order() {
        let mut layout = UniformLayout::default();
        push_uniform(&mut layout, "ambient", UniformKind::Vec4);
        push_uniform(&mut layout, "light_view_projection", UniformKind::Mat4);

        let source = wgsl_struct(&layout, "SurfaceUniforms");
        assert_eq!(
            source,
            "struct SurfaceUniforms {\n    ambient: vec4<f32>,\n    light_view_projection: mat4x4<f32>,\n}\n"
        );
    }
}
