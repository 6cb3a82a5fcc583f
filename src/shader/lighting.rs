//! Caller-owned lighting snapshot
//!
//! The light tracker lives outside this crate. Composition only depends on
//! the kind of each enabled light; positions and colors are per-frame uniforms.

use cgmath::Matrix4;

/// Lights beyond this count are ignored
pub const MAX_LIGHTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSource {
    pub enabled: bool,
    /// Camera-space position, `w == 0` marks a directional light
    pub position: [f32; 4],
    pub color: [f32; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightingState {
    /// Bumped by the owner whenever any light changes
    pub version: u32,
    pub lights: Vec<LightSource>,
    pub ambient: [f32; 4],
    /// View-projection of the shadow-casting light, if shadows are available
    pub light_view_projection: Option<Matrix4<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightKind {
    Point,
    Directional,
}

/// What composition needs to know about the lights
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LightingDescriptor {
    pub lights: Vec<LightKind>,
}

/// One white headlight-style directional light and a dim ambient term
pub fn create_lighting_state() -> LightingState {
    LightingState {
        version: 0,
        lights: vec![LightSource {
            enabled: true,
            position: [0.0, 0.0, 1.0, 0.0],
            color: [1.0, 1.0, 1.0, 1.0],
        }],
        ambient: [0.2, 0.2, 0.2, 1.0],
        light_view_projection: None,
    }
}

/// Enabled lights in order, capped at `MAX_LIGHTS`
pub fn enabled_lights(state: &LightingState) -> impl Iterator<Item = &LightSource> {
    state.lights.iter().filter(|l| l.enabled).take(MAX_LIGHTS)
}

pub fn describe_lighting(state: &LightingState) -> LightingDescriptor {
    LightingDescriptor {
        lights: enabled_lights(state)
            .map(|light| {
                if light.position[3] == 0.0 {
                    LightKind::Directional
                } else {
                    LightKind::Point
                }
            })
            .collect(),
    }
}
