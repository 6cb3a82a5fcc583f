//! GPU layer
//!
//! Everything above this module talks to the graphics API through the
//! `GpuBackend` trait. Handles are opaque ids owned by whoever created them;
//! the resource cache is the only owner in practice.

pub mod gpu_backend;
pub mod grid_mesh;
pub mod wgpu_backend;

#[cfg(test)]
pub mod recording_backend;

pub use gpu_backend::{
    GpuBackend, GpuBackendError, MeshHandle, PassTarget, ProgramDesc, ProgramHandle,
    SampleKind, TargetFormat, TexelData, TextureBinding, TextureDesc, TextureDimension,
    TextureFormat, TextureHandle, TextureUnit, UniformLocation, UniformValue,
    SAMPLER_BINDING, UNIFORM_BINDING,
};
pub use grid_mesh::{grid_indices, grid_vertices};
pub use wgpu_backend::WgpuBackend;
