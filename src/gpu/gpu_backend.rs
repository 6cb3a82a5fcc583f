//! GPU backend seam
//!
//! A small immediate-mode surface over the graphics API: create/upload/release
//! objects, then record passes (bind program, bind textures, set uniforms,
//! draw). Backends are driven from the thread that owns the GPU context.

/// Binding index of the uniform block in every program
pub const UNIFORM_BINDING: u32 = 0;

/// Binding index of the shared linear sampler
pub const SAMPLER_BINDING: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

/// Texture units, each with a fixed binding index shared by all programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureUnit {
    HeightColorMap,
    DepthImage,
    ContourElevation,
    ShadowMap,
    Dem,
}

impl TextureUnit {
    pub const ALL: [TextureUnit; 5] = [
        TextureUnit::HeightColorMap,
        TextureUnit::DepthImage,
        TextureUnit::ContourElevation,
        TextureUnit::ShadowMap,
        TextureUnit::Dem,
    ];

    pub fn binding(self) -> u32 {
        match self {
            TextureUnit::HeightColorMap => 2,
            TextureUnit::DepthImage => 3,
            TextureUnit::ContourElevation => 4,
            TextureUnit::ShadowMap => 5,
            TextureUnit::Dem => 6,
        }
    }

    /// Name of the texture variable in generated WGSL
    pub fn wgsl_name(self) -> &'static str {
        match self {
            TextureUnit::HeightColorMap => "height_color_map",
            TextureUnit::DepthImage => "depth_image",
            TextureUnit::ContourElevation => "contour_elevation",
            TextureUnit::ShadowMap => "shadow_map",
            TextureUnit::Dem => "dem",
        }
    }

    pub fn sample_kind(self) -> SampleKind {
        match self {
            TextureUnit::HeightColorMap => SampleKind::Filtered1D,
            _ => SampleKind::Unfiltered2D,
        }
    }
}

/// How a program reads a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// `texture_1d<f32>` read through the linear sampler
    Filtered1D,
    /// `texture_2d<f32>` read with `textureLoad`
    Unfiltered2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    pub unit: TextureUnit,
    pub binding: u32,
    pub sample: SampleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Color ramp entries, 8 bits per channel like the classic GL_RGB8 upload
    Rgba8Unorm,
    /// Depth images, DEM elevations and auxiliary pass outputs
    R32Float,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// Texture is rendered into by an auxiliary pass
    pub render_target: bool,
}

/// Texel payload for an upload
#[derive(Debug, Clone, Copy)]
pub enum TexelData<'a> {
    Rgba(&'a [[f32; 4]]),
    Scalar(&'a [f32]),
}

impl TexelData<'_> {
    pub fn texel_count(&self) -> usize {
        match self {
            TexelData::Rgba(texels) => texels.len(),
            TexelData::Scalar(texels) => texels.len(),
        }
    }
}

/// Color output of a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    /// The presentation target configured on the backend
    Output,
    /// A single-channel float render target
    R32Float,
}

/// Everything a backend needs to compile and link one program
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub uniform_block_size: u32,
    pub textures: &'a [TextureBinding],
    pub target: TargetFormat,
}

/// Byte offset of a uniform inside the program's uniform block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn byte_size(&self) -> u32 {
        match self {
            UniformValue::Vec4(_) => 16,
            UniformValue::Mat4(_) => 64,
        }
    }
}

/// Render pass destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassTarget {
    Output,
    Texture(TextureHandle),
}

/// Backend errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuBackendError {
    #[error("GPU out of memory while creating {resource}")]
    OutOfMemory { resource: String },

    #[error("Shader compilation failed for {label}: {diagnostic}")]
    Compilation { label: String, diagnostic: String },

    #[error("Unknown {kind} handle {id}")]
    UnknownHandle { kind: String, id: u64 },

    #[error("No active render pass")]
    NoActivePass,

    #[error("GPU validation failed during {operation}: {message}")]
    Validation { operation: String, message: String },
}

/// Graphics API seam used by the resource cache and the surface orchestrator
pub trait GpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, GpuBackendError>;

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        texels: TexelData<'_>,
    ) -> Result<(), GpuBackendError>;

    fn release_texture(&mut self, texture: TextureHandle);

    /// Grid of `width * height` vertices at depth-pixel centers, two triangles per cell
    fn create_grid_mesh(&mut self, width: u32, height: u32) -> Result<MeshHandle, GpuBackendError>;

    fn release_mesh(&mut self, mesh: MeshHandle);

    /// Compile and link. Error diagnostics fail the build, warnings do not.
    fn build_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramHandle, GpuBackendError>;

    fn release_program(&mut self, program: ProgramHandle);

    fn begin_pass(&mut self, target: PassTarget, clear_color: [f32; 4]) -> Result<(), GpuBackendError>;

    fn bind_program(&mut self, program: ProgramHandle) -> Result<(), GpuBackendError>;

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureHandle) -> Result<(), GpuBackendError>;

    /// Set a uniform of the currently bound program
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> Result<(), GpuBackendError>;

    fn draw_mesh(&mut self, mesh: MeshHandle) -> Result<(), GpuBackendError>;

    /// Submit everything recorded since `begin_pass`
    fn end_pass(&mut self) -> Result<(), GpuBackendError>;

    /// Drop everything recorded since `begin_pass` without submitting
    fn abort_pass(&mut self);
}
