//! wgpu implementation of the GPU backend
//!
//! Objects live in per-kind arenas keyed by the handle id. Passes are recorded
//! CPU-side and encoded into one command buffer at `end_pass`, with a fresh
//! uniform buffer and bind group per draw.

use super::gpu_backend::{
    GpuBackend, GpuBackendError, MeshHandle, PassTarget, ProgramDesc, ProgramHandle,
    SampleKind, TargetFormat, TexelData, TextureBinding, TextureDesc, TextureDimension,
    TextureFormat, TextureHandle, TextureUnit, UniformLocation, UniformValue, SAMPLER_BINDING,
    UNIFORM_BINDING,
};
use super::grid_mesh::{grid_indices, grid_vertices};
use crate::color_ramp::quantize_color;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const GRID_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_block_size: u32,
    textures: Vec<TextureBinding>,
    uses_sampler: bool,
    target: TargetFormat,
}

struct DepthAttachment {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct OutputTarget {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct PendingDraw {
    program: u64,
    mesh: u64,
    uniforms: Vec<u8>,
    textures: BTreeMap<TextureUnit, u64>,
}

struct PendingPass {
    target: PassTarget,
    clear_color: [f32; 4],
    program: Option<u64>,
    uniforms: Vec<u8>,
    textures: BTreeMap<TextureUnit, u64>,
    draws: Vec<PendingDraw>,
}

/// GPU backend for one wgpu device/queue pair
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    output_format: wgpu::TextureFormat,
    output: Option<OutputTarget>,
    sampler: wgpu::Sampler,

    textures: HashMap<u64, GpuTexture>,
    meshes: HashMap<u64, GpuMesh>,
    programs: HashMap<u64, GpuProgram>,
    /// One attachment per pass target, replaced when the target is resized
    depth_attachments: HashMap<PassTarget, DepthAttachment>,

    pass: Option<PendingPass>,
    next_id: u64,
}

impl WgpuBackend {
    /// Create a backend rendering into targets of `output_format`
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        // Linear filtering with clamp-to-edge, matching the texel-center mapping
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Height Color Map Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            device,
            queue,
            output_format,
            output: None,
            sampler,
            textures: HashMap::new(),
            meshes: HashMap::new(),
            programs: HashMap::new(),
            depth_attachments: HashMap::new(),
            pass: None,
            next_id: 1,
        }
    }

    /// Set the view that `PassTarget::Output` renders into for the next passes
    pub fn set_output(&mut self, view: wgpu::TextureView, width: u32, height: u32) {
        self.output = Some(OutputTarget {
            view,
            width,
            height,
        });
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_depth_attachment(&mut self, target: PassTarget, width: u32, height: u32) {
        if let Some(existing) = self.depth_attachments.get(&target) {
            if existing.width == width && existing.height == height {
                return;
            }
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Surface Depth Attachment"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let replaced = self.depth_attachments.insert(
            target,
            DepthAttachment {
                texture,
                view,
                width,
                height,
            },
        );
        if let Some(replaced) = replaced {
            replaced.texture.destroy();
        }
    }

    fn pass_mut(&mut self) -> Result<&mut PendingPass, GpuBackendError> {
        self.pass.as_mut().ok_or(GpuBackendError::NoActivePass)
    }

    /// Encode and submit a recorded pass; the caller owns the error scope
    fn encode_pass(&self, pass: &PendingPass) -> Result<(), GpuBackendError> {
        let mut prepared = Vec::with_capacity(pass.draws.len());
        for draw in &pass.draws {
            let program = self
                .programs
                .get(&draw.program)
                .ok_or_else(|| unknown("program", draw.program))?;
            let mesh = self
                .meshes
                .get(&draw.mesh)
                .ok_or_else(|| unknown("mesh", draw.mesh))?;

            let expected_target = match pass.target {
                PassTarget::Output => TargetFormat::Output,
                PassTarget::Texture(_) => TargetFormat::R32Float,
            };
            if program.target != expected_target {
                return Err(GpuBackendError::Validation {
                    operation: "end pass".to_string(),
                    message: "program output does not match pass target".to_string(),
                });
            }

            let uniform_buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Surface Uniforms"),
                    contents: &draw.uniforms,
                    usage: wgpu::BufferUsages::UNIFORM,
                });

            let mut entries = vec![wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: uniform_buffer.as_entire_binding(),
            }];
            if program.uses_sampler {
                entries.push(wgpu::BindGroupEntry {
                    binding: SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                });
            }
            for binding in &program.textures {
                let id = draw.textures.get(&binding.unit).ok_or_else(|| {
                    GpuBackendError::Validation {
                        operation: "end pass".to_string(),
                        message: format!("texture unit {:?} not bound", binding.unit),
                    }
                })?;
                let texture = self.textures.get(id).ok_or_else(|| unknown("texture", *id))?;
                entries.push(wgpu::BindGroupEntry {
                    binding: binding.binding,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
            }

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Surface Bind Group"),
                layout: &program.bind_group_layout,
                entries: &entries,
            });
            prepared.push((program, mesh, bind_group));
        }

        let color_view = match pass.target {
            PassTarget::Output => match self.output.as_ref() {
                Some(output) => &output.view,
                None => return Err(unknown("output view", 0)),
            },
            PassTarget::Texture(handle) => match self.textures.get(&handle.0) {
                Some(texture) => &texture.view,
                None => return Err(unknown("texture", handle.0)),
            },
        };
        let depth_view = match self.depth_attachments.get(&pass.target) {
            Some(attachment) => &attachment.view,
            None => return Err(unknown("depth attachment", 0)),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Surface Pass Encoder"),
            });
        {
            let [r, g, b, a] = pass.clear_color;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Surface Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (program, mesh, bind_group) in &prepared {
                render_pass.set_pipeline(&program.pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(())
    }

    fn pop_validation_scope(&self, operation: &str) -> Result<(), GpuBackendError> {
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(GpuBackendError::Validation {
                operation: operation.to_string(),
                message: error.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn unknown(kind: &str, id: u64) -> GpuBackendError {
    GpuBackendError::UnknownHandle {
        kind: kind.to_string(),
        id,
    }
}

/// Reject extents the device cannot hold; these are caller errors, not exhaustion
fn check_texture_extent(desc: &TextureDesc, limits: &wgpu::Limits) -> Result<(), GpuBackendError> {
    let max_dimension = match desc.dimension {
        TextureDimension::D1 => limits.max_texture_dimension_1d,
        TextureDimension::D2 => limits.max_texture_dimension_2d,
    };
    if desc.dimension == TextureDimension::D1 && desc.height != 1 {
        return Err(GpuBackendError::Validation {
            operation: format!("create {}", desc.label),
            message: format!("1D texture must be one texel high, got {}", desc.height),
        });
    }
    if desc.width == 0 || desc.height == 0 || desc.width.max(desc.height) > max_dimension {
        return Err(GpuBackendError::Validation {
            operation: format!("create {}", desc.label),
            message: format!(
                "extent {}x{} outside 1..={} supported by the device",
                desc.width, desc.height, max_dimension
            ),
        });
    }
    Ok(())
}

fn texel_bytes(texels: TexelData<'_>) -> Cow<'_, [u8]> {
    match texels {
        TexelData::Rgba(colors) => Cow::Owned(colors.iter().flat_map(quantize_color).collect()),
        TexelData::Scalar(values) => Cow::Borrowed(bytemuck::cast_slice(values)),
    }
}

impl GpuBackend for WgpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, GpuBackendError> {
        check_texture_extent(desc, &self.device.limits())?;

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: match desc.dimension {
                TextureDimension::D1 => wgpu::TextureDimension::D1,
                TextureDimension::D2 => wgpu::TextureDimension::D2,
            },
            format: match desc.format {
                TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
                TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
            },
            usage,
            view_formats: &[],
        });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            log::error!(
                "[wgpu_backend::create_texture] Out of memory creating {} ({}x{})",
                desc.label,
                desc.width,
                desc.height
            );
            return Err(GpuBackendError::OutOfMemory {
                resource: desc.label.to_string(),
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.allocate_id();
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                desc: desc.clone(),
            },
        );
        Ok(TextureHandle(id))
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        texels: TexelData<'_>,
    ) -> Result<(), GpuBackendError> {
        let target = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| unknown("texture", texture.0))?;
        let desc = &target.desc;

        let expected = desc.width as usize * desc.height as usize;
        if texels.texel_count() != expected {
            return Err(GpuBackendError::Validation {
                operation: format!("upload {}", desc.label),
                message: format!("expected {} texels, got {}", expected, texels.texel_count()),
            });
        }
        let bytes_per_texel = match (desc.format, texels) {
            (TextureFormat::Rgba8Unorm, TexelData::Rgba(_)) => 4,
            (TextureFormat::R32Float, TexelData::Scalar(_)) => 4,
            _ => {
                return Err(GpuBackendError::Validation {
                    operation: format!("upload {}", desc.label),
                    message: "texel data does not match texture format".to_string(),
                })
            }
        };

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &texel_bytes(texels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_texel * desc.width),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );

        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(released) = self.textures.remove(&texture.0) {
            released.texture.destroy();
        }
        if let Some(attachment) = self.depth_attachments.remove(&PassTarget::Texture(texture)) {
            attachment.texture.destroy();
        }
    }

    fn create_grid_mesh(&mut self, width: u32, height: u32) -> Result<MeshHandle, GpuBackendError> {
        if width < 2 || height < 2 {
            return Err(GpuBackendError::Validation {
                operation: "create grid mesh".to_string(),
                message: format!("grid of {}x{} has no cells", width, height),
            });
        }

        let vertices = grid_vertices(width, height);
        let indices = grid_indices(width, height);

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Surface Grid Vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Surface Grid Indices"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            return Err(GpuBackendError::OutOfMemory {
                resource: format!("surface grid {}x{}", width, height),
            });
        }

        let id = self.allocate_id();
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: indices.len() as u32,
            },
        );
        Ok(MeshHandle(id))
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if let Some(released) = self.meshes.remove(&mesh.0) {
            released.vertex_buffer.destroy();
            released.index_buffer.destroy();
        }
    }

    fn build_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramHandle, GpuBackendError> {
        let uses_sampler = desc
            .textures
            .iter()
            .any(|t| t.sample == SampleKind::Filtered1D);

        let mut layout_entries = vec![wgpu::BindGroupLayoutEntry {
            binding: UNIFORM_BINDING,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        if uses_sampler {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: SAMPLER_BINDING,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        for texture in desc.textures {
            let (sample_type, view_dimension) = match texture.sample {
                SampleKind::Filtered1D => (
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D1,
                ),
                SampleKind::Unfiltered2D => (
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::TextureViewDimension::D2,
                ),
            };
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            });
        }

        let color_format = match desc.target {
            TargetFormat::Output => self.output_format,
            TargetFormat::R32Float => wgpu::TextureFormat::R32Float,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            });
        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(desc.label),
                    entries: &layout_entries,
                });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: desc.vertex_entry,
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &GRID_ATTRIBUTES,
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: desc.fragment_entry,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuBackendError::Compilation {
                label: desc.label.to_string(),
                diagnostic: error.to_string(),
            });
        }

        let id = self.allocate_id();
        self.programs.insert(
            id,
            GpuProgram {
                pipeline,
                bind_group_layout,
                uniform_block_size: desc.uniform_block_size,
                textures: desc.textures.to_vec(),
                uses_sampler,
                target: desc.target,
            },
        );
        Ok(ProgramHandle(id))
    }

    fn release_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn begin_pass(&mut self, target: PassTarget, clear_color: [f32; 4]) -> Result<(), GpuBackendError> {
        if self.pass.is_some() {
            return Err(GpuBackendError::Validation {
                operation: "begin pass".to_string(),
                message: "previous pass was not ended".to_string(),
            });
        }
        if let PassTarget::Texture(handle) = target {
            let texture = self
                .textures
                .get(&handle.0)
                .ok_or_else(|| unknown("texture", handle.0))?;
            if !texture.desc.render_target {
                return Err(GpuBackendError::Validation {
                    operation: "begin pass".to_string(),
                    message: format!("{} is not a render target", texture.desc.label),
                });
            }
        }

        self.pass = Some(PendingPass {
            target,
            clear_color,
            program: None,
            uniforms: Vec::new(),
            textures: BTreeMap::new(),
            draws: Vec::new(),
        });
        Ok(())
    }

    fn bind_program(&mut self, program: ProgramHandle) -> Result<(), GpuBackendError> {
        let block_size = self
            .programs
            .get(&program.0)
            .ok_or_else(|| unknown("program", program.0))?
            .uniform_block_size;

        let pass = self.pass_mut()?;
        pass.program = Some(program.0);
        pass.uniforms = vec![0u8; block_size as usize];
        Ok(())
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureHandle) -> Result<(), GpuBackendError> {
        if !self.textures.contains_key(&texture.0) {
            return Err(unknown("texture", texture.0));
        }
        self.pass_mut()?.textures.insert(unit, texture.0);
        Ok(())
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> Result<(), GpuBackendError> {
        let pass = self.pass_mut()?;
        let start = location.offset as usize;
        let end = start + value.byte_size() as usize;
        if pass.program.is_none() || end > pass.uniforms.len() {
            return Err(GpuBackendError::Validation {
                operation: "set uniform".to_string(),
                message: format!(
                    "offset {} outside uniform block of {} bytes",
                    location.offset,
                    pass.uniforms.len()
                ),
            });
        }

        let bytes: &[u8] = match &value {
            UniformValue::Vec4(v) => bytemuck::bytes_of(v),
            UniformValue::Mat4(m) => bytemuck::bytes_of(m),
        };
        pass.uniforms[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> Result<(), GpuBackendError> {
        if !self.meshes.contains_key(&mesh.0) {
            return Err(unknown("mesh", mesh.0));
        }
        let pass = self.pass_mut()?;
        let program = pass.program.ok_or_else(|| GpuBackendError::Validation {
            operation: "draw".to_string(),
            message: "no program bound".to_string(),
        })?;

        let draw = PendingDraw {
            program,
            mesh: mesh.0,
            uniforms: pass.uniforms.clone(),
            textures: pass.textures.clone(),
        };
        pass.draws.push(draw);
        Ok(())
    }

    fn end_pass(&mut self) -> Result<(), GpuBackendError> {
        let pass = self.pass.take().ok_or(GpuBackendError::NoActivePass)?;

        let (width, height) = match pass.target {
            PassTarget::Output => {
                let output = self.output.as_ref().ok_or_else(|| GpuBackendError::Validation {
                    operation: "end pass".to_string(),
                    message: "no output view configured".to_string(),
                })?;
                (output.width, output.height)
            }
            PassTarget::Texture(handle) => {
                let texture = self
                    .textures
                    .get(&handle.0)
                    .ok_or_else(|| unknown("texture", handle.0))?;
                (texture.desc.width, texture.desc.height)
            }
        };
        if width == 0 || height == 0 {
            return Err(GpuBackendError::Validation {
                operation: "end pass".to_string(),
                message: format!("pass target is {}x{}", width, height),
            });
        }
        self.ensure_depth_attachment(pass.target, width, height);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let encoded = self.encode_pass(&pass);
        let validated = self.pop_validation_scope("end pass");
        encoded.and(validated)
    }

    fn abort_pass(&mut self) {
        if self.pass.take().is_some() {
            log::debug!("[wgpu_backend::abort_pass] Discarded recorded pass");
        }
    }
}
