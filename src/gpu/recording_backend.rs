//! In-memory backend that records every call, used by unit tests

use super::gpu_backend::{
    GpuBackend, GpuBackendError, MeshHandle, PassTarget, ProgramDesc, ProgramHandle,
    TexelData, TextureDesc, TextureHandle, TextureUnit, UniformLocation, UniformValue,
};
use std::collections::HashMap;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub textures_created: usize,
    pub textures_uploaded: usize,
    pub textures_released: usize,
    pub meshes_created: usize,
    pub meshes_released: usize,
    pub programs_built: usize,
    pub programs_released: usize,
    pub passes: usize,
    pub passes_aborted: usize,
    pub draws: usize,
    pub uniforms_set: usize,
    pub textures_bound: usize,
}

#[derive(Debug, Clone)]
pub struct RecordedDraw {
    pub target: PassTarget,
    pub program: ProgramHandle,
    pub mesh: MeshHandle,
    pub textures: Vec<(TextureUnit, TextureHandle)>,
}

#[derive(Debug)]
struct OpenPass {
    target: PassTarget,
    program: Option<ProgramHandle>,
    textures: Vec<(TextureUnit, TextureHandle)>,
    draws: Vec<RecordedDraw>,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub counts: CallCounts,
    pub built_sources: Vec<String>,
    pub uploads: Vec<(TextureHandle, Vec<[f32; 4]>)>,
    pub draws: Vec<RecordedDraw>,
    pub uniforms: Vec<(UniformLocation, UniformValue)>,

    /// Programs whose source contains this text fail to compile
    pub fail_builds_containing: Option<String>,
    /// Every texture allocation fails with `OutOfMemory`
    pub fail_allocations: bool,

    pub live_textures: HashMap<TextureHandle, TextureDesc>,
    pub live_meshes: HashMap<MeshHandle, (u32, u32)>,
    pub live_programs: HashMap<ProgramHandle, String>,

    pass: Option<OpenPass>,
    next_id: u64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    pub fn live_object_count(&self) -> usize {
        self.live_textures.len() + self.live_meshes.len() + self.live_programs.len()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    fn open_pass(&mut self) -> Result<&mut OpenPass, GpuBackendError> {
        self.pass.as_mut().ok_or(GpuBackendError::NoActivePass)
    }
}

impl GpuBackend for RecordingBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, GpuBackendError> {
        if self.fail_allocations {
            return Err(GpuBackendError::OutOfMemory {
                resource: desc.label.to_string(),
            });
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuBackendError::Validation {
                operation: format!("create {}", desc.label),
                message: format!("empty extent {}x{}", desc.width, desc.height),
            });
        }
        self.counts.textures_created += 1;
        let handle = TextureHandle(self.allocate_id());
        self.live_textures.insert(handle, desc.clone());
        Ok(handle)
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        texels: TexelData<'_>,
    ) -> Result<(), GpuBackendError> {
        let desc = self
            .live_textures
            .get(&texture)
            .ok_or_else(|| GpuBackendError::UnknownHandle {
                kind: "texture".to_string(),
                id: texture.0,
            })?;
        let expected = desc.width as usize * desc.height as usize;
        if texels.texel_count() != expected {
            return Err(GpuBackendError::Validation {
                operation: "upload".to_string(),
                message: format!("expected {} texels, got {}", expected, texels.texel_count()),
            });
        }

        self.counts.textures_uploaded += 1;
        if let TexelData::Rgba(colors) = texels {
            self.uploads.push((texture, colors.to_vec()));
        }
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if self.live_textures.remove(&texture).is_some() {
            self.counts.textures_released += 1;
        }
    }

    fn create_grid_mesh(&mut self, width: u32, height: u32) -> Result<MeshHandle, GpuBackendError> {
        if width < 2 || height < 2 {
            return Err(GpuBackendError::Validation {
                operation: "create grid mesh".to_string(),
                message: format!("grid of {}x{} has no cells", width, height),
            });
        }
        self.counts.meshes_created += 1;
        let handle = MeshHandle(self.allocate_id());
        self.live_meshes.insert(handle, (width, height));
        Ok(handle)
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if self.live_meshes.remove(&mesh).is_some() {
            self.counts.meshes_released += 1;
        }
    }

    fn build_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramHandle, GpuBackendError> {
        self.built_sources.push(desc.source.to_string());
        if let Some(marker) = &self.fail_builds_containing {
            if desc.source.contains(marker.as_str()) {
                return Err(GpuBackendError::Compilation {
                    label: desc.label.to_string(),
                    diagnostic: format!("error: unresolved identifier near '{}'", marker),
                });
            }
        }
        self.counts.programs_built += 1;
        let handle = ProgramHandle(self.allocate_id());
        self.live_programs.insert(handle, desc.label.to_string());
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if self.live_programs.remove(&program).is_some() {
            self.counts.programs_released += 1;
        }
    }

    fn begin_pass(&mut self, target: PassTarget, _clear_color: [f32; 4]) -> Result<(), GpuBackendError> {
        if self.pass.is_some() {
            return Err(GpuBackendError::Validation {
                operation: "begin pass".to_string(),
                message: "previous pass was not ended".to_string(),
            });
        }
        self.pass = Some(OpenPass {
            target,
            program: None,
            textures: Vec::new(),
            draws: Vec::new(),
        });
        Ok(())
    }

    fn bind_program(&mut self, program: ProgramHandle) -> Result<(), GpuBackendError> {
        if !self.live_programs.contains_key(&program) {
            return Err(GpuBackendError::UnknownHandle {
                kind: "program".to_string(),
                id: program.0,
            });
        }
        self.open_pass()?.program = Some(program);
        Ok(())
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureHandle) -> Result<(), GpuBackendError> {
        if !self.live_textures.contains_key(&texture) {
            return Err(GpuBackendError::UnknownHandle {
                kind: "texture".to_string(),
                id: texture.0,
            });
        }
        let pass = self.open_pass()?;
        pass.textures.retain(|(bound, _)| *bound != unit);
        pass.textures.push((unit, texture));
        self.counts.textures_bound += 1;
        Ok(())
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> Result<(), GpuBackendError> {
        self.open_pass()?;
        self.counts.uniforms_set += 1;
        self.uniforms.push((location, value));
        Ok(())
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) -> Result<(), GpuBackendError> {
        if !self.live_meshes.contains_key(&mesh) {
            return Err(GpuBackendError::UnknownHandle {
                kind: "mesh".to_string(),
                id: mesh.0,
            });
        }
        let pass = self.open_pass()?;
        let program = pass.program.ok_or_else(|| GpuBackendError::Validation {
            operation: "draw".to_string(),
            message: "no program bound".to_string(),
        })?;
        let draw = RecordedDraw {
            target: pass.target,
            program,
            mesh,
            textures: pass.textures.clone(),
        };
        pass.draws.push(draw);
        Ok(())
    }

    fn end_pass(&mut self) -> Result<(), GpuBackendError> {
        let pass = self.pass.take().ok_or(GpuBackendError::NoActivePass)?;
        self.counts.passes += 1;
        self.counts.draws += pass.draws.len();
        self.draws.extend(pass.draws);
        Ok(())
    }

    fn abort_pass(&mut self) {
        if self.pass.take().is_some() {
            self.counts.passes_aborted += 1;
        }
    }
}
