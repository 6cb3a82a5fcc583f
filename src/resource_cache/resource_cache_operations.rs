//! Resource Cache Operations - Pure DOP Functions
//!
//! Every `ensure_*` compares the cached stamp with the logical resource and
//! touches the GPU only on mismatch. A repeated call with unchanged inputs
//! makes zero backend calls.

use super::resource_cache_data::{
    CacheStats, CachedMesh, CachedProgram, CachedTexture, ResourceCacheData, SyncStamp,
};
use crate::color_ramp::ColorRampData;
use crate::error::{SurfaceError, SurfaceResult};
use crate::gpu::{
    GpuBackend, MeshHandle, ProgramHandle, TexelData, TextureDesc, TextureDimension,
    TextureFormat, TextureHandle, TextureUnit,
};
use crate::providers::{DemGrid, DepthFrame};
use crate::shader::{
    build_program, compose, normalize_feature_config, BuiltProgram, FeatureConfig,
    LightingDescriptor, ProgramSlot, ShaderComposerData, ShaderKey,
};

// ============================================================================
// INITIALIZATION
// ============================================================================

pub fn create_resource_cache() -> ResourceCacheData {
    ResourceCacheData::default()
}

// ============================================================================
// TEXTURES
// ============================================================================

/// Shared texture protocol: reuse on matching stamp, reallocate on size
/// change, upload otherwise
fn ensure_texture_slot<B: GpuBackend + ?Sized>(
    cache: &mut ResourceCacheData,
    backend: &mut B,
    unit: TextureUnit,
    desc: TextureDesc,
    generation: u64,
    texels: Option<TexelData<'_>>,
) -> SurfaceResult<TextureHandle> {
    let stamp = SyncStamp {
        generation,
        width: desc.width,
        height: desc.height,
    };

    let reusable = match cache.textures.get(&unit) {
        Some(cached) if cached.stamp == stamp => {
            cache.stats.texture_hits += 1;
            return Ok(cached.handle);
        }
        Some(cached) if cached.stamp.width == stamp.width && cached.stamp.height == stamp.height => {
            Some(cached.handle)
        }
        _ => None,
    };

    let handle = match reusable {
        Some(handle) => handle,
        None => {
            if let Some(stale) = cache.textures.remove(&unit) {
                backend.release_texture(stale.handle);
            }
            backend.create_texture(&desc)?
        }
    };

    if let Some(texels) = texels {
        if let Err(e) = backend.upload_texture(handle, texels) {
            // Drop the object rather than keep one with unknown contents
            cache.textures.remove(&unit);
            backend.release_texture(handle);
            return Err(e.into());
        }
        cache.stats.texture_uploads += 1;
    }

    log::debug!(
        "[resource_cache::ensure_texture] Synchronized {} ({}x{}, generation {})",
        desc.label,
        stamp.width,
        stamp.height,
        generation
    );

    cache.textures.insert(unit, CachedTexture { handle, stamp });
    Ok(handle)
}

/// Ramp lookup table as a 1D texture, re-uploaded when the version or length moves
pub fn ensure_color_ramp_texture<B: GpuBackend + ?Sized>(
    cache: &mut ResourceCacheData,
    backend: &mut B,
    ramp: &ColorRampData,
) -> SurfaceResult<TextureHandle> {
    if ramp.entries.is_empty() {
        return Err(SurfaceError::StateError {
            expected: "loaded color ramp".to_string(),
            actual: "empty color ramp".to_string(),
        });
    }

    let desc = TextureDesc {
        label: "Height Color Map",
        dimension: TextureDimension::D1,
        format: TextureFormat::Rgba8Unorm,
        width: ramp.entries.len() as u32,
        height: 1,
        render_target: false,
    };
    ensure_texture_slot(
        cache,
        backend,
        TextureUnit::HeightColorMap,
        desc,
        ramp.version as u64,
        Some(TexelData::Rgba(&ramp.entries)),
    )
}

/// Depth image texture, stamped by frame number
pub fn ensure_depth_texture<B: GpuBackend + ?Sized>(
    cache: &mut ResourceCacheData,
    backend: &mut B,
    frame: &DepthFrame,
) -> SurfaceResult<TextureHandle> {
    let desc = TextureDesc {
        label: "Depth Image",
        dimension: TextureDimension::D2,
        format: TextureFormat::R32Float,
        width: frame.width,
        height: frame.height,
        render_target: false,
    };
    ensure_texture_slot(
        cache,
        backend,
        TextureUnit::DepthImage,
        desc,
        frame.frame_number,
        Some(TexelData::Scalar(&frame.depths)),
    )
}

/// DEM elevation texture, stamped by DEM version
pub fn ensure_dem_texture<B: GpuBackend + ?Sized>(
    cache: &mut ResourceCacheData,
    backend: &mut B,
    dem: &DemGrid,
) -> SurfaceResult<TextureHandle> {
    let desc = TextureDesc {
        label: "DEM Elevations",
        dimension: TextureDimension::D2,
        format: TextureFormat::R32Float,
        width: dem.width,
        height: dem.height,
        render_target: false,
    };
    ensure_texture_slot(
        cache,
        backend,
        TextureUnit::Dem,
        desc,
        dem.version,
        Some(TexelData::Scalar(&dem.elevations)),
    )
}

/// Render target of an auxiliary pass, stamped by size only
pub fn ensure_render_target<B: GpuBackend + ?Sized>(
    cache: &mut ResourceCacheData,
    backend: &mut B,
    unit: TextureUnit,
    width: u32,
    height: u32,
) -> SurfaceResult<TextureHandle> {
    let label = match unit {
        TextureUnit::ContourElevation => "Contour Elevation Target",
        TextureUnit::ShadowMap => "Shadow Map Target",
        other => {
            return Err(SurfaceError::StateError {
                expected: "render target texture unit".to_string(),
                actual: format!("{:?}", other),
            })
        }
    };

    let desc = TextureDesc {
        label,
        dimension: TextureDimension::D2,
        format: TextureFormat::R32Float,
        width,
        height,
        render_target: true,
    };
    ensure_texture_slot(cache, backend, unit, desc, 0, None)
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Grid mesh matching the depth image size
pub fn ensure_grid_mesh<B: GpuBackend + ?Sized>(
    cache: &mut ResourceCacheData,
    backend: &mut B,
    width: u32,
    height: u32,
) -> SurfaceResult<MeshHandle> {
    if let Some(mesh) = cache.grid_mesh {
        if mesh.width == width && mesh.height == height {
            cache.stats.mesh_hits += 1;
            return Ok(mesh.handle);
        }
    }

    if let Some(stale) = cache.grid_mesh.take() {
        backend.release_mesh(stale.handle);
    }
    let handle = backend.create_grid_mesh(width, height)?;
    cache.stats.mesh_builds += 1;
    cache.grid_mesh = Some(CachedMesh {
        handle,
        width,
        height,
    });

    log::debug!(
        "[resource_cache::ensure_grid_mesh] Built {}x{} surface grid",
        width,
        height
    );
    Ok(handle)
}

// ============================================================================
// PROGRAMS
// ============================================================================

/// Cache key of a slot; auxiliary programs only depend on the template sources
///
/// An unlit surface composes no light blocks, so its key ignores the
/// lighting version.
pub fn shader_key(
    slot: ProgramSlot,
    config: FeatureConfig,
    lighting_version: u32,
    source_version: u64,
) -> ShaderKey {
    match slot {
        ProgramSlot::Surface => {
            let config = normalize_feature_config(config);
            ShaderKey {
                config,
                lighting_version: if config.illuminate { lighting_version } else { 0 },
                source_version,
            }
        }
        ProgramSlot::ContourElevation | ProgramSlot::ShadowDepth => ShaderKey {
            config: FeatureConfig::default(),
            lighting_version: 0,
            source_version,
        },
    }
}

/// Program for a slot, rebuilt when the (config, lighting version, source
/// version) key changed or the last build failed
///
/// The slot's previous program is released before the new build, so at most
/// one program per slot is ever live.
#[allow(clippy::too_many_arguments)]
pub fn ensure_shader<B: GpuBackend + ?Sized>(
    cache: &mut ResourceCacheData,
    backend: &mut B,
    composer: &mut ShaderComposerData,
    slot: ProgramSlot,
    config: FeatureConfig,
    lighting: &LightingDescriptor,
    lighting_version: u32,
    source_version: u64,
) -> SurfaceResult<ProgramHandle> {
    let key = shader_key(slot, config, lighting_version, source_version);

    if let Some(CachedProgram::Built {
        key: cached_key,
        program,
    }) = cache.programs.get(&slot)
    {
        if *cached_key == key {
            cache.stats.program_hits += 1;
            return Ok(program.handle);
        }
    }

    if let Some(CachedProgram::Built { program, .. }) = cache.programs.remove(&slot) {
        backend.release_program(program.handle);
    }

    let built = compose(composer, slot, key.config, lighting, source_version)
        .and_then(|composed| build_program(backend, &composed));

    match built {
        Ok(program) => {
            let handle = program.handle;
            cache.stats.program_builds += 1;
            cache.programs.insert(slot, CachedProgram::Built { key, program });
            Ok(handle)
        }
        Err(e) => {
            cache.stats.build_failures += 1;
            cache.programs.insert(
                slot,
                CachedProgram::Invalid {
                    key,
                    diagnostic: e.to_string(),
                },
            );
            Err(e)
        }
    }
}

/// Built program of a slot, if the last build succeeded
pub fn built_program(cache: &ResourceCacheData, slot: ProgramSlot) -> Option<&BuiltProgram> {
    match cache.programs.get(&slot) {
        Some(CachedProgram::Built { program, .. }) => Some(program),
        _ => None,
    }
}

pub fn cached_texture(cache: &ResourceCacheData, unit: TextureUnit) -> Option<TextureHandle> {
    cache.textures.get(&unit).map(|cached| cached.handle)
}

// ============================================================================
// TEARDOWN
// ============================================================================

/// Release every GPU object exactly once; returns how many were released
pub fn release_all<B: GpuBackend + ?Sized>(cache: &mut ResourceCacheData, backend: &mut B) -> usize {
    let mut released = 0;

    for (_, cached) in cache.textures.drain() {
        backend.release_texture(cached.handle);
        released += 1;
    }
    if let Some(mesh) = cache.grid_mesh.take() {
        backend.release_mesh(mesh.handle);
        released += 1;
    }
    for (_, cached) in cache.programs.drain() {
        if let CachedProgram::Built { program, .. } = cached {
            backend.release_program(program.handle);
            released += 1;
        }
    }

    log::info!(
        "[resource_cache::release_all] Released {} GPU objects",
        released
    );
    released
}

pub fn cache_stats(cache: &ResourceCacheData) -> CacheStats {
    cache.stats
}
