//! Surface Operations - Pure DOP Functions
//!
//! The per-frame driver. A frame pulls the depth image, brings every cached
//! GPU object up to date, runs the auxiliary passes and draws the surface.
//! Any failure before the final draw is submitted aborts the frame; nothing is
//! drawn with a mix of fresh and stale resources.

use super::surface_data::{
    FrameStats, FrameView, MappingStamp, SurfaceContext, SurfaceScene, SurfaceSettings,
    SurfaceState,
};
use crate::color_ramp::{self, compute_mapping, create_color_ramp, ColorRampData};
use crate::config::{poll_interval, requested_features, SurfaceConfig};
use crate::error::{SurfaceError, SurfaceResult};
use crate::gpu::{
    GpuBackend, MeshHandle, PassTarget, TextureHandle, TextureUnit, UniformValue,
};
use crate::height_mapping::HeightPlaneMapping;
use crate::providers::{validate_dem, validate_depth_frame, DemGrid, DemProvider, DepthImageProvider};
use crate::resource_cache::{
    built_program, cache_stats, cached_texture, create_resource_cache, ensure_color_ramp_texture,
    ensure_dem_texture, ensure_depth_texture, ensure_grid_mesh, ensure_render_target,
    ensure_shader, release_all,
};
use crate::shader::shader_composer_operations::{
    light_color_name, light_position_name, AMBIENT, BASE_PLANE, CONTOUR_LINE_FACTOR,
    DEM_DIST_SCALE, DEM_TRANSFORM, DEPTH_PROJECTION, HEIGHT_COLOR_PLANE, LIGHT_VIEW_PROJECTION,
    PROJECTION_MODELVIEW,
};
use crate::shader::{
    create_shader_composer, describe_lighting, enabled_lights, normalize_feature_config,
    template_paths, BuiltProgram, FeatureConfig, LightingState, ProgramSlot, ShadowMode,
};
use crate::source_watcher::{PollingSourceWatcher, SourceVersion, WatcherThread};
#[cfg(feature = "native")]
use crate::source_watcher::NotifySourceWatcher;
use cgmath::Matrix4;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Clear value of auxiliary targets; the shadow map clears to the far plane
const SHADOW_CLEAR: [f32; 4] = [1.0, 0.0, 0.0, 0.0];
const ELEVATION_CLEAR: [f32; 4] = [0.0; 4];

// ============================================================================
// SCENE
// ============================================================================

pub fn settings_from_config(config: &SurfaceConfig) -> SurfaceSettings {
    SurfaceSettings {
        features: requested_features(config),
        contour_line_spacing: config.contour_line_spacing,
        dem_dist_scale: config.dem_dist_scale,
        shadow_map_size: config.shadow_map_size,
        clear_color: config.clear_color,
        watch_poll_interval: poll_interval(config),
    }
}

/// Scene from an already loaded ramp
pub fn create_scene_with_ramp(
    ramp: ColorRampData,
    settings: SurfaceSettings,
    shader_directory: Option<PathBuf>,
) -> SurfaceResult<SurfaceScene> {
    let source_version = SourceVersion::new();
    let composer = create_shader_composer(shader_directory, source_version.current())?;

    Ok(SurfaceScene {
        ramp: RwLock::new(ramp),
        composer: Mutex::new(composer),
        source_version,
        settings: RwLock::new(settings),
        dem_provider: RwLock::new(None),
    })
}

/// Scene described by a configuration, loading its color ramp
pub fn create_scene(config: &SurfaceConfig) -> SurfaceResult<SurfaceScene> {
    let mut ramp = create_color_ramp(config.ramp_entries);
    color_ramp::load(&mut ramp, &config.color_ramp)?;

    log::info!(
        "[surface::create_scene] Scene ready with ramp {}",
        config.color_ramp.display()
    );
    create_scene_with_ramp(
        ramp,
        settings_from_config(config),
        config.shader_directory.clone(),
    )
}

/// Reload the ramp file; on failure the current ramp stays in use
pub fn reload_color_ramp(scene: &SurfaceScene, path: &Path) -> SurfaceResult<u32> {
    let mut ramp = scene.ramp.write();
    color_ramp::load(&mut ramp, path)?;
    Ok(ramp.version)
}

pub fn set_ramp_entries(scene: &SurfaceScene, entry_count: usize) -> SurfaceResult<()> {
    color_ramp::set_entry_count(&mut scene.ramp.write(), entry_count)
}

pub fn set_features(scene: &SurfaceScene, features: FeatureConfig) {
    scene.settings.write().features = features;
}

pub fn attach_dem(scene: &SurfaceScene, provider: Arc<dyn DemProvider + Send + Sync>) {
    *scene.dem_provider.write() = Some(provider);
}

pub fn detach_dem(scene: &SurfaceScene) {
    *scene.dem_provider.write() = None;
}

/// Start polling the override template directory, if the scene has one
pub fn watch_shader_sources(scene: &SurfaceScene) -> SurfaceResult<Option<WatcherThread>> {
    let directory = match scene.composer.lock().template_directory.clone() {
        Some(directory) => directory,
        None => return Ok(None),
    };
    let interval = scene.settings.read().watch_poll_interval;

    let watcher = PollingSourceWatcher::new(template_paths(&directory), scene.source_version.clone());
    log::info!(
        "[surface::watch_shader_sources] Polling {} every {:?}",
        directory.display(),
        interval
    );
    watcher.spawn(interval).map(Some)
}

/// Bump the scene's source version on filesystem events in the override
/// template directory, if the scene has one
#[cfg(feature = "native")]
pub fn watch_shader_events(scene: &SurfaceScene) -> SurfaceResult<Option<NotifySourceWatcher>> {
    let directory = match scene.composer.lock().template_directory.clone() {
        Some(directory) => directory,
        None => return Ok(None),
    };
    NotifySourceWatcher::watch_directory(&directory, scene.source_version.clone()).map(Some)
}

// ============================================================================
// CONTEXT LIFECYCLE
// ============================================================================

pub fn create_context<B: GpuBackend>(label: impl Into<String>, backend: B) -> SurfaceContext<B> {
    SurfaceContext {
        label: label.into(),
        backend,
        cache: create_resource_cache(),
        state: SurfaceState::Uninitialized,
        mapping: None,
        frames_rendered: 0,
    }
}

fn state_error(expected: &str, actual: SurfaceState) -> SurfaceError {
    SurfaceError::StateError {
        expected: expected.to_string(),
        actual: format!("{:?}", actual),
    }
}

pub fn initialize_context<B: GpuBackend>(context: &mut SurfaceContext<B>) -> SurfaceResult<()> {
    if context.state != SurfaceState::Uninitialized {
        return Err(state_error("Uninitialized", context.state));
    }
    context.state = SurfaceState::Ready;
    log::info!("[surface::initialize_context] Context {} ready", context.label);
    Ok(())
}

/// Release every GPU object of the context; returns how many were released
pub fn teardown_context<B: GpuBackend>(context: &mut SurfaceContext<B>) -> usize {
    if context.state == SurfaceState::TornDown {
        return 0;
    }

    context.backend.abort_pass();
    let released = release_all(&mut context.cache, &mut context.backend);
    context.mapping = None;
    context.state = SurfaceState::TornDown;

    log::info!(
        "[surface::teardown_context] Context {} torn down after {} frames",
        context.label,
        context.frames_rendered
    );
    released
}

// ============================================================================
// FRAME
// ============================================================================

/// Features actually drawn this frame
///
/// DEM deviation needs an attached DEM and shadows need a light projection.
pub fn resolve_feature_config(
    requested: FeatureConfig,
    dem_attached: bool,
    shadow_projection_available: bool,
) -> FeatureConfig {
    let mut resolved = requested;
    resolved.dem_deviation &= dem_attached;
    if !shadow_projection_available {
        resolved.shadow = ShadowMode::Off;
    }
    normalize_feature_config(resolved)
}

fn mat4_value(matrix: &Matrix4<f64>) -> UniformValue {
    let columns: [[f64; 4]; 4] = (*matrix).into();
    UniformValue::Mat4(columns.map(|column| column.map(|v| v as f32)))
}

fn set_named<B: GpuBackend>(
    backend: &mut B,
    program: &BuiltProgram,
    name: &str,
    value: UniformValue,
) -> SurfaceResult<()> {
    let location = program
        .uniform_locations
        .get(name)
        .ok_or_else(|| SurfaceError::Internal {
            message: format!("uniform '{}' missing from program {}", name, program.label),
        })?;
    backend.set_uniform(*location, value)?;
    Ok(())
}

fn bind_program_textures<B: GpuBackend>(
    backend: &mut B,
    program: &BuiltProgram,
    textures: &[(TextureUnit, TextureHandle)],
) -> SurfaceResult<()> {
    for binding in &program.textures {
        let handle = textures
            .iter()
            .find(|(unit, _)| *unit == binding.unit)
            .map(|(_, handle)| *handle)
            .ok_or_else(|| SurfaceError::StateError {
                expected: format!("{:?} texture", binding.unit),
                actual: "not synchronized".to_string(),
            })?;
        backend.bind_texture(binding.unit, handle)?;
    }
    Ok(())
}

/// Everything a frame's passes need, resolved before any pass starts
struct FramePlan {
    features: FeatureConfig,
    mesh: MeshHandle,
    textures: Vec<(TextureUnit, TextureHandle)>,
    mapping: HeightPlaneMapping,
    mapping_recomputed: bool,
    base_plane: [f32; 4],
    depth_projection: Matrix4<f64>,
    dem: Option<DemGrid>,
    depth_frame_number: u64,
}

/// Steps 1-4: inputs, mapping, feature resolution and cache synchronization
fn prepare_frame<B: GpuBackend>(
    context: &mut SurfaceContext<B>,
    scene: &SurfaceScene,
    provider: &dyn DepthImageProvider,
    lighting: &LightingState,
    view: &FrameView,
    settings: &SurfaceSettings,
) -> SurfaceResult<FramePlan> {
    // A minimized window reports an empty viewport; skip the frame
    if view.viewport.0 == 0 || view.viewport.1 == 0 {
        return Err(SurfaceError::StateError {
            expected: "non-empty viewport".to_string(),
            actual: format!("viewport {}x{}", view.viewport.0, view.viewport.1),
        });
    }

    let frame = provider.current_frame()?;
    validate_depth_frame(&frame)?;
    let base_plane = provider.base_plane();
    let depth_projection = provider.depth_projection();

    let dem = if settings.features.dem_deviation {
        let provider = scene.dem_provider.read().clone();
        match provider {
            Some(provider) => {
                let dem = provider.current_dem()?;
                validate_dem(&dem)?;
                Some(dem)
            }
            None => None,
        }
    } else {
        None
    };
    let features = resolve_feature_config(
        settings.features,
        dem.is_some(),
        lighting.light_view_projection.is_some(),
    );

    let mut textures = Vec::with_capacity(TextureUnit::ALL.len());
    let (mapping, mapping_recomputed) = {
        let ramp = scene.ramp.read();

        let stamp = MappingStamp {
            base_plane,
            ramp_version: ramp.version,
            entry_count: ramp.entries.len(),
        };
        let (mapping, recomputed) = match context.mapping.filter(|(cached, _)| *cached == stamp) {
            Some((_, mapping)) => (mapping, false),
            None => {
                let mapping = compute_mapping(&ramp, &base_plane)?;
                context.mapping = Some((stamp, mapping));
                log::debug!(
                    "[surface::render_frame] Height mapping recomputed for ramp version {}: {:?}",
                    ramp.version,
                    mapping.coefficients
                );
                (mapping, true)
            }
        };

        let handle = ensure_color_ramp_texture(&mut context.cache, &mut context.backend, &ramp)?;
        textures.push((TextureUnit::HeightColorMap, handle));
        (mapping, recomputed)
    };

    let cache = &mut context.cache;
    let backend = &mut context.backend;

    textures.push((TextureUnit::DepthImage, ensure_depth_texture(cache, backend, &frame)?));
    let mesh = ensure_grid_mesh(cache, backend, frame.width, frame.height)?;

    if let Some(dem) = &dem {
        textures.push((TextureUnit::Dem, ensure_dem_texture(cache, backend, dem)?));
    }
    if features.contour_lines {
        let (width, height) = view.viewport;
        let target = ensure_render_target(cache, backend, TextureUnit::ContourElevation, width, height)?;
        textures.push((TextureUnit::ContourElevation, target));
    }
    if features.shadow == ShadowMode::Mapped {
        let size = settings.shadow_map_size;
        let target = ensure_render_target(cache, backend, TextureUnit::ShadowMap, size, size)?;
        textures.push((TextureUnit::ShadowMap, target));
    }

    {
        let mut composer = scene.composer.lock();
        let source_version = scene.source_version.current();
        let descriptor = describe_lighting(lighting);

        let mut slots = vec![ProgramSlot::Surface];
        if features.contour_lines {
            slots.push(ProgramSlot::ContourElevation);
        }
        if features.shadow == ShadowMode::Mapped {
            slots.push(ProgramSlot::ShadowDepth);
        }
        for slot in slots {
            ensure_shader(
                cache,
                backend,
                &mut composer,
                slot,
                features,
                &descriptor,
                lighting.version,
                source_version,
            )?;
        }
    }

    Ok(FramePlan {
        features,
        mesh,
        textures,
        mapping,
        mapping_recomputed,
        base_plane: [
            base_plane.normal.x as f32,
            base_plane.normal.y as f32,
            base_plane.normal.z as f32,
            base_plane.offset as f32,
        ],
        depth_projection,
        dem,
        depth_frame_number: frame.frame_number,
    })
}

fn program_for<'a, B>(context: &'a SurfaceContext<B>, slot: ProgramSlot) -> SurfaceResult<&'a BuiltProgram> {
    built_program(&context.cache, slot).ok_or_else(|| SurfaceError::StateError {
        expected: format!("built {:?} program", slot),
        actual: "no program".to_string(),
    })
}

/// Draw the grid into an auxiliary render target
fn run_auxiliary_pass<B: GpuBackend>(
    context: &mut SurfaceContext<B>,
    plan: &FramePlan,
    slot: ProgramSlot,
    target_unit: TextureUnit,
    projection_modelview: &Matrix4<f64>,
    clear: [f32; 4],
) -> SurfaceResult<()> {
    let target = cached_texture(&context.cache, target_unit).ok_or_else(|| SurfaceError::StateError {
        expected: format!("{:?} render target", target_unit),
        actual: "not allocated".to_string(),
    })?;

    let program = program_for(context, slot)?.clone();
    let backend = &mut context.backend;

    backend.begin_pass(PassTarget::Texture(target), clear)?;
    backend.bind_program(program.handle)?;
    bind_program_textures(backend, &program, &plan.textures)?;
    set_named(backend, &program, DEPTH_PROJECTION, mat4_value(&plan.depth_projection))?;
    set_named(backend, &program, PROJECTION_MODELVIEW, mat4_value(projection_modelview))?;
    set_named(backend, &program, HEIGHT_COLOR_PLANE, UniformValue::Vec4(plan.mapping.coefficients))?;
    if slot == ProgramSlot::ContourElevation {
        set_named(backend, &program, BASE_PLANE, UniformValue::Vec4(plan.base_plane))?;
    }
    backend.draw_mesh(plan.mesh)?;
    backend.end_pass()?;
    Ok(())
}

/// Steps 5-7: auxiliary passes, uniforms and the surface draw
fn draw_frame<B: GpuBackend>(
    context: &mut SurfaceContext<B>,
    plan: &FramePlan,
    lighting: &LightingState,
    view: &FrameView,
    settings: &SurfaceSettings,
) -> SurfaceResult<u32> {
    let projection_modelview = view.projection * view.modelview;
    let mut passes = 0;

    if plan.features.shadow == ShadowMode::Mapped {
        let light_projection = lighting.light_view_projection.ok_or_else(|| SurfaceError::StateError {
            expected: "light view projection".to_string(),
            actual: "none".to_string(),
        })?;
        run_auxiliary_pass(
            context,
            plan,
            ProgramSlot::ShadowDepth,
            TextureUnit::ShadowMap,
            &light_projection,
            SHADOW_CLEAR,
        )?;
        passes += 1;
    }
    if plan.features.contour_lines {
        run_auxiliary_pass(
            context,
            plan,
            ProgramSlot::ContourElevation,
            TextureUnit::ContourElevation,
            &projection_modelview,
            ELEVATION_CLEAR,
        )?;
        passes += 1;
    }

    let program = program_for(context, ProgramSlot::Surface)?.clone();
    let backend = &mut context.backend;

    backend.begin_pass(PassTarget::Output, settings.clear_color)?;
    backend.bind_program(program.handle)?;
    bind_program_textures(backend, &program, &plan.textures)?;

    set_named(backend, &program, DEPTH_PROJECTION, mat4_value(&plan.depth_projection))?;
    set_named(backend, &program, PROJECTION_MODELVIEW, mat4_value(&projection_modelview))?;
    set_named(backend, &program, HEIGHT_COLOR_PLANE, UniformValue::Vec4(plan.mapping.coefficients))?;

    if plan.features.illuminate {
        set_named(backend, &program, AMBIENT, UniformValue::Vec4(lighting.ambient))?;
        for (index, light) in enabled_lights(lighting).enumerate() {
            set_named(backend, &program, &light_position_name(index), UniformValue::Vec4(light.position))?;
            set_named(backend, &program, &light_color_name(index), UniformValue::Vec4(light.color))?;
        }
    }
    if plan.features.shadow == ShadowMode::Mapped {
        if let Some(light_projection) = &lighting.light_view_projection {
            set_named(backend, &program, LIGHT_VIEW_PROJECTION, mat4_value(light_projection))?;
        }
    }
    if plan.features.contour_lines {
        let factor = (1.0 / settings.contour_line_spacing) as f32;
        set_named(backend, &program, CONTOUR_LINE_FACTOR, UniformValue::Vec4([factor, 0.0, 0.0, 0.0]))?;
    }
    if let (true, Some(dem)) = (plan.features.dem_deviation, &plan.dem) {
        let scale = (1.0 / settings.dem_dist_scale) as f32;
        set_named(backend, &program, DEM_TRANSFORM, mat4_value(&dem.camera_to_dem))?;
        set_named(backend, &program, DEM_DIST_SCALE, UniformValue::Vec4([scale, 0.0, 0.0, 0.0]))?;
    }

    backend.draw_mesh(plan.mesh)?;
    backend.end_pass()?;
    Ok(passes + 1)
}

/// Render one frame of the surface
///
/// Only valid in `Ready`. On error any open pass is discarded and the context
/// returns to `Ready`, or to `Faulted` when GPU resources ran out.
pub fn render_frame<B: GpuBackend>(
    context: &mut SurfaceContext<B>,
    scene: &SurfaceScene,
    provider: &dyn DepthImageProvider,
    lighting: &LightingState,
    view: &FrameView,
) -> SurfaceResult<FrameStats> {
    if context.state != SurfaceState::Ready {
        return Err(state_error("Ready", context.state));
    }

    let frame = context.frames_rendered + 1;
    context.state = SurfaceState::Rendering { frame };
    let before = cache_stats(&context.cache);
    let settings = *scene.settings.read();

    let result = prepare_frame(context, scene, provider, lighting, view, &settings).and_then(|plan| {
        let passes = draw_frame(context, &plan, lighting, view, &settings)?;
        Ok((plan, passes))
    });

    match result {
        Ok((plan, passes)) => {
            let after = cache_stats(&context.cache);
            context.frames_rendered = frame;
            context.state = SurfaceState::Ready;
            Ok(FrameStats {
                frame,
                depth_frame_number: plan.depth_frame_number,
                features: plan.features,
                passes,
                texture_uploads: after.texture_uploads - before.texture_uploads,
                program_builds: after.program_builds - before.program_builds,
                mapping_recomputed: plan.mapping_recomputed,
            })
        }
        Err(e) => {
            context.backend.abort_pass();
            if e.is_context_fatal() {
                log::error!(
                    "[surface::render_frame] Context {} faulted in frame {}: {}",
                    context.label,
                    frame,
                    e
                );
                context.state = SurfaceState::Faulted;
            } else {
                log::warn!(
                    "[surface::render_frame] Context {} aborted frame {}: {}",
                    context.label,
                    frame,
                    e
                );
                context.state = SurfaceState::Ready;
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_ramp::{load_str, sample, RampFormat};
    use crate::gpu::recording_backend::RecordingBackend;
    use crate::gpu::UniformLocation;
    use crate::height_mapping::create_base_plane;
    use crate::providers::StaticDepthProvider;
    use crate::shader::{create_lighting_state, LightSource};
    use cgmath::{SquareMatrix, Vector3};
    use std::time::Duration;

    fn plain_settings() -> SurfaceSettings {
        SurfaceSettings {
            features: FeatureConfig::default(),
            contour_line_spacing: 1.0,
            dem_dist_scale: 2.0,
            shadow_map_size: 256,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            watch_poll_interval: Duration::from_millis(100),
        }
    }

    fn red_blue_scene(settings: SurfaceSettings) -> SurfaceScene {
        let mut ramp = create_color_ramp(256);
        load_str(&mut ramp, "0,255,0,0\n10,0,0,255\n", "red_blue.csv", RampFormat::Delimited)
            .expect("ramp loads");
        create_scene_with_ramp(ramp, settings, None).expect("scene")
    }

    /// Flat surface 5 units above the z = 0 base plane
    fn provider_at_height_5() -> StaticDepthProvider {
        let plane = create_base_plane(Vector3::new(0.0, 0.0, 1.0), 0.0).expect("plane");
        StaticDepthProvider::flat(8, 6, 5.0, plane, Matrix4::identity())
    }

    fn view() -> FrameView {
        FrameView {
            viewport: (32, 24),
            projection: Matrix4::identity(),
            modelview: Matrix4::identity(),
        }
    }

    fn ready_context() -> SurfaceContext<RecordingBackend> {
        let mut context = create_context("test", RecordingBackend::new());
        initialize_context(&mut context).expect("initialize");
        context
    }

    fn uniform_at(backend: &RecordingBackend, location: UniformLocation) -> Option<UniformValue> {
        backend
            .uniforms
            .iter()
            .rev()
            .find(|(l, _)| *l == location)
            .map(|(_, v)| *v)
    }

    #[test]
    fn test_midpoint_height_renders_even_red_blue_blend() {
        let scene = red_blue_scene(plain_settings());
        let provider = provider_at_height_5();
        let mut context = ready_context();

        let stats = render_frame(&mut context, &scene, &provider, &create_lighting_state(), &view())
            .expect("frame renders");
        assert_eq!(stats.passes, 1);
        assert!(!stats.features.illuminate);

        // The coefficients handed to the GPU map the height-5 surface to the table midpoint
        let program = built_program(&context.cache, ProgramSlot::Surface).expect("program");
        let location = program.uniform_locations[HEIGHT_COLOR_PLANE];
        let coefficients = match uniform_at(&context.backend, location) {
            Some(UniformValue::Vec4(c)) => c,
            other => panic!("height plane not set: {:?}", other),
        };
        let tex_coord = coefficients[0] as f64 * 3.5
            + coefficients[1] as f64 * 2.5
            + coefficients[2] as f64 * 5.0
            + coefficients[3] as f64;
        assert!((tex_coord - 0.5).abs() < 1.0e-5, "tex coord {}", tex_coord);

        let ramp = scene.ramp.read();
        let color = sample(&ramp.entries, tex_coord);
        let red_share = color[0] / (color[0] + color[2]);
        assert!((red_share - 0.5).abs() < 0.01, "red share {}", red_share);

        // The uploaded table is the one sampled above
        let (_, uploaded) = context.backend.uploads.last().expect("ramp uploaded");
        assert_eq!(uploaded, &ramp.entries);
    }

    #[test]
    fn test_unchanged_frame_makes_no_uploads_or_builds() {
        let scene = red_blue_scene(plain_settings());
        let provider = provider_at_height_5();
        let mut context = ready_context();
        let lighting = create_lighting_state();

        let first = render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(first.texture_uploads, 2);
        assert_eq!(first.program_builds, 1);
        assert!(first.mapping_recomputed);

        let calls = context.backend.counts.clone();
        let second = render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(second.texture_uploads, 0);
        assert_eq!(second.program_builds, 0);
        assert!(!second.mapping_recomputed);
        assert_eq!(context.backend.counts.textures_created, calls.textures_created);
        assert_eq!(context.backend.counts.programs_built, calls.programs_built);
        assert_eq!(context.backend.counts.passes, calls.passes + 1);
    }

    #[test]
    fn test_ramp_reload_between_frames() {
        let dir = tempfile::tempdir().expect("temp dir");
        let good = dir.path().join("ramp.csv");
        let bad = dir.path().join("broken.csv");
        std::fs::write(&good, "-5,0,1,0\n5,1,1,1\n").expect("write ramp");
        std::fs::write(&bad, "0,1,0,0\n10,0,0").expect("write ramp");

        let scene = red_blue_scene(plain_settings());
        let provider = provider_at_height_5();
        let mut context = ready_context();
        let lighting = create_lighting_state();
        render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");

        assert!(reload_color_ramp(&scene, &bad).is_err());
        let unchanged = render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(unchanged.texture_uploads, 0);

        assert_eq!(reload_color_ramp(&scene, &good).expect("reload"), 2);
        let reloaded = render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(reloaded.texture_uploads, 1);
        assert!(reloaded.mapping_recomputed);
    }

    #[test]
    fn test_all_features_run_auxiliary_passes() {
        let settings = SurfaceSettings {
            features: FeatureConfig {
                illuminate: true,
                shadow: ShadowMode::Mapped,
                contour_lines: true,
                dem_deviation: false,
            },
            ..plain_settings()
        };
        let scene = red_blue_scene(settings);
        let provider = provider_at_height_5();
        let mut context = ready_context();

        let mut lighting = create_lighting_state();
        lighting.lights.push(LightSource {
            enabled: true,
            position: [0.0, 0.0, 20.0, 1.0],
            color: [0.5, 0.5, 0.5, 1.0],
        });
        lighting.light_view_projection = Some(Matrix4::identity());

        let stats = render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.program_builds, 3);
        assert_eq!(context.backend.counts.draws, 3);

        let surface_draw = context.backend.draws.last().expect("surface draw");
        assert_eq!(surface_draw.target, PassTarget::Output);
        let units: Vec<TextureUnit> = surface_draw.textures.iter().map(|(u, _)| *u).collect();
        assert!(units.contains(&TextureUnit::ShadowMap));
        assert!(units.contains(&TextureUnit::ContourElevation));

        let program = built_program(&context.cache, ProgramSlot::Surface).expect("program");
        assert!(program.uniform_locations.contains_key("light_color_1"));
    }

    #[test]
    fn test_unavailable_features_resolved_away() {
        let settings = SurfaceSettings {
            features: FeatureConfig {
                illuminate: true,
                shadow: ShadowMode::Mapped,
                contour_lines: false,
                dem_deviation: true,
            },
            ..plain_settings()
        };
        let scene = red_blue_scene(settings);
        let provider = provider_at_height_5();
        let mut context = ready_context();

        // No DEM attached and no light projection
        let stats = render_frame(&mut context, &scene, &provider, &create_lighting_state(), &view())
            .expect("frame");
        assert!(!stats.features.dem_deviation);
        assert_eq!(stats.features.shadow, ShadowMode::Off);
        assert_eq!(stats.passes, 1);
    }

    #[test]
    fn test_attached_dem_is_uploaded() {
        use crate::providers::StaticDemProvider;

        let settings = SurfaceSettings {
            features: FeatureConfig {
                dem_deviation: true,
                ..Default::default()
            },
            ..plain_settings()
        };
        let scene = red_blue_scene(settings);
        attach_dem(
            &scene,
            Arc::new(StaticDemProvider {
                dem: DemGrid {
                    width: 3,
                    height: 2,
                    version: 1,
                    elevations: vec![0.0f32; 6].into(),
                    camera_to_dem: Matrix4::identity(),
                },
            }),
        );
        let provider = provider_at_height_5();
        let mut context = ready_context();

        let stats = render_frame(&mut context, &scene, &provider, &create_lighting_state(), &view())
            .expect("frame");
        assert!(stats.features.dem_deviation);
        assert_eq!(stats.texture_uploads, 3);

        detach_dem(&scene);
        let stats = render_frame(&mut context, &scene, &provider, &create_lighting_state(), &view())
            .expect("frame");
        assert!(!stats.features.dem_deviation);
        assert_eq!(stats.program_builds, 1);
    }

    #[test]
    fn test_build_failure_aborts_frame_and_retries() {
        let settings = SurfaceSettings {
            features: FeatureConfig {
                contour_lines: true,
                ..Default::default()
            },
            ..plain_settings()
        };
        let scene = red_blue_scene(settings);
        let provider = provider_at_height_5();
        let mut context = ready_context();
        context.backend.fail_builds_containing = Some("fn apply_contour_lines".to_string());
        let lighting = create_lighting_state();

        let error = render_frame(&mut context, &scene, &provider, &lighting, &view())
            .expect_err("frame aborts");
        assert!(matches!(error, SurfaceError::ShaderBuild { .. }));
        assert_eq!(context.state, SurfaceState::Ready);
        assert_eq!(context.backend.counts.draws, 0);
        assert_eq!(context.backend.counts.passes, 0);

        context.backend.fail_builds_containing = None;
        render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("retry renders");
        assert_eq!(context.frames_rendered, 1);
    }

    #[test]
    fn test_resource_exhaustion_faults_context() {
        let scene = red_blue_scene(plain_settings());
        let provider = provider_at_height_5();
        let mut context = ready_context();
        context.backend.fail_allocations = true;
        let lighting = create_lighting_state();

        let error = render_frame(&mut context, &scene, &provider, &lighting, &view())
            .expect_err("allocation fails");
        assert!(matches!(error, SurfaceError::ResourceExhausted { .. }));
        assert_eq!(context.state, SurfaceState::Faulted);

        context.backend.fail_allocations = false;
        assert!(matches!(
            render_frame(&mut context, &scene, &provider, &lighting, &view()),
            Err(SurfaceError::StateError { .. })
        ));

        teardown_context(&mut context);
        assert_eq!(context.state, SurfaceState::TornDown);
    }

    #[test]
    fn test_empty_viewport_skips_frame_without_fault() {
        let settings = SurfaceSettings {
            features: FeatureConfig {
                contour_lines: true,
                ..Default::default()
            },
            ..plain_settings()
        };
        let scene = red_blue_scene(settings);
        let provider = provider_at_height_5();
        let mut context = ready_context();
        let lighting = create_lighting_state();

        let minimized = FrameView {
            viewport: (0, 0),
            ..view()
        };
        let error = render_frame(&mut context, &scene, &provider, &lighting, &minimized)
            .expect_err("empty viewport");
        assert!(!error.is_context_fatal());
        assert_eq!(context.state, SurfaceState::Ready);
        assert_eq!(context.backend.counts.textures_created, 0);

        let stats = render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(stats.passes, 2);
    }

    #[test]
    fn test_light_changes_do_not_rebuild_unlit_surface() {
        let scene = red_blue_scene(plain_settings());
        let provider = provider_at_height_5();
        let mut context = ready_context();
        let mut lighting = create_lighting_state();

        render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        for step in 1..=5 {
            lighting.version = step;
            lighting.lights[0].position = [step as f32, 0.0, 1.0, 0.0];
            let stats = render_frame(&mut context, &scene, &provider, &lighting, &view())
                .expect("frame");
            assert_eq!(stats.program_builds, 0);
        }
        assert_eq!(context.backend.counts.programs_built, 1);
    }

    #[test]
    fn test_lifecycle_and_teardown() {
        let scene = red_blue_scene(plain_settings());
        let provider = provider_at_height_5();
        let lighting = create_lighting_state();
        let mut context = create_context("lifecycle", RecordingBackend::new());

        assert!(render_frame(&mut context, &scene, &provider, &lighting, &view()).is_err());
        initialize_context(&mut context).expect("initialize");
        assert!(initialize_context(&mut context).is_err());

        render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        assert!(context.backend.live_object_count() > 0);

        let released = teardown_context(&mut context);
        assert_eq!(released, 4);
        assert_eq!(context.backend.live_object_count(), 0);
        assert_eq!(teardown_context(&mut context), 0);
        assert!(render_frame(&mut context, &scene, &provider, &lighting, &view()).is_err());
    }

    #[test]
    fn test_contexts_share_scene_but_not_resources() {
        let scene = red_blue_scene(plain_settings());
        let provider = provider_at_height_5();
        let lighting = create_lighting_state();
        let mut left = ready_context();
        let mut right = ready_context();

        render_frame(&mut left, &scene, &provider, &lighting, &view()).expect("frame");
        render_frame(&mut right, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(left.backend.counts.programs_built, 1);
        assert_eq!(right.backend.counts.programs_built, 1);

        // Composition is shared, GPU programs are not
        assert_eq!(scene.composer.lock().compositions_made, 1);

        set_ramp_entries(&scene, 64).expect("resize");
        let stats = render_frame(&mut left, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(stats.texture_uploads, 1);
        assert_eq!(right.backend.counts.textures_uploaded, 2);
    }

    #[test]
    fn test_source_version_bump_rebuilds_programs() {
        let scene = red_blue_scene(plain_settings());
        let provider = provider_at_height_5();
        let lighting = create_lighting_state();
        let mut context = ready_context();

        render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        scene.source_version.bump();
        let stats = render_frame(&mut context, &scene, &provider, &lighting, &view()).expect("frame");
        assert_eq!(stats.program_builds, 1);
        assert_eq!(context.backend.live_programs.len(), 1);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_shader_events_need_template_directory() {
        let scene = red_blue_scene(plain_settings());
        assert!(watch_shader_events(&scene).expect("no directory").is_none());

        let dir = tempfile::tempdir().expect("temp dir");
        let mut ramp = create_color_ramp(16);
        load_str(&mut ramp, "0 0 0 0\n1 255 255 255\n", "gray.cpt", RampFormat::Cpt).expect("ramp");
        let scene = create_scene_with_ramp(ramp, plain_settings(), Some(dir.path().to_path_buf()))
            .expect("scene");
        assert!(watch_shader_events(&scene).expect("watch").is_some());
    }

    #[test]
    fn test_resolve_feature_config() {
        let requested = FeatureConfig {
            illuminate: false,
            shadow: ShadowMode::Mapped,
            contour_lines: true,
            dem_deviation: true,
        };
        let resolved = resolve_feature_config(requested, true, true);
        assert_eq!(resolved.shadow, ShadowMode::Off);
        assert!(resolved.dem_deviation);
        assert!(!resolve_feature_config(requested, false, true).dem_deviation);
    }
}
