//! Headless surface demo
//!
//! Renders a synthetic sand hill into an offscreen texture and prints the
//! per-frame statistics. Pass a ramp file to use it instead of the built-in
//! two-color ramp.

use anyhow::Context;
use cgmath::{Deg, Matrix4, Point3, Vector3};
use std::sync::Arc;
use topo_surface::color_ramp::{create_color_ramp, load, load_str, RampFormat};
use topo_surface::height_mapping::create_base_plane;
use topo_surface::shader::create_lighting_state;
use topo_surface::surface::{create_scene_with_ramp, settings_from_config};
use topo_surface::{
    create_context, initialize_context, render_frame, teardown_context, FrameView,
    StaticDepthProvider, SurfaceConfig, WgpuBackend,
};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

/// Depths of a Gaussian hill 10 units tall rising from a floor 100 units away
fn hill_depths(peak_x: f32) -> Vec<f32> {
    let mut depths = Vec::with_capacity((WIDTH * HEIGHT) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let dx = (x as f32 - peak_x) / 25.0;
            let dy = (y as f32 - HEIGHT as f32 / 2.0) / 25.0;
            depths.push(100.0 - 10.0 * (-(dx * dx + dy * dy)).exp());
        }
    }
    depths
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    println!("Topographic Surface Headless Demo");
    println!("=================================");

    let config = SurfaceConfig::default();
    let mut ramp = create_color_ramp(config.ramp_entries);
    match std::env::args().nth(1) {
        Some(path) => load(&mut ramp, std::path::Path::new(&path))?,
        None => load_str(
            &mut ramp,
            "0 0 0 255\n5 0 200 0\n10 255 255 255\n",
            "builtin.cpt",
            RampFormat::Cpt,
        )?,
    }
    let scene = create_scene_with_ramp(ramp, settings_from_config(&config), None)?;

    // Create GPU device and queue
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        ..Default::default()
    }))
    .context("Failed to find adapter")?;

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("Headless Surface Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        },
        None,
    ))
    .context("Failed to create device")?;
    let device = Arc::new(device);
    let queue = Arc::new(queue);

    let output_format = wgpu::TextureFormat::Rgba8UnormSrgb;
    let output = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Output"),
        size: wgpu::Extent3d {
            width: 640,
            height: 480,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: output_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });

    let mut backend = WgpuBackend::new(device.clone(), queue, output_format);
    backend.set_output(
        output.create_view(&wgpu::TextureViewDescriptor::default()),
        640,
        480,
    );

    // Pixel (x, y, depth) to camera space, 0.1 units per pixel, looking down -z
    let depth_projection = Matrix4::from_translation(Vector3::new(
        -(WIDTH as f64) * 0.05,
        -(HEIGHT as f64) * 0.05,
        0.0,
    )) * Matrix4::from_nonuniform_scale(0.1, 0.1, -1.0);
    let base_plane = create_base_plane(Vector3::new(0.0, 0.0, 1.0), -100.0)?;
    let provider = StaticDepthProvider::new(
        topo_surface::DepthFrame {
            width: WIDTH,
            height: HEIGHT,
            frame_number: 1,
            depths: hill_depths(WIDTH as f32 / 2.0).into(),
        },
        base_plane,
        depth_projection,
    );

    let view = FrameView {
        viewport: (640, 480),
        projection: cgmath::perspective(Deg(50.0), 640.0 / 480.0, 0.1, 1000.0),
        modelview: Matrix4::look_at_rh(
            Point3::new(0.0, -25.0, -60.0),
            Point3::new(0.0, 0.0, -100.0),
            Vector3::unit_z(),
        ),
    };
    let lighting = create_lighting_state();

    let mut context = create_context("headless", backend);
    initialize_context(&mut context)?;

    for step in 0..3 {
        let stats = render_frame(&mut context, &scene, &provider, &lighting, &view)?;
        println!(
            "Frame {}: depth frame {}, {} passes, {} uploads, {} program builds",
            stats.frame,
            stats.depth_frame_number,
            stats.passes,
            stats.texture_uploads,
            stats.program_builds
        );

        // Slide the hill to the right for the next frame
        provider.replace_frame(WIDTH, HEIGHT, hill_depths(WIDTH as f32 / 2.0 + 10.0 * (step + 1) as f32));
    }

    let _ = device.poll(wgpu::Maintain::Wait);
    let released = teardown_context(&mut context);
    println!("Released {} GPU objects", released);

    Ok(())
}
