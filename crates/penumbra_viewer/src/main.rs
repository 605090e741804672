//! Penumbra Viewer
//!
//! Renders the demo scene headless on the software device and writes the
//! final frame and the sun's shadow map as PNG files.

mod args;
mod demo;

use std::path::Path;
use std::process::ExitCode;

use penumbra_render::prelude::*;
use penumbra_shader::BuiltinShaders;

use crate::args::ViewerArgs;

/// Fixed simulation step
const FRAME_STEP: f32 = 1.0 / 60.0;

/// Sun speed when no configuration file is given (radians per second)
const DEMO_SUN_SPEED: f32 = 0.5;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match ViewerArgs::parse(std::env::args()) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Viewer failed: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &ViewerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => {
            log::info!("Loading config from {:?}", path);
            RendererConfig::load(path)?
        }
        None => RendererConfig::low_quality().with_sun_speed(DEMO_SUN_SPEED),
    };

    let mut device = SoftwareDevice::new(args.width, args.height);
    let sun = demo::sun_properties();
    let mut renderer = ForwardRenderer::new(&mut device, &BuiltinShaders, config, sun)?;
    renderer.set_skybox(&mut device, &BuiltinShaders, &demo::sky_faces(32))?;
    demo::add_lights(&mut renderer, &mut device)?;
    let scene = demo::build_scene(&mut device)?;

    let camera = FlyCamera::looking_at(Vec3::new(0.0, 5.0, 11.0), Vec3::new(0.0, 0.5, 0.0));
    let mut last = None;
    for _ in 0..args.frames {
        renderer.advance(FRAME_STEP, &camera);
        let stats = renderer.render_frame(&mut device, &camera, &scene);
        log::debug!("{}", stats.summary());
        last = Some(stats);
    }

    match &last {
        Some(stats) => log::info!("{}", stats.summary()),
        None => log::warn!("No frames rendered"),
    }

    write_images(&device, &renderer, &args.out_dir)?;

    scene.release(&mut device);
    renderer.release(&mut device);
    Ok(())
}

fn write_images(
    device: &SoftwareDevice,
    renderer: &ForwardRenderer,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(out_dir)?;

    let frame_path = out_dir.join("frame.png");
    device.colour_image().save(&frame_path)?;
    log::info!("Wrote {:?}", frame_path);

    let shadow = renderer
        .lights()
        .directional()
        .shadow_map()
        .and_then(|map| device.depth_image(map.texture(), 0));
    match shadow {
        Some(depth) => {
            let shadow_path = out_dir.join("directional_shadow.png");
            depth.save(&shadow_path)?;
            log::info!("Wrote {:?}", shadow_path);
        }
        None => log::warn!("Directional shadow map unavailable, skipping directional_shadow.png"),
    }
    Ok(())
}
