//! Demo scene: a floor, cubes and pyramids lit by a sun, two lamps and two spots

use glam::{Mat4, Quat, Vec3};
use image::{Rgba, RgbaImage};
use penumbra_render::primitives;
use penumbra_render::{
    Attenuation, ForwardRenderer, LightProperties, Material, RenderDevice, Result, Scene,
    SceneObject, SpotCone, DEFAULT_FLASH_OFFSET,
};

/// Sun colour and intensities
pub fn sun_properties() -> LightProperties {
    LightProperties::new(Vec3::new(1.0, 0.95, 0.85), 0.15, 0.7)
}

/// Upload meshes and textures and lay out the objects
pub fn build_scene(device: &mut dyn RenderDevice) -> Result<Scene> {
    let floor = primitives::plane(30.0, 6.0).upload(device)?;
    let cube = primitives::cube(1.0).upload(device)?;
    let pyramid = primitives::pyramid(1.5, 1.5).upload(device)?;
    let checker = device.create_colour_texture(&checker_texture(64, 8))?;
    let brick = RgbaImage::from_pixel(4, 4, Rgba([170, 90, 60, 255]));
    let brick = device.create_colour_texture(&brick)?;

    let mut scene = Scene::new();
    scene.add(SceneObject::new(floor).with_texture(checker));
    scene.add(
        SceneObject::new(cube)
            .with_transform(Mat4::from_translation(Vec3::new(-2.0, 0.5, 0.0)))
            .with_material(Material::shiny())
            .with_texture(brick),
    );
    scene.add(SceneObject::new(cube).with_transform(Mat4::from_scale_rotation_translation(
        Vec3::splat(1.5),
        Quat::from_rotation_y(0.6),
        Vec3::new(2.5, 0.75, -2.0),
    )));
    scene.add(
        SceneObject::new(pyramid)
            .with_transform(Mat4::from_translation(Vec3::new(0.5, 0.0, 2.0))),
    );
    scene.add(
        SceneObject::new(pyramid)
            .with_transform(Mat4::from_translation(Vec3::new(-3.5, 0.0, -3.0)))
            .with_material(Material::shiny()),
    );

    log::info!("Demo scene: {} objects", scene.len());
    Ok(scene)
}

/// Two coloured lamps, a fixed spot and a camera flash
pub fn add_lights(renderer: &mut ForwardRenderer, device: &mut dyn RenderDevice) -> Result<()> {
    let lamp = Attenuation::new(1.0, 0.09, 0.032);

    let red = renderer.point_light(
        LightProperties::new(Vec3::new(1.0, 0.3, 0.2), 0.05, 0.8),
        Vec3::new(-4.0, 2.5, 1.0),
        lamp,
    );
    let blue = renderer.point_light(
        LightProperties::new(Vec3::new(0.2, 0.4, 1.0), 0.05, 0.8),
        Vec3::new(4.0, 2.0, 2.0),
        lamp,
    );
    renderer.add_point_light(device, red)?;
    renderer.add_point_light(device, blue)?;

    let overhead = renderer.spot_light(
        LightProperties::new(Vec3::ONE, 0.0, 1.0),
        Vec3::new(0.0, 6.0, 0.0),
        Attenuation::new(1.0, 0.05, 0.01),
        SpotCone::new(Vec3::NEG_Y, 25.0),
    );
    let flash = renderer.spot_light(
        LightProperties::new(Vec3::ONE, 0.0, 1.5),
        Vec3::ZERO,
        Attenuation::new(1.0, 0.02, 0.005),
        SpotCone::new(Vec3::NEG_Z, 20.0).with_flash(DEFAULT_FLASH_OFFSET),
    );
    renderer.add_spot_light(device, overhead)?;
    renderer.add_spot_light(device, flash)?;
    Ok(())
}

/// Six faces fading from a pale horizon to a deep zenith
pub fn sky_faces(size: u32) -> [RgbaImage; 6] {
    let horizon = Vec3::new(0.75, 0.85, 0.95);
    let zenith = Vec3::new(0.15, 0.3, 0.65);
    let side = RgbaImage::from_fn(size, size, |_, y| {
        let t = y as f32 / size.saturating_sub(1).max(1) as f32;
        to_rgba(zenith.lerp(horizon, t))
    });
    let top = RgbaImage::from_pixel(size, size, to_rgba(zenith));
    let bottom = RgbaImage::from_pixel(size, size, to_rgba(horizon * 0.6));

    [side.clone(), side.clone(), top, bottom, side.clone(), side]
}

fn checker_texture(size: u32, cells: u32) -> RgbaImage {
    let cell = (size / cells).max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba([200, 200, 200, 255])
        } else {
            Rgba([90, 90, 90, 255])
        }
    })
}

fn to_rgba(colour: Vec3) -> Rgba<u8> {
    let c = (colour.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    Rgba([c.x as u8, c.y as u8, c.z as u8, 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_render::SoftwareDevice;

    #[test]
    fn test_checker_alternates() {
        let texture = checker_texture(16, 2);
        assert_ne!(texture.get_pixel(0, 0), texture.get_pixel(8, 0));
        assert_eq!(texture.get_pixel(0, 0), texture.get_pixel(8, 8));
    }

    #[test]
    fn test_sky_faces_share_size() {
        let faces = sky_faces(8);
        assert!(faces.iter().all(|f| f.dimensions() == (8, 8)));
        assert_ne!(faces[2].get_pixel(0, 0), faces[3].get_pixel(0, 0));
    }

    #[test]
    fn test_build_scene() {
        let mut device = SoftwareDevice::new(8, 8);
        let scene = build_scene(&mut device).unwrap();
        assert_eq!(scene.len(), 5);
        assert_eq!(device.texture_count(), 2);
    }
}
