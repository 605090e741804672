//! Texture storage and sampling for the software device
//!
//! Planes are stored first row first: row 0 of a depth plane is window
//! y = 0, row 0 of a colour plane is the first row of the uploaded image.
//! Both map to texture coordinate t = 0, as in GL.
//!
//! Sampling is nearest-texel. Colour lookups repeat; depth comparisons
//! outside the map read as lit.

use glam::{Vec2, Vec3, Vec4};
use image::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TextureKind {
    Depth2D,
    DepthCube,
    Colour2D,
    ColourCube,
}

#[derive(Debug)]
pub(super) struct Texture {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub depth_layers: Vec<Vec<f32>>,
    pub colour_layers: Vec<Vec<Vec4>>,
}

impl Texture {
    /// Depth texture with every texel at 1.0
    pub fn depth(kind: TextureKind, width: u32, height: u32) -> Self {
        let layers = if kind == TextureKind::DepthCube { 6 } else { 1 };
        let plane = vec![1.0; width as usize * height as usize];
        Self {
            kind,
            width,
            height,
            depth_layers: vec![plane; layers],
            colour_layers: Vec::new(),
        }
    }

    /// Colour texture from equally sized images
    pub fn colour(kind: TextureKind, images: &[RgbaImage]) -> Self {
        let (width, height) = images.first().map_or((0, 0), |image| image.dimensions());
        let colour_layers = images
            .iter()
            .map(|image| {
                image
                    .pixels()
                    .map(|pixel| {
                        let [r, g, b, a] = pixel.0;
                        Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
                    })
                    .collect()
            })
            .collect();
        Self {
            kind,
            width,
            height,
            depth_layers: Vec::new(),
            colour_layers,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(self.kind, TextureKind::Depth2D | TextureKind::DepthCube)
    }

    fn index(&self, column: usize, row: usize) -> usize {
        row * self.width as usize + column
    }

    fn repeat(&self, uv: Vec2) -> (usize, usize) {
        let wrap = |coord: f32, size: u32| {
            let size = size.max(1);
            ((coord.rem_euclid(1.0) * size as f32) as u32).min(size - 1) as usize
        };
        (wrap(uv.x, self.width), wrap(uv.y, self.height))
    }

    fn clamp(&self, uv: Vec2) -> (usize, usize) {
        let clamp = |coord: f32, size: u32| {
            let size = size.max(1);
            ((coord.clamp(0.0, 1.0) * size as f32) as u32).min(size - 1) as usize
        };
        (clamp(uv.x, self.width), clamp(uv.y, self.height))
    }

    /// Colour of a 2D texture
    pub fn sample(&self, uv: Vec2) -> Option<Vec4> {
        if self.kind != TextureKind::Colour2D {
            return None;
        }
        let (column, row) = self.repeat(uv);
        self.colour_layers.first()?.get(self.index(column, row)).copied()
    }

    /// Colour of a cube map along a direction
    pub fn sample_cube(&self, direction: Vec3) -> Option<Vec4> {
        if self.kind != TextureKind::ColourCube {
            return None;
        }
        let (face, st) = cube_coordinates(direction)?;
        let (column, row) = self.clamp(st);
        self.colour_layers.get(face)?.get(self.index(column, row)).copied()
    }

    /// 1.0 where `reference` is at or in front of the stored depth, else 0.0
    pub fn compare(&self, uv: Vec2, reference: f32) -> f32 {
        if self.kind != TextureKind::Depth2D {
            return 1.0;
        }
        if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) {
            return 1.0;
        }
        let (column, row) = self.clamp(uv);
        let stored = self
            .depth_layers
            .first()
            .and_then(|plane| plane.get(self.index(column, row)).copied())
            .unwrap_or(1.0);
        passes_compare(reference, stored)
    }

    /// Cube map variant of [`compare`](Self::compare)
    pub fn compare_cube(&self, direction: Vec3, reference: f32) -> f32 {
        if self.kind != TextureKind::DepthCube {
            return 1.0;
        }
        let Some((face, st)) = cube_coordinates(direction) else {
            return 1.0;
        };
        let (column, row) = self.clamp(st);
        let stored = self
            .depth_layers
            .get(face)
            .and_then(|plane| plane.get(self.index(column, row)).copied())
            .unwrap_or(1.0);
        passes_compare(reference, stored)
    }
}

fn passes_compare(reference: f32, stored: f32) -> f32 {
    if reference <= stored {
        1.0
    } else {
        0.0
    }
}

/// Face index and face coordinates of a cube lookup (GL major-axis rule)
pub(super) fn cube_coordinates(direction: Vec3) -> Option<(usize, Vec2)> {
    let a = direction.abs();
    let d = direction;
    let (face, sc, tc, major) = if a.x >= a.y && a.x >= a.z {
        if d.x > 0.0 {
            (0, -d.z, -d.y, a.x)
        } else {
            (1, d.z, -d.y, a.x)
        }
    } else if a.y >= a.z {
        if d.y > 0.0 {
            (2, d.x, d.z, a.y)
        } else {
            (3, d.x, -d.z, a.y)
        }
    } else if d.z > 0.0 {
        (4, d.x, -d.y, a.z)
    } else {
        (5, -d.x, -d.y, a.z)
    };
    if major <= 0.0 || !major.is_finite() {
        return None;
    }
    let st = Vec2::new(sc / major + 1.0, tc / major + 1.0) * 0.5;
    Some((face, st))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_cube_face_selection() {
        assert_eq!(cube_coordinates(Vec3::X).unwrap(), (0, Vec2::splat(0.5)));
        assert_eq!(cube_coordinates(Vec3::NEG_Y).unwrap().0, 3);
        assert_eq!(cube_coordinates(Vec3::new(0.1, 0.2, -5.0)).unwrap().0, 5);
        assert!(cube_coordinates(Vec3::ZERO).is_none());
    }

    #[test]
    fn test_cube_face_orientation() {
        // +Y face: s follows +x, t follows +z
        let (_, st) = cube_coordinates(Vec3::new(0.5, 1.0, 0.5)).unwrap();
        assert!((st - Vec2::new(0.75, 0.75)).length() < 1e-6);
        // +Z face: t runs against +y
        let (_, st) = cube_coordinates(Vec3::new(0.0, 0.5, 1.0)).unwrap();
        assert!((st - Vec2::new(0.5, 0.25)).length() < 1e-6);
    }

    #[test]
    fn test_colour_sampling_repeats() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        let texture = Texture::colour(TextureKind::Colour2D, std::slice::from_ref(&image));

        assert_eq!(texture.sample(Vec2::new(0.75, 0.25)), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(texture.sample(Vec2::new(1.75, -0.75)), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(texture.sample(Vec2::new(0.25, 0.25)), Some(Vec4::new(0.0, 0.0, 0.0, 1.0)));
        assert!(texture.sample_cube(Vec3::X).is_none());
    }

    #[test]
    fn test_depth_compare() {
        let mut texture = Texture::depth(TextureKind::Depth2D, 2, 2);
        texture.depth_layers[0][0] = 0.25;

        assert_eq!(texture.compare(Vec2::new(0.1, 0.1), 0.2), 1.0);
        assert_eq!(texture.compare(Vec2::new(0.1, 0.1), 0.3), 0.0);
        assert_eq!(texture.compare(Vec2::new(0.9, 0.9), 0.3), 1.0);
        assert_eq!(texture.compare(Vec2::new(-0.1, 0.1), 0.9), 1.0);
    }

    #[test]
    fn test_depth_cube_compare() {
        let mut texture = Texture::depth(TextureKind::DepthCube, 4, 4);
        for depth in texture.depth_layers[3].iter_mut() {
            *depth = 0.1;
        }
        assert_eq!(texture.compare_cube(Vec3::NEG_Y, 0.2), 0.0);
        assert_eq!(texture.compare_cube(Vec3::Y, 0.2), 1.0);
    }
}
