//! Scene drawing
//!
//! Every pass draws the same scene through a [`SceneDraw`] callback. The
//! callback sees a [`DrawContext`] bound to whichever program the pass uses
//! and must issue the same sequence of bind and draw calls regardless of the
//! pass: uniforms a program lacks are silently ignored.

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::device::{MeshId, RenderDevice, TextureId};
use crate::program::ShaderProgram;
use crate::stats::PassKind;

/// Specular response of a surface
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Specular strength
    pub specular_intensity: f32,
    /// Specular exponent
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self::dull()
    }
}

impl Material {
    pub const fn new(specular_intensity: f32, shininess: f32) -> Self {
        Self {
            specular_intensity,
            shininess,
        }
    }

    /// Tight, bright highlight
    pub const fn shiny() -> Self {
        Self::new(4.0, 256.0)
    }

    /// Broad, faint highlight
    pub const fn dull() -> Self {
        Self::new(0.3, 4.0)
    }
}

/// Draw interface handed to the scene by each pass
pub struct DrawContext<'a> {
    device: &'a mut dyn RenderDevice,
    program: &'a ShaderProgram,
    pass: PassKind,
    diffuse_unit: u32,
    draw_calls: u32,
}

impl<'a> DrawContext<'a> {
    /// Context for a program already in use
    pub fn new(
        device: &'a mut dyn RenderDevice,
        program: &'a ShaderProgram,
        pass: PassKind,
        diffuse_unit: u32,
    ) -> Self {
        Self {
            device,
            program,
            pass,
            diffuse_unit,
            draw_calls: 0,
        }
    }

    /// Pass being drawn
    pub fn pass(&self) -> PassKind {
        self.pass
    }

    pub fn set_model(&mut self, model: Mat4) {
        self.program.set_model(self.device, model);
    }

    pub fn set_material(&mut self, material: &Material) {
        self.program.set_material(self.device, material);
    }

    /// Bind a diffuse texture (`None` unbinds)
    pub fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.device.bind_texture(self.diffuse_unit, texture);
        self.program.set_texture(self.device, self.diffuse_unit);
    }

    pub fn draw_mesh(&mut self, mesh: MeshId) {
        self.device.draw_mesh(mesh);
        self.draw_calls += 1;
    }

    /// Draw calls issued so far
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }
}

/// Something that can draw itself in every pass
pub trait SceneDraw {
    fn draw(&self, ctx: &mut DrawContext<'_>);
}

impl<F> SceneDraw for F
where
    F: Fn(&mut DrawContext<'_>),
{
    fn draw(&self, ctx: &mut DrawContext<'_>) {
        self(ctx)
    }
}

/// A mesh placed in the world
#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    pub mesh: MeshId,
    pub transform: Mat4,
    pub material: Material,
    pub texture: Option<TextureId>,
}

impl SceneObject {
    pub fn new(mesh: MeshId) -> Self {
        Self {
            mesh,
            transform: Mat4::IDENTITY,
            material: Material::default(),
            texture: None,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }
}

/// Flat list of objects
#[derive(Clone, Debug, Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object, returning its index
    pub fn add(&mut self, object: SceneObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [SceneObject] {
        &mut self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Delete every mesh and texture the scene references
    pub fn release(self, device: &mut dyn RenderDevice) {
        let mut meshes: Vec<MeshId> = self.objects.iter().map(|o| o.mesh).collect();
        let mut textures: Vec<TextureId> = self.objects.iter().filter_map(|o| o.texture).collect();
        meshes.sort();
        meshes.dedup();
        textures.sort();
        textures.dedup();

        for mesh in meshes {
            device.delete_mesh(mesh);
        }
        for texture in textures {
            device.delete_texture(texture);
        }
    }
}

impl SceneDraw for Scene {
    fn draw(&self, ctx: &mut DrawContext<'_>) {
        for object in &self.objects {
            ctx.set_model(object.transform);
            ctx.set_material(&object.material);
            ctx.bind_texture(object.texture);
            ctx.draw_mesh(object.mesh);
        }
    }
}
