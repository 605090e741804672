//! Omnidirectional shadow map
//!
//! A depth cube map rendered in six sub-passes, one per face. Every face
//! transform comes from one [`CubeTransforms`] built from a single light
//! position and far plane, so the faces always agree.

use glam::{Mat4, Vec3};

use crate::device::{CubeFace, FramebufferId, Rect, RenderDevice, RenderTarget, TextureId};
use crate::error::Result;

use super::attach_depth;

/// Depth cube map with a depth-only framebuffer
#[derive(Debug)]
pub struct OmniShadowMap {
    width: u32,
    height: u32,
    texture: TextureId,
    framebuffer: FramebufferId,
}

impl OmniShadowMap {
    /// Allocate the cube texture and its framebuffer
    pub fn new(device: &mut dyn RenderDevice, width: u32, height: u32) -> Result<Self> {
        let texture = device.create_depth_cube(width, height)?;
        let framebuffer = attach_depth(device, texture)?;
        log::debug!("Omni shadow map {}x{} ready (framebuffer {:?})", width, height, framebuffer);

        Ok(Self {
            width,
            height,
            texture,
            framebuffer,
        })
    }

    /// Bind every face for writing; a depth clear then resets all six
    pub fn write(&self, device: &mut dyn RenderDevice) {
        device.bind_render_target(RenderTarget::Framebuffer(self.framebuffer));
    }

    /// Bind a single face for writing
    pub fn write_face(&self, device: &mut dyn RenderDevice, face: CubeFace) {
        device.bind_render_target(RenderTarget::CubeFace(self.framebuffer, face));
    }

    /// Bind the cube texture to a texture unit for sampling
    pub fn read(&self, device: &mut dyn RenderDevice, unit: u32) {
        device.bind_texture(unit, Some(self.texture));
    }

    /// Free the GPU resources
    pub fn release(self, device: &mut dyn RenderDevice) {
        device.delete_framebuffer(self.framebuffer);
        device.delete_texture(self.texture);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Viewport covering one face
    pub fn viewport(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    /// Face aspect ratio
    pub fn aspect(&self) -> f32 {
        self.viewport().aspect()
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }
}

/// The six face transforms of an omni light
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeTransforms {
    /// Light position shared by every face
    pub position: Vec3,
    /// Far plane, used to linearize stored depth
    pub far_plane: f32,
    /// 90° perspective projection
    pub projection: Mat4,
    /// View matrix per face, in [`CubeFace::ALL`] order
    pub views: [Mat4; 6],
}

impl CubeTransforms {
    /// Build all six faces from one position and near/far pair
    pub fn new(position: Vec3, near: f32, far: f32, aspect: f32) -> Self {
        let projection = Mat4::perspective_rh_gl(std::f32::consts::FRAC_PI_2, aspect, near, far);
        let views = CubeFace::ALL
            .map(|face| Mat4::look_at_rh(position, position + face.direction(), face.up()));

        Self {
            position,
            far_plane: far,
            projection,
            views,
        }
    }

    /// Projection * view of one face
    pub fn face(&self, face: CubeFace) -> Mat4 {
        self.projection * self.views[face.index()]
    }

    /// Projection * view of every face
    pub fn matrices(&self) -> [Mat4; 6] {
        CubeFace::ALL.map(|face| self.face(face))
    }
}
