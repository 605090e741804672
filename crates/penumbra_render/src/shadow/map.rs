//! Directional shadow map

use crate::device::{FramebufferId, Rect, RenderDevice, RenderTarget, TextureId};
use crate::error::Result;

use super::attach_depth;

/// 2D depth texture with a depth-only framebuffer
#[derive(Debug)]
pub struct ShadowMap {
    width: u32,
    height: u32,
    texture: TextureId,
    framebuffer: FramebufferId,
}

impl ShadowMap {
    /// Allocate the depth texture and its framebuffer
    pub fn new(device: &mut dyn RenderDevice, width: u32, height: u32) -> Result<Self> {
        let texture = device.create_depth_texture(width, height)?;
        let framebuffer = attach_depth(device, texture)?;
        log::debug!("Shadow map {}x{} ready (framebuffer {:?})", width, height, framebuffer);

        Ok(Self {
            width,
            height,
            texture,
            framebuffer,
        })
    }

    /// Bind for the depth pass; the caller clears afterwards
    pub fn write(&self, device: &mut dyn RenderDevice) {
        device.bind_render_target(RenderTarget::Framebuffer(self.framebuffer));
    }

    /// Bind the depth texture to a texture unit for sampling
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

    /// Viewport covering the whole map
    pub fn viewport(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn framebuffer(&self) -> FramebufferId {
        self.framebuffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ClearFlags, SoftwareDevice};
    use glam::Vec4;

    #[test]
    fn test_write_then_read_sees_clear() {
        let mut device = SoftwareDevice::new(4, 4);
        let map = ShadowMap::new(&mut device, 32, 16).unwrap();

        map.write(&mut device);
        device.set_viewport(map.viewport());
        device.clear(ClearFlags::DEPTH, Vec4::ZERO);
        device.bind_render_target(RenderTarget::Default);
        map.read(&mut device, 2);

        assert_eq!(device.bound_texture(2), Some(map.texture()));
        let depth = device.depth_texture(map.texture()).unwrap();
        assert_eq!(depth.len(), 32 * 16);
        assert!(depth.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn test_dimensions_are_fixed() {
        let mut device = SoftwareDevice::new(4, 4);
        let map = ShadowMap::new(&mut device, 64, 32).unwrap();
        assert_eq!((map.width(), map.height()), (64, 32));
        assert_eq!(map.viewport(), Rect::new(0, 0, 64, 32));
    }

    #[test]
    fn test_release() {
        let mut device = SoftwareDevice::new(4, 4);
        let map = ShadowMap::new(&mut device, 8, 8).unwrap();
        assert_eq!(device.texture_count(), 1);
        map.release(&mut device);
        assert_eq!(device.texture_count(), 0);
        assert_eq!(device.framebuffer_count(), 0);
    }
}
