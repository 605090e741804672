//! Shadow maps
//!
//! Depth-only render targets owned by lights:
//! - [`ShadowMap`]: 2D depth map for the directional light
//! - [`OmniShadowMap`]: depth cube map for point and spot lights
//!
//! # Write / read ordering
//!
//! Within a frame a map is bound for writing during its depth pass and bound
//! for reading during the lit pass, never the other way round. Reading always
//! observes the most recent write.
//!
//! # Degraded lights
//!
//! Allocation failures never abort setup. The owning light keeps a
//! [`ShadowState::Disabled`] state: it is still lit, its depth pass is
//! skipped and the lit program is told it is unshadowed.

mod map;
mod omni;

pub use map::ShadowMap;
pub use omni::{CubeTransforms, OmniShadowMap};

use crate::device::{FramebufferId, FramebufferStatus, RenderDevice, TextureId};
use crate::error::{RenderError, Result};

/// Shadow capability of a light
#[derive(Debug)]
pub enum ShadowState<M> {
    /// Not yet allocated
    Pending,
    /// Map allocated and usable
    Ready(M),
    /// Shadows off for this light
    Disabled { reason: String },
}

impl<M> Default for ShadowState<M> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<M> ShadowState<M> {
    /// Turn an allocation result into a state, logging failures
    pub fn from_allocation(result: Result<M>, owner: &str) -> Self {
        match result {
            Ok(map) => Self::Ready(map),
            Err(err) => {
                log::warn!("Shadows disabled for {}: {}", owner, err);
                Self::Disabled {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Disabled by configuration
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::Disabled {
            reason: reason.into(),
        }
    }

    /// Whether the map is allocated
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Whether allocation has not run yet
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether shadows are off
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }

    /// The allocated map
    pub fn map(&self) -> Option<&M> {
        match self {
            Self::Ready(map) => Some(map),
            _ => None,
        }
    }

    /// Why shadows are off
    pub fn disabled_reason(&self) -> Option<&str> {
        match self {
            Self::Disabled { reason } => Some(reason),
            _ => None,
        }
    }

    /// Take the map out, leaving the state pending
    pub fn take(&mut self) -> Option<M> {
        match std::mem::take(self) {
            Self::Ready(map) => Some(map),
            other => {
                *self = other;
                None
            }
        }
    }
}

/// Attach `texture` to a new framebuffer and check completeness,
/// releasing both on failure
fn attach_depth(device: &mut dyn RenderDevice, texture: TextureId) -> Result<FramebufferId> {
    let framebuffer = match device.create_framebuffer(texture) {
        Ok(framebuffer) => framebuffer,
        Err(err) => {
            device.delete_texture(texture);
            return Err(err.into());
        }
    };

    let status = device.framebuffer_status(framebuffer);
    if status != FramebufferStatus::Complete {
        device.delete_framebuffer(framebuffer);
        device.delete_texture(texture);
        return Err(RenderError::IncompleteFramebuffer {
            framebuffer,
            status,
        });
    }
    Ok(framebuffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SoftwareDevice, SoftwareLimits};

    #[test]
    fn test_state_from_allocation() {
        let mut device = SoftwareDevice::new(4, 4);
        let ready = ShadowState::from_allocation(ShadowMap::new(&mut device, 16, 16), "sun");
        assert!(ready.is_ready());

        let mut device = SoftwareDevice::with_limits(
            4,
            4,
            SoftwareLimits { max_texture_size: 8, ..Default::default() },
        );
        let disabled = ShadowState::from_allocation(ShadowMap::new(&mut device, 16, 16), "sun");
        assert!(disabled.is_disabled());
        assert!(disabled.disabled_reason().unwrap().contains("exceeds"));
    }

    #[test]
    fn test_incomplete_framebuffer_releases_resources() {
        let mut device = SoftwareDevice::with_limits(
            4,
            4,
            SoftwareLimits { max_framebuffer_size: 8, ..Default::default() },
        );
        let result = OmniShadowMap::new(&mut device, 16, 16);
        assert!(matches!(result, Err(RenderError::IncompleteFramebuffer { .. })));
        assert_eq!(device.texture_count(), 0);
        assert_eq!(device.framebuffer_count(), 0);
    }

    #[test]
    fn test_take_leaves_pending() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut state = ShadowState::Ready(ShadowMap::new(&mut device, 8, 8).unwrap());
        assert!(state.take().is_some());
        assert!(state.is_pending());

        let mut disabled: ShadowState<ShadowMap> = ShadowState::disabled("off");
        assert!(disabled.take().is_none());
        assert!(disabled.is_disabled());
    }
}
