//! Lights
//!
//! Three variants share one capability set ([`Light`]):
//! - [`DirectionalLight`]: orbiting sun with an orthographic shadow map
//! - [`PointLight`]: positional light with attenuation and an omni shadow map
//! - Spot lights: a [`PointLight`] carrying a [`SpotCone`]
//!
//! Parameters are fixed at construction; only positions, directions and the
//! transforms derived from them change between frames.

mod directional;
mod point;
mod set;

pub use directional::{DirectionalLight, OrthoBounds, SunCycle, SunOrbit};
pub use point::{Attenuation, PointLight, SpotCone, DEFAULT_FLASH_OFFSET};
pub use set::LightSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::device::RenderDevice;

/// Colour and intensities common to every light
///
/// Intensities are expected in `[0, 1]` but not clamped.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightProperties {
    /// RGB colour, 0..1
    pub colour: Vec3,
    /// Ambient term
    pub ambient_intensity: f32,
    /// Diffuse term
    pub diffuse_intensity: f32,
}

impl Default for LightProperties {
    fn default() -> Self {
        Self {
            colour: Vec3::ONE,
            ambient_intensity: 0.0,
            diffuse_intensity: 0.0,
        }
    }
}

impl LightProperties {
    /// Create properties
    pub fn new(colour: Vec3, ambient_intensity: f32, diffuse_intensity: f32) -> Self {
        Self {
            colour,
            ambient_intensity,
            diffuse_intensity,
        }
    }

    /// Same colour with both intensities zeroed
    pub fn dark(&self) -> Self {
        Self {
            colour: self.colour,
            ambient_intensity: 0.0,
            diffuse_intensity: 0.0,
        }
    }
}

/// Capabilities shared by every light variant
pub trait Light {
    fn properties(&self) -> &LightProperties;

    fn properties_mut(&mut self) -> &mut LightProperties;

    /// Shadow map size fixed at construction
    fn shadow_size(&self) -> (u32, u32);

    /// Whether the light currently owns a usable shadow map
    fn shadow_enabled(&self) -> bool;

    /// Whether the shadow map has yet to be allocated
    fn shadow_pending(&self) -> bool;

    /// Allocate the shadow map; failures leave the light unshadowed
    fn allocate_shadow(&mut self, device: &mut dyn RenderDevice, enabled: bool);

    /// Free the shadow map
    fn release_shadow(&mut self, device: &mut dyn RenderDevice);
}
