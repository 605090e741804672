//! Renderer Configuration
//!
//! Shadow, sun and pass settings with serde support so a scene can be tuned
//! from a JSON file.

use std::path::Path;

use penumbra_shader::MAX_OMNI_SHADOWS;
use serde::{Deserialize, Serialize};

use crate::device::Rect;
use crate::error::{RenderError, Result};
use crate::light::{OrthoBounds, SunOrbit};

/// Shadow map settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    /// Enable shadows globally
    pub enabled: bool,

    /// Directional shadow map resolution (power of 2)
    pub directional_resolution: u32,

    /// Omni shadow cube face resolution (power of 2)
    pub omni_resolution: u32,

    /// Near plane of omni shadow projections
    pub omni_near: f32,

    /// Far plane of omni shadow projections
    pub omni_far: f32,

    /// Cull front faces during depth passes to reduce acne
    pub front_face_culling: bool,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directional_resolution: 2048,
            omni_resolution: 1024,
            omni_near: 0.01,
            omni_far: 100.0,
            front_face_culling: true,
        }
    }
}

impl ShadowSettings {
    /// Clamp values to valid ranges
    pub fn validate(&mut self) {
        self.directional_resolution =
            self.directional_resolution.clamp(16, 8192).next_power_of_two();
        self.omni_resolution = self.omni_resolution.clamp(16, 4096).next_power_of_two();
        self.omni_near = self.omni_near.max(0.001);
        self.omni_far = self.omni_far.max(self.omni_near + 0.1);
    }

    /// Directional map size
    pub fn directional_size(&self) -> (u32, u32) {
        (self.directional_resolution, self.directional_resolution)
    }

    /// Omni face size
    pub fn omni_size(&self) -> (u32, u32) {
        (self.omni_resolution, self.omni_resolution)
    }
}

/// Directional light projection and orbit
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunSettings {
    /// Orthographic shadow volume
    pub bounds: OrthoBounds,

    /// Orbit circle
    pub orbit: SunOrbit,

    /// Angular speed (radians per second, 0 = static sun)
    pub speed: f32,

    /// Starting orbit angle (radians)
    pub start_angle: f32,
}

/// Which texture unit each sampler reads from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureUnitLayout {
    /// Skybox cube map
    pub skybox: u32,
    /// Object diffuse texture
    pub diffuse: u32,
    /// Directional shadow map
    pub directional_shadow: u32,
    /// First omni shadow map; point lights first, then spot lights
    pub omni_base: u32,
}

impl Default for TextureUnitLayout {
    fn default() -> Self {
        Self {
            skybox: 0,
            diffuse: 1,
            directional_shadow: 2,
            omni_base: 3,
        }
    }
}

impl TextureUnitLayout {
    /// Unit of an omni shadow slot
    pub fn omni_unit(&self, slot: usize) -> u32 {
        self.omni_base + slot as u32
    }

    /// Units needed by the whole layout
    pub fn units_required(&self) -> u32 {
        let fixed = self.skybox.max(self.diffuse).max(self.directional_shadow) + 1;
        fixed.max(self.omni_base + MAX_OMNI_SHADOWS as u32)
    }

    /// Check that no two samplers share a unit
    pub fn validate(&self) -> Result<()> {
        let fixed = [
            ("skybox", self.skybox),
            ("diffuse", self.diffuse),
            ("directional_shadow", self.directional_shadow),
        ];
        let omni = self.omni_base..self.omni_base + MAX_OMNI_SHADOWS as u32;

        for (i, (name, unit)) in fixed.iter().enumerate() {
            if omni.contains(unit) {
                return Err(RenderError::Config(format!(
                    "{} unit {} overlaps omni shadow units {:?}",
                    name, unit, omni
                )));
            }
            if let Some((other, _)) = fixed[i + 1..].iter().find(|(_, u)| u == unit) {
                return Err(RenderError::Config(format!(
                    "{} and {} share texture unit {}",
                    name, other, unit
                )));
            }
        }
        Ok(())
    }
}

/// Light-perspective inset view
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugViewport {
    /// Inset rectangle (origin bottom-left)
    pub rect: Rect,
    /// Camera distance from the origin, back along the light direction
    pub distance: f32,
}

impl Default for DebugViewport {
    fn default() -> Self {
        Self {
            rect: Rect::new(0, 0, 256, 256),
            distance: 30.0,
        }
    }
}

/// Complete renderer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Shadow settings
    pub shadows: ShadowSettings,

    /// Directional light settings
    pub sun: SunSettings,

    /// Colour the main pass clears to
    pub clear_colour: [f32; 4],

    /// Texture unit assignment
    pub texture_units: TextureUnitLayout,

    /// Optional light-perspective inset
    pub debug_viewport: Option<DebugViewport>,

    /// Draw the skybox when one is set
    pub skybox: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shadows: ShadowSettings::default(),
            sun: SunSettings::default(),
            clear_colour: [0.0, 0.0, 0.0, 1.0],
            texture_units: TextureUnitLayout::default(),
            debug_viewport: None,
            skybox: true,
        }
    }
}

impl RendererConfig {
    /// Small shadow maps
    pub fn low_quality() -> Self {
        Self {
            shadows: ShadowSettings {
                directional_resolution: 512,
                omni_resolution: 256,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Large shadow maps
    pub fn high_quality() -> Self {
        Self {
            shadows: ShadowSettings {
                directional_resolution: 4096,
                omni_resolution: 2048,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Every light unshadowed
    pub fn shadows_disabled() -> Self {
        Self {
            shadows: ShadowSettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Enable the light-perspective inset
    pub fn with_debug_viewport(mut self, viewport: DebugViewport) -> Self {
        self.debug_viewport = Some(viewport);
        self
    }

    /// Set the sun speed
    pub fn with_sun_speed(mut self, speed: f32) -> Self {
        self.sun.speed = speed;
        self
    }

    /// Clamp values to valid ranges and check the unit layout
    pub fn validate(&mut self) -> Result<()> {
        self.shadows.validate();
        self.sun.bounds.validate();
        self.sun.orbit.radius = self.sun.orbit.radius.max(0.0);
        if !self.sun.speed.is_finite() {
            self.sun.speed = 0.0;
        }
        for channel in self.clear_colour.iter_mut() {
            *channel = channel.clamp(0.0, 1.0);
        }
        if let Some(debug) = self.debug_viewport.as_mut() {
            debug.distance = debug.distance.max(1.0);
            debug.rect.width = debug.rect.width.max(1);
            debug.rect.height = debug.rect.height.max(1);
        }
        self.texture_units.validate()
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RendererConfig::default();
        assert!(config.shadows.enabled);
        assert_eq!(config.shadows.directional_resolution, 2048);
        assert_eq!(config.sun.orbit.radius, 25.0);
        assert_eq!(config.sun.bounds.right, 20.0);
        assert!(config.debug_viewport.is_none());
    }

    #[test]
    fn test_config_validate() {
        let mut config = RendererConfig {
            shadows: ShadowSettings {
                directional_resolution: 1000,
                omni_resolution: 1,
                omni_near: -1.0,
                omni_far: 0.0,
                ..Default::default()
            },
            clear_colour: [2.0, -1.0, 0.5, 1.0],
            ..Default::default()
        };

        config.validate().unwrap();

        assert_eq!(config.shadows.directional_resolution, 1024);
        assert_eq!(config.shadows.omni_resolution, 16);
        assert_eq!(config.shadows.omni_near, 0.001);
        assert!(config.shadows.omni_far > config.shadows.omni_near);
        assert_eq!(config.clear_colour, [1.0, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_texture_unit_overlap_rejected() {
        let mut config = RendererConfig::default();
        config.texture_units.diffuse = 4;
        assert!(matches!(config.validate(), Err(RenderError::Config(_))));

        let mut config = RendererConfig::default();
        config.texture_units.skybox = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_units_required() {
        let layout = TextureUnitLayout::default();
        assert_eq!(layout.omni_unit(0), 3);
        assert_eq!(layout.omni_unit(5), 8);
        assert_eq!(layout.units_required(), 3 + MAX_OMNI_SHADOWS as u32);
    }

    #[test]
    fn test_config_json() {
        let config = RendererConfig::high_quality()
            .with_sun_speed(1.0)
            .with_debug_viewport(DebugViewport::default());
        let json = config.to_json().unwrap();
        let restored = RendererConfig::from_json(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "shadows": { "enabled": false }, "sun": { "speed": 0.5 } }"#;
        let config = RendererConfig::from_json(json).unwrap();
        assert!(!config.shadows.enabled);
        assert_eq!(config.shadows.directional_resolution, 2048);
        assert_eq!(config.sun.speed, 0.5);
        assert_eq!(config.sun.orbit.height, 15.0);
    }

    #[test]
    fn test_presets() {
        assert!(!RendererConfig::shadows_disabled().shadows.enabled);
        assert_eq!(RendererConfig::low_quality().shadows.omni_resolution, 256);
        assert_eq!(RendererConfig::high_quality().shadows.directional_resolution, 4096);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.json");
        std::fs::write(&path, RendererConfig::low_quality().to_json().unwrap()).unwrap();

        let config = RendererConfig::load(&path).unwrap();
        assert_eq!(config.shadows.directional_resolution, 512);

        assert!(matches!(
            RendererConfig::load(dir.path().join("missing.json")),
            Err(RenderError::Io(_))
        ));
    }
}
