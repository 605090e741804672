//! Point and spot lights

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{Light, LightProperties};
use crate::device::RenderDevice;
use crate::shadow::{CubeTransforms, OmniShadowMap, ShadowState};

/// Offset from the eye of a flash-attached spot light
pub const DEFAULT_FLASH_OFFSET: Vec3 = Vec3::new(0.0, -0.3, 0.0);

/// Distance attenuation `1 / (constant + linear * d + exponent * d²)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub exponent: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }
}

impl Attenuation {
    pub const fn new(constant: f32, linear: f32, exponent: f32) -> Self {
        Self {
            constant,
            linear,
            exponent,
        }
    }

    /// Scale applied to a contribution at `distance`
    pub fn factor(&self, distance: f32) -> f32 {
        let denominator =
            self.constant + self.linear * distance + self.exponent * distance * distance;
        if denominator <= 0.0 {
            0.0
        } else {
            1.0 / denominator
        }
    }
}

/// Cone that turns a point light into a spot light
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotCone {
    direction: Vec3,
    edge_degrees: f32,
    edge_cos: f32,
    enabled: bool,
    flash_offset: Option<Vec3>,
}

impl SpotCone {
    /// Cone along `direction` with a half-angle in degrees
    pub fn new(direction: Vec3, edge_degrees: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            edge_degrees,
            edge_cos: edge_degrees.to_radians().cos(),
            enabled: true,
            flash_offset: None,
        }
    }

    /// Attach to the camera, offset from the eye
    pub fn with_flash(mut self, offset: Vec3) -> Self {
        self.flash_offset = Some(offset);
        self
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = direction.normalize_or_zero();
    }

    /// Half-angle, degrees
    pub fn edge(&self) -> f32 {
        self.edge_degrees
    }

    /// Cosine of the half-angle, as the lit program expects it
    pub fn edge_cos(&self) -> f32 {
        self.edge_cos
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Flip on/off, returning the new state
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Offset from the eye when attached to the camera
    pub fn flash_offset(&self) -> Option<Vec3> {
        self.flash_offset
    }

    pub fn is_flash(&self) -> bool {
        self.flash_offset.is_some()
    }
}

/// Positional light with an omni shadow map, optionally a spot light
#[derive(Debug)]
pub struct PointLight {
    properties: LightProperties,
    position: Vec3,
    attenuation: Attenuation,
    near: f32,
    far: f32,
    cone: Option<SpotCone>,
    shadow_size: (u32, u32),
    shadow: ShadowState<OmniShadowMap>,
}

impl PointLight {
    /// Create a point light
    pub fn new(
        properties: LightProperties,
        position: Vec3,
        attenuation: Attenuation,
        near: f32,
        far: f32,
        shadow_size: (u32, u32),
    ) -> Self {
        Self {
            properties,
            position,
            attenuation,
            near,
            far,
            cone: None,
            shadow_size,
            shadow: ShadowState::Pending,
        }
    }

    /// Create a spot light
    pub fn spot(
        properties: LightProperties,
        position: Vec3,
        attenuation: Attenuation,
        cone: SpotCone,
        near: f32,
        far: f32,
        shadow_size: (u32, u32),
    ) -> Self {
        Self::new(properties, position, attenuation, near, far, shadow_size).with_cone(cone)
    }

    /// Add a cone
    pub fn with_cone(mut self, cone: SpotCone) -> Self {
        self.cone = Some(cone);
        self
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn attenuation(&self) -> &Attenuation {
        &self.attenuation
    }

    pub fn near_plane(&self) -> f32 {
        self.near
    }

    /// Far plane, also used to linearize cube depth
    pub fn far_plane(&self) -> f32 {
        self.far
    }

    pub fn cone(&self) -> Option<&SpotCone> {
        self.cone.as_ref()
    }

    pub fn cone_mut(&mut self) -> Option<&mut SpotCone> {
        self.cone.as_mut()
    }

    pub fn is_spot(&self) -> bool {
        self.cone.is_some()
    }

    /// Whether the light contributes (spot lights can be switched off)
    pub fn is_on(&self) -> bool {
        self.cone.map_or(true, |cone| cone.is_enabled())
    }

    /// Properties to push to the lit program; a switched-off spot is dark
    pub fn effective_properties(&self) -> LightProperties {
        if self.is_on() {
            self.properties
        } else {
            self.properties.dark()
        }
    }

    /// Re-derive position and direction from the camera for flash lights
    pub fn attach_to_eye(&mut self, eye: Vec3, forward: Vec3) -> bool {
        let Some(cone) = self.cone.as_mut() else {
            return false;
        };
        let Some(offset) = cone.flash_offset() else {
            return false;
        };
        self.position = eye + offset;
        cone.set_direction(forward);
        true
    }

    /// Face transforms for the current position
    pub fn cube_transforms(&self) -> CubeTransforms {
        let (width, height) = self.shadow_size;
        let aspect = if height == 0 { 1.0 } else { width as f32 / height as f32 };
        CubeTransforms::new(self.position, self.near, self.far, aspect)
    }

    /// The shadow map, when allocated
    pub fn shadow_map(&self) -> Option<&OmniShadowMap> {
        self.shadow.map()
    }

    pub fn shadow_state(&self) -> &ShadowState<OmniShadowMap> {
        &self.shadow
    }
}

impl Light for PointLight {
    fn properties(&self) -> &LightProperties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut LightProperties {
        &mut self.properties
    }

    fn shadow_size(&self) -> (u32, u32) {
        self.shadow_size
    }

    fn shadow_enabled(&self) -> bool {
        self.shadow.is_ready()
    }

    fn shadow_pending(&self) -> bool {
        self.shadow.is_pending()
    }

    fn allocate_shadow(&mut self, device: &mut dyn RenderDevice, enabled: bool) {
        self.release_shadow(device);
        let owner = if self.is_spot() { "spot light" } else { "point light" };
        self.shadow = if enabled {
            let (width, height) = self.shadow_size;
            ShadowState::from_allocation(OmniShadowMap::new(device, width, height), owner)
        } else {
            ShadowState::disabled("shadows disabled by configuration")
        };
    }

    fn release_shadow(&mut self, device: &mut dyn RenderDevice) {
        if let Some(map) = self.shadow.take() {
            map.release(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lamp() -> PointLight {
        PointLight::new(
            LightProperties::new(Vec3::new(1.0, 0.5, 0.2), 0.1, 1.0),
            Vec3::new(2.0, 3.0, 1.0),
            Attenuation::new(1.0, 0.09, 0.032),
            0.1,
            50.0,
            (128, 128),
        )
    }

    #[test]
    fn test_attenuation_at_ten_units() {
        let light = lamp();
        let factor = light.attenuation().factor(10.0);
        // 1 / (1 + 0.9 + 3.2)
        assert!((factor - 1.0 / 5.1).abs() < 1e-6);
        assert!((factor - 0.196).abs() < 1e-3);
    }

    #[test]
    fn test_attenuation_degenerate() {
        assert_eq!(Attenuation::new(0.0, 0.0, 0.0).factor(5.0), 0.0);
        assert_eq!(Attenuation::default().factor(100.0), 1.0);
    }

    #[test]
    fn test_cube_transforms_share_position() {
        let light = lamp();
        let transforms = light.cube_transforms();
        assert_eq!(transforms.position, light.position());
        assert_eq!(transforms.far_plane, 50.0);
        for view in transforms.views {
            let origin = view.inverse().transform_point3(Vec3::ZERO);
            assert!((origin - light.position()).length() < 1e-4);
        }
    }

    #[test]
    fn test_spot_toggle_darkens() {
        let mut light = lamp().with_cone(SpotCone::new(Vec3::NEG_Y, 20.0));
        assert!(light.is_spot());
        assert!(light.is_on());

        assert!(!light.cone_mut().unwrap().toggle());
        assert!(!light.is_on());
        let pushed = light.effective_properties();
        assert_eq!(pushed.diffuse_intensity, 0.0);
        assert_eq!(pushed.ambient_intensity, 0.0);
        assert_eq!(light.properties().diffuse_intensity, 1.0);
    }

    #[test]
    fn test_edge_cosine() {
        let cone = SpotCone::new(Vec3::new(0.0, -2.0, 0.0), 60.0);
        assert!((cone.edge_cos() - 0.5).abs() < 1e-6);
        assert!((cone.direction() - Vec3::NEG_Y).length() < 1e-6);
    }

    #[test]
    fn test_flash_follows_eye() {
        let cone = SpotCone::new(Vec3::NEG_Z, 20.0).with_flash(DEFAULT_FLASH_OFFSET);
        let mut light = lamp().with_cone(cone);
        let eye = Vec3::new(0.0, 2.0, 5.0);
        assert!(light.attach_to_eye(eye, Vec3::X));
        assert!((light.position() - Vec3::new(0.0, 1.7, 5.0)).length() < 1e-6);
        assert_eq!(light.cone().unwrap().direction(), Vec3::X);

        let mut fixed = lamp();
        assert!(!fixed.attach_to_eye(eye, Vec3::X));
        assert_eq!(fixed.position(), Vec3::new(2.0, 3.0, 1.0));
    }
}
