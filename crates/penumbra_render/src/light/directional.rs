//! Directional light
//!
//! The sun orbits the origin on a horizontal circle. Its light-space transform
//! is recomputed from the orbit angle each time it is asked for, so the
//! shadow frustum stays centred on the scene whatever the phase.

use std::f32::consts::TAU;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::{Light, LightProperties};
use crate::device::RenderDevice;
use crate::shadow::{ShadowMap, ShadowState};

/// Orthographic shadow volume
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrthoBounds {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrthoBounds {
    fn default() -> Self {
        Self::symmetric(20.0, 0.1, 100.0)
    }
}

impl OrthoBounds {
    /// Box of half-extent `half` on both axes
    pub fn symmetric(half: f32, near: f32, far: f32) -> Self {
        Self {
            left: -half,
            right: half,
            bottom: -half,
            top: half,
            near,
            far,
        }
    }

    /// GL-style orthographic projection
    pub fn projection(&self) -> Mat4 {
        Mat4::orthographic_rh_gl(self.left, self.right, self.bottom, self.top, self.near, self.far)
    }

    /// Clamp to a usable volume
    pub fn validate(&mut self) {
        if self.right <= self.left {
            self.right = self.left + 1.0;
        }
        if self.top <= self.bottom {
            self.top = self.bottom + 1.0;
        }
        self.near = self.near.max(0.001);
        self.far = self.far.max(self.near + 0.1);
    }
}

/// Circle the sun travels on
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SunOrbit {
    /// Horizontal distance from the origin
    pub radius: f32,
    /// Height above the origin
    pub height: f32,
}

impl Default for SunOrbit {
    fn default() -> Self {
        Self {
            radius: 25.0,
            height: 15.0,
        }
    }
}

impl SunOrbit {
    /// Sun position at an orbit angle (radians)
    pub fn position(&self, angle: f32) -> Vec3 {
        Vec3::new(self.radius * angle.cos(), self.height, self.radius * angle.sin())
    }
}

/// Caller-owned orbit angle
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SunCycle {
    /// Current angle, radians in `[0, 2π)`
    pub angle: f32,
    /// Angular speed, radians per second
    pub speed: f32,
}

impl SunCycle {
    pub fn new(speed: f32) -> Self {
        Self { angle: 0.0, speed }
    }

    /// Advance by `dt` seconds and return the new angle
    pub fn advance(&mut self, dt: f32) -> f32 {
        self.angle = (self.angle + self.speed * dt).rem_euclid(TAU);
        self.angle
    }
}

/// Sun light with an orthographic shadow map
#[derive(Debug)]
pub struct DirectionalLight {
    properties: LightProperties,
    direction: Vec3,
    bounds: OrthoBounds,
    orbit: SunOrbit,
    shadow_size: (u32, u32),
    shadow: ShadowState<ShadowMap>,
}

impl DirectionalLight {
    /// Create a light shining along `direction` (not normalized here)
    pub fn new(properties: LightProperties, direction: Vec3, shadow_size: (u32, u32)) -> Self {
        Self {
            properties,
            direction,
            bounds: OrthoBounds::default(),
            orbit: SunOrbit::default(),
            shadow_size,
            shadow: ShadowState::Pending,
        }
    }

    /// Replace the shadow volume
    pub fn with_bounds(mut self, bounds: OrthoBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Replace the orbit
    pub fn with_orbit(mut self, orbit: SunOrbit) -> Self {
        self.orbit = orbit;
        self
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = direction;
    }

    pub fn bounds(&self) -> &OrthoBounds {
        &self.bounds
    }

    pub fn orbit(&self) -> &SunOrbit {
        &self.orbit
    }

    /// Fixed orthographic projection
    pub fn projection(&self) -> Mat4 {
        self.bounds.projection()
    }

    /// Sun position at an orbit angle
    pub fn orbit_position(&self, angle: f32) -> Vec3 {
        self.orbit.position(angle)
    }

    /// `projection * lookAt(orbit position, origin, +Y)`
    pub fn light_transform(&self, angle: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.orbit_position(angle), Vec3::ZERO, Vec3::Y);
        self.projection() * view
    }

    /// Point the light from its orbit position at the origin
    pub fn follow_orbit(&mut self, angle: f32) {
        self.direction = (-self.orbit_position(angle)).normalize_or_zero();
    }

    /// View from `distance` back along the light direction, looking at the origin
    pub fn debug_view(&self, distance: f32) -> Mat4 {
        let direction = self.direction.normalize_or_zero();
        let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Mat4::look_at_rh(-direction * distance, Vec3::ZERO, up)
    }

    /// The shadow map, when allocated
    pub fn shadow_map(&self) -> Option<&ShadowMap> {
        self.shadow.map()
    }

    pub fn shadow_state(&self) -> &ShadowState<ShadowMap> {
        &self.shadow
    }
}

impl Light for DirectionalLight {
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
        self.shadow = if enabled {
            let (width, height) = self.shadow_size;
            ShadowState::from_allocation(ShadowMap::new(device, width, height), "directional light")
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
    use crate::device::{SoftwareDevice, SoftwareLimits};

    fn sun() -> DirectionalLight {
        DirectionalLight::new(
            LightProperties::new(Vec3::ONE, 0.2, 0.8),
            Vec3::new(0.0, -1.0, 0.0),
            (256, 256),
        )
    }

    #[test]
    fn test_light_transform_is_periodic() {
        let light = sun();
        for angle in [0.0, 0.7, 2.0, 4.5] {
            let a = light.light_transform(angle);
            let b = light.light_transform(angle + TAU);
            assert!(a.abs_diff_eq(b, 1e-4), "angle {}", angle);
        }
    }

    #[test]
    fn test_orbit_position() {
        let light = sun();
        let p = light.orbit_position(0.0);
        assert!((p - Vec3::new(25.0, 15.0, 0.0)).length() < 1e-5);
        let p = light.orbit_position(std::f32::consts::FRAC_PI_2);
        assert!((p - Vec3::new(0.0, 15.0, 25.0)).length() < 1e-4);
    }

    #[test]
    fn test_origin_maps_inside_shadow_volume() {
        let light = sun();
        let clip = light.light_transform(1.0) * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
        assert!(clip.z > -1.0 && clip.z < 1.0);
    }

    #[test]
    fn test_follow_orbit_points_at_origin() {
        let mut light = sun();
        light.follow_orbit(0.0);
        let expected = -Vec3::new(25.0, 15.0, 0.0).normalize();
        assert!((light.direction() - expected).length() < 1e-5);
    }

    #[test]
    fn test_sun_cycle_wraps() {
        let mut cycle = SunCycle::new(1.0);
        let steps = 600;
        let dt = TAU / steps as f32;
        for _ in 0..steps {
            cycle.advance(dt);
        }
        assert!(cycle.angle < 1e-3 || (TAU - cycle.angle) < 1e-3);
        assert!(cycle.angle >= 0.0 && cycle.angle < TAU);
    }

    #[test]
    fn test_allocation_failure_keeps_light_usable() {
        let mut device = SoftwareDevice::with_limits(
            4,
            4,
            SoftwareLimits { max_texture_size: 64, ..Default::default() },
        );
        let mut light = sun();
        assert!(light.shadow_pending());
        light.allocate_shadow(&mut device, true);
        assert!(!light.shadow_enabled());
        assert!(light.shadow_state().is_disabled());
        assert_eq!(light.properties().diffuse_intensity, 0.8);
    }

    #[test]
    fn test_debug_view_handles_vertical_light() {
        let light = sun();
        let view = light.debug_view(20.0);
        assert!(!view.is_nan());
        let eye = view.inverse().transform_point3(Vec3::ZERO);
        assert!((eye - Vec3::new(0.0, 20.0, 0.0)).length() < 1e-4);
    }
}
