//! Scene light collection
//!
//! One directional light plus growable point and spot collections. The caps
//! of the lit program are enforced when lights are added; the collections are
//! only turned into fixed uniform arrays when the program is bound.

use glam::Vec3;
use penumbra_shader::{MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS};

use super::{DirectionalLight, Light, PointLight};
use crate::device::RenderDevice;
use crate::error::{RenderError, Result};

/// Every light in a scene
#[derive(Debug)]
pub struct LightSet {
    directional: DirectionalLight,
    points: Vec<PointLight>,
    spots: Vec<PointLight>,
}

impl LightSet {
    /// Start with a directional light and no point or spot lights
    pub fn new(directional: DirectionalLight) -> Self {
        Self {
            directional,
            points: Vec::with_capacity(MAX_POINT_LIGHTS),
            spots: Vec::with_capacity(MAX_SPOT_LIGHTS),
        }
    }

    pub fn directional(&self) -> &DirectionalLight {
        &self.directional
    }

    pub fn directional_mut(&mut self) -> &mut DirectionalLight {
        &mut self.directional
    }

    /// Add a point light, returning its index
    pub fn add_point(&mut self, light: PointLight) -> Result<usize> {
        if light.is_spot() {
            return Err(RenderError::Config("point light must not carry a spot cone".into()));
        }
        if self.points.len() >= MAX_POINT_LIGHTS {
            return Err(RenderError::LightLimit {
                kind: "point",
                max: MAX_POINT_LIGHTS,
            });
        }
        self.points.push(light);
        Ok(self.points.len() - 1)
    }

    /// Add a spot light, returning its index
    pub fn add_spot(&mut self, light: PointLight) -> Result<usize> {
        if !light.is_spot() {
            return Err(RenderError::Config("spot light needs a spot cone".into()));
        }
        if self.spots.len() >= MAX_SPOT_LIGHTS {
            return Err(RenderError::LightLimit {
                kind: "spot",
                max: MAX_SPOT_LIGHTS,
            });
        }
        self.spots.push(light);
        Ok(self.spots.len() - 1)
    }

    /// Remove a point light, releasing its shadow map
    pub fn remove_point(
        &mut self,
        device: &mut dyn RenderDevice,
        index: usize,
    ) -> Option<PointLight> {
        if index >= self.points.len() {
            return None;
        }
        let mut light = self.points.remove(index);
        light.release_shadow(device);
        Some(light)
    }

    /// Remove a spot light, releasing its shadow map
    pub fn remove_spot(
        &mut self,
        device: &mut dyn RenderDevice,
        index: usize,
    ) -> Option<PointLight> {
        if index >= self.spots.len() {
            return None;
        }
        let mut light = self.spots.remove(index);
        light.release_shadow(device);
        Some(light)
    }

    pub fn points(&self) -> &[PointLight] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [PointLight] {
        &mut self.points
    }

    pub fn spots(&self) -> &[PointLight] {
        &self.spots
    }

    pub fn spots_mut(&mut self) -> &mut [PointLight] {
        &mut self.spots
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn spot_count(&self) -> usize {
        self.spots.len()
    }

    /// Directional, point and spot lights
    pub fn total(&self) -> usize {
        1 + self.points.len() + self.spots.len()
    }

    /// Lights that currently own a usable shadow map
    pub fn shadowed_count(&self) -> usize {
        let omni = self
            .points
            .iter()
            .chain(self.spots.iter())
            .filter(|light| light.shadow_enabled())
            .count();
        omni + usize::from(self.directional.shadow_enabled())
    }

    /// Allocate shadow maps for lights that don't have one yet
    pub fn allocate_pending(&mut self, device: &mut dyn RenderDevice, enabled: bool) -> usize {
        let mut allocated = 0;
        if self.directional.shadow_pending() {
            self.directional.allocate_shadow(device, enabled);
            allocated += 1;
        }
        for light in self.points.iter_mut().chain(self.spots.iter_mut()) {
            if light.shadow_pending() {
                light.allocate_shadow(device, enabled);
                allocated += 1;
            }
        }
        allocated
    }

    /// Free every shadow map
    pub fn release_shadows(&mut self, device: &mut dyn RenderDevice) {
        self.directional.release_shadow(device);
        for light in self.points.iter_mut().chain(self.spots.iter_mut()) {
            light.release_shadow(device);
        }
    }

    /// Move flash spot lights to the camera; returns how many moved
    pub fn attach_flash_lights(&mut self, eye: Vec3, forward: Vec3) -> usize {
        self.spots
            .iter_mut()
            .map(|light| light.attach_to_eye(eye, forward))
            .filter(|&moved| moved)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use crate::light::{Attenuation, LightProperties, SpotCone};

    fn sun() -> DirectionalLight {
        DirectionalLight::new(LightProperties::new(Vec3::ONE, 0.3, 0.6), Vec3::NEG_Y, (64, 64))
    }

    fn point(x: f32) -> PointLight {
        PointLight::new(
            LightProperties::new(Vec3::ONE, 0.1, 0.9),
            Vec3::new(x, 2.0, 0.0),
            Attenuation::new(1.0, 0.09, 0.032),
            0.1,
            50.0,
            (32, 32),
        )
    }

    fn spot(x: f32) -> PointLight {
        point(x).with_cone(SpotCone::new(Vec3::NEG_Y, 25.0))
    }

    #[test]
    fn test_point_limit_enforced_on_insert() {
        let mut set = LightSet::new(sun());
        for i in 0..MAX_POINT_LIGHTS {
            assert_eq!(set.add_point(point(i as f32)).unwrap(), i);
        }
        let err = set.add_point(point(9.0)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::LightLimit { kind: "point", max } if max == MAX_POINT_LIGHTS
        ));
        assert_eq!(set.point_count(), MAX_POINT_LIGHTS);
    }

    #[test]
    fn test_spot_limit_enforced_on_insert() {
        let mut set = LightSet::new(sun());
        for i in 0..MAX_SPOT_LIGHTS {
            set.add_spot(spot(i as f32)).unwrap();
        }
        let err = set.add_spot(spot(9.0)).unwrap_err();
        assert!(matches!(err, RenderError::LightLimit { kind: "spot", .. }));
    }

    #[test]
    fn test_variant_checks() {
        let mut set = LightSet::new(sun());
        assert!(matches!(set.add_point(spot(0.0)), Err(RenderError::Config(_))));
        assert!(matches!(set.add_spot(point(0.0)), Err(RenderError::Config(_))));
    }

    #[test]
    fn test_allocate_pending_once() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut set = LightSet::new(sun());
        set.add_point(point(0.0)).unwrap();
        set.add_spot(spot(1.0)).unwrap();

        assert_eq!(set.allocate_pending(&mut device, true), 3);
        assert_eq!(set.shadowed_count(), 3);
        assert_eq!(set.allocate_pending(&mut device, true), 0);

        set.release_shadows(&mut device);
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn test_disabled_configuration() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut set = LightSet::new(sun());
        set.add_point(point(0.0)).unwrap();
        set.allocate_pending(&mut device, false);
        assert_eq!(set.shadowed_count(), 0);
        assert!(set.points()[0].shadow_state().is_disabled());
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn test_remove_releases_map() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut set = LightSet::new(sun());
        set.add_point(point(0.0)).unwrap();
        set.allocate_pending(&mut device, true);
        assert_eq!(device.texture_count(), 2);

        assert!(set.remove_point(&mut device, 0).is_some());
        assert_eq!(device.texture_count(), 1);
        assert!(set.remove_point(&mut device, 0).is_none());
    }
}
