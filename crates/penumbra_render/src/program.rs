//! Shader program binder
//!
//! A [`ShaderProgram`] is either ready (linked, locations resolved) or
//! unlinked after a failure. Every location the lighting contract needs is
//! resolved once after linking and cached in the program itself; names a
//! program does not use resolve to [`MISSING_UNIFORM`] and their setters are
//! silent no-ops.
//!
//! Setters act on the program in use, as on a GL context: call
//! [`ShaderProgram::use_program`] first.
//!
//! Light arrays are clamped to the caps of the lit program
//! ([`MAX_POINT_LIGHTS`], [`MAX_SPOT_LIGHTS`], [`MAX_OMNI_SHADOWS`]).

use glam::{Mat4, Vec3};
use penumbra_shader::{
    ShaderCompiler, ShaderSourceProvider, MAX_OMNI_SHADOWS, MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS,
};

use crate::device::{ProgramId, RenderDevice, UniformLocation, UniformValue, MISSING_UNIFORM};
use crate::error::{RenderError, Result};
use crate::light::{DirectionalLight, Light, LightProperties, PointLight};
use crate::scene::Material;

/// Locations of a `Light` struct
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightLocations {
    pub colour: UniformLocation,
    pub ambient_intensity: UniformLocation,
    pub diffuse_intensity: UniformLocation,
}

/// Locations of the directional light
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectionalLocations {
    pub base: LightLocations,
    pub direction: UniformLocation,
    pub shadowed: UniformLocation,
}

/// Locations of one point light slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointLocations {
    pub base: LightLocations,
    pub position: UniformLocation,
    pub constant: UniformLocation,
    pub linear: UniformLocation,
    pub exponent: UniformLocation,
}

/// Locations of one spot light slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpotLocations {
    pub point: PointLocations,
    pub direction: UniformLocation,
    pub edge: UniformLocation,
}

/// Locations of one omni shadow slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OmniShadowLocations {
    pub far_plane: UniformLocation,
    pub shadowed: UniformLocation,
    pub map: UniformLocation,
}

/// Every location of the lighting contract
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformLocations {
    pub model: UniformLocation,
    pub projection: UniformLocation,
    pub view: UniformLocation,
    pub eye_position: UniformLocation,
    pub directional_light_transform: UniformLocation,

    pub light_matrix: UniformLocation,
    pub light_position: UniformLocation,
    pub far_plane: UniformLocation,

    pub specular_intensity: UniformLocation,
    pub shininess: UniformLocation,

    pub diffuse_texture: UniformLocation,
    pub directional_shadow_map: UniformLocation,
    pub skybox: UniformLocation,

    pub directional_light: DirectionalLocations,
    pub point_light_count: UniformLocation,
    pub point_lights: [PointLocations; MAX_POINT_LIGHTS],
    pub spot_light_count: UniformLocation,
    pub spot_lights: [SpotLocations; MAX_SPOT_LIGHTS],
    pub omni_shadows: [OmniShadowLocations; MAX_OMNI_SHADOWS],
}

impl UniformLocations {
    /// Locations for a program that exposes nothing
    pub fn missing() -> Self {
        Self::resolve(|_| MISSING_UNIFORM)
    }

    /// Resolve every name through `lookup`
    pub fn resolve(lookup: impl Fn(&str) -> UniformLocation) -> Self {
        let light = |prefix: &str| LightLocations {
            colour: lookup(&format!("{}.colour", prefix)),
            ambient_intensity: lookup(&format!("{}.ambient_intensity", prefix)),
            diffuse_intensity: lookup(&format!("{}.diffuse_intensity", prefix)),
        };
        let point = |prefix: &str| PointLocations {
            base: light(&format!("{}.base", prefix)),
            position: lookup(&format!("{}.position", prefix)),
            constant: lookup(&format!("{}.constant_term", prefix)),
            linear: lookup(&format!("{}.linear_term", prefix)),
            exponent: lookup(&format!("{}.exponent_term", prefix)),
        };

        Self {
            model: lookup("model"),
            projection: lookup("projection"),
            view: lookup("view"),
            eye_position: lookup("eye_position"),
            directional_light_transform: lookup("directional_light_transform"),

            light_matrix: lookup("light_matrix"),
            light_position: lookup("light_position"),
            far_plane: lookup("far_plane"),

            specular_intensity: lookup("material.specular_intensity"),
            shininess: lookup("material.shininess"),

            diffuse_texture: lookup("diffuse_texture"),
            directional_shadow_map: lookup("directional_shadow_map"),
            skybox: lookup("skybox"),

            directional_light: DirectionalLocations {
                base: light("directional_light.base"),
                direction: lookup("directional_light.direction"),
                shadowed: lookup("directional_light.shadowed"),
            },
            point_light_count: lookup("point_light_count"),
            point_lights: std::array::from_fn(|i| point(&format!("point_lights[{}]", i))),
            spot_light_count: lookup("spot_light_count"),
            spot_lights: std::array::from_fn(|i| SpotLocations {
                point: point(&format!("spot_lights[{}].point", i)),
                direction: lookup(&format!("spot_lights[{}].direction", i)),
                edge: lookup(&format!("spot_lights[{}].edge", i)),
            }),
            omni_shadows: std::array::from_fn(|i| OmniShadowLocations {
                far_plane: lookup(&format!("omni_shadows[{}].far_plane", i)),
                shadowed: lookup(&format!("omni_shadows[{}].shadowed", i)),
                map: lookup(&format!("omni_shadow_map_{}", i)),
            }),
        }
    }
}

/// Link state of a program
#[derive(Debug)]
pub enum ProgramState {
    /// Compile or link failed; the diagnostic is kept
    Unlinked { error: String },
    /// Linked with every location resolved
    Ready {
        id: ProgramId,
        locations: Box<UniformLocations>,
    },
}

/// A named program plus its location cache
#[derive(Debug)]
pub struct ShaderProgram {
    name: String,
    state: ProgramState,
}

impl ShaderProgram {
    /// Compile, link and resolve locations
    pub fn try_load(
        device: &mut dyn RenderDevice,
        compiler: &mut ShaderCompiler,
        provider: &dyn ShaderSourceProvider,
        name: &str,
    ) -> Result<Self> {
        let compiled = compiler.compile_named(provider, name)?;
        let id = device.create_program(&compiled)?;
        let locations = UniformLocations::resolve(|uniform| device.uniform_location(id, uniform));

        log::info!("Linked program '{}' ({} uniforms)", name, compiled.uniforms.len());
        Ok(Self {
            name: name.to_string(),
            state: ProgramState::Ready {
                id,
                locations: Box::new(locations),
            },
        })
    }

    /// Like [`try_load`](Self::try_load), but a failure yields an unlinked program
    pub fn load(
        device: &mut dyn RenderDevice,
        compiler: &mut ShaderCompiler,
        provider: &dyn ShaderSourceProvider,
        name: &str,
    ) -> Self {
        match Self::try_load(device, compiler, provider, name) {
            Ok(program) => program,
            Err(err) => {
                log::error!("Program '{}' unavailable: {}", name, err);
                Self::unlinked(name, err.to_string())
            }
        }
    }

    /// A program that failed to build
    pub fn unlinked(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ProgramState::Unlinked { error: error.into() },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ProgramState::Ready { .. })
    }

    /// Linked program id
    pub fn id(&self) -> Option<ProgramId> {
        match &self.state {
            ProgramState::Ready { id, .. } => Some(*id),
            ProgramState::Unlinked { .. } => None,
        }
    }

    /// Failure diagnostic of an unlinked program
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ProgramState::Unlinked { error } => Some(error),
            ProgramState::Ready { .. } => None,
        }
    }

    /// Cached locations of a ready program
    pub fn locations(&self) -> Option<&UniformLocations> {
        match &self.state {
            ProgramState::Ready { locations, .. } => Some(locations),
            ProgramState::Unlinked { .. } => None,
        }
    }

    /// Error unless the program is ready
    pub fn require_ready(&self) -> Result<ProgramId> {
        self.id().ok_or_else(|| RenderError::ProgramNotReady(self.name.clone()))
    }

    /// Bind the program; returns false if it is not ready
    pub fn use_program(&self, device: &mut dyn RenderDevice) -> bool {
        match self.id() {
            Some(id) => {
                device.use_program(Some(id));
                true
            }
            None => false,
        }
    }

    /// Delete the linked program
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let Some(id) = self.id() {
            device.delete_program(id);
            self.state = ProgramState::Unlinked {
                error: "released".to_string(),
            };
        }
    }

    fn with_locations(&self, f: impl FnOnce(&UniformLocations)) {
        if let Some(locations) = self.locations() {
            f(locations);
        }
    }

    pub fn set_model(&self, device: &mut dyn RenderDevice, model: Mat4) {
        self.with_locations(|l| device.set_uniform(l.model, UniformValue::Mat4(model)));
    }

    pub fn set_projection(&self, device: &mut dyn RenderDevice, projection: Mat4) {
        self.with_locations(|l| device.set_uniform(l.projection, UniformValue::Mat4(projection)));
    }

    pub fn set_view(&self, device: &mut dyn RenderDevice, view: Mat4) {
        self.with_locations(|l| device.set_uniform(l.view, UniformValue::Mat4(view)));
    }

    pub fn set_eye_position(&self, device: &mut dyn RenderDevice, eye: Vec3) {
        self.with_locations(|l| device.set_uniform(l.eye_position, UniformValue::Vec3(eye)));
    }

    pub fn set_directional_light_transform(&self, device: &mut dyn RenderDevice, transform: Mat4) {
        self.with_locations(|l| {
            device.set_uniform(l.directional_light_transform, UniformValue::Mat4(transform))
        });
    }

    /// Face transform of the omni depth pass
    pub fn set_light_matrix(&self, device: &mut dyn RenderDevice, matrix: Mat4) {
        self.with_locations(|l| device.set_uniform(l.light_matrix, UniformValue::Mat4(matrix)));
    }

    /// Light position and far plane of the omni depth pass
    pub fn set_omni_light(&self, device: &mut dyn RenderDevice, position: Vec3, far_plane: f32) {
        self.with_locations(|l| {
            device.set_uniform(l.light_position, UniformValue::Vec3(position));
            device.set_uniform(l.far_plane, UniformValue::Float(far_plane));
        });
    }

    pub fn set_material(&self, device: &mut dyn RenderDevice, material: &Material) {
        self.with_locations(|l| {
            let specular = material.specular_intensity;
            device.set_uniform(l.specular_intensity, UniformValue::Float(specular));
            device.set_uniform(l.shininess, UniformValue::Float(material.shininess));
        });
    }

    /// Point the diffuse sampler at a texture unit
    pub fn set_texture(&self, device: &mut dyn RenderDevice, unit: u32) {
        self.with_locations(|l| {
            device.set_uniform(l.diffuse_texture, UniformValue::Int(unit as i32));
        });
    }

    /// Point the directional shadow sampler at a texture unit
    pub fn set_directional_shadow_map(&self, device: &mut dyn RenderDevice, unit: u32) {
        self.with_locations(|l| {
            device.set_uniform(l.directional_shadow_map, UniformValue::Int(unit as i32))
        });
    }

    /// Point the skybox sampler at a texture unit
    pub fn set_skybox(&self, device: &mut dyn RenderDevice, unit: u32) {
        self.with_locations(|l| device.set_uniform(l.skybox, UniformValue::Int(unit as i32)));
    }

    /// Push the directional light
    pub fn set_directional_light(&self, device: &mut dyn RenderDevice, light: &DirectionalLight) {
        self.with_locations(|l| {
            let slot = &l.directional_light;
            set_light(device, &slot.base, light.properties());
            device.set_uniform(slot.direction, UniformValue::Vec3(light.direction()));
            device.set_uniform(slot.shadowed, UniformValue::Int(light.shadow_enabled() as i32));
        });
    }

    /// Push point lights, clamped to [`MAX_POINT_LIGHTS`]
    ///
    /// Light `i` samples its cube from unit `base_unit + i` and uses omni
    /// shadow slot `base_slot + i`. Returns the count pushed.
    pub fn set_point_lights(
        &self,
        device: &mut dyn RenderDevice,
        lights: &[PointLight],
        base_unit: u32,
        base_slot: usize,
    ) -> usize {
        let count = clamp_count(lights.len(), MAX_POINT_LIGHTS, base_slot);
        self.with_locations(|l| {
            device.set_uniform(l.point_light_count, UniformValue::Int(count as i32));
            for (i, light) in lights.iter().take(count).enumerate() {
                set_point(device, &l.point_lights[i], light);
                let unit = base_unit + i as u32;
                set_omni_shadow(device, &l.omni_shadows[base_slot + i], light, unit);
            }
        });
        count
    }

    /// Push spot lights, clamped to [`MAX_SPOT_LIGHTS`]
    ///
    /// Unit and slot assignment follow [`set_point_lights`](Self::set_point_lights).
    pub fn set_spot_lights(
        &self,
        device: &mut dyn RenderDevice,
        lights: &[PointLight],
        base_unit: u32,
        base_slot: usize,
    ) -> usize {
        let count = clamp_count(lights.len(), MAX_SPOT_LIGHTS, base_slot);
        self.with_locations(|l| {
            device.set_uniform(l.spot_light_count, UniformValue::Int(count as i32));
            for (i, light) in lights.iter().take(count).enumerate() {
                let slot = &l.spot_lights[i];
                set_point(device, &slot.point, light);
                if let Some(cone) = light.cone() {
                    device.set_uniform(slot.direction, UniformValue::Vec3(cone.direction()));
                    device.set_uniform(slot.edge, UniformValue::Float(cone.edge_cos()));
                }
                let unit = base_unit + i as u32;
                set_omni_shadow(device, &l.omni_shadows[base_slot + i], light, unit);
            }
        });
        count
    }
}

fn clamp_count(requested: usize, cap: usize, base_slot: usize) -> usize {
    let count = requested.min(cap).min(MAX_OMNI_SHADOWS.saturating_sub(base_slot));
    if count < requested {
        log::debug!("Clamping {} lights to {}", requested, count);
    }
    count
}

fn set_light(device: &mut dyn RenderDevice, slot: &LightLocations, properties: &LightProperties) {
    device.set_uniform(slot.colour, UniformValue::Vec3(properties.colour));
    device.set_uniform(slot.ambient_intensity, UniformValue::Float(properties.ambient_intensity));
    device.set_uniform(slot.diffuse_intensity, UniformValue::Float(properties.diffuse_intensity));
}

fn set_point(device: &mut dyn RenderDevice, slot: &PointLocations, light: &PointLight) {
    set_light(device, &slot.base, &light.effective_properties());
    let attenuation = light.attenuation();
    device.set_uniform(slot.position, UniformValue::Vec3(light.position()));
    device.set_uniform(slot.constant, UniformValue::Float(attenuation.constant));
    device.set_uniform(slot.linear, UniformValue::Float(attenuation.linear));
    device.set_uniform(slot.exponent, UniformValue::Float(attenuation.exponent));
}

fn set_omni_shadow(
    device: &mut dyn RenderDevice,
    slot: &OmniShadowLocations,
    light: &PointLight,
    unit: u32,
) {
    // A switched-off spot casts no shadow
    let shadowed = light.is_on() && light.shadow_enabled();
    device.set_uniform(slot.far_plane, UniformValue::Float(light.far_plane()));
    device.set_uniform(slot.shadowed, UniformValue::Int(shadowed as i32));
    device.set_uniform(slot.map, UniformValue::Int(unit as i32));
}
