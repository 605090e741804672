//! Fragment stages of the software device
//!
//! A linked program is classified once from its reflected interface:
//!
//! - depth-only programs keep the window depth
//! - programs writing `frag_depth` with `light_position` and `far_plane`
//!   store the linear light distance over the far plane
//! - programs sampling a colour cube read it along the object-space position
//! - programs exposing `directional_light` run the forward lighting model
//! - anything else writes its first colour sampler at the vertex uv
//!
//! Uniforms are snapshotted per draw. Samplers whose unit holds no texture
//! of the right kind read white (colour) or lit (depth).

use glam::{Mat4, Vec2, Vec3, Vec4};
use penumbra_shader::{
    FragmentOutputs, TextureDimension, UniformKind, UniformTable, MAX_POINT_LIGHTS,
    MAX_SPOT_LIGHTS,
};

use super::raster::{FragmentShader, Varyings};
use super::texture::{Texture, TextureKind};
use super::UniformValue;
use crate::light::Attenuation;

/// Offset subtracted from the omni comparison depth
const OMNI_BIAS: f32 = 0.005;
/// Directional bias at grazing angles
const DIRECTIONAL_BIAS_SLOPE: f32 = 0.05;
/// Directional bias facing the light
const DIRECTIONAL_BIAS_MIN: f32 = 0.005;

/// Named uniform values of a linked program
pub(super) trait UniformSource {
    fn value(&self, name: &str) -> Option<UniformValue>;

    /// Unset or mistyped values read as zero
    fn float(&self, name: &str) -> f32 {
        match self.value(name) {
            Some(UniformValue::Float(value)) => value,
            _ => 0.0,
        }
    }

    fn int(&self, name: &str) -> i32 {
        match self.value(name) {
            Some(UniformValue::Int(value)) => value,
            _ => 0,
        }
    }

    fn vec3(&self, name: &str) -> Vec3 {
        match self.value(name) {
            Some(UniformValue::Vec3(value)) => value,
            Some(UniformValue::Vec4(value)) => value.truncate(),
            _ => Vec3::ZERO,
        }
    }

    fn mat4(&self, name: &str) -> Mat4 {
        match self.value(name) {
            Some(UniformValue::Mat4(value)) => value,
            _ => Mat4::ZERO,
        }
    }
}

/// How a program's fragments are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Shading {
    DepthOnly,
    LightDistance,
    Environment,
    Lit,
    Textured,
}

impl Shading {
    /// Classify a program from its reflected interface
    pub fn select(name: &str, outputs: FragmentOutputs, uniforms: &UniformTable) -> Self {
        let has = |uniform: &str| uniforms.location(uniform).is_some();
        if outputs.depth {
            if has("light_position") && has("far_plane") {
                return Self::LightDistance;
            }
            log::warn!("Program '{}' writes frag_depth; window depth used instead", name);
            return Self::DepthOnly;
        }
        if !outputs.colour {
            return Self::DepthOnly;
        }
        if has("directional_light.base.colour") {
            return Self::Lit;
        }
        let samples_cube = uniforms.iter().any(|slot| {
            matches!(
                slot.kind,
                UniformKind::Sampler { dimension: TextureDimension::Cube, depth: false }
            )
        });
        if samples_cube {
            Self::Environment
        } else {
            Self::Textured
        }
    }
}

/// Unit a sampler uniform selects; unset samplers read unit 0
fn sampler_unit(uniforms: &dyn UniformSource, name: &str) -> i32 {
    uniforms.int(name)
}

fn first_sampler(table: &UniformTable, wanted: impl Fn(TextureDimension) -> bool) -> Option<&str> {
    table.iter().find_map(|slot| match slot.kind {
        UniformKind::Sampler { dimension, depth: false } if wanted(dimension) => {
            Some(slot.name.as_str())
        }
        _ => None,
    })
}

/// Fragment stage of one draw
pub(super) enum DrawShader<'a> {
    DepthOnly,
    LightDistance { light: Vec3, far_plane: f32 },
    Environment { cube: Option<&'a Texture> },
    Textured { texture: Option<&'a Texture> },
    Lit(Box<LitShader<'a>>),
}

impl<'a> DrawShader<'a> {
    /// Snapshot the uniforms and bound textures a draw reads
    pub fn bind(
        shading: Shading,
        table: &UniformTable,
        uniforms: &dyn UniformSource,
        texture_on: &dyn Fn(i32, TextureKind) -> Option<&'a Texture>,
    ) -> Self {
        match shading {
            Shading::DepthOnly => Self::DepthOnly,
            Shading::LightDistance => Self::LightDistance {
                light: uniforms.vec3("light_position"),
                far_plane: uniforms.float("far_plane"),
            },
            Shading::Environment => {
                let cube = first_sampler(table, |d| d == TextureDimension::Cube).and_then(|name| {
                    texture_on(sampler_unit(uniforms, name), TextureKind::ColourCube)
                });
                Self::Environment { cube }
            }
            Shading::Textured => {
                let texture = first_sampler(table, |d| d == TextureDimension::D2).and_then(|name| {
                    texture_on(sampler_unit(uniforms, name), TextureKind::Colour2D)
                });
                Self::Textured { texture }
            }
            Shading::Lit => Self::Lit(Box::new(LitShader::bind(uniforms, texture_on))),
        }
    }
}

impl FragmentShader for DrawShader<'_> {
    fn depth(&self, varyings: &Varyings, window_depth: f32) -> f32 {
        match self {
            Self::LightDistance { light, far_plane } if *far_plane > 0.0 => {
                (varyings.world - *light).length() / far_plane
            }
            _ => window_depth,
        }
    }

    fn colour(&self, varyings: &Varyings) -> Vec4 {
        match self {
            Self::DepthOnly | Self::LightDistance { .. } => Vec4::ONE,
            Self::Environment { cube } => cube
                .and_then(|cube| cube.sample_cube(varyings.local))
                .unwrap_or(Vec4::ONE),
            Self::Textured { texture } => texture
                .and_then(|texture| texture.sample(varyings.uv))
                .unwrap_or(Vec4::ONE),
            Self::Lit(lit) => lit.shade(varyings),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LightTerms {
    colour: Vec3,
    ambient: f32,
    diffuse: f32,
}

impl LightTerms {
    fn bind(uniforms: &dyn UniformSource, prefix: &str) -> Self {
        Self {
            colour: uniforms.vec3(&format!("{}.colour", prefix)),
            ambient: uniforms.float(&format!("{}.ambient_intensity", prefix)),
            diffuse: uniforms.float(&format!("{}.diffuse_intensity", prefix)),
        }
    }
}

struct OmniShadow<'a> {
    far_plane: f32,
    map: Option<&'a Texture>,
}

impl OmniShadow<'_> {
    fn shadow(&self, light: Vec3, world: Vec3) -> f32 {
        let Some(map) = self.map else {
            return 0.0;
        };
        if self.far_plane <= 0.0 {
            return 0.0;
        }
        let frag_to_light = world - light;
        let current = frag_to_light.length() / self.far_plane - OMNI_BIAS;
        1.0 - map.compare_cube(frag_to_light, current)
    }
}

struct PointTerms<'a> {
    base: LightTerms,
    position: Vec3,
    attenuation: Attenuation,
    shadow: Option<OmniShadow<'a>>,
}

struct SpotTerms<'a> {
    point: PointTerms<'a>,
    direction: Vec3,
    edge: f32,
}

struct SunShadow<'a> {
    transform: Mat4,
    map: &'a Texture,
}

/// Forward lighting: the sun plus point and spot lights, each against its shadow map
pub(super) struct LitShader<'a> {
    eye: Vec3,
    specular_intensity: f32,
    shininess: f32,
    diffuse: Option<&'a Texture>,
    sun: LightTerms,
    sun_direction: Vec3,
    sun_shadow: Option<SunShadow<'a>>,
    points: Vec<PointTerms<'a>>,
    spots: Vec<SpotTerms<'a>>,
}

impl<'a> LitShader<'a> {
    fn bind(
        uniforms: &dyn UniformSource,
        texture_on: &dyn Fn(i32, TextureKind) -> Option<&'a Texture>,
    ) -> Self {
        let omni = |slot: usize| {
            if uniforms.int(&format!("omni_shadows[{}].shadowed", slot)) == 0 {
                return None;
            }
            let unit = sampler_unit(uniforms, &format!("omni_shadow_map_{}", slot));
            Some(OmniShadow {
                far_plane: uniforms.float(&format!("omni_shadows[{}].far_plane", slot)),
                map: texture_on(unit, TextureKind::DepthCube),
            })
        };
        let point = |prefix: &str, slot: usize| PointTerms {
            base: LightTerms::bind(uniforms, &format!("{}.base", prefix)),
            position: uniforms.vec3(&format!("{}.position", prefix)),
            attenuation: Attenuation::new(
                uniforms.float(&format!("{}.constant_term", prefix)),
                uniforms.float(&format!("{}.linear_term", prefix)),
                uniforms.float(&format!("{}.exponent_term", prefix)),
            ),
            shadow: omni(slot),
        };

        let count = |name: &str, max: usize| uniforms.int(name).clamp(0, max as i32) as usize;
        let point_count = count("point_light_count", MAX_POINT_LIGHTS);
        let spot_count = count("spot_light_count", MAX_SPOT_LIGHTS);
        let points = (0..point_count)
            .map(|i| point(&format!("point_lights[{}]", i), i))
            .collect();
        let spots = (0..spot_count)
            .map(|i| SpotTerms {
                point: point(&format!("spot_lights[{}].point", i), point_count + i),
                direction: uniforms.vec3(&format!("spot_lights[{}].direction", i)),
                edge: uniforms.float(&format!("spot_lights[{}].edge", i)),
            })
            .collect();

        let sun_shadow = if uniforms.int("directional_light.shadowed") != 0 {
            texture_on(sampler_unit(uniforms, "directional_shadow_map"), TextureKind::Depth2D).map(
                |map| SunShadow {
                    transform: uniforms.mat4("directional_light_transform"),
                    map,
                },
            )
        } else {
            None
        };

        Self {
            eye: uniforms.vec3("eye_position"),
            specular_intensity: uniforms.float("material.specular_intensity"),
            shininess: uniforms.float("material.shininess"),
            diffuse: texture_on(sampler_unit(uniforms, "diffuse_texture"), TextureKind::Colour2D),
            sun: LightTerms::bind(uniforms, "directional_light.base"),
            sun_direction: uniforms.vec3("directional_light.direction"),
            sun_shadow,
            points,
            spots,
        }
    }

    fn shade(&self, varyings: &Varyings) -> Vec4 {
        let base = self
            .diffuse
            .and_then(|texture| texture.sample(varyings.uv))
            .unwrap_or(Vec4::ONE);
        let normal = varyings.normal.normalize_or_zero();
        let world = varyings.world;

        let to_sun = (-self.sun_direction).normalize_or_zero();
        let sun_shadow = self.sun_shadow(world, normal, to_sun);
        let mut colour = self.contribution(&self.sun, to_sun, normal, world, sun_shadow);

        for light in &self.points {
            colour += self.point_contribution(light, normal, world);
        }
        for spot in &self.spots {
            colour += self.spot_contribution(spot, normal, world);
        }

        base * colour.extend(1.0)
    }

    /// `ambient + (1 - shadow) * (diffuse + specular)`
    fn contribution(
        &self,
        light: &LightTerms,
        to_light: Vec3,
        normal: Vec3,
        world: Vec3,
        shadow: f32,
    ) -> Vec3 {
        let ambient = light.colour * light.ambient;
        let diffuse_factor = normal.dot(to_light).max(0.0);
        let diffuse = light.colour * light.diffuse * diffuse_factor;

        let mut specular = Vec3::ZERO;
        if diffuse_factor > 0.0 {
            let to_eye = (self.eye - world).normalize_or_zero();
            let incident = -to_light;
            let reflected = (incident - 2.0 * normal.dot(incident) * normal).normalize_or_zero();
            let specular_factor = to_eye.dot(reflected);
            if specular_factor > 0.0 {
                let strength = specular_factor.powf(self.shininess);
                specular = light.colour * self.specular_intensity * strength;
            }
        }

        ambient + (1.0 - shadow) * (diffuse + specular)
    }

    fn point_contribution(&self, light: &PointTerms, normal: Vec3, world: Vec3) -> Vec3 {
        let offset = light.position - world;
        let shadow = light
            .shadow
            .as_ref()
            .map_or(0.0, |shadow| shadow.shadow(light.position, world));
        let to_light = offset.normalize_or_zero();
        let colour = self.contribution(&light.base, to_light, normal, world, shadow);
        colour * light.attenuation.factor(offset.length())
    }

    fn spot_contribution(&self, spot: &SpotTerms, normal: Vec3, world: Vec3) -> Vec3 {
        let ray = (world - spot.point.position).normalize_or_zero();
        let spot_factor = ray.dot(spot.direction.normalize_or_zero());
        if spot_factor <= spot.edge {
            return Vec3::ZERO;
        }
        let colour = self.point_contribution(&spot.point, normal, world);
        colour * (1.0 - (1.0 - spot_factor) / (1.0 - spot.edge))
    }

    /// 3x3 percentage-closer filter over the sun's map
    fn sun_shadow(&self, world: Vec3, normal: Vec3, to_sun: Vec3) -> f32 {
        let Some(shadow) = &self.sun_shadow else {
            return 0.0;
        };
        let light_space = shadow.transform * world.extend(1.0);
        if light_space.w == 0.0 {
            return 0.0;
        }
        let projected = light_space.truncate() / light_space.w;
        let current = projected.z * 0.5 + 0.5;
        if current > 1.0 {
            return 0.0;
        }

        let uv = projected.truncate() * 0.5 + Vec2::splat(0.5);
        let bias = (DIRECTIONAL_BIAS_SLOPE * (1.0 - normal.dot(to_sun))).max(DIRECTIONAL_BIAS_MIN);
        let texel = Vec2::new(1.0 / shadow.map.width as f32, 1.0 / shadow.map.height as f32);

        let mut lit = 0.0;
        for x in -1..=1 {
            for y in -1..=1 {
                let offset = Vec2::new(x as f32, y as f32) * texel;
                lit += shadow.map.compare(uv + offset, current - bias);
            }
        }
        1.0 - lit / 9.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Values(HashMap<String, UniformValue>);

    impl Values {
        fn set(mut self, name: &str, value: UniformValue) -> Self {
            self.0.insert(name.to_string(), value);
            self
        }
    }

    impl UniformSource for Values {
        fn value(&self, name: &str) -> Option<UniformValue> {
            self.0.get(name).copied()
        }
    }

    fn no_textures(_unit: i32, _kind: TextureKind) -> Option<&'static Texture> {
        None
    }

    fn at(world: Vec3) -> Varyings {
        Varyings { world, normal: Vec3::Y, ..Varyings::default() }
    }

    fn lamp(values: Values, prefix: &str, position: Vec3) -> Values {
        values
            .set(&format!("{}.base.colour", prefix), UniformValue::Vec3(Vec3::ONE))
            .set(&format!("{}.base.diffuse_intensity", prefix), UniformValue::Float(1.0))
            .set(&format!("{}.position", prefix), UniformValue::Vec3(position))
            .set(&format!("{}.constant_term", prefix), UniformValue::Float(1.0))
            .set(&format!("{}.linear_term", prefix), UniformValue::Float(0.09))
            .set(&format!("{}.exponent_term", prefix), UniformValue::Float(0.032))
    }

    #[test]
    fn test_ambient_only_sun() {
        let values = Values::default()
            .set("directional_light.base.colour", UniformValue::Vec3(Vec3::new(1.0, 0.5, 0.0)))
            .set("directional_light.base.ambient_intensity", UniformValue::Float(0.2))
            .set("directional_light.direction", UniformValue::Vec3(Vec3::Y));
        let shader = LitShader::bind(&values, &no_textures);

        // Sun below the surface: ambient only
        let colour = shader.shade(&at(Vec3::ZERO));
        assert!((colour - Vec4::new(0.2, 0.1, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_point_light_attenuates() {
        let values = lamp(Values::default(), "point_lights[0]", Vec3::new(0.0, 10.0, 0.0))
            .set("point_light_count", UniformValue::Int(1));
        let shader = LitShader::bind(&values, &no_textures);

        let colour = shader.shade(&at(Vec3::ZERO));
        let expected = 1.0 / (1.0 + 0.09 * 10.0 + 0.032 * 100.0);
        assert!((colour.x - expected).abs() < 1e-5, "{}", colour.x);
    }

    #[test]
    fn test_spot_cone_falloff() {
        let values = lamp(Values::default(), "spot_lights[0].point", Vec3::new(0.0, 1.0, 0.0))
            .set("spot_light_count", UniformValue::Int(1))
            .set("spot_lights[0].direction", UniformValue::Vec3(Vec3::NEG_Y))
            .set("spot_lights[0].edge", UniformValue::Float(0.5));
        let shader = LitShader::bind(&values, &no_textures);

        let centre = shader.shade(&at(Vec3::ZERO)).x;
        let inside = shader.shade(&at(Vec3::new(1.0, 0.0, 0.0))).x;
        let outside = shader.shade(&at(Vec3::new(2.0, 0.0, 0.0))).x;

        let expected_centre = 1.0 / (1.0 + 0.09 + 0.032);
        assert!((centre - expected_centre).abs() < 1e-5);
        assert!(inside > 0.0 && inside < centre);
        assert_eq!(outside, 0.0);
    }

    #[test]
    fn test_light_distance_depth() {
        let shader = DrawShader::LightDistance {
            light: Vec3::new(0.0, 3.0, 0.0),
            far_plane: 100.0,
        };
        let depth = shader.depth(&at(Vec3::ZERO), 0.9);
        assert!((depth - 0.03).abs() < 1e-6);
    }

    #[test]
    fn test_omni_shadow_darkens() {
        let mut map = Texture::depth(TextureKind::DepthCube, 4, 4);
        for depth in map.depth_layers[3].iter_mut() {
            *depth = 0.01;
        }
        let values = lamp(Values::default(), "point_lights[0]", Vec3::new(0.0, 3.0, 0.0))
            .set("point_light_count", UniformValue::Int(1))
            .set("omni_shadows[0].far_plane", UniformValue::Float(100.0))
            .set("omni_shadows[0].shadowed", UniformValue::Int(1))
            .set("omni_shadow_map_0", UniformValue::Int(3));
        let bound = |unit: i32, kind: TextureKind| (unit == 3 && kind == map.kind).then_some(&map);
        let shadowed = LitShader::bind(&values, &bound).shade(&at(Vec3::ZERO));

        let values = values.set("omni_shadows[0].shadowed", UniformValue::Int(0));
        let unshadowed = LitShader::bind(&values, &bound).shade(&at(Vec3::ZERO));

        assert_eq!(shadowed.x, 0.0);
        assert!(unshadowed.x > 0.5);
    }
}
