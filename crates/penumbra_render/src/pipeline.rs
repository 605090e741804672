//! Forward renderer
//!
//! Runs the passes of a frame in a fixed order:
//!
//! 1. Directional shadow: sun depth into its 2D map
//! 2. Omni shadows: one cube depth pass per point light, then per spot light
//! 3. Main: clear, skybox, lit scene into the default framebuffer
//! 4. Light debug (optional): the lit scene from the sun, scissored to an inset
//!
//! Shadow maps are always written before the main pass reads them. A pass
//! whose program failed to link or whose light has no shadow map is skipped
//! and recorded in the returned [`FrameStats`].

use std::f32::consts::TAU;

use glam::{Mat4, Vec3, Vec4};
use image::RgbaImage;
use penumbra_shader::{
    ShaderCompiler, ShaderSourceProvider, DIRECTIONAL_SHADOW_PROGRAM, LIT_PROGRAM,
    OMNI_SHADOW_PROGRAM,
};

use crate::camera::Camera;
use crate::config::RendererConfig;
use crate::device::{
    ClearFlags, CubeFace, CullFace, CullState, DepthState, Rect, RenderDevice, RenderTarget,
};
use crate::error::Result;
use crate::light::{
    Attenuation, DirectionalLight, Light, LightProperties, LightSet, PointLight, SpotCone, SunCycle,
};
use crate::program::ShaderProgram;
use crate::scene::{DrawContext, SceneDraw};
use crate::skybox::Skybox;
use crate::stats::{FrameStats, PassKind, SkipReason};

/// Multi-pass shadow-mapped forward renderer
#[derive(Debug)]
pub struct ForwardRenderer {
    config: RendererConfig,
    compiler: ShaderCompiler,
    directional_program: ShaderProgram,
    omni_program: ShaderProgram,
    lit_program: ShaderProgram,
    skybox: Option<Skybox>,
    lights: LightSet,
    sun: SunCycle,
    frame: u64,
}

impl ForwardRenderer {
    /// Build the lighting programs and the sun
    ///
    /// Programs that fail to compile are reported and left unlinked; only an
    /// invalid configuration is an error.
    pub fn new(
        device: &mut dyn RenderDevice,
        provider: &dyn ShaderSourceProvider,
        mut config: RendererConfig,
        sun: LightProperties,
    ) -> Result<Self> {
        config.validate()?;

        let mut compiler = ShaderCompiler::new();
        let directional_program =
            ShaderProgram::load(device, &mut compiler, provider, DIRECTIONAL_SHADOW_PROGRAM);
        let omni_program =
            ShaderProgram::load(device, &mut compiler, provider, OMNI_SHADOW_PROGRAM);
        let lit_program = ShaderProgram::load(device, &mut compiler, provider, LIT_PROGRAM);

        let cycle = SunCycle {
            angle: config.sun.start_angle.rem_euclid(TAU),
            speed: config.sun.speed,
        };
        let shadow_size = config.shadows.directional_size();
        let mut directional = DirectionalLight::new(sun, Vec3::NEG_Y, shadow_size)
            .with_bounds(config.sun.bounds)
            .with_orbit(config.sun.orbit);
        directional.follow_orbit(cycle.angle);

        let mut lights = LightSet::new(directional);
        lights.allocate_pending(device, config.shadows.enabled);

        log::info!(
            "Forward renderer ready (shadows {}, directional {}px, omni {}px)",
            if config.shadows.enabled { "on" } else { "off" },
            config.shadows.directional_resolution,
            config.shadows.omni_resolution,
        );

        Ok(Self {
            config,
            compiler,
            directional_program,
            omni_program,
            lit_program,
            skybox: None,
            lights,
            sun: cycle,
            frame: 0,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    /// Lights added here get their shadow maps at the next frame
    pub fn lights_mut(&mut self) -> &mut LightSet {
        &mut self.lights
    }

    pub fn sun(&self) -> &SunCycle {
        &self.sun
    }

    /// Jump the sun to an orbit angle
    pub fn set_sun_angle(&mut self, angle: f32) {
        self.sun.angle = angle.rem_euclid(TAU);
        self.lights.directional_mut().follow_orbit(self.sun.angle);
    }

    pub fn set_sun_speed(&mut self, speed: f32) {
        self.sun.speed = speed;
    }

    /// Frames rendered so far
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    pub fn directional_program(&self) -> &ShaderProgram {
        &self.directional_program
    }

    pub fn omni_program(&self) -> &ShaderProgram {
        &self.omni_program
    }

    pub fn lit_program(&self) -> &ShaderProgram {
        &self.lit_program
    }

    pub fn skybox(&self) -> Option<&Skybox> {
        self.skybox.as_ref()
    }

    /// Point light using the configured omni shadow settings
    pub fn point_light(
        &self,
        properties: LightProperties,
        position: Vec3,
        attenuation: Attenuation,
    ) -> PointLight {
        let shadows = &self.config.shadows;
        PointLight::new(
            properties,
            position,
            attenuation,
            shadows.omni_near,
            shadows.omni_far,
            shadows.omni_size(),
        )
    }

    /// Spot light using the configured omni shadow settings
    pub fn spot_light(
        &self,
        properties: LightProperties,
        position: Vec3,
        attenuation: Attenuation,
        cone: SpotCone,
    ) -> PointLight {
        self.point_light(properties, position, attenuation).with_cone(cone)
    }

    /// Add a point light and allocate its shadow map
    pub fn add_point_light(
        &mut self,
        device: &mut dyn RenderDevice,
        light: PointLight,
    ) -> Result<usize> {
        let index = self.lights.add_point(light)?;
        self.lights.points_mut()[index].allocate_shadow(device, self.config.shadows.enabled);
        Ok(index)
    }

    /// Add a spot light and allocate its shadow map
    pub fn add_spot_light(
        &mut self,
        device: &mut dyn RenderDevice,
        light: PointLight,
    ) -> Result<usize> {
        let index = self.lights.add_spot(light)?;
        self.lights.spots_mut()[index].allocate_shadow(device, self.config.shadows.enabled);
        Ok(index)
    }

    /// Replace the skybox
    pub fn set_skybox(
        &mut self,
        device: &mut dyn RenderDevice,
        provider: &dyn ShaderSourceProvider,
        faces: &[RgbaImage; 6],
    ) -> Result<()> {
        let skybox = Skybox::new(device, &mut self.compiler, provider, faces)?;
        if let Some(old) = self.skybox.replace(skybox) {
            old.release(device);
        }
        Ok(())
    }

    /// Step the simulation between frames
    ///
    /// Advances the sun, points the directional light from its orbit position
    /// at the origin and moves flash spot lights to the camera.
    pub fn advance(&mut self, dt: f32, camera: &dyn Camera) {
        let angle = self.sun.advance(dt);
        self.lights.directional_mut().follow_orbit(angle);
        self.lights.attach_flash_lights(camera.eye_position(), camera.forward());
    }

    /// Render one frame into the default framebuffer
    pub fn render_frame(
        &mut self,
        device: &mut dyn RenderDevice,
        camera: &dyn Camera,
        scene: &dyn SceneDraw,
    ) -> FrameStats {
        self.frame += 1;
        let allocated = self.lights.allocate_pending(device, self.config.shadows.enabled);
        if allocated > 0 {
            log::debug!("Allocated {} pending shadow maps", allocated);
        }

        let mut stats = FrameStats::new(self.frame, self.sun.angle);
        let saved_cull = device.cull_state();
        let saved_depth = device.depth_state();
        let saved_scissor = device.scissor();
        device.set_scissor(None);
        device.set_depth_state(DepthState::default());

        self.directional_shadow_pass(device, scene, &mut stats);
        self.omni_shadow_passes(device, scene, &mut stats);
        self.main_pass(device, camera, scene, &mut stats);
        self.light_debug_pass(device, scene, &mut stats);

        device.use_program(None);
        device.set_scissor(saved_scissor);
        device.set_depth_state(saved_depth);
        device.set_cull_state(saved_cull);

        stats.shadowed_lights = self.lights.shadowed_count();
        log::trace!("{}", stats.summary());
        stats
    }

    /// Free programs, skybox and shadow maps
    pub fn release(mut self, device: &mut dyn RenderDevice) {
        self.lights.release_shadows(device);
        if let Some(skybox) = self.skybox.take() {
            skybox.release(device);
        }
        self.directional_program.release(device);
        self.omni_program.release(device);
        self.lit_program.release(device);
    }

    fn directional_shadow_pass(
        &self,
        device: &mut dyn RenderDevice,
        scene: &dyn SceneDraw,
        stats: &mut FrameStats,
    ) {
        let kind = PassKind::DirectionalShadow;
        let light = self.lights.directional();
        let Some(map) = light.shadow_map() else {
            stats.skip(kind, SkipReason::ShadowDisabled);
            return;
        };
        if !self.directional_program.use_program(device) {
            stats.skip(kind, SkipReason::ProgramUnavailable);
            return;
        }

        device.set_viewport(map.viewport());
        map.write(device);
        device.clear(ClearFlags::DEPTH, Vec4::ONE);

        let saved_cull = self.cull_front_faces(device);
        self.directional_program
            .set_directional_light_transform(device, light.light_transform(self.sun.angle));
        let draws = self.draw_scene(device, &self.directional_program, kind, scene);
        device.set_cull_state(saved_cull);

        device.bind_render_target(RenderTarget::Default);
        stats.record(kind, draws);
    }

    fn omni_shadow_passes(
        &self,
        device: &mut dyn RenderDevice,
        scene: &dyn SceneDraw,
        stats: &mut FrameStats,
    ) {
        let points = self.lights.points().iter().enumerate();
        let spots = self.lights.spots().iter().enumerate();
        let points = points.map(|(i, light)| (PassKind::PointShadow(i), light));
        let spots = spots.map(|(i, light)| (PassKind::SpotShadow(i), light));

        for (kind, light) in points.chain(spots) {
            self.omni_shadow_pass(device, scene, kind, light, stats);
        }
    }

    fn omni_shadow_pass(
        &self,
        device: &mut dyn RenderDevice,
        scene: &dyn SceneDraw,
        kind: PassKind,
        light: &PointLight,
        stats: &mut FrameStats,
    ) {
        let Some(map) = light.shadow_map() else {
            stats.skip(kind, SkipReason::ShadowDisabled);
            return;
        };
        if !light.is_on() {
            stats.skip(kind, SkipReason::LightOff);
            return;
        }
        if !self.omni_program.use_program(device) {
            stats.skip(kind, SkipReason::ProgramUnavailable);
            return;
        }

        // All six faces come from one position and far plane
        let transforms = light.cube_transforms();

        device.set_viewport(map.viewport());
        map.write(device);
        device.clear(ClearFlags::DEPTH, Vec4::ONE);
        self.omni_program.set_omni_light(device, transforms.position, transforms.far_plane);

        let saved_cull = self.cull_front_faces(device);
        let mut draws = 0;
        for face in CubeFace::ALL {
            map.write_face(device, face);
            self.omni_program.set_light_matrix(device, transforms.face(face));
            draws += self.draw_scene(device, &self.omni_program, kind, scene);
        }
        device.set_cull_state(saved_cull);

        device.bind_render_target(RenderTarget::Default);
        stats.record(kind, draws);
    }

    fn main_pass(
        &self,
        device: &mut dyn RenderDevice,
        camera: &dyn Camera,
        scene: &dyn SceneDraw,
        stats: &mut FrameStats,
    ) {
        let (width, height) = device.default_framebuffer_size();
        let viewport = Rect::from_size(width, height);
        device.bind_render_target(RenderTarget::Default);
        device.set_viewport(viewport);
        device.clear(ClearFlags::ALL, Vec4::from_array(self.config.clear_colour));

        let view = camera.view_matrix();
        let projection = camera.projection_matrix(viewport.aspect());

        if let Some(skybox) = self.skybox.as_ref().filter(|_| self.config.skybox) {
            let draws = skybox.draw(device, view, projection, self.config.texture_units.skybox);
            stats.record(PassKind::Skybox, draws);
        }

        if !self.lit_program.use_program(device) {
            stats.skip(PassKind::Main, SkipReason::ProgramUnavailable);
            return;
        }
        let (points, spots) = self.bind_lighting(device, view, projection, camera.eye_position());
        stats.point_lights = points;
        stats.spot_lights = spots;

        let draws = self.draw_scene(device, &self.lit_program, PassKind::Main, scene);
        stats.record(PassKind::Main, draws);
    }

    fn light_debug_pass(
        &self,
        device: &mut dyn RenderDevice,
        scene: &dyn SceneDraw,
        stats: &mut FrameStats,
    ) {
        let Some(debug) = self.config.debug_viewport else {
            return;
        };
        if !self.lit_program.use_program(device) {
            stats.skip(PassKind::LightDebug, SkipReason::ProgramUnavailable);
            return;
        }

        let light = self.lights.directional();
        let saved_viewport = device.viewport();
        let saved_scissor = device.scissor();
        device.set_viewport(debug.rect);
        device.set_scissor(Some(debug.rect));
        device.clear(ClearFlags::ALL, Vec4::from_array(self.config.clear_colour));

        let eye = -light.direction().normalize_or_zero() * debug.distance;
        self.bind_lighting(device, light.debug_view(debug.distance), light.projection(), eye);
        let draws = self.draw_scene(device, &self.lit_program, PassKind::LightDebug, scene);

        device.set_scissor(saved_scissor);
        device.set_viewport(saved_viewport);
        stats.record(PassKind::LightDebug, draws);
    }

    /// Push camera, lights and shadow samplers to the lit program in use
    fn bind_lighting(
        &self,
        device: &mut dyn RenderDevice,
        view: Mat4,
        projection: Mat4,
        eye: Vec3,
    ) -> (usize, usize) {
        let program = &self.lit_program;
        let units = &self.config.texture_units;
        let sun = self.lights.directional();

        program.set_projection(device, projection);
        program.set_view(device, view);
        program.set_eye_position(device, eye);
        program.set_directional_light_transform(device, sun.light_transform(self.sun.angle));
        program.set_directional_light(device, sun);
        program.set_texture(device, units.diffuse);

        program.set_directional_shadow_map(device, units.directional_shadow);
        match sun.shadow_map() {
            Some(map) => map.read(device, units.directional_shadow),
            None => device.bind_texture(units.directional_shadow, None),
        }

        let points =
            program.set_point_lights(device, self.lights.points(), units.omni_unit(0), 0);
        let spots = program.set_spot_lights(
            device,
            self.lights.spots(),
            units.omni_unit(points),
            points,
        );

        let omni = self.lights.points()[..points].iter().chain(&self.lights.spots()[..spots]);
        for (slot, light) in omni.enumerate() {
            let unit = units.omni_unit(slot);
            match light.shadow_map().filter(|_| light.is_on()) {
                Some(map) => map.read(device, unit),
                None => device.bind_texture(unit, None),
            }
        }
        (points, spots)
    }

    /// Switch to front-face culling if configured; returns the state to restore
    fn cull_front_faces(&self, device: &mut dyn RenderDevice) -> CullState {
        let saved = device.cull_state();
        if self.config.shadows.front_face_culling {
            device.set_cull_state(CullState {
                enabled: true,
                face: CullFace::Front,
            });
        }
        saved
    }

    fn draw_scene(
        &self,
        device: &mut dyn RenderDevice,
        program: &ShaderProgram,
        kind: PassKind,
        scene: &dyn SceneDraw,
    ) -> u32 {
        let mut ctx = DrawContext::new(device, program, kind, self.config.texture_units.diffuse);
        scene.draw(&mut ctx);
        ctx.draw_calls()
    }
}
