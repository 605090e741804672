//! Software reference device
//!
//! A CPU implementation of [`RenderDevice`] with GL state semantics. Vertex
//! positions are transformed by the program's reflected clip transform and
//! each program's fragment stage is reproduced from its reflected interface
//! (see the `shading` module): depth passes store window depth, omni passes
//! store light distance over the far plane, the lit program evaluates the
//! full lighting model against the bound shadow maps.
//!
//! Depth planes, cube faces and the default framebuffer can be read back, and
//! an optional command trace records the order of state changes and draws.

use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3, Vec4};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use penumbra_shader::{ClipTransform, CompiledProgram, ScalarType, UniformKind, UniformTable};

use super::raster::{self, ClipVertex, RasterState, Surface, Varyings};
use super::shading::{DrawShader, Shading, UniformSource};
use super::texture::{Texture, TextureKind};
use super::{
    ClearFlags, CubeFace, CullState, DepthState, FramebufferId, FramebufferStatus, MeshId,
    ProgramId, Rect, RenderDevice, RenderTarget, TextureId, UniformLocation, UniformValue, Vertex,
    MISSING_UNIFORM,
};
use crate::error::DeviceError;

/// Limits of the software device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftwareLimits {
    /// Largest texture edge
    pub max_texture_size: u32,
    /// Largest attachment edge a framebuffer accepts
    pub max_framebuffer_size: u32,
    /// Texture units available to a program
    pub max_texture_units: u32,
}

impl Default for SoftwareLimits {
    fn default() -> Self {
        Self {
            max_texture_size: 4096,
            max_framebuffer_size: 4096,
            max_texture_units: 16,
        }
    }
}

/// Recorded device command
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    BindTarget(RenderTarget),
    Viewport(Rect),
    Scissor(Option<Rect>),
    Cull(CullState),
    Depth(DepthState),
    Clear { target: RenderTarget, flags: ClearFlags },
    UseProgram(Option<ProgramId>),
    BindTexture { unit: u32, texture: Option<TextureId> },
    Draw { target: RenderTarget, program: Option<ProgramId>, mesh: MeshId, fragments: u32 },
}

#[derive(Debug)]
struct Framebuffer {
    depth: TextureId,
}

#[derive(Debug)]
struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

#[derive(Debug)]
struct Program {
    name: String,
    uniforms: UniformTable,
    clip: ClipTransform,
    shading: Shading,
    values: Vec<Option<UniformValue>>,
}

impl UniformSource for Program {
    fn value(&self, name: &str) -> Option<UniformValue> {
        let location = self.uniforms.location(name)?;
        self.values.get(location as usize).copied().flatten()
    }
}

impl Program {
    // Unset matrices read as zero
    fn clip_matrix(&self) -> Mat4 {
        self.clip
            .factors
            .iter()
            .fold(Mat4::IDENTITY, |acc, name| acc * self.mat4(name))
    }

    /// Run the vertex stage over a mesh
    fn assemble(&self, mesh: &Mesh) -> Vec<[ClipVertex; 3]> {
        let clip_matrix = self.clip_matrix();
        let model = match self.uniforms.location("model") {
            Some(_) => self.mat4("model"),
            None => Mat4::IDENTITY,
        };
        let swizzle = self.clip.swizzle;

        let vertices: Vec<ClipVertex> = mesh
            .vertices
            .iter()
            .map(|vertex| {
                let local = Vec3::from_array(vertex.position);
                let clip = clip_matrix * local.extend(1.0);
                let position = match swizzle {
                    Some(pattern) => Vec4::new(
                        clip[pattern[0]],
                        clip[pattern[1]],
                        clip[pattern[2]],
                        clip[pattern[3]],
                    ),
                    None => clip,
                };
                let varyings = Varyings {
                    local,
                    world: (model * local.extend(1.0)).truncate(),
                    normal: (model * Vec3::from_array(vertex.normal).extend(0.0)).truncate(),
                    uv: Vec2::from_array(vertex.uv),
                };
                ClipVertex::new(position, varyings)
            })
            .collect();

        mesh.indices
            .chunks_exact(3)
            .map(|tri| {
                [
                    vertices[tri[0] as usize],
                    vertices[tri[1] as usize],
                    vertices[tri[2] as usize],
                ]
            })
            .collect()
    }
}

/// Texture bound to a unit, if it has the kind a sampler expects
fn texture_on_unit<'a>(
    textures: &'a HashMap<u32, Texture>,
    units: &[Option<TextureId>],
    unit: i32,
    kind: TextureKind,
) -> Option<&'a Texture> {
    let unit = usize::try_from(unit).ok()?;
    let id = units.get(unit).copied().flatten()?;
    textures.get(&id.0).filter(|texture| texture.kind == kind)
}

fn accepts(kind: UniformKind, value: &UniformValue) -> bool {
    match (kind, value) {
        (UniformKind::Scalar(ScalarType::Float), UniformValue::Float(_)) => true,
        (UniformKind::Scalar(ScalarType::Float), UniformValue::Int(_)) => false,
        (UniformKind::Scalar(_), UniformValue::Int(_)) => true,
        (UniformKind::Sampler { .. }, UniformValue::Int(_)) => true,
        (UniformKind::Vector { size: 3, .. }, UniformValue::Vec3(_)) => true,
        (UniformKind::Vector { size: 4, .. }, UniformValue::Vec4(_)) => true,
        (UniformKind::Matrix { columns: 4, rows: 4 }, UniformValue::Mat4(_)) => true,
        _ => false,
    }
}

/// CPU implementation of [`RenderDevice`]
pub struct SoftwareDevice {
    limits: SoftwareLimits,
    width: u32,
    height: u32,
    colour: Vec<Vec4>,
    depth: Vec<f32>,

    textures: HashMap<u32, Texture>,
    framebuffers: HashMap<u32, Framebuffer>,
    meshes: HashMap<u32, Mesh>,
    programs: HashMap<u32, Program>,
    next_id: u32,

    target: RenderTarget,
    viewport: Rect,
    scissor: Option<Rect>,
    cull: CullState,
    depth_state: DepthState,
    active_program: Option<ProgramId>,
    units: Vec<Option<TextureId>>,

    tracing: bool,
    events: Vec<DeviceEvent>,
}

impl SoftwareDevice {
    /// Create a device with a `width`x`height` default framebuffer
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_limits(width, height, SoftwareLimits::default())
    }

    /// Create a device with explicit limits
    pub fn with_limits(width: u32, height: u32, limits: SoftwareLimits) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            limits,
            width,
            height,
            colour: vec![Vec4::ZERO; pixels],
            depth: vec![1.0; pixels],
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            meshes: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            target: RenderTarget::Default,
            viewport: Rect::from_size(width, height),
            scissor: None,
            cull: CullState::default(),
            depth_state: DepthState::default(),
            active_program: None,
            units: vec![None; limits.max_texture_units as usize],
            tracing: false,
            events: Vec::new(),
        }
    }

    /// Device limits
    pub fn limits(&self) -> SoftwareLimits {
        self.limits
    }

    /// Start or stop recording [`DeviceEvent`]s
    pub fn set_tracing(&mut self, enabled: bool) {
        self.tracing = enabled;
    }

    /// Recorded commands
    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    /// Drain recorded commands
    pub fn take_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Default framebuffer colour plane, bottom row first
    pub fn colour_buffer(&self) -> &[Vec4] {
        &self.colour
    }

    /// Default framebuffer depth plane, bottom row first
    pub fn depth_buffer(&self) -> &[f32] {
        &self.depth
    }

    /// Default framebuffer colour at a pixel
    pub fn colour_at(&self, x: u32, y: u32) -> Option<Vec4> {
        (x < self.width && y < self.height).then(|| self.colour[(y * self.width + x) as usize])
    }

    /// Default framebuffer depth at a pixel
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.depth[(y * self.width + x) as usize])
    }

    /// Depth plane of a 2D depth texture
    pub fn depth_texture(&self, texture: TextureId) -> Option<&[f32]> {
        let texture = self.textures.get(&texture.0)?;
        match texture.kind {
            TextureKind::Depth2D => texture.depth_layers.first().map(Vec::as_slice),
            _ => None,
        }
    }

    /// Depth plane of one cube face
    pub fn depth_cube_face(&self, texture: TextureId, face: CubeFace) -> Option<&[f32]> {
        let texture = self.textures.get(&texture.0)?;
        match texture.kind {
            TextureKind::DepthCube => texture.depth_layers.get(face.index()).map(Vec::as_slice),
            _ => None,
        }
    }

    /// Size of a texture
    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture.0).map(|t| (t.width, t.height))
    }

    /// Texture bound to a unit
    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.units.get(unit as usize).copied().flatten()
    }

    /// Program currently in use
    pub fn active_program(&self) -> Option<ProgramId> {
        self.active_program
    }

    /// Name a program was linked from
    pub fn program_name(&self, program: ProgramId) -> Option<&str> {
        self.programs.get(&program.0).map(|p| p.name.as_str())
    }

    /// Last value set for a named uniform
    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        self.programs.get(&program.0)?.value(name)
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of live framebuffers
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Default framebuffer as an image, top row first
    pub fn colour_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let c = self.colour[((self.height - 1 - y) * self.width + x) as usize];
            let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgba([to_byte(c.x), to_byte(c.y), to_byte(c.z), to_byte(c.w)])
        })
    }

    /// Depth texture layer as a grayscale image, top row first
    pub fn depth_image(&self, texture: TextureId, layer: usize) -> Option<GrayImage> {
        let texture = self.textures.get(&texture.0)?;
        let plane = texture.depth_layers.get(layer)?;
        let (width, height) = (texture.width, texture.height);
        Some(GrayImage::from_fn(width, height, |x, y| {
            let depth = plane[((height - 1 - y) * width + x) as usize];
            Luma([(depth.clamp(0.0, 1.0) * 255.0).round() as u8])
        }))
    }

    fn record(&mut self, event: DeviceEvent) {
        if self.tracing {
            self.events.push(event);
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::EmptyTexture { width, height });
        }
        let max = self.limits.max_texture_size;
        if width > max || height > max {
            return Err(DeviceError::UnsupportedSize { width, height, max });
        }
        Ok(())
    }

    fn insert_texture(&mut self, texture: Texture) -> TextureId {
        let id = self.allocate_id();
        log::debug!(
            "Created {:?} texture {} ({}x{})",
            texture.kind,
            id,
            texture.width,
            texture.height
        );
        self.textures.insert(id, texture);
        TextureId(id)
    }

    fn create_depth(
        &mut self,
        width: u32,
        height: u32,
        kind: TextureKind,
    ) -> Result<TextureId, DeviceError> {
        self.check_size(width, height)?;
        Ok(self.insert_texture(Texture::depth(kind, width, height)))
    }

    /// Depth attachment behind a target and the layers it addresses
    fn target_layers(&self, target: RenderTarget) -> Option<(u32, std::ops::Range<usize>)> {
        let (framebuffer, face) = match target {
            RenderTarget::Default => return None,
            RenderTarget::Framebuffer(fb) => (fb, None),
            RenderTarget::CubeFace(fb, face) => (fb, Some(face)),
        };
        let attachment = self.framebuffers.get(&framebuffer.0)?.depth;
        let texture = self.textures.get(&attachment.0)?;
        let layers = match (texture.kind, face) {
            (TextureKind::DepthCube, Some(face)) => face.index()..face.index() + 1,
            (TextureKind::DepthCube, None) => 0..6,
            (_, None) => 0..1,
            (_, Some(_)) => return None,
        };
        Some((attachment.0, layers))
    }

    fn target_size(&self) -> (u32, u32) {
        match self.target_layers(self.target) {
            Some((texture, _)) => self
                .textures
                .get(&texture)
                .map(|t| (t.width, t.height))
                .unwrap_or((0, 0)),
            None => (self.width, self.height),
        }
    }
}

/// Shade and rasterize assembled triangles onto a surface
fn rasterize(
    program: &Program,
    triangles: Vec<[ClipVertex; 3]>,
    textures: &HashMap<u32, Texture>,
    units: &[Option<TextureId>],
    state: &RasterState,
    surface: &mut Surface,
) -> u32 {
    let texture_on = |unit: i32, kind: TextureKind| texture_on_unit(textures, units, unit, kind);
    let shader = DrawShader::bind(program.shading, &program.uniforms, program, &texture_on);
    triangles
        .into_iter()
        .map(|triangle| raster::draw_triangle(triangle, state, &shader, surface))
        .sum()
}

fn clear_plane(plane: &mut [f32], width: u32, height: u32, region: Rect, value: f32) {
    let region = region.intersect(&Rect::from_size(width, height));
    for y in region.y..region.y + region.height as i32 {
        let row = y as usize * width as usize;
        for x in region.x..region.x + region.width as i32 {
            plane[row + x as usize] = value;
        }
    }
}

impl RenderDevice for SoftwareDevice {
    fn create_depth_texture(&mut self, width: u32, height: u32) -> Result<TextureId, DeviceError> {
        self.create_depth(width, height, TextureKind::Depth2D)
    }

    fn create_depth_cube(&mut self, width: u32, height: u32) -> Result<TextureId, DeviceError> {
        self.create_depth(width, height, TextureKind::DepthCube)
    }

    fn create_colour_texture(&mut self, image: &RgbaImage) -> Result<TextureId, DeviceError> {
        self.check_size(image.width(), image.height())?;
        Ok(self.insert_texture(Texture::colour(
            TextureKind::Colour2D,
            std::slice::from_ref(image),
        )))
    }

    fn create_colour_cube(&mut self, faces: &[RgbaImage; 6]) -> Result<TextureId, DeviceError> {
        let (width, height) = faces[0].dimensions();
        self.check_size(width, height)?;
        if faces.iter().any(|face| face.dimensions() != (width, height)) {
            return Err(DeviceError::MismatchedCubeFaces);
        }
        Ok(self.insert_texture(Texture::colour(TextureKind::ColourCube, faces)))
    }

    fn create_framebuffer(&mut self, depth: TextureId) -> Result<FramebufferId, DeviceError> {
        let texture = self.textures.get(&depth.0).ok_or(DeviceError::UnknownTexture(depth))?;
        if !texture.is_depth() {
            return Err(DeviceError::InvalidAttachment(format!(
                "texture {} is not a depth texture",
                depth.0
            )));
        }
        let id = self.allocate_id();
        self.framebuffers.insert(id, Framebuffer { depth });
        log::debug!("Created framebuffer {} with depth attachment {}", id, depth.0);
        Ok(FramebufferId(id))
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(fb) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::MissingAttachment;
        };
        match self.textures.get(&fb.depth.0) {
            None => FramebufferStatus::MissingAttachment,
            Some(texture) if !texture.is_depth() => FramebufferStatus::IncompleteAttachment,
            Some(texture) => {
                let max = self.limits.max_framebuffer_size;
                if texture.width > max || texture.height > max {
                    FramebufferStatus::IncompleteAttachment
                } else {
                    FramebufferStatus::Complete
                }
            }
        }
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<MeshId, DeviceError> {
        if indices.len() % 3 != 0 {
            return Err(DeviceError::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(DeviceError::InvalidMesh(format!(
                "index {} out of range for {} vertices",
                bad,
                vertices.len()
            )));
        }
        let id = self.allocate_id();
        self.meshes.insert(
            id,
            Mesh {
                vertices: vertices.to_vec(),
                indices: indices.to_vec(),
            },
        );
        log::debug!(
            "Uploaded mesh {} ({} vertices, {} indices)",
            id,
            vertices.len(),
            indices.len()
        );
        Ok(MeshId(id))
    }

    fn create_program(&mut self, program: &CompiledProgram) -> Result<ProgramId, DeviceError> {
        let samplers = program.uniforms.sampler_count();
        if samplers > self.limits.max_texture_units as usize {
            return Err(DeviceError::ProgramLink {
                name: program.name.clone(),
                reason: format!(
                    "{} samplers exceed {} texture units",
                    samplers, self.limits.max_texture_units
                ),
            });
        }
        let shading = Shading::select(&program.name, program.outputs, &program.uniforms);
        let id = self.allocate_id();
        log::debug!("Linked program '{}' as {} ({:?} fragments)", program.name, id, shading);
        self.programs.insert(
            id,
            Program {
                name: program.name.clone(),
                uniforms: program.uniforms.clone(),
                clip: program.clip.clone(),
                shading,
                values: vec![None; program.uniforms.len()],
            },
        );
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.active_program == Some(program) {
            self.active_program = None;
        }
        self.programs.remove(&program.0);
    }

    fn delete_texture(&mut self, texture: TextureId) {
        for unit in self.units.iter_mut() {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
        self.textures.remove(&texture.0);
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        let bound = match self.target {
            RenderTarget::Framebuffer(fb) | RenderTarget::CubeFace(fb, _) => fb == framebuffer,
            RenderTarget::Default => false,
        };
        if bound {
            self.target = RenderTarget::Default;
        }
        self.framebuffers.remove(&framebuffer.0);
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        self.meshes.remove(&mesh.0);
    }

    fn bind_render_target(&mut self, target: RenderTarget) {
        self.target = target;
        self.record(DeviceEvent::BindTarget(target));
    }

    fn render_target(&self) -> RenderTarget {
        self.target
    }

    fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
        self.record(DeviceEvent::Viewport(viewport));
    }

    fn viewport(&self) -> Rect {
        self.viewport
    }

    fn set_scissor(&mut self, scissor: Option<Rect>) {
        self.scissor = scissor;
        self.record(DeviceEvent::Scissor(scissor));
    }

    fn scissor(&self) -> Option<Rect> {
        self.scissor
    }

    fn set_cull_state(&mut self, state: CullState) {
        self.cull = state;
        self.record(DeviceEvent::Cull(state));
    }

    fn cull_state(&self) -> CullState {
        self.cull
    }

    fn set_depth_state(&mut self, state: DepthState) {
        self.depth_state = state;
        self.record(DeviceEvent::Depth(state));
    }

    fn depth_state(&self) -> DepthState {
        self.depth_state
    }

    fn clear(&mut self, flags: ClearFlags, colour: Vec4) {
        let target = self.target;
        self.record(DeviceEvent::Clear { target, flags });

        let (width, height) = self.target_size();
        let region = self.scissor.unwrap_or(Rect::from_size(width, height));
        let clear_depth = flags.depth && self.depth_state.write;

        match self.target_layers(target) {
            None if target == RenderTarget::Default => {
                if flags.colour {
                    let region = region.intersect(&Rect::from_size(width, height));
                    for y in region.y..region.y + region.height as i32 {
                        for x in region.x..region.x + region.width as i32 {
                            self.colour[y as usize * width as usize + x as usize] = colour;
                        }
                    }
                }
                if clear_depth {
                    clear_plane(&mut self.depth, width, height, region, 1.0);
                }
            }
            None => log::warn!("Clear on incomplete render target {:?} ignored", target),
            Some((texture, layers)) => {
                if !clear_depth {
                    return;
                }
                if let Some(texture) = self.textures.get_mut(&texture) {
                    for layer in layers {
                        clear_plane(&mut texture.depth_layers[layer], width, height, region, 1.0);
                    }
                }
            }
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        if let Some(id) = program {
            if !self.programs.contains_key(&id.0) {
                log::warn!("use_program: unknown program {}", id.0);
                return;
            }
        }
        self.active_program = program;
        self.record(DeviceEvent::UseProgram(program));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> UniformLocation {
        self.programs
            .get(&program.0)
            .and_then(|p| p.uniforms.location(name))
            .unwrap_or(MISSING_UNIFORM)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        if location == MISSING_UNIFORM {
            return;
        }
        let Some(id) = self.active_program else {
            log::warn!("set_uniform({}) with no program in use", location);
            return;
        };
        let Some(program) = self.programs.get_mut(&id.0) else {
            return;
        };
        let Some(slot) = program.uniforms.slot(location) else {
            log::warn!("Program '{}' has no uniform at location {}", program.name, location);
            return;
        };
        if !accepts(slot.kind, &value) {
            log::warn!(
                "Ignoring {:?} for uniform '{}' of kind {:?} in '{}'",
                value,
                slot.name,
                slot.kind,
                program.name
            );
            return;
        }
        program.values[location as usize] = Some(value);
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        let Some(slot) = self.units.get_mut(unit as usize) else {
            let max = self.limits.max_texture_units;
            log::warn!("Texture unit {} exceeds device limit {}", unit, max);
            return;
        };
        *slot = texture;
        self.record(DeviceEvent::BindTexture { unit, texture });
    }

    fn draw_mesh(&mut self, mesh_id: MeshId) {
        let target = self.target;
        let program_id = self.active_program;

        let Some(program) = program_id.and_then(|id| self.programs.get(&id.0)) else {
            log::warn!("draw_mesh({}) with no program in use", mesh_id.0);
            return;
        };
        let Some(mesh) = self.meshes.get(&mesh_id.0) else {
            log::warn!("draw_mesh: unknown mesh {}", mesh_id.0);
            return;
        };

        let triangles = program.assemble(mesh);
        let state = RasterState {
            viewport: self.viewport,
            scissor: self.scissor,
            cull: self.cull,
            depth: self.depth_state,
        };

        let (width, height) = self.target_size();
        let mut fragments = 0;

        match self.target_layers(target) {
            None if target == RenderTarget::Default => {
                let mut surface = Surface {
                    width,
                    height,
                    depth: &mut self.depth,
                    colour: Some(&mut self.colour),
                };
                let (textures, units) = (&self.textures, &self.units);
                fragments = rasterize(program, triangles, textures, units, &state, &mut surface);
            }
            None => log::warn!("Draw to incomplete render target {:?} ignored", target),
            Some((attachment, layers)) => {
                // The attachment is detached while drawing so it can never be sampled
                if let Some(mut texture) = self.textures.remove(&attachment) {
                    // Layered targets without a face select the first layer
                    if let Some(plane) = texture.depth_layers.get_mut(layers.start) {
                        let mut surface = Surface { width, height, depth: plane, colour: None };
                        fragments = rasterize(
                            program,
                            triangles,
                            &self.textures,
                            &self.units,
                            &state,
                            &mut surface,
                        );
                    }
                    self.textures.insert(attachment, texture);
                }
            }
        }

        self.record(DeviceEvent::Draw {
            target,
            program: program_id,
            mesh: mesh_id,
            fragments,
        });
    }

    fn default_framebuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DepthFunc;
    use penumbra_shader::{ShaderCompiler, ShaderSource};

    const FLAT: &str = r#"
        @group(0) @binding(0) var<uniform> mvp: mat4x4<f32>;

        @vertex
        fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
            return mvp * vec4<f32>(pos, 1.0);
        }

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0, 1.0, 1.0, 1.0);
        }
    "#;

    fn quad(z: f32) -> (Vec<Vertex>, Vec<u32>) {
        let v = |x: f32, y: f32| Vertex::new([x, y, z], [0.0, 0.0], [0.0, 0.0, 1.0]);
        (
            vec![v(-1.0, -1.0), v(1.0, -1.0), v(1.0, 1.0), v(-1.0, 1.0)],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    fn flat_program(device: &mut SoftwareDevice) -> ProgramId {
        let compiled = ShaderCompiler::new().compile(&ShaderSource::new("flat", FLAT)).unwrap();
        device.create_program(&compiled).unwrap()
    }

    #[test]
    fn test_texture_size_limit() {
        let mut device = SoftwareDevice::with_limits(
            8,
            8,
            SoftwareLimits { max_texture_size: 64, ..Default::default() },
        );
        assert!(device.create_depth_texture(64, 64).is_ok());
        let err = device.create_depth_texture(128, 64).unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedSize { max: 64, .. }));
        assert!(matches!(device.create_depth_cube(0, 4), Err(DeviceError::EmptyTexture { .. })));
    }

    #[test]
    fn test_framebuffer_completeness() {
        let mut device = SoftwareDevice::with_limits(
            8,
            8,
            SoftwareLimits { max_framebuffer_size: 32, ..Default::default() },
        );
        let small = device.create_depth_texture(32, 32).unwrap();
        let large = device.create_depth_texture(64, 64).unwrap();

        let fb = device.create_framebuffer(small).unwrap();
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::Complete);

        let fb = device.create_framebuffer(large).unwrap();
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::IncompleteAttachment);

        device.delete_texture(large);
        assert_eq!(device.framebuffer_status(fb), FramebufferStatus::MissingAttachment);
    }

    #[test]
    fn test_unset_matrix_draws_nothing() {
        let mut device = SoftwareDevice::new(4, 4);
        let program = flat_program(&mut device);
        let (vertices, indices) = quad(0.0);
        let mesh = device.create_mesh(&vertices, &indices).unwrap();

        device.use_program(Some(program));
        device.draw_mesh(mesh);
        assert!(device.depth_buffer().iter().all(|&d| d == 1.0));

        let location = device.uniform_location(program, "mvp");
        device.set_uniform(location, UniformValue::Mat4(Mat4::IDENTITY));
        device.draw_mesh(mesh);
        assert!(device.depth_buffer().iter().all(|&d| (d - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_missing_and_mismatched_uniforms_are_ignored() {
        let mut device = SoftwareDevice::new(4, 4);
        let program = flat_program(&mut device);
        device.use_program(Some(program));

        assert_eq!(device.uniform_location(program, "nothing"), MISSING_UNIFORM);
        device.set_uniform(MISSING_UNIFORM, UniformValue::Float(1.0));

        let location = device.uniform_location(program, "mvp");
        device.set_uniform(location, UniformValue::Float(2.0));
        assert_eq!(device.uniform_value(program, "mvp"), None);
    }

    #[test]
    fn test_scissored_clear() {
        let mut device = SoftwareDevice::new(4, 4);
        device.clear(ClearFlags::ALL, Vec4::new(1.0, 0.0, 0.0, 1.0));

        device.set_scissor(Some(Rect::new(0, 0, 2, 2)));
        device.clear(ClearFlags::COLOUR, Vec4::new(0.0, 0.0, 1.0, 1.0));
        device.set_scissor(None);

        assert_eq!(device.colour_at(0, 0), Some(Vec4::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(device.colour_at(3, 3), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_depth_clear_respects_write_mask() {
        let mut device = SoftwareDevice::new(4, 4);
        let program = flat_program(&mut device);
        let (vertices, indices) = quad(0.0);
        let mesh = device.create_mesh(&vertices, &indices).unwrap();
        device.use_program(Some(program));
        let location = device.uniform_location(program, "mvp");
        device.set_uniform(location, UniformValue::Mat4(Mat4::IDENTITY));
        device.draw_mesh(mesh);

        device.set_depth_state(DepthState { test: true, func: DepthFunc::Less, write: false });
        device.clear(ClearFlags::DEPTH, Vec4::ZERO);
        assert_eq!(device.depth_at(1, 1), Some(0.5));

        device.set_depth_state(DepthState::default());
        device.clear(ClearFlags::DEPTH, Vec4::ZERO);
        assert_eq!(device.depth_at(1, 1), Some(1.0));
    }

    #[test]
    fn test_cube_face_target() {
        let mut device = SoftwareDevice::new(4, 4);
        let program = flat_program(&mut device);
        let (vertices, indices) = quad(0.0);
        let mesh = device.create_mesh(&vertices, &indices).unwrap();
        let cube = device.create_depth_cube(4, 4).unwrap();
        let fb = device.create_framebuffer(cube).unwrap();

        device.bind_render_target(RenderTarget::CubeFace(fb, CubeFace::NegativeY));
        device.set_viewport(Rect::from_size(4, 4));
        device.use_program(Some(program));
        let location = device.uniform_location(program, "mvp");
        device.set_uniform(location, UniformValue::Mat4(Mat4::IDENTITY));
        device.draw_mesh(mesh);

        for face in CubeFace::ALL {
            let plane = device.depth_cube_face(cube, face).unwrap();
            let expected = if face == CubeFace::NegativeY { 0.5 } else { 1.0 };
            assert!(plane.iter().all(|&d| (d - expected).abs() < 1e-6), "{:?}", face);
        }

        device.bind_render_target(RenderTarget::Framebuffer(fb));
        device.clear(ClearFlags::DEPTH, Vec4::ZERO);
        let below = device.depth_cube_face(cube, CubeFace::NegativeY).unwrap();
        assert!(below.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn test_trace_records_order() {
        let mut device = SoftwareDevice::new(2, 2);
        device.set_tracing(true);
        device.bind_render_target(RenderTarget::Default);
        device.clear(ClearFlags::ALL, Vec4::ZERO);

        let events = device.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DeviceEvent::BindTarget(RenderTarget::Default)));
        assert!(matches!(events[1], DeviceEvent::Clear { .. }));
        assert!(device.events().is_empty());
    }

    #[test]
    fn test_colour_follows_bound_texture() {
        let sampled = r#"
            @group(0) @binding(0) var<uniform> mvp: mat4x4<f32>;
            @group(0) @binding(1) var tex: texture_2d<f32>;
            @group(0) @binding(2) var tex_sampler: sampler;

            @vertex
            fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
                return mvp * vec4<f32>(pos, 1.0);
            }

            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return textureSample(tex, tex_sampler, vec2<f32>(0.5, 0.5));
            }
        "#;
        let mut device = SoftwareDevice::new(4, 4);
        let source = ShaderSource::new("sampled", sampled);
        let compiled = ShaderCompiler::new().compile(&source).unwrap();
        let program = device.create_program(&compiled).unwrap();
        let red = device
            .create_colour_texture(&RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])))
            .unwrap();
        let (vertices, indices) = quad(1.0);
        let mesh = device.create_mesh(&vertices, &indices).unwrap();

        device.use_program(Some(program));
        let mvp = device.uniform_location(program, "mvp");
        device.set_uniform(mvp, UniformValue::Mat4(Mat4::IDENTITY));
        let tex = device.uniform_location(program, "tex");
        device.set_uniform(tex, UniformValue::Int(3));
        device.bind_texture(3, Some(red));
        device.set_depth_state(DepthState { test: true, func: DepthFunc::LessEqual, write: true });
        device.draw_mesh(mesh);

        assert_eq!(device.colour_at(2, 2), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_program_link_sampler_limit() {
        let mut device = SoftwareDevice::with_limits(
            4,
            4,
            SoftwareLimits { max_texture_units: 1, ..Default::default() },
        );
        let source = ShaderSource::new(
            "two_samplers",
            r#"
            @group(0) @binding(0) var a: texture_2d<f32>;
            @group(0) @binding(1) var b: texture_2d<f32>;
            @group(0) @binding(2) var s: sampler;

            @vertex
            fn vs_main() -> @builtin(position) vec4<f32> {
                return vec4<f32>(0.0, 0.0, 0.0, 1.0);
            }

            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                let uv = vec2<f32>(0.0, 0.0);
                return textureSample(a, s, uv) + textureSample(b, s, uv);
            }
            "#,
        );
        let compiled = ShaderCompiler::new().compile(&source).unwrap();
        let err = device.create_program(&compiled).unwrap_err();
        assert!(matches!(err, DeviceError::ProgramLink { .. }));
    }

    #[test]
    fn test_light_distance_program_writes_linear_depth() {
        let mut device = SoftwareDevice::new(4, 4);
        let compiled = ShaderCompiler::new()
            .compile_named(&penumbra_shader::BuiltinShaders, penumbra_shader::OMNI_SHADOW_PROGRAM)
            .unwrap();
        let program = device.create_program(&compiled).unwrap();
        let floor = [
            Vertex::new([-10.0, 0.0, 10.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([10.0, 0.0, 10.0], [1.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([10.0, 0.0, -10.0], [1.0, 1.0], [0.0, 1.0, 0.0]),
            Vertex::new([-10.0, 0.0, -10.0], [0.0, 1.0], [0.0, 1.0, 0.0]),
        ];
        let mesh = device.create_mesh(&floor, &[0, 1, 2, 0, 2, 3]).unwrap();
        let cube = device.create_depth_cube(16, 16).unwrap();
        let fb = device.create_framebuffer(cube).unwrap();

        let light = glam::Vec3::new(0.0, 3.0, 0.0);
        let transforms = crate::shadow::CubeTransforms::new(light, 0.1, 100.0, 1.0);
        device.bind_render_target(RenderTarget::CubeFace(fb, CubeFace::NegativeY));
        device.set_viewport(Rect::from_size(16, 16));
        device.use_program(Some(program));
        let set = |device: &mut SoftwareDevice, name: &str, value: UniformValue| {
            let location = device.uniform_location(program, name);
            device.set_uniform(location, value);
        };
        set(&mut device, "model", UniformValue::Mat4(Mat4::IDENTITY));
        set(&mut device, "light_matrix", UniformValue::Mat4(transforms.face(CubeFace::NegativeY)));
        set(&mut device, "light_position", UniformValue::Vec3(light));
        set(&mut device, "far_plane", UniformValue::Float(100.0));
        device.draw_mesh(mesh);

        let plane = device.depth_cube_face(cube, CubeFace::NegativeY).unwrap();
        // Texel next to the face centre looks almost straight down
        let centre = plane[8 * 16 + 8];
        assert!((centre - 0.03).abs() < 1e-3, "centre depth {}", centre);
        // Distance grows towards the corners
        assert!(plane[0] > centre);
        assert!(plane.iter().all(|&d| d < 1.0));
    }

    #[test]
    fn test_cube_sampling_program_reads_faces() {
        let sky = r#"
            @group(0) @binding(0) var<uniform> mvp: mat4x4<f32>;
            @group(0) @binding(1) var sky: texture_cube<f32>;
            @group(0) @binding(2) var sky_sampler: sampler;

            struct VertexOutput {
                @builtin(position) clip: vec4<f32>,
                @location(0) direction: vec3<f32>,
            }

            @vertex
            fn vs_main(@location(0) pos: vec3<f32>) -> VertexOutput {
                return VertexOutput(mvp * vec4<f32>(pos, 1.0), pos);
            }

            @fragment
            fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
                return textureSample(sky, sky_sampler, in.direction);
            }
        "#;
        let mut device = SoftwareDevice::new(4, 4);
        let compiled = ShaderCompiler::new().compile(&ShaderSource::new("sky", sky)).unwrap();
        let program = device.create_program(&compiled).unwrap();
        let faces: [RgbaImage; 6] =
            std::array::from_fn(|i| RgbaImage::from_pixel(2, 2, Rgba([40 * i as u8, 0, 0, 255])));
        let cube = device.create_colour_cube(&faces).unwrap();
        // Object-space directions all have +Z as their major axis
        let (mut vertices, indices) = quad(0.5);
        for vertex in vertices.iter_mut() {
            vertex.position[0] *= 0.25;
            vertex.position[1] *= 0.25;
        }
        let mesh = device.create_mesh(&vertices, &indices).unwrap();

        device.use_program(Some(program));
        let mvp = device.uniform_location(program, "mvp");
        let flatten = Mat4::from_scale(glam::Vec3::new(4.0, 4.0, 0.0));
        device.set_uniform(mvp, UniformValue::Mat4(flatten));
        device.bind_texture(0, Some(cube));
        device.draw_mesh(mesh);

        let expected = 160.0 / 255.0;
        assert!((device.colour_at(1, 1).unwrap().x - expected).abs() < 1e-6);
    }
}
