//! Render device seam
//!
//! The immediate-mode command surface the renderer drives. Semantics follow
//! classic GL state machines:
//! - State (viewport, scissor, cull, depth) persists until changed
//! - Uniforms are set on the program currently in use
//! - Window coordinates have their origin at the bottom-left
//!
//! [`SoftwareDevice`] implements the trait on the CPU for headless use.

mod raster;
mod shading;
mod software;
mod texture;

pub use software::{DeviceEvent, SoftwareDevice, SoftwareLimits};

use glam::{Mat4, Vec3, Vec4};
use image::RgbaImage;
use penumbra_shader::CompiledProgram;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw handle value
            pub fn raw(&self) -> u32 {
                self.0
            }
        }
    };
}

resource_id!(
    /// Texture handle
    TextureId
);
resource_id!(
    /// Framebuffer handle
    FramebufferId
);
resource_id!(
    /// Linked program handle
    ProgramId
);
resource_id!(
    /// Uploaded mesh handle
    MeshId
);

/// Uniform location; [`MISSING_UNIFORM`] when the program has no such uniform
pub type UniformLocation = i32;

/// Location returned for names the program does not expose
pub const MISSING_UNIFORM: UniformLocation = -1;

/// Pixel rectangle in window coordinates (origin bottom-left)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Create a rectangle
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle anchored at the origin
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Whether a pixel lies inside the rectangle
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x + self.width as i32
            && y < self.y + self.height as i32
    }

    /// Overlap of two rectangles
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width as i32).min(other.x + other.width as i32);
        let y1 = (self.y + self.height as i32).min(other.y + other.height as i32);
        Rect::new(x0, y0, (x1 - x0).max(0) as u32, (y1 - y0).max(0) as u32)
    }

    /// Width over height
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Cube map face, in GL layer order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// All faces in layer order
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Layer index
    pub fn index(self) -> usize {
        self as usize
    }

    /// Direction the face looks along
    pub fn direction(self) -> Vec3 {
        match self {
            Self::PositiveX => Vec3::X,
            Self::NegativeX => Vec3::NEG_X,
            Self::PositiveY => Vec3::Y,
            Self::NegativeY => Vec3::NEG_Y,
            Self::PositiveZ => Vec3::Z,
            Self::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of the face view
    pub fn up(self) -> Vec3 {
        match self {
            Self::PositiveY => Vec3::Z,
            Self::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }
}

/// Where draws and clears land
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTarget {
    /// The window framebuffer
    Default,
    /// An offscreen framebuffer (all layers of a cube attachment)
    Framebuffer(FramebufferId),
    /// One face of a cube-attached framebuffer
    CubeFace(FramebufferId, CubeFace),
}

/// Which faces culling removes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullFace {
    Back,
    Front,
}

/// Face culling state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CullState {
    pub enabled: bool,
    pub face: CullFace,
}

impl Default for CullState {
    fn default() -> Self {
        Self {
            enabled: false,
            face: CullFace::Back,
        }
    }
}

/// Depth comparison
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthFunc {
    Never,
    Less,
    LessEqual,
    Equal,
    Greater,
    GreaterEqual,
    NotEqual,
    Always,
}

impl DepthFunc {
    /// Whether an incoming depth passes against the stored one
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::LessEqual => incoming <= stored,
            Self::Equal => incoming == stored,
            Self::Greater => incoming > stored,
            Self::GreaterEqual => incoming >= stored,
            Self::NotEqual => incoming != stored,
            Self::Always => true,
        }
    }
}

/// Depth test and write state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub func: DepthFunc,
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            func: DepthFunc::Less,
            write: true,
        }
    }
}

/// Buffers touched by a clear
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearFlags {
    pub colour: bool,
    pub depth: bool,
}

impl ClearFlags {
    pub const COLOUR: Self = Self { colour: true, depth: false };
    pub const DEPTH: Self = Self { colour: false, depth: true };
    pub const ALL: Self = Self { colour: true, depth: true };
}

/// Typed uniform value
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// Framebuffer completeness
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    MissingAttachment,
}

/// Mesh vertex
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex {
    /// Size in bytes
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a vertex
    pub const fn new(position: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self { position, uv, normal }
    }
}

/// Immediate-mode GPU command surface
pub trait RenderDevice {
    // Resources

    /// Allocate a 2D depth texture cleared to 1.0
    fn create_depth_texture(&mut self, width: u32, height: u32) -> Result<TextureId, DeviceError>;

    /// Allocate a depth cube map, every face `width`x`height`
    fn create_depth_cube(&mut self, width: u32, height: u32) -> Result<TextureId, DeviceError>;

    /// Upload a colour texture
    fn create_colour_texture(&mut self, image: &RgbaImage) -> Result<TextureId, DeviceError>;

    /// Upload a colour cube map in [`CubeFace::ALL`] order
    fn create_colour_cube(&mut self, faces: &[RgbaImage; 6]) -> Result<TextureId, DeviceError>;

    /// Create a framebuffer whose only attachment is `depth`
    fn create_framebuffer(&mut self, depth: TextureId) -> Result<FramebufferId, DeviceError>;

    /// Completeness of a framebuffer
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;

    /// Upload an indexed triangle list
    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<MeshId, DeviceError>;

    /// Link a compiled program
    fn create_program(&mut self, program: &CompiledProgram) -> Result<ProgramId, DeviceError>;

    fn delete_program(&mut self, program: ProgramId);
    fn delete_texture(&mut self, texture: TextureId);
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    fn delete_mesh(&mut self, mesh: MeshId);

    // State

    fn bind_render_target(&mut self, target: RenderTarget);
    fn render_target(&self) -> RenderTarget;

    fn set_viewport(&mut self, viewport: Rect);
    fn viewport(&self) -> Rect;

    /// `None` disables the scissor test
    fn set_scissor(&mut self, scissor: Option<Rect>);
    fn scissor(&self) -> Option<Rect>;

    fn set_cull_state(&mut self, state: CullState);
    fn cull_state(&self) -> CullState;

    fn set_depth_state(&mut self, state: DepthState);
    fn depth_state(&self) -> DepthState;

    /// Clear the bound target; honours the scissor and the depth write mask
    fn clear(&mut self, flags: ClearFlags, colour: Vec4);

    // Programs

    fn use_program(&mut self, program: Option<ProgramId>);

    /// Location of a uniform, [`MISSING_UNIFORM`] if absent
    fn uniform_location(&self, program: ProgramId, name: &str) -> UniformLocation;

    /// Set a uniform on the program in use; [`MISSING_UNIFORM`] is ignored
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    // Drawing

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);
    fn draw_mesh(&mut self, mesh: MeshId);

    /// Size of the default framebuffer
    fn default_framebuffer_size(&self) -> (u32, u32);
}
