//! # Penumbra Render - Shadow-Mapped Forward Renderer
//!
//! Multi-light forward rendering with:
//! - A directional sun with an orthographic shadow map
//! - Point and spot lights with omnidirectional (cube) shadow maps
//! - A uniform binder that resolves every lighting location once per program
//! - A skybox drawn behind the scene
//! - An optional light-perspective debug inset
//!
//! ## Architecture
//!
//! The renderer drives an immediate-mode [`device::RenderDevice`]. Each frame
//! the [`ForwardRenderer`] runs, in order:
//!
//! 1. **Directional shadow pass**: sun depth into a 2D map
//! 2. **Omni shadow passes**: six cube faces per point/spot light
//! 3. **Main pass**: clear, skybox, lit scene
//! 4. **Light debug pass**: the lit scene from the sun, in a scissored inset
//!
//! The scene is drawn through a [`SceneDraw`] callback, identically in every
//! pass. [`SoftwareDevice`] rasterizes depth on the CPU so frames can be
//! rendered and inspected headless.
//!
//! ## Example
//!
//! ```ignore
//! use penumbra_render::prelude::*;
//! use penumbra_shader::BuiltinShaders;
//!
//! let mut device = SoftwareDevice::new(640, 480);
//! let mut renderer = ForwardRenderer::new(
//!     &mut device,
//!     &BuiltinShaders,
//!     RendererConfig::default(),
//!     LightProperties::new(Vec3::ONE, 0.2, 0.6),
//! )?;
//!
//! let attenuation = Attenuation::new(1.0, 0.09, 0.032);
//! let lamp = renderer.point_light(props, Vec3::new(0.0, 3.0, 0.0), attenuation);
//! renderer.add_point_light(&mut device, lamp)?;
//!
//! let camera = FlyCamera::new(Vec3::new(0.0, 4.0, 10.0));
//! renderer.advance(1.0 / 60.0, &camera);
//! let stats = renderer.render_frame(&mut device, &camera, &scene);
//! ```

pub mod camera;
pub mod config;
pub mod device;
pub mod error;
pub mod light;
pub mod pipeline;
pub mod primitives;
pub mod program;
pub mod scene;
pub mod shadow;
pub mod skybox;
pub mod stats;

pub use camera::{Camera, CameraMovement, FlyCamera};
pub use config::{DebugViewport, RendererConfig, ShadowSettings, SunSettings, TextureUnitLayout};
pub use device::{
    ClearFlags, CubeFace, CullFace, CullState, DepthFunc, DepthState, DeviceEvent, FramebufferId,
    FramebufferStatus, MeshId, ProgramId, Rect, RenderDevice, RenderTarget, SoftwareDevice,
    SoftwareLimits, TextureId, UniformLocation, UniformValue, Vertex, MISSING_UNIFORM,
};
pub use error::{DeviceError, RenderError, Result};
pub use light::{
    Attenuation, DirectionalLight, Light, LightProperties, LightSet, OrthoBounds, PointLight,
    SpotCone, SunCycle, SunOrbit, DEFAULT_FLASH_OFFSET,
};
pub use pipeline::ForwardRenderer;
pub use primitives::MeshData;
pub use program::{ProgramState, ShaderProgram, UniformLocations};
pub use scene::{DrawContext, Material, Scene, SceneDraw, SceneObject};
pub use shadow::{CubeTransforms, OmniShadowMap, ShadowMap, ShadowState};
pub use skybox::Skybox;
pub use stats::{FrameStats, PassKind, PassRecord, SkipReason};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::camera::{Camera, FlyCamera};
    pub use crate::config::RendererConfig;
    pub use crate::device::{RenderDevice, SoftwareDevice};
    pub use crate::light::{Attenuation, Light, LightProperties, PointLight, SpotCone};
    pub use crate::pipeline::ForwardRenderer;
    pub use crate::scene::{Material, Scene, SceneDraw, SceneObject};
    pub use crate::stats::{FrameStats, PassKind};
    pub use glam::{Mat4, Vec3};
}
