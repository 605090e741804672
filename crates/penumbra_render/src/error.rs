//! Renderer errors

use penumbra_shader::ShaderError;
use thiserror::Error;

use crate::device::{FramebufferId, FramebufferStatus, MeshId, TextureId};

/// Errors raised by a [`RenderDevice`](crate::device::RenderDevice)
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Texture size {width}x{height} exceeds device limit {max}")]
    UnsupportedSize { width: u32, height: u32, max: u32 },

    #[error("Texture has zero extent ({width}x{height})")]
    EmptyTexture { width: u32, height: u32 },

    #[error("Cube map faces differ in size")]
    MismatchedCubeFaces,

    #[error("Unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("Unknown framebuffer {0:?}")]
    UnknownFramebuffer(FramebufferId),

    #[error("Unknown mesh {0:?}")]
    UnknownMesh(MeshId),

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("Program '{name}' failed to link: {reason}")]
    ProgramLink { name: String, reason: String },
}

/// Errors from renderer setup and configuration
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Framebuffer {framebuffer:?} incomplete: {status:?}")]
    IncompleteFramebuffer {
        framebuffer: FramebufferId,
        status: FramebufferStatus,
    },

    #[error("Program '{0}' is not ready")]
    ProgramNotReady(String),

    #[error("Too many {kind} lights (max {max})")]
    LightLimit { kind: &'static str, max: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for renderer operations
pub type Result<T> = std::result::Result<T, RenderError>;
