//! # Penumbra Shader
//!
//! Shader front end for the Penumbra renderer providing:
//! - Named WGSL program sources (built-in, on-disk, or overridden in memory)
//! - Parsing and validation via naga
//! - Link checks between the vertex and fragment stages
//! - Uniform reflection into a flat, GL-style location table
//!
//! ## Architecture
//!
//! ```text
//! ShaderSourceProvider ──► ShaderSource ──► Parser ──► naga::Module
//!                                                          │
//!                                       ┌──────────────────┴──────────────┐
//!                                       ▼                                 ▼
//!                           Validator ──► Link check        Reflector ──► UniformTable
//!                                                                         ClipTransform
//!                                                                         FragmentOutputs
//! ```
//!
//! The lighting contract between the renderer and the bundled `lit` program is
//! sized by [`MAX_POINT_LIGHTS`] and [`MAX_SPOT_LIGHTS`]; the uniform arrays in
//! `shaders/lit.wgsl` must agree with them.

pub mod compiler;
pub mod validator;
pub mod reflect;
pub mod source;

pub use compiler::{CompiledProgram, ShaderCompiler};
pub use validator::{LinkedStages, ShaderValidator};
pub use reflect::{
    ClipTransform, FragmentOutputs, ScalarType, TextureDimension, UniformKind, UniformSlot,
    UniformTable,
};
pub use source::{
    BuiltinShaders, ShaderDirectory, ShaderSource, ShaderSourceMap, ShaderSourceProvider,
    DIRECTIONAL_SHADOW_PROGRAM, LIT_PROGRAM, OMNI_SHADOW_PROGRAM, SKYBOX_PROGRAM,
};

use std::path::PathBuf;
use thiserror::Error;

/// Maximum point lights the lit program accepts
pub const MAX_POINT_LIGHTS: usize = 3;
/// Maximum spot lights the lit program accepts
pub const MAX_SPOT_LIGHTS: usize = 3;
/// Omni shadow slots (point lights first, spot lights after)
pub const MAX_OMNI_SHADOWS: usize = MAX_POINT_LIGHTS + MAX_SPOT_LIGHTS;

/// Errors from the shader front end
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("Failed to read shader file {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WGSL parse error in '{name}':\n{diagnostic}")]
    Parse { name: String, diagnostic: String },

    #[error("Validation error in '{name}': {diagnostic}")]
    Validation { name: String, diagnostic: String },

    #[error("Link error in '{name}': {reason}")]
    Link { name: String, reason: String },

    #[error("Shader not found: {0}")]
    NotFound(String),
}

impl ShaderError {
    /// Name of the program the error belongs to, when known
    pub fn program(&self) -> Option<&str> {
        match self {
            Self::Parse { name, .. } | Self::Validation { name, .. } | Self::Link { name, .. } => {
                Some(name)
            }
            Self::NotFound(name) => Some(name),
            Self::FileRead { .. } => None,
        }
    }
}
