//! Shader sources
//!
//! Every program is a single WGSL module holding a `@vertex` and a `@fragment`
//! entry point. Sources come from a [`ShaderSourceProvider`]; the renderer asks
//! for programs by name and never touches the file system itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ShaderError;

/// Depth-only program for the directional light
pub const DIRECTIONAL_SHADOW_PROGRAM: &str = "directional_shadow";
/// Cube-face depth program for point and spot lights
pub const OMNI_SHADOW_PROGRAM: &str = "omni_shadow";
/// Forward lighting program
pub const LIT_PROGRAM: &str = "lit";
/// Background cube program
pub const SKYBOX_PROGRAM: &str = "skybox";

/// Source text of one named program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    /// Program name
    pub name: String,
    /// WGSL module text
    pub wgsl: String,
}

impl ShaderSource {
    /// Create a source from a name and WGSL text
    pub fn new(name: impl Into<String>, wgsl: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wgsl: wgsl.into(),
        }
    }
}

/// Supplies program source text by name
pub trait ShaderSourceProvider {
    /// Look up the source of a named program
    fn source(&self, name: &str) -> Result<ShaderSource, ShaderError>;
}

/// Programs bundled with this crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinShaders;

impl BuiltinShaders {
    /// Names of every bundled program
    pub const NAMES: [&'static str; 4] = [
        DIRECTIONAL_SHADOW_PROGRAM,
        OMNI_SHADOW_PROGRAM,
        LIT_PROGRAM,
        SKYBOX_PROGRAM,
    ];

    fn text(name: &str) -> Option<&'static str> {
        match name {
            DIRECTIONAL_SHADOW_PROGRAM => Some(include_str!("../shaders/directional_shadow.wgsl")),
            OMNI_SHADOW_PROGRAM => Some(include_str!("../shaders/omni_shadow.wgsl")),
            LIT_PROGRAM => Some(include_str!("../shaders/lit.wgsl")),
            SKYBOX_PROGRAM => Some(include_str!("../shaders/skybox.wgsl")),
            _ => None,
        }
    }
}

impl ShaderSourceProvider for BuiltinShaders {
    fn source(&self, name: &str) -> Result<ShaderSource, ShaderError> {
        Self::text(name)
            .map(|text| ShaderSource::new(name, text))
            .ok_or_else(|| ShaderError::NotFound(name.to_string()))
    }
}

/// Reads `<base>/<name>.wgsl` from disk
#[derive(Debug, Clone)]
pub struct ShaderDirectory {
    base_path: PathBuf,
}

impl ShaderDirectory {
    /// Create a provider rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Directory the provider reads from
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.wgsl", name))
    }
}

impl ShaderSourceProvider for ShaderDirectory {
    fn source(&self, name: &str) -> Result<ShaderSource, ShaderError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(ShaderError::NotFound(name.to_string()));
        }
        let wgsl = std::fs::read_to_string(&path)
            .map_err(|source| ShaderError::FileRead { path: path.clone(), source })?;

        log::debug!("Loaded shader '{}' from {:?} ({} bytes)", name, path, wgsl.len());
        Ok(ShaderSource::new(name, wgsl))
    }
}

/// In-memory sources layered over the built-in programs
#[derive(Debug, Clone, Default)]
pub struct ShaderSourceMap {
    sources: HashMap<String, String>,
    fallback_to_builtin: bool,
}

impl ShaderSourceMap {
    /// Empty map without fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Map that falls back to [`BuiltinShaders`] for names it doesn't hold
    pub fn builtin() -> Self {
        Self {
            sources: HashMap::new(),
            fallback_to_builtin: true,
        }
    }

    /// Add or replace a program source
    pub fn with_source(mut self, name: impl Into<String>, wgsl: impl Into<String>) -> Self {
        self.insert(name, wgsl);
        self
    }

    /// Add or replace a program source
    pub fn insert(&mut self, name: impl Into<String>, wgsl: impl Into<String>) {
        self.sources.insert(name.into(), wgsl.into());
    }
}

impl ShaderSourceProvider for ShaderSourceMap {
    fn source(&self, name: &str) -> Result<ShaderSource, ShaderError> {
        match self.sources.get(name) {
            Some(wgsl) => Ok(ShaderSource::new(name, wgsl.clone())),
            None if self.fallback_to_builtin => BuiltinShaders.source(name),
            None => Err(ShaderError::NotFound(name.to_string())),
        }
    }
}
