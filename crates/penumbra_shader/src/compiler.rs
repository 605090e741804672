//! Program compilation using naga
//!
//! A program goes through three stages, any of which can fail with a
//! diagnostic naming the program:
//! - WGSL parsing
//! - Module validation
//! - Vertex/fragment linking
//!
//! A successful compile carries the reflected uniform table, the clip-space
//! transform of the vertex stage and the outputs of the fragment stage.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use naga::front::wgsl;

use crate::reflect::{self, ClipTransform, FragmentOutputs, UniformTable};
use crate::source::{ShaderSource, ShaderSourceProvider};
use crate::validator::ShaderValidator;
use crate::ShaderError;

/// A parsed, validated and linked program
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// Program name
    pub name: String,
    /// Validated module
    pub module: naga::Module,
    /// Flattened uniform interface
    pub uniforms: UniformTable,
    /// How vertex positions reach clip space
    pub clip: ClipTransform,
    /// What the fragment stage writes
    pub outputs: FragmentOutputs,
    /// Vertex entry point
    pub vertex_entry: String,
    /// Fragment entry point
    pub fragment_entry: String,
}

/// Program compiler
#[derive(Debug)]
pub struct ShaderCompiler {
    validator: ShaderValidator,
    /// Parsed modules keyed by source hash
    module_cache: HashMap<u64, naga::Module>,
}

impl ShaderCompiler {
    /// Create a new compiler
    pub fn new() -> Self {
        Self {
            validator: ShaderValidator::new(),
            module_cache: HashMap::new(),
        }
    }

    /// Parse WGSL source into a naga module
    pub fn parse_wgsl(&self, name: &str, source: &str) -> Result<naga::Module, ShaderError> {
        wgsl::parse_str(source).map_err(|e| ShaderError::Parse {
            name: name.to_string(),
            diagnostic: e.emit_to_string(source),
        })
    }

    /// Compile a source into a linked program
    pub fn compile(&mut self, source: &ShaderSource) -> Result<CompiledProgram, ShaderError> {
        let key = source_hash(&source.wgsl);
        let module = match self.module_cache.get(&key) {
            Some(module) => module.clone(),
            None => {
                let module = self.parse_wgsl(&source.name, &source.wgsl)?;
                self.module_cache.insert(key, module.clone());
                module
            }
        };

        self.validator.validate(&source.name, &module)?;
        let stages = self.validator.link(&source.name, &module)?;

        let uniforms = reflect::reflect_uniforms(&module);
        let clip = reflect::reflect_clip_transform(&module);
        let outputs = reflect::reflect_fragment_outputs(&module);

        log::debug!(
            "Compiled program '{}' ({} uniforms, {} samplers, clip chain {:?})",
            source.name,
            uniforms.len(),
            uniforms.sampler_count(),
            clip.factors
        );

        Ok(CompiledProgram {
            name: source.name.clone(),
            module,
            uniforms,
            clip,
            outputs,
            vertex_entry: stages.vertex,
            fragment_entry: stages.fragment,
        })
    }

    /// Look up a program by name and compile it
    pub fn compile_named(
        &mut self,
        provider: &dyn ShaderSourceProvider,
        name: &str,
    ) -> Result<CompiledProgram, ShaderError> {
        let source = provider.source(name)?;
        self.compile(&source)
    }

    /// Number of cached modules
    pub fn cached_modules(&self) -> usize {
        self.module_cache.len()
    }

    /// Drop every cached module
    pub fn clear_cache(&mut self) {
        self.module_cache.clear();
    }
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn source_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}
