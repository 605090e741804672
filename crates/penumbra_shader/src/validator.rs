//! Shader validation
//!
//! Runs the naga validator over a parsed module and performs the link step:
//! a program must expose exactly one vertex and one fragment entry point, and
//! every location the fragment stage reads must be written by the vertex stage.

use std::collections::BTreeSet;

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::ShaderError;

/// Entry points selected by the link step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedStages {
    /// Vertex entry point name
    pub vertex: String,
    /// Fragment entry point name
    pub fragment: String,
}

/// Shader validator
#[derive(Debug, Clone)]
pub struct ShaderValidator {
    /// Required capabilities
    capabilities: Capabilities,
    /// Validation flags
    flags: ValidationFlags,
}

impl ShaderValidator {
    /// Create a new validator with default settings
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::all(),
            flags: ValidationFlags::all(),
        }
    }

    /// Create a validator with specific capabilities
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            flags: ValidationFlags::all(),
        }
    }

    /// Validate a module
    pub fn validate(
        &self,
        name: &str,
        module: &naga::Module,
    ) -> Result<naga::valid::ModuleInfo, ShaderError> {
        let mut validator = Validator::new(self.flags, self.capabilities);
        validator.validate(module).map_err(|e| ShaderError::Validation {
            name: name.to_string(),
            diagnostic: format!("{:?}", e),
        })
    }

    /// Check that the module forms a complete vertex + fragment program
    pub fn link(&self, name: &str, module: &naga::Module) -> Result<LinkedStages, ShaderError> {
        let link_error = |reason: String| ShaderError::Link {
            name: name.to_string(),
            reason,
        };

        let entry = |stage| single_entry_point(module, stage).map_err(&link_error);
        let vertex = entry(naga::ShaderStage::Vertex)?;
        let fragment = entry(naga::ShaderStage::Fragment)?;

        let written = vertex_output_locations(module, vertex);
        let read = fragment_input_locations(module, fragment);
        if let Some(missing) = read.difference(&written).next() {
            return Err(link_error(format!(
                "fragment '{}' reads location {} which vertex '{}' never writes",
                fragment.name, missing, vertex.name
            )));
        }

        Ok(LinkedStages {
            vertex: vertex.name.clone(),
            fragment: fragment.name.clone(),
        })
    }
}

impl Default for ShaderValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn single_entry_point(
    module: &naga::Module,
    stage: naga::ShaderStage,
) -> Result<&naga::EntryPoint, String> {
    let mut found = module.entry_points.iter().filter(|ep| ep.stage == stage);
    match (found.next(), found.next()) {
        (Some(ep), None) => Ok(ep),
        (None, _) => Err(format!("missing {:?} entry point", stage)),
        (Some(first), Some(second)) => Err(format!(
            "ambiguous {:?} entry points '{}' and '{}'",
            stage, first.name, second.name
        )),
    }
}

fn locations_of(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut BTreeSet<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(*location);
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                        out.insert(*location);
                    }
                }
            }
        }
    }
}

fn vertex_output_locations(
    module: &naga::Module,
    entry_point: &naga::EntryPoint,
) -> BTreeSet<u32> {
    let mut locations = BTreeSet::new();
    if let Some(result) = &entry_point.function.result {
        locations_of(module, result.ty, result.binding.as_ref(), &mut locations);
    }
    locations
}

fn fragment_input_locations(
    module: &naga::Module,
    entry_point: &naga::EntryPoint,
) -> BTreeSet<u32> {
    let mut locations = BTreeSet::new();
    for argument in &entry_point.function.arguments {
        locations_of(module, argument.ty, argument.binding.as_ref(), &mut locations);
    }
    locations
}
