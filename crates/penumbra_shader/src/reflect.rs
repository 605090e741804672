//! Shader reflection
//!
//! Flattens the uniform interface of a module into GL-style names so the
//! renderer can resolve locations once after linking:
//!
//! ```text
//! var<uniform> point_lights: array<PointLight, 3>
//!     point_lights[0].base.colour
//!     point_lights[0].base.ambient_intensity
//!     ...
//!     point_lights[2].exponent_term
//! ```
//!
//! Texture globals become sampler slots that take a texture unit index.
//! Sampler objects are fixed pipeline state and are not listed.

use std::collections::HashMap;

/// Scalar component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Float,
    Sint,
    Uint,
    Bool,
}

/// Texture dimension of a sampler slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    Cube,
}

/// Type of a single uniform slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Scalar(ScalarType),
    Vector { scalar: ScalarType, size: u8 },
    Matrix { columns: u8, rows: u8 },
    Sampler { dimension: TextureDimension, depth: bool },
}

impl UniformKind {
    /// Whether this slot selects a texture unit
    pub fn is_sampler(&self) -> bool {
        matches!(self, Self::Sampler { .. })
    }
}

/// One resolvable uniform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSlot {
    /// Flattened name
    pub name: String,
    /// Slot type
    pub kind: UniformKind,
    /// Location (index into the table)
    pub location: i32,
}

/// Flat table of every uniform a program exposes
#[derive(Debug, Clone, Default)]
pub struct UniformTable {
    slots: Vec<UniformSlot>,
    by_name: HashMap<String, usize>,
}

impl UniformTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot, returning its location
    pub fn push(&mut self, name: impl Into<String>, kind: UniformKind) -> i32 {
        let name = name.into();
        if let Some(&index) = self.by_name.get(&name) {
            return self.slots[index].location;
        }
        let location = self.slots.len() as i32;
        self.by_name.insert(name.clone(), self.slots.len());
        self.slots.push(UniformSlot { name, kind, location });
        location
    }

    /// Location of a named uniform
    pub fn location(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).map(|&index| self.slots[index].location)
    }

    /// Slot at a location
    pub fn slot(&self, location: i32) -> Option<&UniformSlot> {
        usize::try_from(location).ok().and_then(|index| self.slots.get(index))
    }

    /// Slot by name
    pub fn get(&self, name: &str) -> Option<&UniformSlot> {
        self.by_name.get(name).map(|&index| &self.slots[index])
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate slots in location order
    pub fn iter(&self) -> impl Iterator<Item = &UniformSlot> {
        self.slots.iter()
    }

    /// Number of sampler slots
    pub fn sampler_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.kind.is_sampler()).count()
    }
}

/// How the vertex stage moves a vertex position into clip space
///
/// `factors` lists the matrix uniforms multiplied into the position, outermost
/// first; `swizzle` is applied to the product afterwards (for example `xyww`).
/// An empty chain means positions are already in clip space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipTransform {
    /// Matrix uniform names, left to right
    pub factors: Vec<String>,
    /// Component selection applied to the clip position
    pub swizzle: Option<[usize; 4]>,
}

impl ClipTransform {
    /// Whether the position passes through untransformed
    pub fn is_identity(&self) -> bool {
        self.factors.is_empty() && self.swizzle.is_none()
    }
}

/// Build the uniform table of a module
pub fn reflect_uniforms(module: &naga::Module) -> UniformTable {
    let mut table = UniformTable::new();

    for (_, global) in module.global_variables.iter() {
        let Some(name) = global.name.clone() else {
            continue;
        };

        match global.space {
            naga::AddressSpace::Uniform => flatten(module, name, global.ty, &mut table),
            naga::AddressSpace::Handle => {
                if let naga::TypeInner::Image { dim, class, .. } = &module.types[global.ty].inner {
                    let kind = UniformKind::Sampler {
                        dimension: texture_dimension(*dim),
                        depth: matches!(class, naga::ImageClass::Depth { .. }),
                    };
                    table.push(name, kind);
                }
            }
            _ => {}
        }
    }

    table
}

fn flatten(
    module: &naga::Module,
    prefix: String,
    ty: naga::Handle<naga::Type>,
    table: &mut UniformTable,
) {
    match &module.types[ty].inner {
        naga::TypeInner::Struct { members, .. } => {
            for member in members {
                let member_name = member.name.as_deref().unwrap_or("_");
                flatten(module, format!("{}.{}", prefix, member_name), member.ty, table);
            }
        }
        naga::TypeInner::Array { base, size, .. } => match size {
            naga::ArraySize::Constant(count) => {
                for index in 0..count.get() {
                    flatten(module, format!("{}[{}]", prefix, index), *base, table);
                }
            }
            _ => log::debug!("Skipping runtime-sized uniform array '{}'", prefix),
        },
        naga::TypeInner::Scalar { kind, .. } => {
            table.push(prefix, UniformKind::Scalar(scalar_type(*kind)));
        }
        naga::TypeInner::Vector { size, kind, .. } => {
            table.push(
                prefix,
                UniformKind::Vector {
                    scalar: scalar_type(*kind),
                    size: vector_size(*size),
                },
            );
        }
        naga::TypeInner::Matrix { columns, rows, .. } => {
            table.push(
                prefix,
                UniformKind::Matrix {
                    columns: vector_size(*columns),
                    rows: vector_size(*rows),
                },
            );
        }
        _ => log::debug!("Uniform '{}' has no settable representation", prefix),
    }
}

fn scalar_type(kind: naga::ScalarKind) -> ScalarType {
    match kind {
        naga::ScalarKind::Sint => ScalarType::Sint,
        naga::ScalarKind::Uint => ScalarType::Uint,
        naga::ScalarKind::Bool => ScalarType::Bool,
        _ => ScalarType::Float,
    }
}

fn vector_size(size: naga::VectorSize) -> u8 {
    match size {
        naga::VectorSize::Bi => 2,
        naga::VectorSize::Tri => 3,
        naga::VectorSize::Quad => 4,
    }
}

fn texture_dimension(dim: naga::ImageDimension) -> TextureDimension {
    match dim {
        naga::ImageDimension::D1 => TextureDimension::D1,
        naga::ImageDimension::D2 => TextureDimension::D2,
        naga::ImageDimension::D3 => TextureDimension::D3,
        naga::ImageDimension::Cube => TextureDimension::Cube,
    }
}

/// Extract the clip-space transform of the vertex entry point
///
/// Follows the expression returned as `@builtin(position)`, either directly or
/// as a member of a composed output struct, and records every matrix uniform
/// multiplied into it.
pub fn reflect_clip_transform(module: &naga::Module) -> ClipTransform {
    let mut clip = ClipTransform::default();

    let Some(entry_point) = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga::ShaderStage::Vertex)
    else {
        return clip;
    };

    let function = &entry_point.function;
    let Some(returned) = find_return(&function.body) else {
        return clip;
    };

    let position = function.result.as_ref().and_then(|result| match &result.binding {
        Some(naga::Binding::BuiltIn(naga::BuiltIn::Position { .. })) => Some(returned),
        Some(_) => None,
        None => position_member(module, result.ty).and_then(|index| {
            match &function.expressions[returned] {
                naga::Expression::Compose { components, .. } => components.get(index).copied(),
                _ => None,
            }
        }),
    });

    if let Some(position) = position {
        collect_factors(module, function, position, &mut clip);
    }
    clip
}

/// What the fragment stage writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FragmentOutputs {
    /// At least one colour location
    pub colour: bool,
    /// `@builtin(frag_depth)`
    pub depth: bool,
}

/// Reflect the outputs of the fragment entry point
pub fn reflect_fragment_outputs(module: &naga::Module) -> FragmentOutputs {
    let mut outputs = FragmentOutputs::default();
    let Some(result) = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == naga::ShaderStage::Fragment)
        .and_then(|ep| ep.function.result.as_ref())
    else {
        return outputs;
    };

    let mut record = |binding: Option<&naga::Binding>| match binding {
        Some(naga::Binding::Location { .. }) => outputs.colour = true,
        Some(naga::Binding::BuiltIn(naga::BuiltIn::FragDepth)) => outputs.depth = true,
        _ => {}
    };
    match (&result.binding, &module.types[result.ty].inner) {
        (None, naga::TypeInner::Struct { members, .. }) => {
            for member in members {
                record(member.binding.as_ref());
            }
        }
        (binding, _) => record(binding.as_ref()),
    }
    outputs
}

fn find_return(block: &naga::Block) -> Option<naga::Handle<naga::Expression>> {
    for statement in block.iter() {
        match statement {
            naga::Statement::Return { value: Some(value) } => return Some(*value),
            naga::Statement::Block(inner) => {
                if let Some(value) = find_return(inner) {
                    return Some(value);
                }
            }
            _ => {}
        }
    }
    None
}

fn position_member(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Option<usize> {
    match &module.types[ty].inner {
        naga::TypeInner::Struct { members, .. } => members.iter().position(|member| {
            matches!(member.binding, Some(naga::Binding::BuiltIn(naga::BuiltIn::Position { .. })))
        }),
        _ => None,
    }
}

fn collect_factors(
    module: &naga::Module,
    function: &naga::Function,
    expression: naga::Handle<naga::Expression>,
    clip: &mut ClipTransform,
) {
    match &function.expressions[expression] {
        naga::Expression::Swizzle { size: naga::VectorSize::Quad, vector, pattern }
            if clip.swizzle.is_none() && clip.factors.is_empty() =>
        {
            clip.swizzle = Some(pattern.map(swizzle_index));
            collect_factors(module, function, *vector, clip);
        }
        naga::Expression::Binary { op: naga::BinaryOperator::Multiply, left, right } => {
            collect_factors(module, function, *left, clip);
            collect_factors(module, function, *right, clip);
        }
        naga::Expression::Load { pointer } => {
            if let Some(name) = matrix_uniform_name(module, function, *pointer) {
                clip.factors.push(name);
            }
        }
        _ => {}
    }
}

fn swizzle_index(component: naga::SwizzleComponent) -> usize {
    match component {
        naga::SwizzleComponent::X => 0,
        naga::SwizzleComponent::Y => 1,
        naga::SwizzleComponent::Z => 2,
        naga::SwizzleComponent::W => 3,
    }
}

fn matrix_uniform_name(
    module: &naga::Module,
    function: &naga::Function,
    pointer: naga::Handle<naga::Expression>,
) -> Option<String> {
    match &function.expressions[pointer] {
        naga::Expression::GlobalVariable(handle) => {
            let global = &module.global_variables[*handle];
            let is_matrix = matches!(module.types[global.ty].inner, naga::TypeInner::Matrix { .. });
            (global.space == naga::AddressSpace::Uniform && is_matrix)
                .then(|| global.name.clone())
                .flatten()
        }
        naga::Expression::AccessIndex { base, index } => {
            let naga::Expression::GlobalVariable(handle) = &function.expressions[*base] else {
                return None;
            };
            let global = &module.global_variables[*handle];
            if global.space != naga::AddressSpace::Uniform {
                return None;
            }
            let naga::TypeInner::Struct { members, .. } = &module.types[global.ty].inner else {
                return None;
            };
            let member = members.get(*index as usize)?;
            if !matches!(module.types[member.ty].inner, naga::TypeInner::Matrix { .. }) {
                return None;
            }
            Some(format!("{}.{}", global.name.as_deref()?, member.name.as_deref()?))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use naga::front::wgsl;

    const LIGHTS_SHADER: &str = r#"
        struct Light {
            colour: vec3<f32>,
            intensity: f32,
        }

        @group(0) @binding(0) var<uniform> projection: mat4x4<f32>;
        @group(0) @binding(1) var<uniform> lights: array<Light, 2>;
        @group(0) @binding(2) var<uniform> light_count: i32;
        @group(0) @binding(3) var shadow_map: texture_depth_cube;
        @group(0) @binding(4) var shadow_sampler: sampler_comparison;

        @vertex
        fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
            return projection * vec4<f32>(pos, 1.0);
        }

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            let dir = vec3<f32>(1.0, 0.0, 0.0);
            let depth = textureSampleCompareLevel(shadow_map, shadow_sampler, dir, 0.5);
            return vec4<f32>(lights[0].colour * depth, f32(light_count));
        }
    "#;

    #[test]
    fn test_reflect_flattens_struct_arrays() {
        let module = wgsl::parse_str(LIGHTS_SHADER).unwrap();
        let table = reflect_uniforms(&module);

        assert_eq!(table.location("projection"), Some(0));
        assert!(table.location("lights[0].colour").is_some());
        assert!(table.location("lights[1].intensity").is_some());
        assert!(table.location("lights[2].colour").is_none());
        assert_eq!(
            table.get("light_count").unwrap().kind,
            UniformKind::Scalar(ScalarType::Sint)
        );
        assert_eq!(
            table.get("lights[1].colour").unwrap().kind,
            UniformKind::Vector { scalar: ScalarType::Float, size: 3 }
        );
    }

    #[test]
    fn test_reflect_sampler_slots() {
        let module = wgsl::parse_str(LIGHTS_SHADER).unwrap();
        let table = reflect_uniforms(&module);

        let slot = table.get("shadow_map").unwrap();
        assert_eq!(
            slot.kind,
            UniformKind::Sampler { dimension: TextureDimension::Cube, depth: true }
        );
        assert!(table.get("shadow_sampler").is_none());
        assert_eq!(table.sampler_count(), 1);
    }

    #[test]
    fn test_locations_are_dense() {
        let module = wgsl::parse_str(LIGHTS_SHADER).unwrap();
        let table = reflect_uniforms(&module);

        for (index, slot) in table.iter().enumerate() {
            assert_eq!(slot.location, index as i32);
            assert_eq!(table.slot(slot.location).unwrap().name, slot.name);
        }
        assert!(table.slot(-1).is_none());
    }

    #[test]
    fn test_clip_transform_direct_return() {
        let module = wgsl::parse_str(LIGHTS_SHADER).unwrap();
        let clip = reflect_clip_transform(&module);
        assert_eq!(clip.factors, vec!["projection".to_string()]);
        assert_eq!(clip.swizzle, None);
    }

    #[test]
    fn test_clip_transform_struct_output_with_swizzle() {
        let module = wgsl::parse_str(
            r#"
            @group(0) @binding(0) var<uniform> projection: mat4x4<f32>;
            @group(0) @binding(1) var<uniform> view: mat4x4<f32>;

            struct VertexOutput {
                @builtin(position) clip_position: vec4<f32>,
                @location(0) direction: vec3<f32>,
            }

            @vertex
            fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
                let clip = projection * view * vec4<f32>(position, 1.0);
                return VertexOutput(clip.xyww, position);
            }

            @fragment
            fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
                return vec4<f32>(in.direction, 1.0);
            }
            "#,
        )
        .unwrap();

        let clip = reflect_clip_transform(&module);
        assert_eq!(clip.factors, vec!["projection".to_string(), "view".to_string()]);
        assert_eq!(clip.swizzle, Some([0, 1, 3, 3]));
    }

    #[test]
    fn test_clip_transform_without_matrices() {
        let module = wgsl::parse_str(
            r#"
            @vertex
            fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(pos, 1.0);
            }

            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return vec4<f32>(1.0, 1.0, 1.0, 1.0);
            }
            "#,
        )
        .unwrap();

        assert!(reflect_clip_transform(&module).is_identity());
    }

    #[test]
    fn test_fragment_outputs() {
        let colour = wgsl::parse_str(LIGHTS_SHADER).unwrap();
        assert_eq!(
            reflect_fragment_outputs(&colour),
            FragmentOutputs { colour: true, depth: false }
        );

        let depth = wgsl::parse_str(
            r#"
            @vertex
            fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
                return vec4<f32>(pos, 1.0);
            }

            @fragment
            fn fs_main(@builtin(position) frag: vec4<f32>) -> @builtin(frag_depth) f32 {
                return frag.z * 0.5;
            }
            "#,
        )
        .unwrap();
        assert_eq!(
            reflect_fragment_outputs(&depth),
            FragmentOutputs { colour: false, depth: true }
        );
    }
}
