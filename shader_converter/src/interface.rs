//! Location and descriptor binding assignment for stage inputs and outputs.
//!
//! The vertex stage assigns varying locations and records them in an [InterfaceBindingMap].
//! The fragment stage reuses these locations so both sides of the interface always match.
use indexmap::IndexMap;
use log::debug;
use smol_str::SmolStr;

use crate::{declaration::{Declaration, SymbolTable}, error::ConvertError};

/// Varying locations assigned by the vertex stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceBindingMap {
    locations: IndexMap<SmolStr, u32>,
}

impl InterfaceBindingMap {
    pub fn location(&self, name: &str) -> Option<u32> {
        self.locations.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// The next available descriptor binding shared by both stages of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorBindings {
    pub set: u32,
    pub next_binding: u32,
}

/// A descriptor set and binding like `layout(set = 0, binding = 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub set: u32,
    pub binding: u32,
}

impl DescriptorBindings {
    pub fn allocate(&mut self) -> Binding {
        let binding = Binding {
            set: self.set,
            binding: self.next_binding,
        };
        self.next_binding += 1;
        binding
    }
}

/// A declaration with its assigned location or binding index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot<T> {
    pub index: T,
    pub declaration: Declaration,
}

/// Inputs and outputs for a single stage in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageInterface {
    /// Vertex attributes or fragment varyings.
    pub inputs: Vec<Slot<u32>>,
    /// Vertex varyings.
    pub outputs: Vec<Slot<u32>>,
    pub samplers: Vec<Slot<Binding>>,
}

/// Assign locations for attributes and varyings starting from 0 in declaration order.
pub fn allocate_vertex(
    symbols: &SymbolTable,
    bindings: &mut InterfaceBindingMap,
    descriptors: &mut DescriptorBindings,
) -> StageInterface {
    let inputs = sequential_slots(&symbols.attributes);
    let outputs = sequential_slots(&symbols.varyings);

    for output in &outputs {
        bindings
            .locations
            .insert(output.declaration.name.clone(), output.index);
    }

    StageInterface {
        inputs,
        outputs,
        samplers: sampler_slots(symbols, descriptors),
    }
}

/// Assign each varying the location of the vertex output with the same name.
pub fn allocate_fragment(
    symbols: &SymbolTable,
    bindings: &InterfaceBindingMap,
    descriptors: &mut DescriptorBindings,
) -> Result<StageInterface, ConvertError> {
    if !symbols.attributes.is_empty() {
        debug!("Ignoring {} attributes in fragment shader", symbols.attributes.len());
    }

    let inputs = symbols
        .varyings
        .values()
        .map(|v| {
            bindings
                .location(&v.name)
                .map(|index| Slot {
                    index,
                    declaration: v.clone(),
                })
                .ok_or_else(|| ConvertError::InterfaceMismatch {
                    name: v.name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StageInterface {
        inputs,
        outputs: Vec::new(),
        samplers: sampler_slots(symbols, descriptors),
    })
}

fn sequential_slots(declarations: &IndexMap<SmolStr, Declaration>) -> Vec<Slot<u32>> {
    declarations
        .values()
        .zip(0..)
        .map(|(d, index)| Slot {
            index,
            declaration: d.clone(),
        })
        .collect()
}

fn sampler_slots(symbols: &SymbolTable, descriptors: &mut DescriptorBindings) -> Vec<Slot<Binding>> {
    symbols
        .samplers
        .values()
        .map(|s| Slot {
            index: descriptors.allocate(),
            declaration: s.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Stage, declaration::ShaderUnit};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn indices<T: Copy>(slots: &[Slot<T>]) -> Vec<(T, &str)> {
        slots
            .iter()
            .map(|s| (s.index, s.declaration.name.as_str()))
            .collect()
    }

    fn vertex_unit() -> ShaderUnit {
        ShaderUnit::parse(
            indoc! {"
                attribute vec3 position;
                attribute vec3 normal;
                attribute vec2 texcoord0;
                varying vec2 uv;
                varying vec3 worldNormal;
                varying vec4 unusedColor;
                void main()
                {
                    uv = texcoord0;
                    worldNormal = normal;
                    gl_Position = vec4(position, 1.0);
                }
            "},
            Stage::Vertex,
        )
        .unwrap()
    }

    #[test]
    fn allocate_vertex_locations() {
        let vertex = vertex_unit();
        let mut bindings = InterfaceBindingMap::default();
        let mut descriptors = DescriptorBindings::default();

        let interface = allocate_vertex(&vertex.symbols, &mut bindings, &mut descriptors);

        assert_eq!(
            vec![(0, "position"), (1, "normal"), (2, "texcoord0")],
            indices(&interface.inputs)
        );
        assert_eq!(vec![(0, "uv"), (1, "worldNormal")], indices(&interface.outputs));
        assert_eq!(Some(1), bindings.location("worldNormal"));
        assert_eq!(None, bindings.location("unusedColor"));
        assert_eq!(2, bindings.len());
    }

    #[test]
    fn allocate_fragment_matches_vertex() {
        let vertex = vertex_unit();
        let mut bindings = InterfaceBindingMap::default();
        let mut descriptors = DescriptorBindings::default();
        allocate_vertex(&vertex.symbols, &mut bindings, &mut descriptors);

        // Declaration order differs from the vertex shader.
        let fragment = ShaderUnit::parse(
            indoc! {"
                varying vec3 worldNormal;
                varying vec2 uv;
                uniform sampler2D albedo;
                uniform sampler2D normalMap;
                void main()
                {
                    gl_FragColor = texture2D(albedo, uv) + texture2D(normalMap, uv) * worldNormal.x;
                }
            "},
            Stage::Fragment,
        )
        .unwrap();
        descriptors.allocate();
        let interface = allocate_fragment(&fragment.symbols, &bindings, &mut descriptors).unwrap();

        assert_eq!(vec![(1, "worldNormal"), (0, "uv")], indices(&interface.inputs));
        assert!(interface.outputs.is_empty());

        // Sampler bindings continue after the uniform buffer.
        assert_eq!(
            vec![
                (Binding { set: 0, binding: 1 }, "albedo"),
                (Binding { set: 0, binding: 2 }, "normalMap")
            ],
            indices(&interface.samplers)
        );
    }

    #[test]
    fn allocate_fragment_interface_mismatch() {
        let vertex = vertex_unit();
        let mut bindings = InterfaceBindingMap::default();
        let mut descriptors = DescriptorBindings::default();
        allocate_vertex(&vertex.symbols, &mut bindings, &mut descriptors);

        let fragment = ShaderUnit::parse(
            "varying vec3 normal; void main() { gl_FragColor = vec4(normal, 1.0); }",
            Stage::Fragment,
        )
        .unwrap();

        assert_eq!(
            Err(ConvertError::InterfaceMismatch {
                name: "normal".into()
            }),
            allocate_fragment(&fragment.symbols, &bindings, &mut descriptors)
        );
    }
}
