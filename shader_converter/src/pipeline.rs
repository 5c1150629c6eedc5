//! Conversion of a single vertex and fragment shader pair.
//!
//! Both stages are classified before any locations or offsets are assigned
//! since the packing strategy depends on the uniforms used by both stages.
use crate::{
    Stage,
    declaration::{Diagnostic, ShaderUnit},
    emit::ShaderText,
    error::ConvertError,
    interface::{
        DescriptorBindings, InterfaceBindingMap, StageInterface, allocate_fragment,
        allocate_vertex,
    },
    layout::{LayoutPlanner, PackingStrategy, StageLayout},
    rewrite::{entry_point_text, rewrite_body},
};

/// Settings for converting shader pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// The maximum combined uniform size in bytes for using push constants.
    pub push_constant_limit: u32,
    /// The version for the `#version` directive.
    pub glsl_version: u32,
    pub vertex_input_extension: String,
    pub fragment_input_extension: String,
    pub vertex_output_extension: String,
    pub fragment_output_extension: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            push_constant_limit: 128,
            glsl_version: 450,
            vertex_input_extension: "vsh".to_string(),
            fragment_input_extension: "psh".to_string(),
            vertex_output_extension: "vert".to_string(),
            fragment_output_extension: "frag".to_string(),
        }
    }
}

/// A single converted stage and the data used to generate it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedShader {
    pub text: String,
    pub interface: StageInterface,
    pub layout: StageLayout,
}

/// The converted vertex and fragment stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedPair {
    pub vertex: ConvertedShader,
    pub fragment: ConvertedShader,
    pub strategy: PackingStrategy,
    /// The total uniform block size rounded up to a multiple of 16.
    pub uniform_size_in_bytes: u32,
    /// Unused declarations removed from either stage.
    pub diagnostics: Vec<Diagnostic>,
}

// State shared between both stages of a pair.
struct PipelinePair {
    bindings: InterfaceBindingMap,
    descriptors: DescriptorBindings,
    layout: LayoutPlanner,
    glsl_version: u32,
}

/// Convert the legacy GLSL `vertex` and `fragment` sources for a single pipeline.
///
/// The vertex stage is always allocated and planned first
/// since the fragment stage depends on its output locations and uniform offsets.
pub fn convert_pair(
    vertex: &str,
    fragment: &str,
    options: &ConvertOptions,
) -> Result<ConvertedPair, ConvertError> {
    let vertex = ShaderUnit::parse(vertex, Stage::Vertex)?;
    let fragment = ShaderUnit::parse(fragment, Stage::Fragment)?;
    convert_units(vertex, fragment, options)
}

/// Convert already classified stages like [convert_pair].
///
/// This allows reporting the diagnostics of each stage even if conversion fails.
pub fn convert_units(
    mut vertex: ShaderUnit,
    mut fragment: ShaderUnit,
    options: &ConvertOptions,
) -> Result<ConvertedPair, ConvertError> {
    let mut descriptors = DescriptorBindings::default();
    let layout = LayoutPlanner::new(
        &vertex.symbols,
        &fragment.symbols,
        options.push_constant_limit,
        &mut descriptors,
    )?;

    let mut pair = PipelinePair {
        bindings: InterfaceBindingMap::default(),
        descriptors,
        layout,
        glsl_version: options.glsl_version,
    };

    let vertex_interface = allocate_vertex(
        &vertex.symbols,
        &mut pair.bindings,
        &mut pair.descriptors,
    );
    let vertex_shader = pair.convert_stage(&mut vertex, vertex_interface)?;

    let fragment_interface =
        allocate_fragment(&fragment.symbols, &pair.bindings, &mut pair.descriptors)?;
    let fragment_shader = pair.convert_stage(&mut fragment, fragment_interface)?;

    let mut diagnostics = vertex.diagnostics;
    diagnostics.extend(fragment.diagnostics);

    Ok(ConvertedPair {
        vertex: vertex_shader,
        fragment: fragment_shader,
        strategy: pair.layout.strategy(),
        uniform_size_in_bytes: pair.layout.size_in_bytes(),
        diagnostics,
    })
}

impl PipelinePair {
    fn convert_stage(
        &mut self,
        unit: &mut ShaderUnit,
        interface: StageInterface,
    ) -> Result<ConvertedShader, ConvertError> {
        let layout = self.layout.plan_stage(&unit.symbols)?;

        let accessor = self.layout.strategy().accessor();
        rewrite_body(&mut unit.entry_body, unit.stage, &layout.fields, accessor);
        let entry_point = entry_point_text(&unit.entry_body);

        let text = ShaderText {
            stage: unit.stage,
            glsl_version: self.glsl_version,
            defines: &unit.symbols.defines,
            interface: &interface,
            uniform_block: layout.block.as_ref(),
            entry_point: &entry_point,
        }
        .emit();

        Ok(ConvertedShader {
            text,
            interface,
            layout,
        })
    }
}
