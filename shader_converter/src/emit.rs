//! GLSL text generation for a converted stage.
//!
//! Sections are written in a fixed order and omitted if empty:
//! version, stage banner, defines, inputs, samplers, uniforms, outputs, and the entry point.
use indexmap::IndexMap;
use indoc::indoc;
use smol_str::SmolStr;

use crate::{
    Stage,
    declaration::Define,
    interface::{Binding, Slot, StageInterface},
    layout::UniformBlock,
    rewrite::FRAGMENT_OUTPUT,
};

/// Everything needed to write a single converted stage.
#[derive(Debug)]
pub struct ShaderText<'a> {
    pub stage: Stage,
    pub glsl_version: u32,
    pub defines: &'a IndexMap<SmolStr, Define>,
    pub interface: &'a StageInterface,
    pub uniform_block: Option<&'a UniformBlock>,
    /// The rewritten entry point function.
    pub entry_point: &'a str,
}

impl ShaderText<'_> {
    pub fn emit(&self) -> String {
        let mut text = format!(
            "#version {}\n#extension GL_ARB_separate_shader_objects : enable\n\n",
            self.glsl_version
        );

        match self.stage {
            Stage::Vertex => text += "// Vertex shader\n\n",
            Stage::Fragment => text += "// Fragment shader\n\n",
        }

        section(&mut text, "Defines", self.defines.values().map(define));

        match self.stage {
            Stage::Vertex => {
                section(
                    &mut text,
                    "Input",
                    self.interface.inputs.iter().map(|s| location(s, "in")),
                );
                section(&mut text, "Samplers", self.interface.samplers.iter().map(sampler));
                self.uniforms(&mut text);
                section(
                    &mut text,
                    "Varying variables",
                    self.interface.outputs.iter().map(|s| location(s, "out")),
                );
                text += indoc! {"
                    // Vertex output
                    out gl_PerVertex {
                        vec4 gl_Position;
                    };

                "};
            }
            Stage::Fragment => {
                section(
                    &mut text,
                    "Varying variables",
                    self.interface.inputs.iter().map(|s| location(s, "in")),
                );
                section(&mut text, "Samplers", self.interface.samplers.iter().map(sampler));
                self.uniforms(&mut text);
                text += &format!(
                    "// Fragment output\nlayout(location = 0) out vec4 {FRAGMENT_OUTPUT};\n\n"
                );
            }
        }

        text += "// Main function\n";
        text += self.entry_point;
        text
    }

    fn uniforms(&self, text: &mut String) {
        match self.uniform_block {
            Some(UniformBlock::PushConstant { members }) => {
                *text += "// Push constants\n";
                *text += "layout(push_constant) uniform PushConstants {\n";
                *text += members;
                *text += "} pc;\n\n";
            }
            Some(UniformBlock::UniformBuffer {
                binding: Binding { set, binding },
                members,
            }) => {
                *text += "// Uniform buffer\n";
                *text += &format!(
                    "layout(set = {set}, binding = {binding}) uniform UniformBuffer {{\n"
                );
                *text += members;
                *text += "} ub;\n\n";
            }
            None => (),
        }
    }
}

fn section<I: Iterator<Item = String>>(text: &mut String, name: &str, lines: I) {
    let mut lines = lines.peekable();
    if lines.peek().is_some() {
        *text += &format!("// {name}\n");
        for line in lines {
            *text += &line;
        }
        *text += "\n";
    }
}

fn define(define: &Define) -> String {
    let parameters = define.parameters.as_deref().unwrap_or_default();
    if define.value.is_empty() {
        format!("#define {}{parameters}\n", define.name)
    } else {
        format!("#define {}{parameters} {}\n", define.name, define.value)
    }
}

fn location(slot: &Slot<u32>, direction: &str) -> String {
    format!(
        "layout(location = {}) {direction} {} {};\n",
        slot.index,
        slot.declaration.ty,
        slot.declaration.arrayed_name()
    )
}

fn sampler(slot: &Slot<Binding>) -> String {
    format!(
        "layout(set = {}, binding = {}) uniform {} {};\n",
        slot.index.set,
        slot.index.binding,
        slot.declaration.ty,
        slot.declaration.arrayed_name()
    )
}
