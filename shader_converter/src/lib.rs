//! # shader_converter
//! shader_converter converts legacy GLSL vertex and fragment shader pairs
//! using `attribute`, `varying`, and loose `uniform` declarations
//! into Vulkan GLSL with explicit locations, descriptor bindings,
//! and a push constant or uniform buffer block for uniform values.
//!
//! Both stages of a pair are converted together since fragment inputs must use
//! the locations assigned to vertex outputs and uniforms from both stages share one block.
//!
//! # Getting Started
//! ```rust
//! use shader_converter::{convert_pair, ConvertOptions};
//!
//! let vertex = "attribute vec3 position; void main() { gl_Position = vec4(position, 1.0); }";
//! let fragment = "void main() { gl_FragColor = vec4(1.0); }";
//!
//! let converted = convert_pair(vertex, fragment, &ConvertOptions::default()).unwrap();
//! assert!(converted.vertex.text.contains("layout(location = 0) in vec3 position;"));
//! ```
use strum::Display;

pub mod batch;
pub mod declaration;
pub mod emit;
pub mod error;
pub mod interface;
pub mod layout;
mod pipeline;
pub mod rewrite;
pub mod tokenize;

pub use pipeline::{ConvertOptions, ConvertedPair, ConvertedShader, convert_pair, convert_units};

/// The programmable pipeline stage for a shader source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Vertex,
    Fragment,
}
