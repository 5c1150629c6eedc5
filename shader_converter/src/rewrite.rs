//! Renaming of uniform references and legacy built-ins in the entry point.
use std::collections::HashMap;

use smol_str::{SmolStr, format_smolstr};

use crate::{Stage, layout::LayoutField, tokenize::EntryBody};

/// The canonical signature written for the entry point.
pub const ENTRY_POINT_SIGNATURE: &str = "void main()";

/// The explicit fragment output replacing `gl_FragColor`.
pub const FRAGMENT_OUTPUT: &str = "outputFragColor";

// Legacy sampling functions and their overloaded replacements.
const FRAGMENT_BUILTINS: &[(&str, &str)] = &[
    ("texture2D", "texture"),
    ("texture2DProj", "textureProj"),
    ("textureCube", "texture"),
    ("gl_FragColor", FRAGMENT_OUTPUT),
];

/// Qualify uniform references with the block accessor and replace legacy built-ins.
///
/// All identifiers are replaced in a single pass,
/// so replacements are never matched again by later replacements.
pub fn rewrite_body(body: &mut EntryBody, stage: Stage, uniforms: &[LayoutField], accessor: &str) {
    let mut replacements: HashMap<SmolStr, SmolStr> = uniforms
        .iter()
        .map(|u| (u.name.clone(), format_smolstr!("{accessor}.{}", u.name)))
        .collect();

    if stage == Stage::Fragment {
        for (legacy, name) in FRAGMENT_BUILTINS {
            replacements.insert((*legacy).into(), (*name).into());
        }
    }

    body.replace_identifiers(&replacements);
}

/// The entry point function with a normalized signature.
pub fn entry_point_text(body: &EntryBody) -> String {
    format!("{ENTRY_POINT_SIGNATURE}\n{{{}}}\n", body.to_text())
}
