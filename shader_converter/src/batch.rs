//! Conversion of folders containing many shader pairs.
//!
//! Pairs are found by matching file names that differ only in their extension.
//! Each pair is converted independently, so an error only affects that pair.
use std::{
    collections::BTreeMap,
    error::Error,
    path::{Path, PathBuf},
};

use log::{error, info, warn};
use rayon::prelude::*;

use crate::{
    ConvertOptions, Stage, convert_units,
    declaration::{Diagnostic, ShaderUnit},
    error::ConvertPairError,
};

/// The vertex and fragment source files sharing the same path without extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderPairPaths {
    pub vertex: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
}

/// The results from [convert_folder] sorted by path.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub converted: usize,
    pub failed: Vec<(PathBuf, ConvertPairError)>,
    /// Unused declarations and the source file containing them.
    pub diagnostics: Vec<(PathBuf, Diagnostic)>,
}

/// Find all shader pairs under `input` grouped by their path without extension.
pub fn find_shader_pairs<P: AsRef<Path>>(
    input: P,
    options: &ConvertOptions,
) -> Result<BTreeMap<PathBuf, ShaderPairPaths>, globwalk::GlobError> {
    let patterns = [
        format!("*.{}", options.vertex_input_extension),
        format!("*.{}", options.fragment_input_extension),
    ];

    let mut pairs = BTreeMap::<PathBuf, ShaderPairPaths>::new();
    for entry in globwalk::GlobWalkerBuilder::from_patterns(input.as_ref(), &patterns).build()? {
        let path = match entry {
            Ok(entry) => entry.into_path(),
            Err(e) => {
                error!("Error reading {:?}: {e}", input.as_ref());
                continue;
            }
        };

        let pair = pairs.entry(path.with_extension("")).or_default();
        match stage_from_path(&path, options) {
            Some(Stage::Vertex) => pair.vertex = Some(path),
            Some(Stage::Fragment) => pair.fragment = Some(path),
            None => (),
        }
    }

    Ok(pairs)
}

fn stage_from_path(path: &Path, options: &ConvertOptions) -> Option<Stage> {
    let extension = path.extension()?.to_str()?;
    if extension == options.vertex_input_extension {
        Some(Stage::Vertex)
    } else if extension == options.fragment_input_extension {
        Some(Stage::Fragment)
    } else {
        None
    }
}

/// Convert every shader pair in `input` and write the results to the same relative paths in `output`.
///
/// Failed pairs are logged and returned in the summary without stopping the other pairs.
pub fn convert_folder<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &ConvertOptions,
) -> Result<BatchSummary, globwalk::GlobError> {
    // Use the same absolute form as the found paths to mirror the folder structure.
    let input = input
        .as_ref()
        .canonicalize()
        .unwrap_or_else(|_| input.as_ref().to_owned());
    let input = input.as_path();
    let output = output.as_ref();

    let pairs: Vec<_> = find_shader_pairs(input, options)?.into_iter().collect();

    // The pairs don't share any state, so they can be processed in parallel.
    let results: Vec<_> = pairs
        .par_iter()
        .map(|(name, paths)| (name, convert_pair_files(paths, input, output, options)))
        .collect();

    let mut summary = BatchSummary::default();
    for (name, (diagnostics, result)) in results {
        // Unused declarations are reported even if the pair later fails.
        for (path, diagnostic) in &diagnostics {
            warn!("{diagnostic} ({path:?})");
        }
        summary.diagnostics.extend(diagnostics);

        match result {
            Ok(()) => summary.converted += 1,
            Err(e) => {
                error!("{}", error_chain(&e));
                summary.failed.push((name.clone(), e));
            }
        }
    }

    info!(
        "Converted {} shader pairs with {} failures and {} unused declarations",
        summary.converted,
        summary.failed.len(),
        summary.diagnostics.len()
    );

    Ok(summary)
}

fn convert_pair_files(
    paths: &ShaderPairPaths,
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> (Vec<(PathBuf, Diagnostic)>, Result<(), ConvertPairError>) {
    let (vertex_path, fragment_path) = match (&paths.vertex, &paths.fragment) {
        (Some(v), Some(f)) => (v, f),
        (Some(path), None) | (None, Some(path)) => {
            let e = ConvertPairError::MissingPairedFile { path: path.clone() };
            return (Vec::new(), Err(e));
        }
        (None, None) => unreachable!("pairs always contain at least one file"),
    };

    let (vertex, fragment) = match (read_source(vertex_path), read_source(fragment_path)) {
        (Ok(v), Ok(f)) => (v, f),
        (Err(e), _) | (_, Err(e)) => return (Vec::new(), Err(e)),
    };

    let vertex = ShaderUnit::parse(&vertex, Stage::Vertex);
    let fragment = ShaderUnit::parse(&fragment, Stage::Fragment);

    let diagnostics = [vertex.as_ref(), fragment.as_ref()]
        .into_iter()
        .flatten()
        .flat_map(|unit| {
            let path = match unit.stage {
                Stage::Vertex => vertex_path,
                Stage::Fragment => fragment_path,
            };
            unit.diagnostics.iter().map(move |d| (path.clone(), d.clone()))
        })
        .collect();

    let result = vertex
        .and_then(|vertex| fragment.and_then(|fragment| convert_units(vertex, fragment, options)))
        .map_err(|source| ConvertPairError::Convert {
            vertex: vertex_path.clone(),
            fragment: fragment_path.clone(),
            source,
        })
        .and_then(|pair| {
            write_output(
                &output_path(vertex_path, input, output, &options.vertex_output_extension),
                &pair.vertex.text,
            )?;
            write_output(
                &output_path(fragment_path, input, output, &options.fragment_output_extension),
                &pair.fragment.text,
            )
        });

    (diagnostics, result)
}

fn read_source(path: &Path) -> Result<String, ConvertPairError> {
    std::fs::read_to_string(path).map_err(|source| ConvertPairError::Read {
        path: path.to_owned(),
        source,
    })
}

fn write_output(path: &Path, text: &str) -> Result<(), ConvertPairError> {
    let write = || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)
    };
    write().map_err(|source| ConvertPairError::Write {
        path: path.to_owned(),
        source,
    })
}

/// Mirror the path relative to `input` under `output` with a new extension.
pub fn output_path(path: &Path, input: &Path, output: &Path, extension: &str) -> PathBuf {
    // Globwalk paths always start with the input folder.
    let relative = path.strip_prefix(input).unwrap_or(path);
    output.join(relative).with_extension(extension)
}

// Include the underlying causes like "error converting ...: fragment varying ...".
fn error_chain(e: &dyn Error) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(e) = source {
        text += &format!(": {e}");
        source = e.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::declaration::DeclarationKind;
    use crate::error::ConvertError;
    use pretty_assertions::assert_eq;

    // A scratch folder that is removed when dropped.
    struct TempFolder(PathBuf);

    impl TempFolder {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir()
                .join(format!("shader_converter_{name}_{}", std::process::id()));
            let _ = std::fs::remove_dir_all(&path);
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn write(&self, relative: &str, text: &str) {
            let path = self.0.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        }
    }

    impl Drop for TempFolder {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    const VERTEX: &str = include_str!("data/simple.vsh");
    const FRAGMENT: &str = include_str!("data/simple.psh");

    #[test]
    fn find_pairs_grouped_by_name() {
        let input = TempFolder::new("find_pairs");
        input.write("a.vsh", VERTEX);
        input.write("a.psh", FRAGMENT);
        input.write("nested/b.vsh", VERTEX);
        input.write("readme.txt", "");

        let pairs = find_shader_pairs(&input.0, &ConvertOptions::default()).unwrap();
        assert_eq!(
            vec![
                (
                    input.0.join("a"),
                    ShaderPairPaths {
                        vertex: Some(input.0.join("a.vsh")),
                        fragment: Some(input.0.join("a.psh")),
                    }
                ),
                (
                    input.0.join("nested/b"),
                    ShaderPairPaths {
                        vertex: Some(input.0.join("nested/b.vsh")),
                        fragment: None,
                    }
                ),
            ],
            pairs.into_iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn convert_folder_mirrors_structure() {
        let input = TempFolder::new("convert_input");
        let output = TempFolder::new("convert_output");
        input.write("sprites/quad.vsh", VERTEX);
        input.write("sprites/quad.psh", FRAGMENT);

        let summary = convert_folder(&input.0, &output.0, &ConvertOptions::default()).unwrap();
        assert_eq!(1, summary.converted);
        assert!(summary.failed.is_empty());

        let vertex = std::fs::read_to_string(output.0.join("sprites/quad.vert")).unwrap();
        let fragment = std::fs::read_to_string(output.0.join("sprites/quad.frag")).unwrap();
        assert!(vertex.starts_with("#version 450\n"));
        assert!(fragment.contains("layout(location = 0) in vec2 uv;"));
    }

    #[test]
    fn convert_folder_failures_isolated() {
        let input = TempFolder::new("failures_input");
        let output = TempFolder::new("failures_output");
        input.write("good.vsh", VERTEX);
        input.write("good.psh", FRAGMENT);
        input.write("lonely.psh", FRAGMENT);
        input.write("mismatch.vsh", VERTEX);
        input.write(
            "mismatch.psh",
            "varying vec3 normal; void main() { gl_FragColor = vec4(normal, 1.0); }",
        );
        input.write(
            "unused.vsh",
            "uniform float unused; void main() { gl_Position = vec4(1.0); }",
        );
        input.write("unused.psh", "void main() { gl_FragColor = vec4(1.0); }");

        let summary = convert_folder(&input.0, &output.0, &ConvertOptions::default()).unwrap();
        assert_eq!(2, summary.converted);
        assert!(output.0.join("good.frag").exists());
        assert!(!output.0.join("mismatch.vert").exists());

        assert_eq!(2, summary.failed.len());
        assert_eq!(input.0.join("lonely"), summary.failed[0].0);
        assert!(matches!(
            &summary.failed[0].1,
            ConvertPairError::MissingPairedFile { path } if path == &input.0.join("lonely.psh")
        ));
        assert_eq!(input.0.join("mismatch"), summary.failed[1].0);
        assert!(matches!(
            &summary.failed[1].1,
            ConvertPairError::Convert {
                source: ConvertError::InterfaceMismatch { name },
                ..
            } if name == "normal"
        ));

        assert_eq!(
            vec![(
                input.0.join("unused.vsh"),
                Diagnostic {
                    stage: Stage::Vertex,
                    kind: DeclarationKind::Uniform,
                    name: "unused".into()
                }
            )],
            summary.diagnostics
        );
    }

    #[test]
    fn convert_folder_failed_pair_diagnostics() {
        let input = TempFolder::new("failed_diagnostics_input");
        let output = TempFolder::new("failed_diagnostics_output");
        input.write(
            "broken.vsh",
            "uniform float unused; void main() { gl_Position = vec4(1.0); }",
        );
        input.write(
            "broken.psh",
            "varying vec3 normal; void main() { gl_FragColor = vec4(normal, 1.0); }",
        );

        let summary = convert_folder(&input.0, &output.0, &ConvertOptions::default()).unwrap();
        assert_eq!(0, summary.converted);
        assert_eq!(1, summary.failed.len());
        assert_eq!(
            vec![(
                input.0.join("broken.vsh"),
                Diagnostic {
                    stage: Stage::Vertex,
                    kind: DeclarationKind::Uniform,
                    name: "unused".into()
                }
            )],
            summary.diagnostics
        );
    }

    #[test]
    fn output_path_mirrored() {
        assert_eq!(
            PathBuf::from("out/a/b/c.frag"),
            output_path(Path::new("in/a/b/c.psh"), Path::new("in"), Path::new("out"), "frag")
        );
    }

    #[test]
    fn error_chain_includes_source() {
        let e = ConvertPairError::Convert {
            vertex: "a.vsh".into(),
            fragment: "a.psh".into(),
            source: ConvertError::InterfaceMismatch {
                name: "normal".into(),
            },
        };
        assert_eq!(
            "error converting \"a.vsh\" and \"a.psh\": fragment varying \"normal\" is not written by the vertex shader",
            error_chain(&e)
        );
    }
}
