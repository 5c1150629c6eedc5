//! Classification of global declarations into a per stage [SymbolTable].
//!
//! Declarations that are never referenced by the entry point are removed
//! and reported as a [Diagnostic] instead.
use std::{collections::HashSet, fmt, iter::Peekable};

use indexmap::IndexMap;
use log::debug;
use smol_str::SmolStr;
use strum::Display;

use crate::{
    Stage,
    error::ConvertError,
    tokenize::{EntryBody, Token, entry_point_body, normalize, tokens},
};

/// Optional precision qualifiers or equivalent macros before a declaration type.
pub const PRECISION_QUALIFIERS: &[&str] = &[
    "lowp",
    "mediump",
    "highp",
    "PRECISION_LOW",
    "PRECISION_MEDIUM",
    "PRECISION_HIGH",
    "PLATFORM_PRECISION",
];

/// Uniform types that are bound as combined image samplers instead of uniform data.
pub const SAMPLER_TYPES: &[&str] = &[
    "sampler1D",
    "sampler2D",
    "sampler3D",
    "samplerCube",
    "sampler2DShadow",
    "samplerCubeShadow",
    "sampler2DArray",
];

/// The largest supported length for array declarations.
pub const MAX_ARRAY_LENGTH: u32 = 4096;

// Predefined macros that can't be redefined.
const RESERVED_DEFINES: &[&str] = &[
    "GL_ES",
    "GL_FRAGMENT_PRECISION_HIGH",
    "VULKAN",
    "__VERSION__",
    "__LINE__",
    "__FILE__",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeclarationKind {
    Attribute,
    Uniform,
    Varying,
    Sampler,
    Define,
}

/// A global variable declaration like `uniform highp vec4 colors[2];`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub ty: SmolStr,
    pub name: SmolStr,
    pub array_length: Option<u32>,
}

impl Declaration {
    /// The name with any array suffix like `colors[2]`.
    pub fn arrayed_name(&self) -> String {
        match self.array_length {
            Some(length) => format!("{}[{length}]", self.name),
            None => self.name.to_string(),
        }
    }
}

/// A preprocessor definition like `#define SCALE(x) (x * 2.0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    pub name: SmolStr,
    /// The parameter list for function-like macros including parentheses.
    pub parameters: Option<SmolStr>,
    pub value: String,
}

/// A declaration dropped because the entry point never references it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DeclarationKind,
    pub name: SmolStr,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unused {} {:?} in {} shader",
            self.kind, self.name, self.stage
        )
    }
}

/// Referenced declarations for a single stage in order of first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolTable {
    pub attributes: IndexMap<SmolStr, Declaration>,
    pub uniforms: IndexMap<SmolStr, Declaration>,
    pub varyings: IndexMap<SmolStr, Declaration>,
    pub samplers: IndexMap<SmolStr, Declaration>,
    pub defines: IndexMap<SmolStr, Define>,
}

/// A single classified shader stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderUnit {
    pub stage: Stage,
    /// The source with tabs replaced and comments removed.
    pub source: String,
    pub entry_body: EntryBody,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
}

impl ShaderUnit {
    /// Tokenize `source` and classify its global declarations.
    pub fn parse(source: &str, stage: Stage) -> Result<Self, ConvertError> {
        let source = normalize(source);
        let entry_body = EntryBody::parse(entry_point_body(&source, stage)?);

        let mut classifier = Classifier {
            stage,
            entry_body,
            symbols: SymbolTable::default(),
            diagnostics: Vec::new(),
            seen: HashSet::new(),
        };
        classifier.classify(tokens(&source))?;

        Ok(Self {
            stage,
            entry_body: classifier.entry_body,
            symbols: classifier.symbols,
            diagnostics: classifier.diagnostics,
            source,
        })
    }
}

struct Classifier {
    stage: Stage,
    entry_body: EntryBody,
    symbols: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    // Names already declared for each kind whether used or not.
    seen: HashSet<(DeclarationKind, SmolStr)>,
}

impl Classifier {
    fn classify<'a, I>(&mut self, tokens: I) -> Result<(), ConvertError>
    where
        I: Iterator<Item = Token<'a>>,
    {
        let mut tokens = tokens.peekable();
        while let Some(token) = tokens.next() {
            match token.text {
                "attribute" => {
                    if let Some((ty, name)) = type_and_name(&mut tokens) {
                        let (name, array_length) = split_array(name)?;
                        self.add(DeclarationKind::Attribute, ty, name, array_length);
                    }
                }
                "uniform" => {
                    if let Some((ty, name)) = type_and_name(&mut tokens) {
                        let (name, array_length) = split_array(name)?;
                        let kind = if SAMPLER_TYPES.contains(&ty) {
                            DeclarationKind::Sampler
                        } else {
                            DeclarationKind::Uniform
                        };
                        self.add(kind, ty, name, array_length);
                    }
                }
                "varying" => {
                    if let Some((ty, name)) = type_and_name(&mut tokens) {
                        match split_array(name)? {
                            (name, Some(length)) => self.add_varying_array(ty, name, length),
                            (name, None) => self.add(DeclarationKind::Varying, ty, name, None),
                        }
                    }
                }
                "#define" => self.add_define(token.line, &mut tokens),
                _ => (),
            }
        }
        Ok(())
    }

    fn add(&mut self, kind: DeclarationKind, ty: &str, name: &str, array_length: Option<u32>) {
        if !self.seen.insert((kind, name.into())) {
            return;
        }

        if !self.entry_body.references(name) {
            self.drop_unused(kind, name);
            return;
        }

        let declaration = Declaration {
            kind,
            ty: ty.into(),
            name: name.into(),
            array_length,
        };
        let table = match kind {
            DeclarationKind::Attribute => &mut self.symbols.attributes,
            DeclarationKind::Uniform => &mut self.symbols.uniforms,
            DeclarationKind::Varying => &mut self.symbols.varyings,
            DeclarationKind::Sampler => &mut self.symbols.samplers,
            DeclarationKind::Define => return,
        };
        table.insert(declaration.name.clone(), declaration);
    }

    // Interface arrays are split into separate varyings with their own locations.
    fn add_varying_array(&mut self, ty: &str, name: &str, length: u32) {
        if !self.seen.insert((DeclarationKind::Varying, name.into())) {
            return;
        }

        if !self.entry_body.references(name) {
            self.drop_unused(DeclarationKind::Varying, name);
            return;
        }

        self.entry_body.expand_indexed(name, length);
        for i in 0..length {
            let element_name = SmolStr::from(format!("{name}_{i}"));
            self.symbols.varyings.entry(element_name.clone()).or_insert(Declaration {
                kind: DeclarationKind::Varying,
                ty: ty.into(),
                name: element_name,
                array_length: None,
            });
        }
    }

    fn add_define<'a, I>(&mut self, line: usize, tokens: &mut Peekable<I>)
    where
        I: Iterator<Item = Token<'a>>,
    {
        let Some(head) = tokens.next_if(|t| t.line == line) else {
            return;
        };

        let mut value = Vec::new();
        while let Some(t) = tokens.next_if(|t| t.line == line) {
            value.push(t.text);
        }

        let (name, parameters) = match head.text.find('(') {
            Some(i) => (&head.text[..i], Some(SmolStr::new(&head.text[i..]))),
            None => (head.text, None),
        };

        if RESERVED_DEFINES.contains(&name) {
            debug!("Skipping reserved define {name:?}");
            return;
        }
        if self.symbols.defines.contains_key(name) {
            return;
        }
        if !self.entry_body.references(name) {
            debug!("Skipping unused define {name:?} in {} shader", self.stage);
            return;
        }

        self.symbols.defines.insert(
            name.into(),
            Define {
                name: name.into(),
                parameters,
                value: value.join(" "),
            },
        );
    }

    fn drop_unused(&mut self, kind: DeclarationKind, name: &str) {
        self.diagnostics.push(Diagnostic {
            stage: self.stage,
            kind,
            name: name.into(),
        });
    }
}

// Parse "[precision] type name;" after a storage qualifier.
fn type_and_name<'a, I>(tokens: &mut Peekable<I>) -> Option<(&'a str, &'a str)>
where
    I: Iterator<Item = Token<'a>>,
{
    tokens.next_if(|t| PRECISION_QUALIFIERS.contains(&t.text));
    let ty = tokens.next()?.text;
    let name = tokens.next()?.text.trim_end_matches(';');
    Some((ty, name))
}

// Split "name[N]" into "name" and N with 0 < N <= MAX_ARRAY_LENGTH.
fn split_array(name: &str) -> Result<(&str, Option<u32>), ConvertError> {
    match name.split_once('[') {
        Some((base, rest)) => {
            let length = rest.trim_end_matches(']');
            match length.parse() {
                Ok(n) if n > 0 && n <= MAX_ARRAY_LENGTH => Ok((base, Some(n))),
                _ => Err(ConvertError::InvalidArrayLength {
                    name: base.into(),
                    length: length.into(),
                }),
            }
        }
        None => Ok((name, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn names<T>(map: &IndexMap<SmolStr, T>) -> Vec<&str> {
        map.keys().map(|k| k.as_str()).collect()
    }

    #[test]
    fn classify_vertex_declarations() {
        let source = indoc! {"
            attribute highp vec3 position;
            attribute vec2 texcoord0;
            uniform mat4 mvp;
            uniform PRECISION_HIGH float scale;
            varying lowp vec2 uv;

            void main()
            {
                uv = texcoord0 * scale;
                gl_Position = mvp * vec4(position, 1.0);
            }
        "};
        let unit = ShaderUnit::parse(source, Stage::Vertex).unwrap();

        assert_eq!(vec!["position", "texcoord0"], names(&unit.symbols.attributes));
        assert_eq!(vec!["mvp", "scale"], names(&unit.symbols.uniforms));
        assert_eq!(vec!["uv"], names(&unit.symbols.varyings));
        assert_eq!(
            Declaration {
                kind: DeclarationKind::Uniform,
                ty: "float".into(),
                name: "scale".into(),
                array_length: None
            },
            unit.symbols.uniforms["scale"]
        );
        assert!(unit.diagnostics.is_empty());
    }

    #[test]
    fn classify_unused_declarations() {
        let source = indoc! {"
            attribute vec3 position;
            attribute vec3 normal;
            uniform float unused;
            uniform float unusedScale;
            uniform float unused;
            uniform sampler2D shadowMap;
            varying vec2 uv;

            void main()
            {
                gl_Position = vec4(position * unusedScale2, 1.0);
            }
        "};
        let unit = ShaderUnit::parse(source, Stage::Vertex).unwrap();

        assert_eq!(vec!["position"], names(&unit.symbols.attributes));
        assert!(unit.symbols.uniforms.is_empty());
        assert!(unit.symbols.samplers.is_empty());
        assert!(unit.symbols.varyings.is_empty());

        // Duplicate declarations only produce a single diagnostic.
        assert_eq!(
            vec![
                "unused attribute \"normal\" in vertex shader",
                "unused uniform \"unused\" in vertex shader",
                "unused uniform \"unusedScale\" in vertex shader",
                "unused sampler \"shadowMap\" in vertex shader",
                "unused varying \"uv\" in vertex shader",
            ],
            unit.diagnostics
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn classify_duplicate_first_occurrence_wins() {
        let source = indoc! {"
            uniform vec4 color;
            uniform vec3 color;
            void main() { gl_FragColor = color; }
        "};
        let unit = ShaderUnit::parse(source, Stage::Fragment).unwrap();
        assert_eq!("vec4", unit.symbols.uniforms["color"].ty);
        assert_eq!(1, unit.symbols.uniforms.len());
    }

    #[test]
    fn classify_samplers() {
        let source = indoc! {"
            uniform lowp sampler2D albedo;
            uniform samplerCube environment;
            uniform vec4 tint;
            void main()
            {
                gl_FragColor = texture2D(albedo, uv) * textureCube(environment, n) * tint;
            }
        "};
        let unit = ShaderUnit::parse(source, Stage::Fragment).unwrap();
        assert_eq!(vec!["albedo", "environment"], names(&unit.symbols.samplers));
        assert_eq!(vec!["tint"], names(&unit.symbols.uniforms));
    }

    #[test]
    fn classify_varying_array() {
        let source = indoc! {"
            varying vec2 uv[2];
            void main()
            {
                uv[0] = a;
                uv[1] = b;
            }
        "};
        let unit = ShaderUnit::parse(source, Stage::Vertex).unwrap();
        assert_eq!(vec!["uv_0", "uv_1"], names(&unit.symbols.varyings));
        assert_eq!(
            "\n    uv_0 = a;\n    uv_1 = b;\n",
            unit.entry_body.to_text()
        );
    }

    #[test]
    fn classify_uniform_array() {
        let source = indoc! {"
            uniform vec4 colors[4];
            void main() { gl_FragColor = colors[1]; }
        "};
        let unit = ShaderUnit::parse(source, Stage::Fragment).unwrap();
        assert_eq!(Some(4), unit.symbols.uniforms["colors"].array_length);
        assert_eq!("colors[4]", unit.symbols.uniforms["colors"].arrayed_name());
    }

    #[test]
    fn classify_invalid_array_length() {
        let source = "varying vec2 uv[N]; void main() { uv[0] = a; }";
        assert_eq!(
            Err(ConvertError::InvalidArrayLength {
                name: "uv".into(),
                length: "N".into()
            }),
            ShaderUnit::parse(source, Stage::Vertex)
        );
    }

    #[test]
    fn classify_array_length_too_large() {
        let source = "varying vec4 v[4000000000]; void main() { v[0] = a; }";
        assert_eq!(
            Err(ConvertError::InvalidArrayLength {
                name: "v".into(),
                length: "4000000000".into()
            }),
            ShaderUnit::parse(source, Stage::Vertex)
        );

        let source = "uniform mat4 bones[100000000]; void main() { gl_Position = bones[0][0]; }";
        assert_eq!(
            Err(ConvertError::InvalidArrayLength {
                name: "bones".into(),
                length: "100000000".into()
            }),
            ShaderUnit::parse(source, Stage::Vertex)
        );

        let source = "uniform vec4 data[4096]; void main() { gl_Position = data[0]; }";
        let unit = ShaderUnit::parse(source, Stage::Vertex).unwrap();
        assert_eq!(Some(MAX_ARRAY_LENGTH), unit.symbols.uniforms["data"].array_length);
    }

    #[test]
    fn classify_defines() {
        let source = indoc! {"
            #define GL_ES 1
            #define SCALE 2.0
            #define OFFSET(x) (x + 0.5)
            #define UNUSED 3
            void main()
            {
                gl_Position = vec4(OFFSET(SCALE));
            }
        "};
        let unit = ShaderUnit::parse(source, Stage::Vertex).unwrap();
        assert_eq!(vec!["SCALE", "OFFSET"], names(&unit.symbols.defines));
        assert_eq!(
            Define {
                name: "OFFSET".into(),
                parameters: Some("(x)".into()),
                value: "(x + 0.5)".into()
            },
            unit.symbols.defines["OFFSET"]
        );
        // Unused defines are not reported as diagnostics.
        assert!(unit.diagnostics.is_empty());
    }

    #[test]
    fn classify_missing_entry_point() {
        assert_eq!(
            Err(ConvertError::EntryPointNotFound {
                stage: Stage::Vertex
            }),
            ShaderUnit::parse("attribute vec3 position;", Stage::Vertex)
        );
    }
}
