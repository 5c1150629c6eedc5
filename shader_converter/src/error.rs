use std::path::PathBuf;

use smol_str::SmolStr;
use thiserror::Error;

use crate::Stage;

/// A fatal error for a single vertex/fragment pair.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("failed to find entry point `void main()` in {stage} shader")]
    EntryPointNotFound { stage: Stage },

    #[error("fragment varying {name:?} is not written by the vertex shader")]
    InterfaceMismatch { name: SmolStr },

    #[error("uniform {name:?} has unsupported type {ty:?}")]
    UnknownType { name: SmolStr, ty: SmolStr },

    #[error("uniform {name:?} is declared as {vertex:?} in vertex shader but {fragment:?} in fragment shader")]
    ConflictingUniform {
        name: SmolStr,
        vertex: SmolStr,
        fragment: SmolStr,
    },

    #[error("uniform {name:?} does not fit in a uniform block")]
    UniformBlockTooLarge { name: SmolStr },

    #[error("declaration {name:?} has invalid array length {length:?}")]
    InvalidArrayLength { name: SmolStr, length: SmolStr },
}

/// Errors for a pair of files processed by [convert_folder](crate::batch::convert_folder).
#[derive(Debug, Error)]
pub enum ConvertPairError {
    #[error("expected a paired shader file for {path:?}")]
    MissingPairedFile { path: PathBuf },

    #[error("error reading {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error writing {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error converting {vertex:?} and {fragment:?}")]
    Convert {
        vertex: PathBuf,
        fragment: PathBuf,
        #[source]
        source: ConvertError,
    },
}
