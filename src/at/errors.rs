use crate::at::codec::AccessTransform;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtError {
    #[error("malformed access transform token '{token}'")]
    MalformedToken { token: String },

    #[error("conflicting access transforms for {class}{member}: {existing} vs {incoming}")]
    ConflictingTransform {
        class: String,
        /// Rendered member suffix (`#name` / `#name(desc)`), empty for the class itself
        member: String,
        existing: AccessTransform,
        incoming: AccessTransform,
    },

    #[error("malformed method descriptor '{descriptor}'")]
    MalformedDescriptor { descriptor: String },

    #[error("malformed access transform line {line}: {text}")]
    MalformedLine { line: usize, text: String },
}

/// I/O failures while reading or writing AT tables and patch headers.
#[derive(Error, Debug)]
pub enum AtIoError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: AtError,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}
