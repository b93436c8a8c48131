use crate::edit::EditError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JavaSyntaxError {
    #[error("failed to set Java language for parser")]
    LanguageSet,

    #[error("failed to parse Java source")]
    ParseFailed,
}

/// A transform that could not be applied to one declaration.
///
/// These are collected per occurrence; the rest of the file is still rewritten.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteIssue {
    #[error("{path}: cannot find {target} in class {class}")]
    TargetMemberNotFound {
        path: PathBuf,
        class: String,
        /// `class` for the declaration itself, otherwise the member signature
        target: String,
    },

    #[error("{path}: {target} in class {class} is already {state}")]
    RedundantTransform {
        path: PathBuf,
        class: String,
        target: String,
        state: String,
    },

    #[error("{path}: invalid target {target} in class {class}: {reason}")]
    InvalidTarget {
        path: PathBuf,
        class: String,
        target: String,
        reason: String,
    },
}

/// Failures that abort a rewrite pass.
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("rewrite of {path} produced {found} results, expected {expected}")]
    UnexpectedResultSetShape {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("{path}: {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: JavaSyntaxError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write rewritten source: {0}")]
    Edit(#[from] EditError),
}
