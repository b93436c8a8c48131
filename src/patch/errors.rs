use crate::at::AtIoError;
use crate::edit::EditError;
use crate::java::RewriteError;
use crate::safety::SafetyError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchParseError {
    #[error("patch contains no file sections")]
    Empty,

    #[error("line {line}: expected `+++ ` after `--- `")]
    MissingNewPath { line: usize },

    #[error("line {line}: file section has no hunks")]
    NoHunks { line: usize },

    #[error("line {line}: malformed hunk header {text:?}")]
    BadHunkHeader { line: usize, text: String },

    #[error("line {line}: unexpected line in hunk {text:?}")]
    UnexpectedLine { line: usize, text: String },

    #[error("line {line}: patch ends inside a hunk")]
    Truncated { line: usize },
}

/// Nearest location a failed hunk could have matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestMatch {
    /// 1-based line in the target file
    pub line: usize,
    /// Normalized similarity in `[0, 1]`
    pub similarity: f64,
}

/// Why one hunk could not be placed.
#[derive(Debug, Clone, PartialEq)]
pub struct HunkFailure {
    /// 1-based hunk index within its file section
    pub hunk: usize,
    /// 1-based line the hunk header points at
    pub expected_line: usize,
    pub closest: Option<ClosestMatch>,
}

impl std::fmt::Display for HunkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hunk #{} at line {} did not match",
            self.hunk, self.expected_line
        )?;
        if let Some(closest) = &self.closest {
            write!(
                f,
                " (closest candidate at line {}, {:.0}% similar)",
                closest.line,
                closest.similarity * 100.0
            )?;
        }
        Ok(())
    }
}

/// Failure to apply one patch file.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("malformed patch: {0}")]
    Parse(#[from] PatchParseError),

    #[error("{path}: {failure}")]
    Hunk { path: PathBuf, failure: HunkFailure },

    #[error("{path}: target file does not exist")]
    MissingTarget { path: PathBuf },

    #[error("{path}: file to create already exists")]
    TargetExists { path: PathBuf },

    #[error(transparent)]
    Unsafe(#[from] SafetyError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {0}")]
    Write(#[from] EditError),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {output}")]
    Tool {
        program: String,
        status: String,
        output: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}

/// Failures that abort a whole patch-set run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("patch directory {0} does not exist")]
    MissingPatchDir(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Collect(#[from] AtIoError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Unsafe(#[from] SafetyError),
}
