use crate::patch::errors::ApplyError;
use std::path::{Path, PathBuf};

/// How strictly hunks must match their recorded context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzOptions {
    /// Allow whitespace drift and dropping boundary context lines
    pub fuzzy: bool,
    /// Context lines that may be ignored at each end of a hunk
    pub max_fuzz: usize,
}

impl Default for FuzzOptions {
    fn default() -> Self {
        Self {
            fuzzy: false,
            max_fuzz: 2,
        }
    }
}

/// A patch file that applied cleanly (possibly with offset or fuzz).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Files written, relative to the tree root
    pub files: Vec<PathBuf>,
    /// Largest number of context lines ignored for any hunk
    pub fuzz: usize,
    /// Largest absolute line offset needed for any hunk
    pub offset: usize,
}

/// Applies one unified-diff patch to a tree.
///
/// Implementations must leave the tree untouched when they return an error
/// for a single-file patch.
pub trait PatchApplier {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Apply `patch_text` (AT header already stripped) to the tree at `tree`.
    ///
    /// `patch_file` is only used for diagnostics.
    fn apply(&self, tree: &Path, patch_file: &Path, patch_text: &str) -> Result<Applied, ApplyError>;
}
