//! Unified diff parsing and application.
//!
//! Two strategies sit behind [`PatchApplier`]: an in-process applier that
//! locates hunks itself, and a wrapper around an external `patch` executable.
//! [`PatchEngine`] drives either one over a whole patch directory.

pub mod applier;
pub mod engine;
pub mod errors;
pub mod format;
pub mod inprocess;
pub mod native;

pub use applier::{Applied, FuzzOptions, PatchApplier};
pub use engine::{PatchEngine, PatchReport, PatchResult, PatchSetOptions, PatchSetReport};
pub use errors::{ApplyError, ClosestMatch, EngineError, HunkFailure, PatchParseError};
pub use format::{parse_patch, FilePatch, Hunk, HunkLine};
pub use inprocess::{apply_hunks, InProcessApplier, PatchedText};
pub use native::NativeApplier;
