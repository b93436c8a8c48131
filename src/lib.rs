//! Forkpatch: patch lifecycle engine for forks of generated Java sources
//!
//! A fork is kept as a directory of unified diffs against a freshly generated
//! base tree. Visibility and finality overrides are tracked separately as
//! access transforms, stored in patch headers rather than as textual deltas.
//!
//! # Architecture
//!
//! - [`at`]: the access transform token codec, sets, tables and collectors.
//! - [`java`]: tree-sitter based rewriting of modifiers on Java declarations.
//! - [`patch`]: applying patch directories in-process or through `patch`.
//! - [`rebuild`]: diffing a working tree back into a patch directory.
//! - [`vcs`] and [`pipeline`]: git checkpoints around each stage.
//!
//! Per-file problems never abort a batch; they are collected as
//! [`report::Failure`] values. Only invariant violations are returned as errors.
//!
//! # Example
//!
//! ```no_run
//! use forkpatch::at::AccessTransformSet;
//! use forkpatch::rebuild::{PatchRebuilder, RebuildOptions};
//! use std::path::Path;
//!
//! let rebuilder = PatchRebuilder::new(RebuildOptions::default());
//! let report = rebuilder
//!     .rebuild(
//!         Path::new("base"),
//!         Path::new("working"),
//!         Path::new("patches"),
//!         &AccessTransformSet::new(),
//!     )
//!     .expect("rebuild failed");
//! println!("{} patches", report.patches);
//! ```

pub mod at;
pub mod config;
pub mod edit;
pub mod java;
pub mod patch;
pub mod pipeline;
pub mod rebuild;
pub mod report;
pub mod safety;
pub mod tree;
pub mod vcs;

// Re-exports
pub use at::{AccessTransform, AccessTransformSet, AtError, MemberKey};
pub use config::{load_from_path, load_from_str, ConfigError, ForkConfig};
pub use edit::{Edit, EditError, EditVerification};
pub use java::{RewriteError, StructuralRewriter};
pub use patch::{
    ApplyError, EngineError, InProcessApplier, NativeApplier, PatchApplier, PatchEngine,
    PatchReport, PatchResult,
};
pub use rebuild::{PatchRebuilder, RebuildError, RebuildOptions, RebuildReport};
pub use report::{BatchFailure, Failure, Stage};
pub use safety::{SafetyError, TreeGuard};
pub use vcs::{Checkpoint, VcsError, VersionedTree};
