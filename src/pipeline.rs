//! Checkpointed pipeline stages: vanilla -> base -> patched.

use crate::at::{read_table, AccessTransformSet, AtIoError};
use crate::config::ForkConfig;
use crate::java::StructuralRewriter;
use crate::patch::{EngineError, PatchEngine, PatchSetOptions, PatchSetReport};
use crate::tree::{copy_tree, ensure_clean};
use crate::vcs::{Author, Checkpoint, VcsError, VersionedTree};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Table(#[from] AtIoError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a stage that applies patches. `checkpoint` is only set when
/// every patch applied and the stage was tagged.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub report: PatchSetReport,
    pub checkpoint: Option<Checkpoint>,
}

/// Seed `tree` from `vanilla`, commit and tag it, then optionally apply
/// `base_patches` and tag the result as the base checkpoint.
///
/// Without base patches the base tag points at the vanilla commit.
pub fn setup_base(
    vanilla: &Path,
    tree: &Path,
    base_patches: Option<&Path>,
    config: &ForkConfig,
) -> Result<StageOutcome, PipelineError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PipelineError::Io { path, source }
    };
    let vanilla_canonical = vanilla.canonicalize().map_err(io(vanilla))?;
    if let Ok(tree_canonical) = tree.canonicalize() {
        if vanilla_canonical.starts_with(&tree_canonical) {
            return Err(PipelineError::Io {
                path: tree.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "tree would overwrite the vanilla sources",
                ),
            });
        }
    }
    ensure_clean(tree).map_err(io(tree))?;
    let copied = copy_tree(vanilla, tree).map_err(io(vanilla))?;
    info!(files = copied, tree = %tree.display(), "copied vanilla sources");

    let tags = &config.checkpoint;
    let (repo, initial) = VersionedTree::init(tree, Author::from(tags))?;
    repo.tag(&initial, &tags.vanilla_tag)?;

    let Some(patch_dir) = base_patches else {
        let base = repo.tag(&initial, &tags.base_tag)?;
        return Ok(StageOutcome {
            report: PatchSetReport::default(),
            checkpoint: Some(base),
        });
    };

    let report = apply_patches(tree, patch_dir, config)?;
    if !report.is_success() {
        warn!(failures = report.failures().len(), "base patches failed, not tagging");
        return Ok(StageOutcome {
            report,
            checkpoint: None,
        });
    }
    let commit = repo.commit("Base")?;
    let base = repo.tag(&commit, &tags.base_tag)?;
    Ok(StageOutcome {
        report,
        checkpoint: Some(base),
    })
}

/// Reset `tree` to the base checkpoint, apply `patch_dir`, and on success
/// commit and tag the result as patched.
///
/// A stale patched tag is deleted first, so the stage can be rerun.
pub fn apply_stage(tree: &Path, patch_dir: &Path, config: &ForkConfig) -> Result<StageOutcome, PipelineError> {
    let tags = &config.checkpoint;
    let repo = VersionedTree::open(tree, Author::from(tags));
    if repo.tag_exists(&tags.patched_tag)? {
        repo.delete_tag(&tags.patched_tag)?;
    }
    repo.reset_hard(&tags.base_tag)?;

    let report = apply_patches(tree, patch_dir, config)?;
    if !report.is_success() {
        return Ok(StageOutcome {
            report,
            checkpoint: None,
        });
    }
    let commit = repo.commit("Patched")?;
    let patched = repo.tag(&commit, &tags.patched_tag)?;
    info!(tag = %patched.name, commit = %patched.commit, "tagged patched tree");
    Ok(StageOutcome {
        report,
        checkpoint: Some(patched),
    })
}

/// Apply a patch set in place using the configured strategy and table.
pub fn apply_patches(tree: &Path, patch_dir: &Path, config: &ForkConfig) -> Result<PatchSetReport, PipelineError> {
    let options = PatchSetOptions {
        apply_ats: config.apply.apply_ats,
        extra_ats: prior_table(config.rebuild.at_table.as_deref())?,
        rewriter: StructuralRewriter::new(config.rebuild.classpath.clone()),
    };
    let engine = PatchEngine::from_config(&config.apply);
    Ok(engine.apply_patch_set(tree, patch_dir, tree, &options)?)
}

/// The table at `path`, or an empty set when there is none yet.
pub fn prior_table(path: Option<&Path>) -> Result<AccessTransformSet, AtIoError> {
    match path {
        Some(path) if path.is_file() => read_table(path),
        _ => Ok(AccessTransformSet::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::git_available;
    use std::fs;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn apply_stage_is_rerunnable() {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let vanilla = dir.path().join("vanilla");
        let tree = dir.path().join("tree");
        let patches = dir.path().join("patches");
        write(&vanilla.join("A.java"), "class A {\n}\n");
        write(
            &patches.join("A.java.patch"),
            "--- a/A.java\n+++ b/A.java\n@@ -1,2 +1,3 @@\n class A {\n+    int a;\n }\n",
        );
        let config = ForkConfig::default();

        let setup = setup_base(&vanilla, &tree, None, &config).unwrap();
        assert_eq!(setup.checkpoint.unwrap().name, "mache");

        for _ in 0..2 {
            let outcome = apply_stage(&tree, &patches, &config).unwrap();
            assert!(outcome.report.is_success());
            assert_eq!(outcome.checkpoint.unwrap().name, "patched");
            assert_eq!(
                fs::read_to_string(tree.join("A.java")).unwrap(),
                "class A {\n    int a;\n}\n"
            );
        }
    }

    #[test]
    fn failed_apply_is_not_tagged() {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let vanilla = dir.path().join("vanilla");
        let tree = dir.path().join("tree");
        let patches = dir.path().join("patches");
        write(&vanilla.join("A.java"), "class A {\n}\n");
        write(
            &patches.join("A.java.patch"),
            "--- a/A.java\n+++ b/A.java\n@@ -1,2 +1,3 @@\n class Other {\n+    int a;\n }\n",
        );
        let config = ForkConfig::default();
        setup_base(&vanilla, &tree, None, &config).unwrap();

        let outcome = apply_stage(&tree, &patches, &config).unwrap();
        assert!(outcome.checkpoint.is_none());
        assert_eq!(outcome.report.failures().len(), 1);
        let repo = VersionedTree::open(&tree, Author::from(&config.checkpoint));
        assert!(!repo.tag_exists("patched").unwrap());
    }

    #[test]
    fn missing_table_is_empty() {
        assert!(prior_table(None).unwrap().is_empty());
        assert!(prior_table(Some(Path::new("/nonexistent/table.at")))
            .unwrap()
            .is_empty());
    }
}
