//! Batch application of a patch directory to a source tree.

use crate::at::{collect_from_patches, split_header, AccessTransformSet};
use crate::config::{ApplyConfig, Strategy};
use crate::java::StructuralRewriter;
use crate::patch::applier::{FuzzOptions, PatchApplier};
use crate::patch::errors::EngineError;
use crate::patch::inprocess::InProcessApplier;
use crate::patch::native::NativeApplier;
use crate::report::Failure;
use crate::tree::{copy_tree, ensure_clean, VCS_DIR};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Outcome for one patch file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatchResult {
    Success {
        patch: PathBuf,
        files: Vec<PathBuf>,
        fuzz: usize,
        offset: usize,
    },
    PerFileFailure {
        patch: PathBuf,
        failure: Failure,
    },
}

impl PatchResult {
    pub fn patch(&self) -> &Path {
        match self {
            PatchResult::Success { patch, .. } | PatchResult::PerFileFailure { patch, .. } => patch,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PatchResult::Success { .. })
    }
}

/// Every per-file outcome of one run, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub results: Vec<PatchResult>,
}

impl PatchReport {
    pub fn applied(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failures(&self) -> Vec<Failure> {
        self.results
            .iter()
            .filter_map(|r| match r {
                PatchResult::PerFileFailure { failure, .. } => Some(failure.clone()),
                PatchResult::Success { .. } => None,
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(PatchResult::is_success)
    }
}

/// Report for [`PatchEngine::apply_patch_set`]: header transforms plus patches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchSetReport {
    /// Distinct class/member transforms found in headers and the prior table
    pub transforms: usize,
    /// Declarations rewritten in the output tree
    pub rewritten: usize,
    /// Problems with header directives or their rewrite
    pub at_failures: Vec<Failure>,
    pub patches: PatchReport,
}

impl PatchSetReport {
    pub fn failures(&self) -> Vec<Failure> {
        let mut all = self.at_failures.clone();
        all.extend(self.patches.failures());
        all
    }

    pub fn is_success(&self) -> bool {
        self.at_failures.is_empty() && self.patches.is_success()
    }
}

/// Options for the access-transform half of [`PatchEngine::apply_patch_set`].
#[derive(Debug, Clone, Default)]
pub struct PatchSetOptions {
    /// Rewrite header transforms into the output before applying patches
    pub apply_ats: bool,
    /// Extra transforms (e.g. from a project-wide table) merged with the headers
    pub extra_ats: AccessTransformSet,
    pub rewriter: StructuralRewriter,
}

pub struct PatchEngine {
    applier: Box<dyn PatchApplier>,
}

impl PatchEngine {
    pub fn new(applier: Box<dyn PatchApplier>) -> Self {
        Self { applier }
    }

    pub fn from_config(config: &ApplyConfig) -> Self {
        let options = FuzzOptions {
            fuzzy: config.fuzzy,
            max_fuzz: config.max_fuzz,
        };
        let applier: Box<dyn PatchApplier> = match config.strategy {
            Strategy::InProcess => Box::new(InProcessApplier::new(options)),
            Strategy::External => Box::new(NativeApplier::new(
                config.patch_executable.clone(),
                options,
                Duration::from_secs(config.timeout_secs),
            )),
        };
        Self::new(applier)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.applier.name()
    }

    /// Apply every `.patch` under `patch_dir` to `source`, writing into `output`.
    ///
    /// When `output` differs from `source` it is wiped and seeded with a copy of
    /// `source` first. Every patch is attempted; failures are reported, not raised.
    pub fn apply(&self, source: &Path, patch_dir: &Path, output: &Path) -> Result<PatchReport, EngineError> {
        prepare_output(source, output)?;
        self.apply_in_place(patch_dir, output)
    }

    /// Collect header transforms, rewrite them into the output tree, then apply patches.
    pub fn apply_patch_set(
        &self,
        source: &Path,
        patch_dir: &Path,
        output: &Path,
        options: &PatchSetOptions,
    ) -> Result<PatchSetReport, EngineError> {
        prepare_output(source, output)?;

        let mut report = PatchSetReport::default();
        if options.apply_ats {
            let collection = collect_from_patches(patch_dir)?;
            report
                .at_failures
                .extend(collection.issues.iter().map(Failure::from));

            let mut ats = options.extra_ats.clone();
            for conflict in ats.merge_set(&collection.set) {
                report
                    .at_failures
                    .push(Failure::from_at_error(&conflict, None, None));
            }
            report.transforms = ats.len();

            let rewrite = options.rewriter.rewrite_tree(output, &ats)?;
            report.rewritten = rewrite.applied;
            report
                .at_failures
                .extend(rewrite.issues.into_iter().map(Failure::from));
            info!(
                transforms = report.transforms,
                rewritten = report.rewritten,
                files = rewrite.files_changed,
                "applied access transforms"
            );
        }

        report.patches = self.apply_in_place(patch_dir, output)?;
        Ok(report)
    }

    fn apply_in_place(&self, patch_dir: &Path, tree: &Path) -> Result<PatchReport, EngineError> {
        if !patch_dir.is_dir() {
            return Err(EngineError::MissingPatchDir(patch_dir.to_path_buf()));
        }

        let mut report = PatchReport::default();
        for relative in list_patches(patch_dir)? {
            let full = patch_dir.join(&relative);
            let result = match fs::read_to_string(&full) {
                Ok(text) => match split_header(&text) {
                    // transforms only; they were rewritten into the tree already
                    (header, body) if !header.is_empty() && body.trim().is_empty() => {
                        debug!(patch = %relative.display(), "header-only patch");
                        PatchResult::Success {
                            patch: relative,
                            files: Vec::new(),
                            fuzz: 0,
                            offset: 0,
                        }
                    }
                    (_, body) => match self.applier.apply(tree, &relative, body) {
                        Ok(applied) => {
                            debug!(patch = %relative.display(), fuzz = applied.fuzz, offset = applied.offset, "applied");
                            PatchResult::Success {
                                patch: relative,
                                files: applied.files,
                                fuzz: applied.fuzz,
                                offset: applied.offset,
                            }
                        }
                        Err(error) => PatchResult::PerFileFailure {
                            failure: Failure::from_apply_error(&relative, &error),
                            patch: relative,
                        },
                    },
                },
                Err(error) => PatchResult::PerFileFailure {
                    failure: Failure::Io {
                        path: full.clone(),
                        reason: error.to_string(),
                    },
                    patch: relative,
                },
            };
            if let PatchResult::PerFileFailure { failure, .. } = &result {
                failure.log();
            }
            report.results.push(result);
        }

        info!(
            strategy = self.applier.name(),
            applied = report.applied(),
            failed = report.results.len() - report.applied(),
            "applied patches"
        );
        Ok(report)
    }
}

/// Sorted relative paths of every `.patch` file under `patch_dir`.
fn list_patches(patch_dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut patches = Vec::new();
    for entry in WalkDir::new(patch_dir).sort_by_file_name() {
        let entry = entry.map_err(|source| EngineError::Walk {
            path: patch_dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(".patch") {
            if let Ok(relative) = entry.path().strip_prefix(patch_dir) {
                patches.push(relative.to_path_buf());
            }
        }
    }
    patches.sort();
    Ok(patches)
}

/// Copy-then-patch setup: wipe `output` and seed it from `source`.
fn prepare_output(source: &Path, output: &Path) -> Result<(), EngineError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| EngineError::Io { path, source }
    };
    let source_canonical = source.canonicalize().map_err(io(source))?;
    let output_canonical = output.canonicalize().ok();
    if output_canonical.as_deref() == Some(source_canonical.as_path()) {
        return Ok(());
    }
    if output_canonical
        .as_deref()
        .is_some_and(|out| source_canonical.starts_with(out))
    {
        return Err(EngineError::Io {
            path: output.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "output directory contains the source tree",
            ),
        });
    }

    ensure_clean(output).map_err(io(output))?;
    let copied = copy_tree(source, output).map_err(io(source))?;
    debug!(copied, skipped = VCS_DIR, "seeded output tree");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::HEADER_SEPARATOR;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let patches = dir.path().join("patches");
        let out = dir.path().join("out");
        write(&base.join("p/X.java"), "class X {\n}\n");
        write(&base.join("p/Y.java"), "class Y {\n}\n");
        write(
            &patches.join("p/X.java.patch"),
            "--- a/p/X.java\n+++ b/p/X.java\n@@ -1,2 +1,2 @@\n class Gone {\n-}\n+};\n",
        );
        write(
            &patches.join("p/Y.java.patch"),
            "--- a/p/Y.java\n+++ b/p/Y.java\n@@ -1,2 +1,3 @@\n class Y {\n+    int y;\n }\n",
        );

        let engine = PatchEngine::from_config(&ApplyConfig::default());
        let report = engine.apply(&base, &patches, &out).unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(!report.is_success());
        let failed: Vec<&Path> = report
            .results
            .iter()
            .filter(|r| !r.is_success())
            .map(PatchResult::patch)
            .collect();
        assert_eq!(failed, vec![Path::new("p/X.java.patch")]);
        assert_eq!(
            fs::read_to_string(out.join("p/Y.java")).unwrap(),
            "class Y {\n    int y;\n}\n"
        );
        // source untouched by copy-then-patch
        assert_eq!(fs::read_to_string(base.join("p/Y.java")).unwrap(), "class Y {\n}\n");
    }

    #[test]
    fn output_is_wiped_before_copy() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let patches = dir.path().join("patches");
        let out = dir.path().join("out");
        write(&base.join("A.java"), "class A {}\n");
        write(&out.join("Stale.java"), "stale");
        fs::create_dir_all(&patches).unwrap();

        let report = PatchEngine::from_config(&ApplyConfig::default())
            .apply(&base, &patches, &out)
            .unwrap();
        assert!(report.results.is_empty());
        assert!(!out.join("Stale.java").exists());
        assert!(out.join("A.java").exists());
    }

    #[test]
    fn patch_set_applies_header_transforms_first() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let patches = dir.path().join("patches");
        write(&base.join("A.java"), "class A {\n    void m() {}\n}\n");
        write(
            &patches.join("A.java.patch"),
            &format!(
                "AT: public m()V\nAT: pub broken\n{HEADER_SEPARATOR}\n--- a/A.java\n+++ b/A.java\n@@ -1,3 +1,3 @@\n class A {{\n-    public void m() {{}}\n+    public void m() {{ return; }}\n }}\n"
            ),
        );

        let engine = PatchEngine::from_config(&ApplyConfig::default());
        let options = PatchSetOptions {
            apply_ats: true,
            ..Default::default()
        };
        let report = engine
            .apply_patch_set(&base, &patches, &base, &options)
            .unwrap();

        assert_eq!(report.transforms, 1);
        assert_eq!(report.rewritten, 1);
        assert!(report.patches.is_success());
        assert_eq!(report.at_failures.len(), 1);
        assert_eq!(report.at_failures[0].kind(), "MalformedToken");
        assert_eq!(
            fs::read_to_string(base.join("A.java")).unwrap(),
            "class A {\n    public void m() { return; }\n}\n"
        );
    }

    #[test]
    fn header_only_patch_carries_transforms() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        let patches = dir.path().join("patches");
        let out = dir.path().join("out");
        write(&base.join("A.java"), "class A {\n    void m() {}\n}\n");
        write(
            &patches.join("A.java.patch"),
            &format!("AT: public m()V\n{HEADER_SEPARATOR}\n"),
        );

        let report = PatchEngine::from_config(&ApplyConfig::default())
            .apply_patch_set(&base, &patches, &out, &PatchSetOptions { apply_ats: true, ..Default::default() })
            .unwrap();

        assert!(report.is_success(), "{:?}", report.failures());
        assert_eq!(report.patches.applied(), 1);
        assert_eq!(
            fs::read_to_string(out.join("A.java")).unwrap(),
            "class A {\n    public void m() {}\n}\n"
        );
    }

    #[test]
    fn missing_patch_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = PatchEngine::from_config(&ApplyConfig::default())
            .apply(dir.path(), &dir.path().join("nope"), dir.path())
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingPatchDir(_)));
    }
}
