//! Rebuilding a patch set from a working tree.
//!
//! For every file present in both trees: inline transform markers are pulled
//! out of the working copy, the matching transforms are woven into an
//! in-memory copy of the base file, and what remains is diffed. The base tree
//! on disk is never modified.

use crate::at::{
    class_name_for, collect_from_patches, extract_inline, AccessTransformSet, AtIoError,
    HEADER_PREFIX, HEADER_SEPARATOR,
};
use crate::config::RebuildConfig;
use crate::edit::{atomic_write, EditError};
use crate::java::{RewriteError, StructuralRewriter};
use crate::patch::format::NO_NEWLINE_MARKER;
use crate::patch::{apply_hunks, parse_patch, FuzzOptions};
use crate::report::Failure;
use crate::tree::{ensure_clean, list_files, slash_path};
use diffy::{DiffOptions, Line};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Collect(#[from] AtIoError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Write(#[from] EditError),

    #[error("{path}: generated patch does not reproduce the working file: {reason}")]
    Unreproducible { path: PathBuf, reason: String },
}

#[derive(Debug, Clone)]
pub struct RebuildOptions {
    pub context_lines: usize,
    /// Relative path suffixes never diffed
    pub exclude: Vec<String>,
    pub structural_rewrite: bool,
    pub classpath: Vec<PathBuf>,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self::from(&RebuildConfig::default())
    }
}

impl From<&RebuildConfig> for RebuildOptions {
    fn from(config: &RebuildConfig) -> Self {
        Self {
            context_lines: config.context_lines,
            exclude: config.exclude.clone(),
            structural_rewrite: config.structural_rewrite,
            classpath: config.classpath.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RebuildReport {
    /// Patch files written
    pub patches: usize,
    /// Every transform known after the run: prior table, old headers, inline markers
    pub ats: AccessTransformSet,
    /// Inline markers stripped from the working tree
    pub extracted: usize,
    pub failures: Vec<Failure>,
}

pub struct PatchRebuilder {
    options: RebuildOptions,
    rewriter: StructuralRewriter,
}

impl PatchRebuilder {
    pub fn new(options: RebuildOptions) -> Self {
        let rewriter = StructuralRewriter::new(options.classpath.clone());
        Self { options, rewriter }
    }

    /// Diff `working` against `base` into `patch_dir`.
    ///
    /// `existing` holds transforms from a prior table; headers already present
    /// in `patch_dir` are read and merged in before the directory is wiped.
    /// Inline markers are stripped from `working` in place.
    pub fn rebuild(
        &self,
        base: &Path,
        working: &Path,
        patch_dir: &Path,
        existing: &AccessTransformSet,
    ) -> Result<RebuildReport, RebuildError> {
        let mut report = RebuildReport {
            ats: existing.clone(),
            ..Default::default()
        };

        let previous = collect_from_patches(patch_dir)?;
        report
            .failures
            .extend(previous.issues.iter().map(Failure::from));
        for conflict in report.ats.merge_set(&previous.set) {
            report
                .failures
                .push(Failure::from_at_error(&conflict, Some(patch_dir), None));
        }

        ensure_clean(patch_dir).map_err(|source| RebuildError::Io {
            path: patch_dir.to_path_buf(),
            source,
        })?;

        let files = list_files(base).map_err(|source| RebuildError::Io {
            path: base.to_path_buf(),
            source,
        })?;
        for relative in files {
            if !working.join(&relative).is_file() {
                continue;
            }
            if self.is_excluded(&relative) {
                debug!(path = %relative.display(), "excluded");
                continue;
            }
            if self.rebuild_file(base, working, patch_dir, &relative, &mut report)? {
                report.patches += 1;
            }
        }

        for failure in &report.failures {
            failure.log();
        }
        info!(
            patches = report.patches,
            extracted = report.extracted,
            transforms = report.ats.len(),
            "rebuilt patches"
        );
        Ok(report)
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        let path = slash_path(relative);
        self.options
            .exclude
            .iter()
            .any(|suffix| path.ends_with(suffix.as_str()))
    }

    /// Rebuild one file; `true` when a patch was written.
    fn rebuild_file(
        &self,
        base: &Path,
        working: &Path,
        patch_dir: &Path,
        relative: &Path,
        report: &mut RebuildReport,
    ) -> Result<bool, RebuildError> {
        let Some(base_text) = read_text(&base.join(relative))? else {
            return Ok(false);
        };
        let working_path = working.join(relative);
        let Some(mut working_text) = read_text(&working_path)? else {
            return Ok(false);
        };

        let class = class_name_for(relative);
        let mut inline = AccessTransformSet::new();
        let extraction = extract_inline(&working_text, &class, &mut inline);
        for (line, error) in &extraction.issues {
            report
                .failures
                .push(Failure::from_at_error(error, Some(&working_path), Some(*line)));
        }
        // markers in the working tree win over older header and table entries
        for conflict in report.ats.overlay(&inline) {
            debug!(path = %relative.display(), %conflict, "inline marker overrides older transform");
        }
        if extraction.found > 0 {
            debug!(path = %relative.display(), markers = extraction.found, "stripped inline transforms");
            atomic_write(&working_path, extraction.text.as_bytes())?;
            report.extracted += extraction.found;
            working_text = extraction.text;
        }

        let class_ats = report.ats.restrict_to(&class);
        let base_text = if self.options.structural_rewrite
            && !class_ats.is_empty()
            && is_java(relative)
        {
            self.rewrite_base(base, relative, &class_ats, report)?
                .unwrap_or(base_text)
        } else {
            base_text
        };

        let header_only = base_text == working_text;
        if header_only && class_ats.is_empty() {
            return Ok(false);
        }

        let mut patch = String::new();
        if let Some(transforms) = class_ats.get_class(&class) {
            for (member, at) in transforms.entries() {
                patch.push_str(HEADER_PREFIX);
                patch.push_str(&at.to_string());
                if let Some(member) = member {
                    patch.push(' ');
                    patch.push_str(&member.to_string());
                }
                patch.push('\n');
            }
            patch.push_str(HEADER_SEPARATOR);
            patch.push('\n');
        }
        if !header_only {
            let diff = unified_diff(
                &base_text,
                &working_text,
                &slash_path(relative),
                self.options.context_lines,
            );
            verify_diff(&base_text, &working_text, &diff).map_err(|reason| {
                RebuildError::Unreproducible {
                    path: relative.to_path_buf(),
                    reason,
                }
            })?;
            patch.push_str(&diff);
        }

        let mut name = relative.as_os_str().to_owned();
        name.push(".patch");
        let target = patch_dir.join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| RebuildError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        atomic_write(&target, patch.as_bytes())?;
        debug!(patch = %target.display(), "wrote patch");
        Ok(true)
    }

    /// Base text with `class_ats` applied, or `None` when nothing changed.
    fn rewrite_base(
        &self,
        base: &Path,
        relative: &Path,
        class_ats: &AccessTransformSet,
        report: &mut RebuildReport,
    ) -> Result<Option<String>, RebuildError> {
        let mut results = self
            .rewriter
            .rewrite_files(base, &[relative.to_path_buf()], class_ats)?;
        if results.len() != 1 {
            return Err(RewriteError::UnexpectedResultSetShape {
                path: relative.to_path_buf(),
                expected: 1,
                found: results.len(),
            }
            .into());
        }
        let result = results.remove(0);
        report
            .failures
            .extend(result.issues.iter().cloned().map(Failure::from));
        Ok(result.changed().then_some(result.rewritten))
    }
}

/// Unified diff of `old` against `new` with `a/` and `b/` path prefixes.
///
/// Empty when the texts are equal. Empty ranges use the GNU convention of
/// naming the line before the change.
pub fn unified_diff(old: &str, new: &str, path: &str, context: usize) -> String {
    if old == new {
        return String::new();
    }
    let patch = DiffOptions::new()
        .set_context_len(context)
        .create_patch(old, new);

    let mut out = format!("--- a/{path}\n+++ b/{path}\n");
    // lines added minus lines removed by earlier hunks
    let mut shift: isize = 0;
    for hunk in patch.hunks() {
        let (old_len, new_len) = (hunk.old_range().len(), hunk.new_range().len());
        // one side is always non-empty; place the other relative to it
        let (old_first, new_first) = if old_len > 0 {
            let first = hunk.old_range().start() - 1;
            (first, (first as isize + shift) as usize)
        } else {
            let first = hunk.new_range().start() - 1;
            ((first as isize - shift) as usize, first)
        };
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            hunk_range(old_first, old_len),
            hunk_range(new_first, new_len)
        ));

        for line in hunk.lines() {
            let (sign, text) = match line {
                Line::Context(text) => (' ', *text),
                Line::Delete(text) => ('-', *text),
                Line::Insert(text) => ('+', *text),
            };
            out.push(sign);
            out.push_str(text);
            if !text.ends_with('\n') {
                out.push('\n');
                out.push_str(NO_NEWLINE_MARKER);
                out.push('\n');
            }
        }
        shift += new_len as isize - old_len as isize;
    }
    out
}

fn hunk_range(first: usize, len: usize) -> String {
    match len {
        0 => format!("{first},0"),
        1 => format!("{}", first + 1),
        _ => format!("{},{len}", first + 1),
    }
}

/// Re-read `diff` and apply it strictly to `old`; it must yield `new`.
fn verify_diff(old: &str, new: &str, diff: &str) -> Result<(), String> {
    let sections = parse_patch(diff).map_err(|e| e.to_string())?;
    let [section] = sections.as_slice() else {
        return Err(format!("expected one file section, found {}", sections.len()));
    };
    let strict = FuzzOptions {
        fuzzy: false,
        max_fuzz: 0,
    };
    let patched = apply_hunks(old, section, strict).map_err(|e| e.to_string())?;
    if patched.text != new {
        return Err("patched text differs".to_string());
    }
    Ok(())
}

fn is_java(relative: &Path) -> bool {
    relative.extension().is_some_and(|ext| ext == "java")
}

/// File contents, or `None` for files that are not UTF-8.
fn read_text(path: &Path) -> Result<Option<String>, RebuildError> {
    let bytes = fs::read(path).map_err(|source| RebuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(Some(text)),
        Err(_) => {
            warn!(path = %path.display(), "skipping non-UTF-8 file");
            Ok(None)
        }
    }
}
