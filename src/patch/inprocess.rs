//! Pure in-process patch application.

use crate::edit::atomic_write;
use crate::patch::applier::{Applied, FuzzOptions, PatchApplier};
use crate::patch::errors::{ApplyError, ClosestMatch, HunkFailure, PatchParseError};
use crate::patch::format::{parse_patch, FilePatch, Hunk, HunkLine};
use crate::safety::TreeGuard;
use std::fs;
use std::path::{Path, PathBuf};

/// Candidate lines scanned on each side of the expected position when
/// looking for the closest near-miss of a failed hunk.
const CLOSEST_MATCH_WINDOW: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct InProcessApplier {
    options: FuzzOptions,
}

impl InProcessApplier {
    pub fn new(options: FuzzOptions) -> Self {
        Self { options }
    }
}

impl PatchApplier for InProcessApplier {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn apply(&self, tree: &Path, patch_file: &Path, patch_text: &str) -> Result<Applied, ApplyError> {
        let guard = TreeGuard::new(tree)?;
        let sections = parse_patch(patch_text)?;

        // compute every section before writing so a failure leaves the tree untouched
        let mut writes: Vec<(PathBuf, PathBuf, Option<String>)> = Vec::new();
        let mut applied = Applied::default();
        for section in &sections {
            let relative = section.target().ok_or(PatchParseError::Empty)?;
            let path = guard.resolve(relative)?;

            let original = if section.is_creation() {
                if path.exists() {
                    return Err(ApplyError::TargetExists {
                        path: PathBuf::from(relative),
                    });
                }
                String::new()
            } else if !path.is_file() {
                return Err(ApplyError::MissingTarget {
                    path: PathBuf::from(relative),
                });
            } else {
                fs::read_to_string(&path).map_err(|source| ApplyError::Io {
                    path: path.clone(),
                    source,
                })?
            };

            let result = apply_hunks(&original, section, self.options).map_err(|failure| {
                ApplyError::Hunk {
                    path: PathBuf::from(relative),
                    failure,
                }
            })?;
            tracing::debug!(
                patch = %patch_file.display(),
                target = relative,
                fuzz = result.fuzz,
                offset = result.offset,
                "hunks placed"
            );

            applied.fuzz = applied.fuzz.max(result.fuzz);
            applied.offset = applied.offset.max(result.offset);
            let content = (!section.is_deletion()).then_some(result.text);
            writes.push((PathBuf::from(relative), path, content));
        }

        for (relative, path, content) in writes {
            match content {
                Some(text) => {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent).map_err(|source| ApplyError::Io {
                            path: parent.to_path_buf(),
                            source,
                        })?;
                    }
                    atomic_write(&path, text.as_bytes())?;
                }
                None => fs::remove_file(&path).map_err(|source| ApplyError::Io {
                    path: path.clone(),
                    source,
                })?,
            }
            applied.files.push(relative);
        }
        Ok(applied)
    }
}

/// Text produced by [`apply_hunks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedText {
    pub text: String,
    pub fuzz: usize,
    pub offset: usize,
}

/// Apply one file section's hunks to `original`.
pub fn apply_hunks(original: &str, patch: &FilePatch, options: FuzzOptions) -> Result<PatchedText, HunkFailure> {
    let (mut lines, mut trailing_newline) = split_content(original);
    // net line-count change from hunks applied so far
    let mut shift: isize = 0;
    // distance between where the previous hunk was expected and where it landed
    let mut drift: isize = 0;
    let mut floor = 0;
    let mut max_fuzz = 0;
    let mut max_offset = 0;

    for (index, hunk) in patch.hunks.iter().enumerate() {
        let header_pos = if hunk.old_len == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        let expected = (header_pos as isize + shift + drift).max(0) as usize;

        let Some(placement) = locate(&lines, hunk, expected, floor, options) else {
            return Err(HunkFailure {
                hunk: index + 1,
                expected_line: expected + 1,
                closest: closest_match(&lines, &hunk.old_lines(), expected, floor),
            });
        };

        let hunk_start = placement.start.saturating_sub(placement.front);
        drift = hunk_start as isize - (header_pos as isize + shift);
        max_offset = max_offset.max(drift.unsigned_abs());
        max_fuzz = max_fuzz.max(placement.front.max(placement.back));

        let body = &hunk.lines[placement.front..hunk.lines.len() - placement.back];
        let mut cursor = placement.start;
        let mut replacement = Vec::with_capacity(body.len());
        for line in body {
            match line {
                // keep the file's version of context lines matched with whitespace drift
                HunkLine::Context(_) => {
                    replacement.push(lines[cursor].clone());
                    cursor += 1;
                }
                HunkLine::Remove(_) => cursor += 1,
                HunkLine::Add(text) => replacement.push(text.clone()),
            }
        }
        let replaced = cursor - placement.start;
        let inserted = replacement.len();
        lines.splice(placement.start..cursor, replacement);

        let end = placement.start + inserted;
        if (hunk.old_missing_newline || hunk.new_missing_newline) && end + placement.back == lines.len() {
            trailing_newline = !hunk.new_missing_newline;
        } else if hunk.old_len == 0 && end == lines.len() && inserted > 0 {
            trailing_newline = true;
        }

        shift += inserted as isize - replaced as isize;
        floor = end;
    }

    let mut text = lines.join("\n");
    if trailing_newline && !lines.is_empty() {
        text.push('\n');
    }
    Ok(PatchedText {
        text,
        fuzz: max_fuzz,
        offset: max_offset,
    })
}

/// Split on `\n`, remembering whether the text ended with one.
fn split_content(text: &str) -> (Vec<String>, bool) {
    if text.is_empty() {
        return (Vec::new(), false);
    }
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let trailing = lines.last().is_some_and(String::is_empty);
    if trailing {
        lines.pop();
    }
    (lines, trailing)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    /// Line where the trimmed hunk body starts
    start: usize,
    /// Leading context lines ignored
    front: usize,
    /// Trailing context lines ignored
    back: usize,
}

fn locate(lines: &[String], hunk: &Hunk, expected: usize, floor: usize, options: FuzzOptions) -> Option<Placement> {
    let old = hunk.old_lines();
    let (leading, trailing) = hunk.context_bounds();

    let mut levels = vec![(0, false)];
    if options.fuzzy {
        levels.push((0, true));
        for fuzz in 1..=options.max_fuzz {
            levels.push((fuzz, false));
            levels.push((fuzz, true));
        }
    }

    for (fuzz, normalized) in levels {
        let front = fuzz.min(leading);
        let back = fuzz.min(trailing);
        if fuzz > 0 && front == 0 && back == 0 {
            continue;
        }
        if front + back > old.len() || (front + back == old.len() && !old.is_empty()) {
            continue;
        }
        let pattern = &old[front..old.len() - back];
        if let Some(start) = search(lines, pattern, expected + front, floor, normalized) {
            return Some(Placement { start, front, back });
        }
    }
    None
}

/// Nearest position at or after `floor` where `pattern` matches, scanning
/// outward from `expected`.
fn search(lines: &[String], pattern: &[&str], expected: usize, floor: usize, normalized: bool) -> Option<usize> {
    if pattern.is_empty() {
        return Some(expected.clamp(floor, lines.len()));
    }
    if lines.len() < pattern.len() {
        return None;
    }
    let last = lines.len() - pattern.len();
    let matches_at = |pos: usize| {
        pattern.iter().enumerate().all(|(i, want)| {
            let have = lines[pos + i].as_str();
            if normalized {
                have.split_whitespace().eq(want.split_whitespace())
            } else {
                have == *want
            }
        })
    };

    let expected = expected.min(last);
    let max_distance = expected.max(last - expected);
    for distance in 0..=max_distance {
        let forward = expected + distance;
        if forward <= last && forward >= floor && matches_at(forward) {
            return Some(forward);
        }
        if distance > 0 && distance <= expected {
            let backward = expected - distance;
            if backward >= floor && matches_at(backward) {
                return Some(backward);
            }
        }
    }
    None
}

fn closest_match(lines: &[String], old: &[&str], expected: usize, floor: usize) -> Option<ClosestMatch> {
    if old.is_empty() || lines.len() < old.len() {
        return None;
    }
    let wanted = old.join("\n");
    let last = lines.len() - old.len();
    let from = expected.saturating_sub(CLOSEST_MATCH_WINDOW).max(floor);
    let to = (expected + CLOSEST_MATCH_WINDOW).min(last);

    let mut best: Option<ClosestMatch> = None;
    for pos in from..=to {
        let candidate = lines[pos..pos + old.len()].join("\n");
        let similarity = strsim::normalized_levenshtein(&wanted, &candidate);
        if best.as_ref().map_or(true, |b| similarity > b.similarity) {
            best = Some(ClosestMatch {
                line: pos + 1,
                similarity,
            });
        }
    }
    best
}
