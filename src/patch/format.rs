//! Unified diff parsing.
//!
//! Lines are kept byte-exact: a `\r` before the newline stays part of the
//! line so CRLF sources round-trip.

use crate::patch::errors::PatchParseError;

pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";
pub const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
    /// The old side's last line has no trailing newline
    pub old_missing_newline: bool,
    /// The new side's last line has no trailing newline
    pub new_missing_newline: bool,
}

impl Hunk {
    /// Lines the hunk expects to find (context and removals).
    pub fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    /// Lines the hunk leaves behind (context and additions).
    pub fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }

    /// Number of unchanged lines at the start and end of the hunk.
    pub fn context_bounds(&self) -> (usize, usize) {
        let leading = self
            .lines
            .iter()
            .take_while(|l| matches!(l, HunkLine::Context(_)))
            .count();
        let trailing = self
            .lines
            .iter()
            .rev()
            .take_while(|l| matches!(l, HunkLine::Context(_)))
            .count();
        if leading == self.lines.len() {
            (leading, 0)
        } else {
            (leading, trailing)
        }
    }
}

/// One file's worth of hunks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilePatch {
    /// Old path with the first component stripped, `None` for `/dev/null`
    pub old_path: Option<String>,
    /// New path with the first component stripped, `None` for `/dev/null`
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    /// The path the patch writes to, falling back to the old path for deletions.
    pub fn target(&self) -> Option<&str> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }

    pub fn is_creation(&self) -> bool {
        self.old_path.is_none()
    }

    pub fn is_deletion(&self) -> bool {
        self.new_path.is_none()
    }
}

/// Parse every file section of a unified diff.
///
/// Text before the first `--- ` line (git headers, AT headers) is ignored.
pub fn parse_patch(text: &str) -> Result<Vec<FilePatch>, PatchParseError> {
    let lines: Vec<&str> = split_lines(text);
    let mut patches = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(old) = lines[i].strip_prefix("--- ") else {
            i += 1;
            continue;
        };
        let new = lines
            .get(i + 1)
            .and_then(|l| l.strip_prefix("+++ "))
            .ok_or(PatchParseError::MissingNewPath { line: i + 2 })?;

        let mut patch = FilePatch {
            old_path: strip_path(old),
            new_path: strip_path(new),
            hunks: Vec::new(),
        };
        i += 2;

        while i < lines.len() && lines[i].starts_with("@@") {
            let (hunk, next) = parse_hunk(&lines, i)?;
            patch.hunks.push(hunk);
            i = next;
        }

        if patch.hunks.is_empty() {
            return Err(PatchParseError::NoHunks { line: i });
        }
        patches.push(patch);
    }

    if patches.is_empty() {
        return Err(PatchParseError::Empty);
    }
    Ok(patches)
}

/// Split on `\n` only, dropping the empty tail after a final newline.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

fn strip_path(raw: &str) -> Option<String> {
    // `--- a/Foo.java\t2024-01-01 00:00:00` style timestamps
    let path = raw.split('\t').next().unwrap_or(raw).trim_end_matches('\r').trim();
    if path == DEV_NULL {
        return None;
    }
    Some(match path.split_once('/') {
        Some((_, rest)) => rest.to_string(),
        None => path.to_string(),
    })
}

fn parse_hunk(lines: &[&str], start: usize) -> Result<(Hunk, usize), PatchParseError> {
    let header = lines[start];
    let bad_header = || PatchParseError::BadHunkHeader {
        line: start + 1,
        text: header.to_string(),
    };

    let ranges = header
        .strip_prefix("@@ ")
        .and_then(|rest| rest.split(" @@").next())
        .ok_or_else(bad_header)?;
    let (old, new) = ranges.split_once(' ').ok_or_else(bad_header)?;
    let (old_start, old_len) = parse_range(old.strip_prefix('-').ok_or_else(bad_header)?)
        .ok_or_else(bad_header)?;
    let (new_start, new_len) = parse_range(new.strip_prefix('+').ok_or_else(bad_header)?)
        .ok_or_else(bad_header)?;

    let mut hunk = Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        ..Default::default()
    };

    let (mut old_seen, mut new_seen) = (0, 0);
    let mut i = start + 1;
    while old_seen < old_len || new_seen < new_len {
        let Some(line) = lines.get(i) else {
            return Err(PatchParseError::Truncated { line: i });
        };
        let parsed = match line.chars().next() {
            Some(' ') => HunkLine::Context(line[1..].to_string()),
            // some editors strip the single space from blank context lines
            None => HunkLine::Context(String::new()),
            Some('-') => HunkLine::Remove(line[1..].to_string()),
            Some('+') => HunkLine::Add(line[1..].to_string()),
            Some('\\') => {
                mark_missing_newline(&mut hunk);
                i += 1;
                continue;
            }
            _ => {
                return Err(PatchParseError::UnexpectedLine {
                    line: i + 1,
                    text: line.to_string(),
                })
            }
        };
        match parsed {
            HunkLine::Context(_) => {
                old_seen += 1;
                new_seen += 1;
            }
            HunkLine::Remove(_) => old_seen += 1,
            HunkLine::Add(_) => new_seen += 1,
        }
        if old_seen > old_len || new_seen > new_len {
            return Err(PatchParseError::UnexpectedLine {
                line: i + 1,
                text: line.to_string(),
            });
        }
        hunk.lines.push(parsed);
        i += 1;
    }

    // a trailing marker belongs to the last line of the hunk
    if lines.get(i).is_some_and(|l| l.starts_with('\\')) {
        mark_missing_newline(&mut hunk);
        i += 1;
    }

    Ok((hunk, i))
}

fn mark_missing_newline(hunk: &mut Hunk) {
    match hunk.lines.last() {
        Some(HunkLine::Context(_)) => {
            hunk.old_missing_newline = true;
            hunk.new_missing_newline = true;
        }
        Some(HunkLine::Remove(_)) => hunk.old_missing_newline = true,
        Some(HunkLine::Add(_)) => hunk.new_missing_newline = true,
        None => {}
    }
}

/// `l,c` or `l` (length 1).
fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_file_patch() {
        let text = "--- a/p/A.java\n+++ b/p/A.java\n@@ -1,3 +1,3 @@\n class A {\n-    int x;\n+    long x;\n }\n";
        let patches = parse_patch(text).unwrap();
        assert_eq!(patches.len(), 1);
        let patch = &patches[0];
        assert_eq!(patch.target(), Some("p/A.java"));
        assert_eq!(patch.hunks[0].old_lines(), vec!["class A {", "    int x;", "}"]);
        assert_eq!(patch.hunks[0].new_lines(), vec!["class A {", "    long x;", "}"]);
        assert_eq!(patch.hunks[0].context_bounds(), (1, 1));
    }

    #[test]
    fn parses_short_ranges_and_creation() {
        let text = "--- /dev/null\n+++ b/New.java\n@@ -0,0 +1 @@\n+class New {}\n";
        let patch = &parse_patch(text).unwrap()[0];
        assert!(patch.is_creation());
        assert_eq!(patch.hunks[0].new_len, 1);
        assert_eq!(patch.hunks[0].old_len, 0);
    }

    #[test]
    fn tracks_missing_newlines_per_side() {
        let text = "--- a/A\n+++ b/A\n@@ -1 +1 @@\n-old\n\\ No newline at end of file\n+new\n";
        let hunk = &parse_patch(text).unwrap()[0].hunks[0];
        assert!(hunk.old_missing_newline);
        assert!(!hunk.new_missing_newline);

        let text = "--- a/A\n+++ b/A\n@@ -1 +1 @@\n-old\n+new\n\\ No newline at end of file\n";
        let hunk = &parse_patch(text).unwrap()[0].hunks[0];
        assert!(!hunk.old_missing_newline);
        assert!(hunk.new_missing_newline);
    }

    #[test]
    fn keeps_carriage_returns() {
        let text = "--- a/A\n+++ b/A\n@@ -1 +1 @@\n-a\r\n+b\r\n";
        let hunk = &parse_patch(text).unwrap()[0].hunks[0];
        assert_eq!(hunk.old_lines(), vec!["a\r"]);
    }

    #[test]
    fn skips_leading_header_text() {
        let text = "AT: public m()V\n====\n--- a/A\n+++ b/A\n@@ -1 +1 @@\n-a\n+b\n";
        assert_eq!(parse_patch(text).unwrap().len(), 1);
    }

    #[test]
    fn rejects_broken_patches() {
        assert!(matches!(parse_patch(""), Err(PatchParseError::Empty)));
        assert!(matches!(
            parse_patch("--- a/A\n+++ b/A\n@@ -x +1 @@\n"),
            Err(PatchParseError::BadHunkHeader { .. })
        ));
        assert!(matches!(
            parse_patch("--- a/A\n+++ b/A\n@@ -1,2 +1,2 @@\n a\n"),
            Err(PatchParseError::Truncated { .. })
        ));
        assert!(matches!(
            parse_patch("--- a/A\n@@ -1 +1 @@\n"),
            Err(PatchParseError::MissingNewPath { .. })
        ));
    }
}
