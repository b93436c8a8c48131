use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Byte-span replacement with verification of the text being replaced.
///
/// Modifier rewrites compile down to this primitive: locating the span is the
/// hard part, applying it is mechanical.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until it is spliced or applied"]
pub struct Edit {
    /// File the span belongs to, used for error reporting
    pub file: PathBuf,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    pub new_text: String,
    pub expected_before: EditVerification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    ExactMatch(String),
    /// xxh3 of the expected text, used for long spans
    Hash(u64),
}

impl EditVerification {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Hash spans over 1KB, compare shorter ones directly.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("before-text verification failed at {file}:{byte_start}: found {found:?}")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range [{byte_start}, {byte_end}) in text of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("overlapping edits in {file} at byte {at}")]
    Overlapping { file: PathBuf, at: usize },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("edit would split a UTF-8 character")]
    InvalidUtf8Edit,
}

impl Edit {
    pub fn new(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl Into<String>,
    ) -> Self {
        let expected = expected_before.into();
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(&expected),
        }
    }

    /// Zero-width insertion at `at`.
    pub fn insert(file: impl Into<PathBuf>, at: usize, text: impl Into<String>) -> Self {
        Self::new(file, at, at, text, "")
    }

    fn validate(&self, content: &str) -> Result<(), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }
        let current = content
            .get(self.byte_start..self.byte_end)
            .ok_or(EditError::InvalidUtf8Edit)?;
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }
        Ok(())
    }
}

/// Apply `edits` to `content`, returning the new text.
///
/// Edits are validated against the original text, then spliced bottom-to-top
/// so earlier offsets stay valid.
pub fn splice(content: &str, edits: &[Edit]) -> Result<String, EditError> {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.byte_start.cmp(&a.byte_start).then(b.byte_end.cmp(&a.byte_end)));

    for edit in &sorted {
        edit.validate(content)?;
    }
    for window in sorted.windows(2) {
        let (later, earlier) = (window[0], window[1]);
        if earlier.byte_end > later.byte_start
            || (earlier.byte_start == later.byte_start && earlier.byte_end == later.byte_end)
        {
            return Err(EditError::Overlapping {
                file: later.file.clone(),
                at: later.byte_start,
            });
        }
    }

    let mut out = content.to_string();
    for edit in sorted {
        out.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
    }
    Ok(out)
}

/// Tempfile in the target's directory, fsync, then rename over the target.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = path.parent().ok_or_else(|| {
        EditError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
