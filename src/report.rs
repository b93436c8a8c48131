//! Collected per-file and per-directive failures.
//!
//! Batch operations never stop at the first problem; they turn each one into
//! a [`Failure`] value and keep going. A stage that ends with a non-empty
//! failure list is reported to the caller as a [`BatchFailure`].

use crate::at::{AtError, CollectIssue};
use crate::java::RewriteIssue;
use crate::patch::ApplyError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    MalformedToken {
        path: Option<PathBuf>,
        line: Option<usize>,
        token: String,
    },
    MalformedDirective {
        path: Option<PathBuf>,
        line: Option<usize>,
        reason: String,
    },
    ConflictingTransform {
        path: Option<PathBuf>,
        class: String,
        member: String,
        existing: String,
        incoming: String,
    },
    TargetMemberNotFound {
        path: PathBuf,
        class: String,
        target: String,
    },
    RedundantTransform {
        path: PathBuf,
        class: String,
        target: String,
        state: String,
    },
    InvalidTarget {
        path: PathBuf,
        class: String,
        target: String,
        reason: String,
    },
    HunkApplyFailure {
        patch: PathBuf,
        reason: String,
    },
    MalformedPatch {
        patch: PathBuf,
        reason: String,
    },
    ExternalToolFailure {
        patch: PathBuf,
        reason: String,
    },
    Io {
        path: PathBuf,
        reason: String,
    },
}

impl Failure {
    /// A transform problem found at `path:line` (either may be unknown).
    pub fn from_at_error(error: &AtError, path: Option<&Path>, line: Option<usize>) -> Self {
        let path = path.map(Path::to_path_buf);
        match error {
            AtError::MalformedToken { token } => Failure::MalformedToken {
                path,
                line,
                token: token.clone(),
            },
            AtError::ConflictingTransform {
                class,
                member,
                existing,
                incoming,
            } => Failure::ConflictingTransform {
                path,
                class: class.clone(),
                member: member.clone(),
                existing: existing.to_string(),
                incoming: incoming.to_string(),
            },
            AtError::MalformedDescriptor { .. } | AtError::MalformedLine { .. } => {
                Failure::MalformedDirective {
                    path,
                    line,
                    reason: error.to_string(),
                }
            }
        }
    }

    /// Failure for one patch file that did not apply.
    pub fn from_apply_error(patch: &Path, error: &ApplyError) -> Self {
        let patch = patch.to_path_buf();
        let reason = error.to_string();
        match error {
            ApplyError::Hunk { .. } | ApplyError::MissingTarget { .. } | ApplyError::TargetExists { .. } => {
                Failure::HunkApplyFailure { patch, reason }
            }
            ApplyError::Parse(_) | ApplyError::Unsafe(_) => Failure::MalformedPatch { patch, reason },
            ApplyError::Spawn { .. } | ApplyError::Tool { .. } | ApplyError::Timeout { .. } => {
                Failure::ExternalToolFailure { patch, reason }
            }
            ApplyError::Io { .. } | ApplyError::Write(_) => Failure::Io {
                path: patch,
                reason,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Failure::MalformedToken { .. } => "MalformedToken",
            Failure::MalformedDirective { .. } => "MalformedDirective",
            Failure::ConflictingTransform { .. } => "ConflictingTransform",
            Failure::TargetMemberNotFound { .. } => "TargetMemberNotFound",
            Failure::RedundantTransform { .. } => "RedundantTransform",
            Failure::InvalidTarget { .. } => "InvalidTarget",
            Failure::HunkApplyFailure { .. } => "HunkApplyFailure",
            Failure::MalformedPatch { .. } => "MalformedPatch",
            Failure::ExternalToolFailure { .. } => "ExternalToolFailure",
            Failure::Io { .. } => "Io",
        }
    }

    /// Emit this failure through `tracing` at error level.
    pub fn log(&self) {
        tracing::error!(kind = self.kind(), "{self}");
    }
}

impl From<&CollectIssue> for Failure {
    fn from(issue: &CollectIssue) -> Self {
        Failure::from_at_error(&issue.error, Some(&issue.path), Some(issue.line))
    }
}

impl From<RewriteIssue> for Failure {
    fn from(issue: RewriteIssue) -> Self {
        match issue {
            RewriteIssue::TargetMemberNotFound {
                path,
                class,
                target,
            } => Failure::TargetMemberNotFound {
                path,
                class,
                target,
            },
            RewriteIssue::RedundantTransform {
                path,
                class,
                target,
                state,
            } => Failure::RedundantTransform {
                path,
                class,
                target,
                state,
            },
            RewriteIssue::InvalidTarget {
                path,
                class,
                target,
                reason,
            } => Failure::InvalidTarget {
                path,
                class,
                target,
                reason,
            },
        }
    }
}

fn location(path: &Option<PathBuf>, line: &Option<usize>) -> String {
    match (path, line) {
        (Some(p), Some(l)) => format!("{}:{l}: ", p.display()),
        (Some(p), None) => format!("{}: ", p.display()),
        _ => String::new(),
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::MalformedToken { path, line, token } => {
                write!(f, "{}malformed access transform token '{token}'", location(path, line))
            }
            Failure::MalformedDirective { path, line, reason } => {
                write!(f, "{}{reason}", location(path, line))
            }
            Failure::ConflictingTransform {
                path,
                class,
                member,
                existing,
                incoming,
            } => write!(
                f,
                "{}conflicting access transforms for {class}{member}: {existing} vs {incoming}",
                location(path, &None)
            ),
            Failure::TargetMemberNotFound {
                path,
                class,
                target,
            } => write!(f, "{}: cannot find {target} in class {class}", path.display()),
            Failure::RedundantTransform {
                path,
                class,
                target,
                state,
            } => write!(
                f,
                "{}: {target} in class {class} is already {state}",
                path.display()
            ),
            Failure::InvalidTarget {
                path,
                class,
                target,
                reason,
            } => write!(
                f,
                "{}: invalid target {target} in class {class}: {reason}",
                path.display()
            ),
            Failure::HunkApplyFailure { patch, reason }
            | Failure::MalformedPatch { patch, reason }
            | Failure::ExternalToolFailure { patch, reason } => {
                write!(f, "Patch failed: {}: {reason}", patch.display())
            }
            Failure::Io { path, reason } => write!(f, "{}: {reason}", path.display()),
        }
    }
}

/// Pipeline stage a batch of failures came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Apply,
    Rebuild,
    CollectAts,
}

/// Summary error for a stage that finished with failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub stage: Stage,
    pub failures: Vec<Failure>,
}

impl BatchFailure {
    /// `Err` when `failures` is non-empty.
    pub fn check(stage: Stage, failures: Vec<Failure>) -> Result<(), BatchFailure> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchFailure { stage, failures })
        }
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.failures.len();
        match self.stage {
            Stage::Apply => write!(f, "Failed to apply {count} patches"),
            Stage::Rebuild => write!(f, "Rebuild finished with {count} problems"),
            Stage::CollectAts => write!(f, "{count} access transform problems"),
        }
    }
}

impl std::error::Error for BatchFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::codec::parse;
    use crate::patch::{HunkFailure, PatchParseError};

    #[test]
    fn at_errors_keep_their_location() {
        let failure = Failure::from_at_error(
            &AtError::MalformedToken {
                token: "pub".into(),
            },
            Some(Path::new("a/A.java.patch")),
            Some(3),
        );
        assert_eq!(
            failure.to_string(),
            "a/A.java.patch:3: malformed access transform token 'pub'"
        );

        let conflict = Failure::from_at_error(
            &AtError::ConflictingTransform {
                class: "a.A".into(),
                member: "#m()V".into(),
                existing: parse("private").unwrap(),
                incoming: parse("public").unwrap(),
            },
            None,
            None,
        );
        assert_eq!(conflict.kind(), "ConflictingTransform");
        assert!(conflict.to_string().contains("a.A#m()V: private vs public"));
    }

    #[test]
    fn apply_errors_map_to_taxonomy() {
        let hunk = ApplyError::Hunk {
            path: "A.java".into(),
            failure: HunkFailure {
                hunk: 2,
                expected_line: 10,
                closest: None,
            },
        };
        let failure = Failure::from_apply_error(Path::new("A.java.patch"), &hunk);
        assert_eq!(failure.kind(), "HunkApplyFailure");
        assert!(failure.to_string().starts_with("Patch failed: A.java.patch"));

        let parse = ApplyError::Parse(PatchParseError::Empty);
        assert_eq!(
            Failure::from_apply_error(Path::new("B.patch"), &parse).kind(),
            "MalformedPatch"
        );
    }

    #[test]
    fn batch_failure_summary() {
        assert!(BatchFailure::check(Stage::Apply, Vec::new()).is_ok());
        let err = BatchFailure::check(
            Stage::Apply,
            vec![Failure::Io {
                path: "x".into(),
                reason: "denied".into(),
            }],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Failed to apply 1 patches");

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["stage"], "apply");
        assert_eq!(json["failures"][0]["kind"], "io");
    }
}
