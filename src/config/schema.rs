use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Contents of `forkpatch.toml`. Every section and field is optional.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ForkConfig {
    #[serde(default)]
    pub apply: ApplyConfig,
    #[serde(default)]
    pub rebuild: RebuildConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    InProcess,
    External,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::InProcess => f.write_str("in-process"),
            Strategy::External => f.write_str("external"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ApplyConfig {
    pub strategy: Strategy,
    pub patch_executable: String,
    pub fuzzy: bool,
    /// Context lines that may be ignored at each end of a hunk
    pub max_fuzz: usize,
    pub timeout_secs: u64,
    /// Rewrite header transforms into the tree before applying patches
    pub apply_ats: bool,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::InProcess,
            patch_executable: "patch".to_string(),
            fuzzy: false,
            max_fuzz: 2,
            timeout_secs: 60,
            apply_ats: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RebuildConfig {
    pub context_lines: usize,
    /// Relative path suffixes never diffed
    pub exclude: Vec<String>,
    pub structural_rewrite: bool,
    /// Extra source roots used for type resolution
    pub classpath: Vec<PathBuf>,
    pub at_table: Option<PathBuf>,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            context_lines: 3,
            exclude: Vec::new(),
            structural_rewrite: true,
            classpath: Vec::new(),
            at_table: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointConfig {
    pub author_name: String,
    pub author_email: String,
    pub vanilla_tag: String,
    pub base_tag: String,
    pub patched_tag: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            author_name: "forkpatch".to_string(),
            author_email: "forkpatch@localhost".to_string(),
            vanilla_tag: "vanilla".to_string(),
            base_tag: "mache".to_string(),
            patched_tag: "patched".to_string(),
        }
    }
}

impl ForkConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.apply.strategy == Strategy::External && self.apply.patch_executable.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                section: "apply",
                field: "patch_executable",
            });
        }
        if self.apply.timeout_secs == 0 {
            issues.push(ValidationIssue::OutOfRange {
                section: "apply",
                field: "timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if !self.apply.fuzzy && self.apply.max_fuzz != ApplyConfig::default().max_fuzz {
            issues.push(ValidationIssue::InvalidCombo {
                section: "apply",
                message: "max_fuzz has no effect unless fuzzy = true".to_string(),
            });
        }

        if self.rebuild.context_lines > 64 {
            issues.push(ValidationIssue::OutOfRange {
                section: "rebuild",
                field: "context_lines",
                message: "must be at most 64".to_string(),
            });
        }
        if self.rebuild.exclude.iter().any(|e| e.trim().is_empty()) {
            issues.push(ValidationIssue::OutOfRange {
                section: "rebuild",
                field: "exclude",
                message: "entries must not be empty".to_string(),
            });
        }

        let checkpoint = &self.checkpoint;
        for (field, value) in [
            ("author_name", &checkpoint.author_name),
            ("author_email", &checkpoint.author_email),
            ("vanilla_tag", &checkpoint.vanilla_tag),
            ("base_tag", &checkpoint.base_tag),
            ("patched_tag", &checkpoint.patched_tag),
        ] {
            if value.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    section: "checkpoint",
                    field,
                });
            }
        }
        if checkpoint.base_tag == checkpoint.patched_tag || checkpoint.vanilla_tag == checkpoint.patched_tag {
            issues.push(ValidationIssue::InvalidCombo {
                section: "checkpoint",
                message: "patched_tag must differ from the vanilla and base tags".to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    OutOfRange {
        section: &'static str,
        field: &'static str,
        message: String,
    },
    InvalidCombo {
        section: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { section, field } => {
                write!(f, "[{section}] missing required field '{field}'")
            }
            ValidationIssue::OutOfRange {
                section,
                field,
                message,
            } => write!(f, "[{section}] {field} {message}"),
            ValidationIssue::InvalidCombo { section, message } => {
                write!(f, "[{section}] invalid configuration: {message}")
            }
        }
    }
}
