//! Patch application through an external `patch` executable.

use crate::patch::applier::{Applied, FuzzOptions, PatchApplier};
use crate::patch::errors::ApplyError;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
pub struct NativeApplier {
    program: String,
    options: FuzzOptions,
    timeout: Duration,
}

impl NativeApplier {
    pub fn new(program: impl Into<String>, options: FuzzOptions, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            options,
            timeout,
        }
    }

    fn base_args(&self) -> Vec<String> {
        let fuzz = if self.options.fuzzy {
            self.options.max_fuzz
        } else {
            0
        };
        vec![
            "-p1".to_string(),
            "--batch".to_string(),
            "--forward".to_string(),
            "--no-backup-if-mismatch".to_string(),
            "--reject-file=-".to_string(),
            format!("-F{fuzz}"),
        ]
    }

    /// Run the tool once with `patch_text` on stdin; returns its combined output.
    fn run(&self, tree: &Path, patch_text: &str, dry_run: bool) -> Result<String, ApplyError> {
        let mut args = self.base_args();
        if dry_run {
            args.push("--dry-run".to_string());
        }

        let spawn_error = |source| ApplyError::Spawn {
            program: self.program.clone(),
            source,
        };
        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(tree)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(patch_text.as_bytes()).map_err(spawn_error)?;
        }

        let Some(status) = child.wait_timeout(self.timeout).map_err(spawn_error)? else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ApplyError::Timeout {
                program: self.program.clone(),
                secs: self.timeout.as_secs(),
            });
        };

        let mut output = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            let _ = stdout.read_to_string(&mut output);
        }
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut output);
        }

        if status.success() {
            Ok(output)
        } else {
            Err(ApplyError::Tool {
                program: self.program.clone(),
                status: status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                output: output.trim().to_string(),
            })
        }
    }
}

impl PatchApplier for NativeApplier {
    fn name(&self) -> &'static str {
        "external"
    }

    fn apply(&self, tree: &Path, patch_file: &Path, patch_text: &str) -> Result<Applied, ApplyError> {
        // the dry run keeps a failing patch from half-applying
        self.run(tree, patch_text, true)?;
        let output = self.run(tree, patch_text, false)?;
        tracing::debug!(patch = %patch_file.display(), %output, "external patch applied");
        Ok(parse_report(&output))
    }
}

/// Extract touched files, fuzz and offsets from GNU patch's chatter.
fn parse_report(output: &str) -> Applied {
    let mut applied = Applied::default();
    for line in output.lines() {
        if let Some(file) = line.strip_prefix("patching file ") {
            applied
                .files
                .push(PathBuf::from(file.trim().trim_matches(['\'', '"'])));
        }
        if let Some(fuzz) = number_after(line, "with fuzz ") {
            applied.fuzz = applied.fuzz.max(fuzz);
        }
        if let Some(offset) = number_after(line, "(offset ") {
            applied.offset = applied.offset.max(offset);
        }
    }
    applied
}

fn number_after(line: &str, marker: &str) -> Option<usize> {
    let rest = &line[line.find(marker)? + marker.len()..];
    let digits: String = rest
        .trim_start_matches('-')
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn patch_available() -> bool {
        Command::new("patch")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn parses_gnu_patch_output() {
        let report = parse_report(
            "patching file p/A.java\nHunk #1 succeeded at 12 with fuzz 1 (offset -3 lines).\npatching file 'p/B.java'\n",
        );
        assert_eq!(
            report.files,
            vec![PathBuf::from("p/A.java"), PathBuf::from("p/B.java")]
        );
        assert_eq!(report.fuzz, 1);
        assert_eq!(report.offset, 3);
    }

    #[test]
    fn fuzz_flag_follows_options() {
        let strict = NativeApplier::new("patch", FuzzOptions::default(), Duration::from_secs(5));
        assert!(strict.base_args().contains(&"-F0".to_string()));

        let fuzzy = NativeApplier::new(
            "patch",
            FuzzOptions {
                fuzzy: true,
                max_fuzz: 3,
            },
            Duration::from_secs(5),
        );
        assert!(fuzzy.base_args().contains(&"-F3".to_string()));
    }

    #[test]
    fn missing_executable_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let applier = NativeApplier::new(
            "definitely-not-a-patch-binary",
            FuzzOptions::default(),
            Duration::from_secs(5),
        );
        let err = applier
            .apply(dir.path(), Path::new("A.patch"), "--- a/A\n+++ b/A\n")
            .unwrap_err();
        assert!(matches!(err, ApplyError::Spawn { .. }));
    }

    #[test]
    fn applies_and_rejects_with_system_patch() {
        if !patch_available() {
            eprintln!("skipping: no patch executable");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.java"), "class A {\n}\n").unwrap();
        let applier = NativeApplier::new("patch", FuzzOptions::default(), Duration::from_secs(30));

        let good = "--- a/A.java\n+++ b/A.java\n@@ -1,2 +1,3 @@\n class A {\n+    int x;\n }\n";
        let applied = applier.apply(dir.path(), Path::new("A.java.patch"), good).unwrap();
        assert_eq!(applied.files, vec![PathBuf::from("A.java")]);
        assert_eq!(
            fs::read_to_string(dir.path().join("A.java")).unwrap(),
            "class A {\n    int x;\n}\n"
        );

        let bad = "--- a/A.java\n+++ b/A.java\n@@ -1,2 +1,2 @@\n class Nope {\n-}\n+};\n";
        let err = applier.apply(dir.path(), Path::new("A.java.patch"), bad).unwrap_err();
        assert!(matches!(err, ApplyError::Tool { .. }));
        assert_eq!(
            fs::read_to_string(dir.path().join("A.java")).unwrap(),
            "class A {\n    int x;\n}\n"
        );
    }
}
