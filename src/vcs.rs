//! Checkpointed history for a source tree, backed by the `git` CLI.

use crate::config::CheckpointConfig;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Tag created by [`VersionedTree::init`].
pub const INITIAL_TAG: &str = "initial";

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git {command} failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unknown checkpoint '{0}'")]
    UnknownCheckpoint(String),
}

/// A named commit usable as a reset target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub name: String,
    pub commit: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl From<&CheckpointConfig> for Author {
    fn from(config: &CheckpointConfig) -> Self {
        Self {
            name: config.author_name.clone(),
            email: config.author_email.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VersionedTree {
    root: PathBuf,
    author: Author,
}

impl VersionedTree {
    /// Wrap an existing repository.
    pub fn open(root: impl Into<PathBuf>, author: Author) -> Self {
        Self {
            root: root.into(),
            author,
        }
    }

    /// Start history at `root`: everything present becomes the first commit,
    /// tagged [`INITIAL_TAG`].
    pub fn init(root: impl Into<PathBuf>, author: Author) -> Result<(Self, Checkpoint), VcsError> {
        let tree = Self::open(root, author);
        tree.git(["init", "--quiet"])?;
        let commit = tree.commit("Initial")?;
        let checkpoint = tree.tag(&commit, INITIAL_TAG)?;
        Ok((tree, checkpoint))
    }

    /// Clone `from` into `to`.
    pub fn clone(from: &Path, to: impl Into<PathBuf>, author: Author) -> Result<Self, VcsError> {
        let to = to.into();
        run(
            None,
            &author,
            [
                OsStr::new("clone"),
                OsStr::new("--quiet"),
                from.as_os_str(),
                to.as_os_str(),
            ],
        )?;
        Ok(Self::open(to, author))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage everything and commit it, even when nothing changed.
    pub fn commit(&self, message: &str) -> Result<Checkpoint, VcsError> {
        self.git(["add", "--all", "."])?;
        self.git([
            "commit",
            "--quiet",
            "--no-gpg-sign",
            "--no-verify",
            "--allow-empty",
            "-m",
            message,
        ])?;
        let commit = self.git(["rev-parse", "HEAD"])?;
        debug!(root = %self.root.display(), %commit, message, "committed");
        Ok(Checkpoint {
            name: commit.clone(),
            commit,
        })
    }

    /// Name `checkpoint` with an annotated tag.
    pub fn tag(&self, checkpoint: &Checkpoint, name: &str) -> Result<Checkpoint, VcsError> {
        self.git(["tag", "-a", name, "-m", name, checkpoint.commit.as_str()])?;
        Ok(Checkpoint {
            name: name.to_string(),
            commit: checkpoint.commit.clone(),
        })
    }

    pub fn delete_tag(&self, name: &str) -> Result<(), VcsError> {
        self.git(["tag", "-d", name]).map(|_| ())
    }

    pub fn tag_exists(&self, name: &str) -> Result<bool, VcsError> {
        let tag = format!("refs/tags/{name}");
        match self.git(["rev-parse", "--quiet", "--verify", tag.as_str()]) {
            Ok(_) => Ok(true),
            Err(VcsError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Resolve a tag or other revision to its commit.
    pub fn checkpoint(&self, name: &str) -> Result<Checkpoint, VcsError> {
        let rev = format!("{name}^{{commit}}");
        match self.git(["rev-parse", "--quiet", "--verify", rev.as_str()]) {
            Ok(commit) => Ok(Checkpoint {
                name: name.to_string(),
                commit,
            }),
            Err(VcsError::Command { .. }) => Err(VcsError::UnknownCheckpoint(name.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Restore `name` exactly, dropping uncommitted and untracked changes.
    pub fn reset_hard(&self, name: &str) -> Result<Checkpoint, VcsError> {
        let checkpoint = self.checkpoint(name)?;
        self.git(["reset", "--quiet", "--hard", checkpoint.commit.as_str()])?;
        self.git(["clean", "-fdq"])?;
        debug!(root = %self.root.display(), checkpoint = name, "reset");
        Ok(checkpoint)
    }

    fn git<I, S>(&self, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run(Some(&self.root), &self.author, args)
    }
}

fn run<I, S>(dir: Option<&Path>, author: &Author, args: I) -> Result<String, VcsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let mut command = Command::new("git");
    if let Some(dir) = dir {
        command.arg("-C").arg(dir);
    }
    command
        .arg("-c")
        .arg(format!("user.name={}", author.name))
        .arg("-c")
        .arg(format!("user.email={}", author.email))
        .args(["-c", "core.autocrlf=false", "-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
        .args(["-c", "init.defaultBranch=main"])
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0");

    let output = command.output().map_err(VcsError::Spawn)?;
    if !output.status.success() {
        return Err(VcsError::Command {
            command: args
                .iter()
                .map(|a| a.as_ref().to_string_lossy())
                .collect::<Vec<_>>()
                .join(" "),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether a usable `git` executable is on `PATH`.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn author() -> Author {
        Author::from(&CheckpointConfig::default())
    }

    #[test]
    fn checkpoints_survive_resets() {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.java"), "class A {}\n").unwrap();
        let (tree, initial) = VersionedTree::init(dir.path(), author()).unwrap();
        assert_eq!(initial.name, INITIAL_TAG);
        assert!(tree.tag_exists(INITIAL_TAG).unwrap());
        assert!(!tree.tag_exists("patched").unwrap());

        fs::write(dir.path().join("A.java"), "class A { int x; }\n").unwrap();
        let second = tree.commit("Patched").unwrap();
        tree.tag(&second, "patched").unwrap();
        assert_eq!(tree.checkpoint("patched").unwrap().commit, second.commit);

        fs::write(dir.path().join("A.java"), "dirty").unwrap();
        fs::write(dir.path().join("Untracked.java"), "new").unwrap();
        tree.reset_hard(INITIAL_TAG).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("A.java")).unwrap(), "class A {}\n");
        assert!(!dir.path().join("Untracked.java").exists());

        tree.delete_tag("patched").unwrap();
        assert!(!tree.tag_exists("patched").unwrap());
        assert!(matches!(
            tree.checkpoint("patched"),
            Err(VcsError::UnknownCheckpoint(_))
        ));
    }

    #[test]
    fn clone_copies_history() {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let origin = dir.path().join("origin");
        fs::create_dir_all(&origin).unwrap();
        fs::write(origin.join("A.java"), "class A {}\n").unwrap();
        VersionedTree::init(&origin, author()).unwrap();

        let copy = VersionedTree::clone(&origin, dir.path().join("copy"), author()).unwrap();
        assert!(copy.root().join("A.java").is_file());
        assert!(copy.checkpoint("HEAD").is_ok());
    }
}
