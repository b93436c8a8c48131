use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Keeps paths named by patch files inside the tree being patched.
#[derive(Debug, Clone)]
pub struct TreeGuard {
    /// Canonical tree root
    root: PathBuf,
    /// Canonical directories inside the tree that patches must never touch
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside the tree: {path} (tree: {root})")]
    OutsideTree { path: PathBuf, root: PathBuf },

    #[error("path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl TreeGuard {
    /// The root is canonicalized so symlinked roots compare correctly.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = root.as_ref().canonicalize()?;
        let forbidden_paths = vec![root.join(".git")];
        Ok(Self {
            root,
            forbidden_paths,
        })
    }

    /// Resolve a patch-relative path to an absolute path inside the tree.
    ///
    /// The target does not need to exist yet; its closest existing ancestor is
    /// canonicalized so symlinks pointing out of the tree are still caught.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let relative = relative.as_ref();
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes {
            return Err(SafetyError::OutsideTree {
                path: relative.to_path_buf(),
                root: self.root.clone(),
            });
        }

        let absolute = self.root.join(relative);
        let mut existing = absolute.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        let canonical = existing.canonicalize()?;
        self.check_canonical(&canonical)?;
        if absolute.starts_with(&self.root) {
            self.check_canonical(&absolute)?;
        }
        Ok(absolute)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideTree {
                path: canonical.to_path_buf(),
                root: self.root.clone(),
            });
        }
        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolves_existing_and_new_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        fs::write(temp_dir.path().join("a/b/C.java"), "").unwrap();
        let guard = TreeGuard::new(temp_dir.path()).unwrap();

        assert!(guard.resolve("a/b/C.java").is_ok());
        let created = guard.resolve("a/new/D.java").unwrap();
        assert!(created.ends_with("a/new/D.java"));
    }

    #[test]
    fn rejects_parent_components_and_absolute_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = TreeGuard::new(temp_dir.path()).unwrap();

        assert!(matches!(
            guard.resolve("../outside.java"),
            Err(SafetyError::OutsideTree { .. })
        ));
        assert!(matches!(
            guard.resolve("/etc/passwd"),
            Err(SafetyError::OutsideTree { .. })
        ));
    }

    #[test]
    fn rejects_git_metadata() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
        let guard = TreeGuard::new(temp_dir.path()).unwrap();

        assert!(matches!(
            guard.resolve(".git/config"),
            Err(SafetyError::ForbiddenPath { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn rejects_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let tree = temp_dir.path().join("tree");
        let outside = temp_dir.path().join("outside");
        fs::create_dir_all(&tree).unwrap();
        fs::create_dir_all(&outside).unwrap();
        symlink(&outside, tree.join("escape")).unwrap();

        let guard = TreeGuard::new(&tree).unwrap();
        assert!(matches!(
            guard.resolve("escape/A.java"),
            Err(SafetyError::OutsideTree { .. })
        ));
    }
}
