// ABOUTME: Local source tree handed to the sandbox, plus branch name validation
// The tree is resolved to its repository work directory with git2 before anything is mounted

use git2::Repository;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SourceTreeError {
    #[error("Git repository error: {0}")]
    Git(#[from] git2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Repository has no work directory: {0}")]
    Bare(PathBuf),
    #[error("Invalid branch name: {0}")]
    InvalidBranchName(String),
}

/// Work directory of a local git clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    root: PathBuf,
}

impl SourceTree {
    /// Discover the repository containing `path` and use its work directory as the tree root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceTreeError> {
        let path = path.as_ref();
        let repo = Repository::discover(path)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| SourceTreeError::Bare(repo.path().to_path_buf()))?;
        let root = workdir.canonicalize()?;

        debug!("Resolved source tree {} to {}", path.display(), root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reject names git would refuse as a branch, since they end up inside an API path.
pub fn validate_branch_name(name: &str) -> Result<(), SourceTreeError> {
    if name.is_empty() {
        return Err(SourceTreeError::InvalidBranchName(
            "Branch name cannot be empty".to_string(),
        ));
    }

    let invalid_chars = [' ', '~', '^', ':', '?', '*', '[', '\\'];
    if name.chars().any(|c| invalid_chars.contains(&c) || c.is_control()) {
        return Err(SourceTreeError::InvalidBranchName(format!(
            "Branch name contains invalid characters: {}",
            name
        )));
    }

    if name.starts_with('-') || name.ends_with('/') || name.contains("//") || name.contains("..") {
        return Err(SourceTreeError::InvalidBranchName(format!(
            "Invalid branch name format: {}",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_resolves_repository_root_from_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init(temp_dir.path()).unwrap();
        let nested = temp_dir.path().join("docs").join("guide");
        std::fs::create_dir_all(&nested).unwrap();

        let tree = SourceTree::open(&nested).unwrap();
        assert_eq!(tree.root(), temp_dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_open_rejects_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let result = SourceTree::open(temp_dir.path().join("does-not-exist"));
        assert!(result.is_err());
    }

    #[test]
    fn test_open_rejects_bare_repository() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init_bare(temp_dir.path()).unwrap();

        let result = SourceTree::open(temp_dir.path());
        assert!(matches!(result, Err(SourceTreeError::Bare(_))));
    }

    #[test]
    fn test_validate_branch_name() {
        for valid in ["main", "release/1.2", "feature/signoff-check", "v2"] {
            assert!(validate_branch_name(valid).is_ok(), "{} should be valid", valid);
        }

        for invalid in ["", "has space", "-leading", "trailing/", "a//b", "a..b", "x:y", "star*"] {
            assert!(validate_branch_name(invalid).is_err(), "{:?} should be invalid", invalid);
        }
    }
}
