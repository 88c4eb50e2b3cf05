//! Source tree snapshot
//!
//! An immutable view of the monorepo checkout at orchestration start. All
//! project builders borrow the same snapshot; nothing mutates it after
//! acquisition.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::infra::git;

/// Immutable snapshot of the monorepo.
///
/// Holds the checkout root and the revision identifier the release is cut
/// from. The revision feeds the versioned tag; an empty revision is legal
/// and degrades the tag to its date component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    root: PathBuf,
    revision: String,
}

impl SourceTree {
    /// Open a source tree, discovering the revision from the git HEAD.
    ///
    /// Falls back to a content digest of the tree when the checkout is not
    /// a git repository (e.g. an exported tarball).
    pub fn open(root: &Path) -> Result<Self, ConfigError> {
        let revision = git::head_revision(root)
            .unwrap_or_else(|_| content_digest(root).unwrap_or_default());
        Self::with_revision(root, revision)
    }

    /// Open a source tree with an explicit revision identifier.
    pub fn with_revision(root: &Path, revision: String) -> Result<Self, ConfigError> {
        if !root.is_dir() {
            return Err(ConfigError::SourceRootNotFound {
                path: root.to_path_buf(),
            });
        }
        let root = root
            .canonicalize()
            .map_err(|_| ConfigError::SourceRootNotFound {
                path: root.to_path_buf(),
            })?;
        Ok(Self { root, revision })
    }

    /// Checkout root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Revision identifier (git SHA or content digest; may be empty)
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Absolute path of a subtree within the snapshot
    pub fn path(&self, subtree: &str) -> PathBuf {
        self.root.join(subtree)
    }

    /// Whether a subtree exists within the snapshot
    pub fn contains(&self, subtree: &str) -> bool {
        self.root.join(subtree).exists()
    }
}

/// Digest the tree contents into a stable hex identifier.
///
/// Walks files in sorted order and hashes relative path plus content, so
/// the digest is independent of filesystem iteration order.
fn content_digest(root: &Path) -> Option<String> {
    let mut entries: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for path in &entries {
        let rel = path.strip_prefix(root).ok()?;
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(std::fs::read(path).ok()?);
    }

    Some(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_missing_root() {
        let err = SourceTree::with_revision(Path::new("/nonexistent/checkout"), String::new());
        assert!(matches!(err, Err(ConfigError::SourceRootNotFound { .. })));
    }

    #[test]
    fn test_contains_and_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cmd/api")).unwrap();

        let tree = SourceTree::with_revision(dir.path(), "abc".to_string()).unwrap();
        assert!(tree.contains("cmd/api"));
        assert!(!tree.contains("cmd/worker"));
        assert!(tree.path("cmd/api").ends_with("cmd/api"));
    }

    #[test]
    fn test_content_digest_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();

        let first = content_digest(dir.path()).unwrap();
        let second = content_digest(dir.path()).unwrap();
        assert_eq!(first, second);

        std::fs::write(dir.path().join("b.txt"), "gamma").unwrap();
        let third = content_digest(dir.path()).unwrap();
        assert_ne!(first, third);
    }
}
