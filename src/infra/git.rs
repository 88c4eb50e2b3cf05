//! Git revision discovery
//!
//! Resolves the revision a release is cut from using the gix crate. The
//! orchestrator only needs the HEAD commit id; clone and fetch are the
//! concern of whatever produced the checkout.

use std::path::Path;

use crate::error::GitError;

/// Resolve the HEAD commit id of the repository containing `path`.
pub fn head_revision(path: &Path) -> Result<String, GitError> {
    let repo = gix::discover(path).map_err(|_| GitError::NotARepository {
        path: path.to_path_buf(),
    })?;

    let head = repo.head_id().map_err(|e| GitError::HeadUnresolved {
        error: e.to_string(),
    })?;

    Ok(head.to_string())
}
