//! Repository identity ("product") resolution from git metadata.

use crate::error::ProductError;
use git2::Repository;
use std::path::{Path, PathBuf};

const PREFERRED_REMOTE: &str = "origin";

/// Product name for the repository at `repo_root`, read from its remote URL.
///
/// `origin` is preferred; otherwise the first configured remote is used.
/// Callers memoize the result for the session.
pub fn resolve(repo_root: &Path) -> Result<String, ProductError> {
    let repo = Repository::open(repo_root)
        .map_err(|_| ProductError::NoRepository(repo_root.to_path_buf()))?;
    let remotes = repo.remotes()?;
    let remote_name = if remotes.iter().flatten().any(|name| name == PREFERRED_REMOTE) {
        PREFERRED_REMOTE.to_string()
    } else {
        remotes
            .iter()
            .flatten()
            .next()
            .map(str::to_string)
            .ok_or_else(|| ProductError::NoRemote(repo_root.to_path_buf()))?
    };
    let remote = repo.find_remote(&remote_name)?;
    let url = remote
        .url()
        .ok_or_else(|| ProductError::NoRemote(repo_root.to_path_buf()))?;
    name_from_remote_url(url).ok_or_else(|| ProductError::UnrecognizedUrl(url.to_string()))
}

/// Nearest ancestor of `start` (inclusive) holding a git working tree.
pub fn discover_repo_root(start: &Path) -> Option<PathBuf> {
    let repo = Repository::discover(start).ok()?;
    // git2 reports workdirs with a trailing separator
    repo.workdir().map(|dir| dir.components().collect())
}

/// Last path segment of a remote URL with any `.git` suffix removed.
///
/// Handles `https://host/org/repo.git`, `ssh://git@host/org/repo` and the
/// scp-like `git@host:org/repo.git`.
pub fn name_from_remote_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches(['/', '\\']);
    let last = trimmed.rsplit(['/', ':', '\\']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
