//! Version-control collaborator.
//!
//! The share lifecycle only needs a repository root, a base revision, a
//! binary diff and a three-way patch apply. `GitVcs` provides them by shelling
//! out to git; tests substitute a fake.

use std::path::{Path, PathBuf};

use dvshare_utils_git as git;
pub use dvshare_utils_git::GIT_TIMEOUT_ENV;
use tracing::{debug, warn};

use crate::paths::canonical_dir;
use crate::{Result, ShareError};

/// Result of a three-way patch application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub success: bool,
    /// Exit status of the merge tool, when it exited normally.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Capabilities the share lifecycle needs from version control.
pub trait VersionControl {
    /// Root of the working tree.
    fn repo_root(&self) -> Result<PathBuf>;

    /// Current revision id, if the repository has one.
    fn current_revision(&self) -> Option<String>;

    /// Configured author name, if any.
    fn user_name(&self) -> Option<String>;

    /// Unified (binary-safe) diff of repository-relative `paths` against `base`.
    fn diff(&self, paths: &[String], base: Option<&str>) -> Result<Vec<u8>>;

    /// Three-way apply of `patch`; conflicting hunks are rejected individually.
    fn apply_three_way(&self, patch: &[u8]) -> Result<MergeOutcome>;
}

/// Git-backed collaborator rooted at a discovered working tree.
#[derive(Debug, Clone)]
pub struct GitVcs {
    root: PathBuf,
}

impl GitVcs {
    /// Locate the repository containing `cwd`.
    pub fn discover(cwd: &Path) -> Result<Self> {
        let root = git::get_repo_root(cwd)
            .ok_or_else(|| ShareError::NotARepository(cwd.to_path_buf()))?;
        debug!(root = %root.display(), "Discovered repository");
        Ok(Self {
            root: canonical_dir(&root),
        })
    }

    /// Use `root` as-is without asking git.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl VersionControl for GitVcs {
    fn repo_root(&self) -> Result<PathBuf> {
        Ok(self.root.clone())
    }

    fn current_revision(&self) -> Option<String> {
        git::get_commit_hash(&self.root)
    }

    fn user_name(&self) -> Option<String> {
        git::get_user_name(&self.root)
    }

    fn diff(&self, paths: &[String], base: Option<&str>) -> Result<Vec<u8>> {
        let output = git::diff_binary(&self.root, base, paths)
            .map_err(|e| ShareError::Git(format!("git diff: {e}")))?;
        if !output.success() {
            warn!(stderr = %output.stderr_lossy().trim(), "git diff failed");
            return Err(ShareError::Git(format!(
                "git diff exited with {:?}",
                output.code()
            )));
        }
        Ok(output.stdout)
    }

    fn apply_three_way(&self, patch: &[u8]) -> Result<MergeOutcome> {
        let output = git::apply_three_way(&self.root, patch)
            .map_err(|e| ShareError::Git(format!("git apply: {e}")))?;
        Ok(MergeOutcome {
            success: output.success(),
            code: output.code(),
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        })
    }
}
