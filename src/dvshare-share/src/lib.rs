//! Ephemeral, server-less sharing of uncommitted local changes.
//!
//! A share is an immutable bundle of selected working-tree files, a diff
//! against the base revision and a JSON manifest with an expiry. Shares live
//! in the repository (`.git/dv-share/<ID>/`), are packed into a single zip for
//! hand-off, and are applied on the receiving side either as a three-way
//! patch or as a raw copy with backups.
//!
//! # Layout
//!
//! ```text
//! .git/dv-share/<ID>/
//!     manifest.json
//!     share.patch
//!     files/<relative paths...>
//! ```

pub mod apply;
pub mod backend;
pub mod config;
pub mod fingerprint;
pub mod pack;
pub mod paths;
pub mod prune;
pub mod record;
pub mod store;
pub mod ttl;
pub mod vcs;

pub use apply::{ApplyMode, ApplyReport, Reconciler};
pub use backend::{FsBackend, MemoryBackend, ShareBackend};
pub use config::ShareConfig;
pub use fingerprint::{HashingReader, fingerprint, fingerprint_file};
pub use pack::{ImportedShare, Packager, ShareSource, StoredShare};
pub use prune::{PruneReport, sweep};
pub use record::{FileEntry, ShareRecord};
pub use store::{CreateReport, CreateRequest, ListedShare, ShareStore, SkipReason, SkippedPath};
pub use ttl::{format_ttl, parse_ttl};
pub use vcs::{GitVcs, MergeOutcome, VersionControl};

use std::path::PathBuf;
use thiserror::Error;

/// Name of the metadata file inside a share.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Name of the diff file inside a share.
pub const PATCH_FILE: &str = "share.patch";
/// Directory holding the snapshotted files inside a share.
pub const FILES_DIR: &str = "files";

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("invalid TTL: {0}")]
    InvalidDuration(String),
    #[error("path {path} not under repo {root}")]
    PathEscape { path: PathBuf, root: PathBuf },
    #[error("nothing to share")]
    EmptyShare,
    #[error("share not found: {0}")]
    NotFound(String),
    #[error("broken manifest for {id}: {reason}")]
    CorruptMetadata { id: String, reason: String },
    #[error("patch failed; you can retry with --mode copy")]
    PatchFailed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("no files/ to copy; abort")]
    NothingToApply,
    #[error("invalid share id: {0:?}")]
    InvalidId(String),
    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),
    #[error("fingerprint mismatch for {path}: expected {expected}, got {actual}")]
    FingerprintMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("archive error: {0}")]
    Archive(String),
    #[error("git error: {0}")]
    Git(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShareError {
    /// Process exit status for this error.
    ///
    /// Only `EmptyShare` (1) and `NothingToApply` (2) carry meaning; a failed
    /// patch forwards the merge tool's own status when it has one.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShareError::NothingToApply => 2,
            ShareError::PatchFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

impl From<zip::result::ZipError> for ShareError {
    fn from(e: zip::result::ZipError) -> Self {
        ShareError::Archive(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShareError>;
