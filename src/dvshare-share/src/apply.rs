//! Applying a received share onto a working tree.
//!
//! `patch` mode hands the diff to a three-way merge; `copy` mode writes the
//! snapshotted files, backing up anything it overwrites. A failed merge is
//! reported, never retried in copy mode behind the caller's back.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use crate::fingerprint::fingerprint;
use crate::pack::ShareSource;
use crate::paths::safe_join;
use crate::vcs::VersionControl;
use crate::{Result, ShareError};

/// How to apply a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// Three-way merge of the recorded diff.
    #[default]
    Patch,
    /// Copy snapshotted files over the tree.
    Copy,
}

impl FromStr for ApplyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patch" => Ok(ApplyMode::Patch),
            "copy" => Ok(ApplyMode::Copy),
            other => Err(format!("unknown apply mode: {other}")),
        }
    }
}

/// What an apply did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyReport {
    /// The diff merged cleanly.
    Patched { stdout: String, stderr: String },
    /// Files were copied.
    Copied {
        written: usize,
        /// Backups made of pre-existing destinations.
        backups: Vec<PathBuf>,
        /// Patch mode was requested but the share had no usable diff.
        fell_back: bool,
    },
}

/// Applies shares to the tree rooted at `target`.
pub struct Reconciler<'a> {
    vcs: &'a dyn VersionControl,
    target: PathBuf,
    backup_suffix: String,
    verify_fingerprints: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(vcs: &'a dyn VersionControl, target: impl Into<PathBuf>) -> Self {
        Self {
            vcs,
            target: target.into(),
            backup_suffix: ".bak".to_string(),
            verify_fingerprints: false,
        }
    }

    pub fn with_backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = suffix.into();
        self
    }

    /// Check each file against its manifest digest before copying anything.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_fingerprints = verify;
        self
    }

    /// Apply `source` in `mode`.
    ///
    /// Patch mode with an absent or empty diff falls back to copying. Fails
    /// with `NothingToApply` when there is neither a diff nor any file.
    pub fn apply(&self, source: &dyn ShareSource, mode: ApplyMode) -> Result<ApplyReport> {
        if mode == ApplyMode::Patch {
            match source.patch()? {
                Some(patch) if !patch.is_empty() => return self.apply_patch(&patch),
                _ => debug!("No usable diff; falling back to copy"),
            }
        }
        self.apply_copy(source, mode == ApplyMode::Patch)
    }

    fn apply_patch(&self, patch: &[u8]) -> Result<ApplyReport> {
        let outcome = self.vcs.apply_three_way(patch)?;
        if !outcome.success {
            return Err(ShareError::PatchFailed {
                code: outcome.code,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
            });
        }
        info!("Patch applied");
        Ok(ApplyReport::Patched {
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        })
    }

    fn apply_copy(&self, source: &dyn ShareSource, fell_back: bool) -> Result<ApplyReport> {
        let names = source.file_names()?;
        if names.is_empty() {
            return Err(ShareError::NothingToApply);
        }

        // Resolve every destination up front so a hostile name aborts before
        // anything is written.
        let targets = names
            .iter()
            .map(|rel| Ok((rel.as_str(), self.resolve(rel)?)))
            .collect::<Result<Vec<_>>>()?;

        if self.verify_fingerprints {
            self.verify(source, &names)?;
        }

        let mut backups = Vec::new();
        for (rel, dest) in &targets {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            if dest.exists() {
                if fingerprint(fs::File::open(dest)?)? == fingerprint(source.open_file(rel)?)? {
                    debug!(path = %dest.display(), "Already up to date");
                    continue;
                }
                let backup = fresh_backup_path(dest, &self.backup_suffix);
                fs::copy(dest, &backup)?;
                debug!(path = %dest.display(), backup = %backup.display(), "Backed up");
                backups.push(backup);
            }
            let mut reader = source.open_file(rel)?;
            let mut out = fs::File::create(dest)?;
            std::io::copy(&mut reader, &mut out)?;
        }

        info!(written = targets.len(), backups = backups.len(), "Files copied");
        Ok(ApplyReport::Copied {
            written: targets.len(),
            backups,
            fell_back,
        })
    }

    /// Destination for a share-relative name. Names that climb out of the
    /// target or land in its `.git` directory are refused.
    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let dest = safe_join(&self.target, rel)?;
        let first = Path::new(rel)
            .components()
            .find(|c| !matches!(c, Component::CurDir));
        match first {
            Some(Component::Normal(part)) if part.eq_ignore_ascii_case(".git") => {
                Err(ShareError::PathEscape {
                    path: PathBuf::from(rel),
                    root: self.target.clone(),
                })
            }
            _ => Ok(dest),
        }
    }

    fn verify(&self, source: &dyn ShareSource, names: &[String]) -> Result<()> {
        let Some(record) = source.record()? else {
            return Ok(());
        };
        for entry in &record.files {
            if !names.contains(&entry.path) {
                continue;
            }
            let actual = fingerprint(source.open_file(&entry.path)?)?;
            if actual != entry.sha256 {
                return Err(ShareError::FingerprintMismatch {
                    path: entry.path.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// `dest` with `suffix` appended to its file name.
pub fn backup_path(dest: &Path, suffix: &str) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// First backup name for `dest` that does not exist yet: `<dest><suffix>`,
/// then `<dest><suffix>.1`, `<dest><suffix>.2` and so on.
pub fn fresh_backup_path(dest: &Path, suffix: &str) -> PathBuf {
    let base = backup_path(dest, suffix);
    let mut candidate = base.clone();
    let mut n = 0u32;
    while candidate.exists() {
        n += 1;
        candidate = backup_path(&base, &format!(".{n}"));
    }
    candidate
}
