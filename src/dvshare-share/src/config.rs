//! Per-repository configuration (`.dvshare.toml`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, ShareError};

/// File name looked up at the repository root.
pub const CONFIG_FILE: &str = ".dvshare.toml";

/// Configuration for the share store and the apply side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Store root, relative to the repository root.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// TTL used when none is given on the command line.
    #[serde(default = "default_ttl")]
    pub default_ttl: String,
    /// Where `pack` writes archives by default, relative to the repository root.
    #[serde(default = "default_pack_dir")]
    pub pack_dir: PathBuf,
    /// Suffix for copies of files overwritten in copy mode.
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,
    /// Timeout for each git invocation, `0` for none.
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,
    /// Check archived files against their manifest digests before copying.
    #[serde(default)]
    pub verify_fingerprints: bool,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".git").join("dv-share")
}

fn default_ttl() -> String {
    "24h".to_string()
}

fn default_pack_dir() -> PathBuf {
    PathBuf::from("simlog")
}

fn default_backup_suffix() -> String {
    ".bak".to_string()
}

fn default_git_timeout_secs() -> u64 {
    dvshare_utils_git::DEFAULT_GIT_TIMEOUT_SECS
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            default_ttl: default_ttl(),
            pack_dir: default_pack_dir(),
            backup_suffix: default_backup_suffix(),
            git_timeout_secs: default_git_timeout_secs(),
            verify_fingerprints: false,
        }
    }
}

impl ShareConfig {
    /// Load `<repo_root>/.dvshare.toml`, or defaults when it is absent.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config = Self::parse(&content)
            .map_err(|e| ShareError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded dvshare config");
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn store_root(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.store_dir)
    }

    pub fn pack_root(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.pack_dir)
    }
}
