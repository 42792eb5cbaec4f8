//! Blob storage behind the share store.
//!
//! A backend maps a share id to a set of named blobs (`manifest.json`,
//! `share.patch`, `files/<path>`). The filesystem backend is the real store;
//! the in-memory one backs unit tests.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::Result;
use crate::paths::{safe_join, to_slash};

/// Key/blob storage for shares. Blob names are relative, `/`-separated.
pub trait ShareBackend {
    /// Ids of every share area present, in no particular order.
    fn share_ids(&self) -> Result<Vec<String>>;

    /// Whether a share area exists for `id`, with or without a manifest.
    fn contains(&self, id: &str) -> Result<bool>;

    /// Open a blob for reading. `Ok(None)` when it does not exist.
    fn open(&self, id: &str, name: &str) -> Result<Option<Box<dyn Read + '_>>>;

    /// Create or replace a blob, returning the number of bytes written.
    fn write(&self, id: &str, name: &str, data: &mut dyn Read) -> Result<u64>;

    /// Names of the blobs under `prefix/`, relative to it, sorted.
    fn list(&self, id: &str, prefix: &str) -> Result<Vec<String>>;

    /// Delete a share area. `Ok(false)` if it was already gone.
    fn remove(&self, id: &str) -> Result<bool>;

    /// Directory holding the share, for backends that have one.
    fn location(&self, _id: &str) -> Option<PathBuf> {
        None
    }

    /// Read a whole blob into memory.
    fn read(&self, id: &str, name: &str) -> Result<Option<Vec<u8>>> {
        match self.open(id, name)? {
            Some(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            None => Ok(None),
        }
    }
}

/// Shares stored as directories under a root (`.git/dv-share`).
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn share_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn blob_path(&self, id: &str, name: &str) -> Result<PathBuf> {
        safe_join(&self.share_dir(id), name)
    }
}

impl ShareBackend for FsBackend {
    fn share_ids(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => ids.push(name),
                Err(name) => warn!(name = ?name, "Skipping non UTF-8 share directory"),
            }
        }
        Ok(ids)
    }

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.share_dir(id).is_dir())
    }

    fn open(&self, id: &str, name: &str) -> Result<Option<Box<dyn Read + '_>>> {
        let path = self.blob_path(id, name)?;
        match fs::File::open(&path) {
            Ok(file) if path.is_file() => Ok(Some(Box::new(file))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, id: &str, name: &str, data: &mut dyn Read) -> Result<u64> {
        let path = self.blob_path(id, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&path)?;
        let written = std::io::copy(data, &mut file)?;
        file.flush()?;
        // Blobs must be durable before the manifest that vouches for them.
        file.sync_all()?;

        #[cfg(unix)]
        {
            if let Some(parent) = path.parent() {
                if let Ok(dir) = fs::File::open(parent) {
                    let _ = dir.sync_all();
                }
            }
        }

        debug!(share_id = %id, blob = %name, bytes = written, "Blob written");
        Ok(written)
    }

    fn list(&self, id: &str, prefix: &str) -> Result<Vec<String>> {
        let base = self.blob_path(id, prefix)?;
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&base).follow_links(false) {
            let entry = entry.map_err(|e| {
                std::io::Error::other(format!("walking {}: {}", base.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&base) {
                names.push(to_slash(rel));
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove(&self, id: &str) -> Result<bool> {
        match fs::remove_dir_all(self.share_dir(id)) {
            Ok(()) => {
                debug!(share_id = %id, "Share area removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self, id: &str) -> Option<PathBuf> {
        Some(self.share_dir(id))
    }
}

type Blobs = BTreeMap<String, Vec<u8>>;

/// Process-local backend for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    shares: RwLock<BTreeMap<String, Blobs>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw blob, bypassing the store (used to fake corruption).
    pub fn put(&self, id: &str, name: &str, data: impl Into<Vec<u8>>) {
        self.shares
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_default()
            .insert(name.to_string(), data.into());
    }
}

impl ShareBackend for MemoryBackend {
    fn share_ids(&self) -> Result<Vec<String>> {
        let shares = self.shares.read().unwrap_or_else(PoisonError::into_inner);
        Ok(shares.keys().cloned().collect())
    }

    fn contains(&self, id: &str) -> Result<bool> {
        let shares = self.shares.read().unwrap_or_else(PoisonError::into_inner);
        Ok(shares.contains_key(id))
    }

    fn open(&self, id: &str, name: &str) -> Result<Option<Box<dyn Read + '_>>> {
        let shares = self.shares.read().unwrap_or_else(PoisonError::into_inner);
        Ok(shares
            .get(id)
            .and_then(|blobs| blobs.get(name))
            .map(|data| Box::new(Cursor::new(data.clone())) as Box<dyn Read>))
    }

    fn write(&self, id: &str, name: &str, data: &mut dyn Read) -> Result<u64> {
        let mut buf = Vec::new();
        data.read_to_end(&mut buf)?;
        let written = buf.len() as u64;
        self.put(id, name, buf);
        Ok(written)
    }

    fn list(&self, id: &str, prefix: &str) -> Result<Vec<String>> {
        let shares = self.shares.read().unwrap_or_else(PoisonError::into_inner);
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        Ok(shares
            .get(id)
            .map(|blobs| {
                blobs
                    .keys()
                    .filter_map(|name| name.strip_prefix(&dir).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn remove(&self, id: &str) -> Result<bool> {
        let mut shares = self.shares.write().unwrap_or_else(PoisonError::into_inner);
        Ok(shares.remove(id).is_some())
    }
}
