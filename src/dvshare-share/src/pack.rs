//! Packing shares into a single zip and reading them back.
//!
//! Archive layout mirrors the store: `manifest.json` and `share.patch` at the
//! top level, snapshotted files under `files/` with `/` separators.

use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

use crate::backend::ShareBackend;
use crate::paths::{safe_join, to_slash};
use crate::record::ShareRecord;
use crate::store::ShareStore;
use crate::{FILES_DIR, MANIFEST_FILE, PATCH_FILE, Result, ShareError};

/// Anything laid out like a share: a manifest, an optional diff and a file area.
pub trait ShareSource {
    /// Raw manifest bytes, if present.
    fn manifest(&self) -> Result<Option<Vec<u8>>>;

    /// Raw diff bytes, if present (possibly empty).
    fn patch(&self) -> Result<Option<Vec<u8>>>;

    /// Relative paths in the file area, sorted. Empty when there is none.
    fn file_names(&self) -> Result<Vec<String>>;

    /// Open a file from the file area.
    fn open_file(&self, rel: &str) -> Result<Box<dyn Read + '_>>;

    /// Parsed manifest, if present and readable.
    fn record(&self) -> Result<Option<ShareRecord>> {
        self.manifest()?
            .map(|bytes| ShareRecord::from_manifest(&bytes))
            .transpose()
    }
}

/// A share read straight from a [`ShareStore`].
pub struct StoredShare<'a, B> {
    store: &'a ShareStore<B>,
    id: String,
}

impl<'a, B: ShareBackend> StoredShare<'a, B> {
    /// Borrow share `id`; fails unless it has a readable manifest.
    pub fn new(store: &'a ShareStore<B>, id: &str) -> Result<Self> {
        store.get(id)?;
        Ok(Self {
            store,
            id: id.to_string(),
        })
    }
}

impl<B: ShareBackend> ShareSource for StoredShare<'_, B> {
    fn manifest(&self) -> Result<Option<Vec<u8>>> {
        self.store.manifest_bytes(&self.id).map(Some)
    }

    fn patch(&self) -> Result<Option<Vec<u8>>> {
        self.store.backend().read(&self.id, PATCH_FILE)
    }

    fn file_names(&self) -> Result<Vec<String>> {
        self.store.file_names(&self.id)
    }

    fn open_file(&self, rel: &str) -> Result<Box<dyn Read + '_>> {
        self.store.open_file(&self.id, rel)
    }
}

/// A received share, either an extracted archive or a directory on disk.
///
/// When created from an archive the extraction directory is owned by this
/// value and deleted when it is dropped, on success and error paths alike.
#[derive(Debug)]
pub struct ImportedShare {
    root: PathBuf,
    _extracted: Option<TempDir>,
}

impl ImportedShare {
    /// Open `source`: a `.zip` archive (by extension) or an extracted directory.
    pub fn open(source: &Path) -> Result<Self> {
        if is_zip(source) {
            let file = fs::File::open(source)?;
            return Self::extract(file);
        }
        if !source.is_dir() {
            return Err(ShareError::NotFound(source.display().to_string()));
        }
        debug!(dir = %source.display(), "Using extracted share directory");
        Ok(Self {
            root: source.to_path_buf(),
            _extracted: None,
        })
    }

    /// Extract an in-memory archive.
    pub fn from_archive_bytes(bytes: &[u8]) -> Result<Self> {
        Self::extract(Cursor::new(bytes))
    }

    fn extract<R: Read + Seek>(reader: R) -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("dvshare_").tempdir()?;
        extract_zip(reader, temp.path())?;
        debug!(dir = %temp.path().display(), "Extracted share archive");
        Ok(Self {
            root: temp.path().to_path_buf(),
            _extracted: Some(temp),
        })
    }

    /// Directory the share's contents are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file area, when present.
    pub fn files_dir(&self) -> Option<PathBuf> {
        let dir = self.root.join(FILES_DIR);
        dir.is_dir().then_some(dir)
    }

    fn read_optional(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

impl ShareSource for ImportedShare {
    fn manifest(&self) -> Result<Option<Vec<u8>>> {
        self.read_optional(MANIFEST_FILE)
    }

    fn patch(&self) -> Result<Option<Vec<u8>>> {
        self.read_optional(PATCH_FILE)
    }

    fn file_names(&self) -> Result<Vec<String>> {
        let Some(dir) = self.files_dir() else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        for entry in walkdir::WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&dir) {
                    names.push(to_slash(rel));
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_file(&self, rel: &str) -> Result<Box<dyn Read + '_>> {
        let path = safe_join(&self.root.join(FILES_DIR), rel)?;
        Ok(Box::new(fs::File::open(path)?))
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Extract every member of a zip under `dest`, refusing members that would
/// land outside it.
pub fn extract_zip<R: Read + Seek>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(reader)?;

    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        let name = member.name().to_string();
        let out = safe_join(dest, &name)?;

        if member.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&out)?;
        std::io::copy(&mut member, &mut file)?;
    }
    Ok(())
}

/// Serializes shares to zip archives.
pub struct Packager;

impl Packager {
    /// Archive name for a share id.
    pub fn archive_name(id: &str) -> String {
        format!("dvshare_{id}.zip")
    }

    /// Bundle `source` into an in-memory zip.
    pub fn export(source: &dyn ShareSource) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        Self::write_archive(source, &mut buf)?;
        Ok(buf.into_inner())
    }

    /// Write `dvshare_<id>.zip` for a stored share into `out_dir`.
    pub fn export_to_dir<B: ShareBackend>(
        store: &ShareStore<B>,
        id: &str,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let source = StoredShare::new(store, id)?;
        fs::create_dir_all(out_dir)?;
        let out = out_dir.join(Self::archive_name(id));

        let mut tmp = tempfile::NamedTempFile::new_in(out_dir)?;
        Self::write_archive(&source, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&out).map_err(|e| ShareError::Io(e.error))?;

        info!(share_id = %id, archive = %out.display(), "Share packed");
        Ok(out)
    }

    fn write_archive<W: Write + Seek>(source: &dyn ShareSource, sink: W) -> Result<()> {
        let mut zip = zip::ZipWriter::new(sink);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in [
            (MANIFEST_FILE, source.manifest()?),
            (PATCH_FILE, source.patch()?),
        ] {
            if let Some(bytes) = bytes {
                zip.start_file(name, options)?;
                zip.write_all(&bytes)?;
            }
        }

        let files = source.file_names()?;
        if files.is_empty() {
            warn!("Share has no files to pack");
        }
        for rel in files {
            zip.start_file(format!("{FILES_DIR}/{rel}"), options)?;
            let mut reader = source.open_file(&rel)?;
            std::io::copy(&mut reader, &mut zip)?;
        }

        zip.finish()?;
        Ok(())
    }
}
