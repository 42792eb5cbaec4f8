//! Share store: create, read, list and remove share records.
//!
//! A record is only considered to exist once its manifest is written, so
//! `create` writes files first, then the diff, then the manifest.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{Local, SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::backend::ShareBackend;
use crate::fingerprint::HashingReader;
use crate::paths::{absolutize, canonical_dir, relative_to_root, validate_share_id};
use crate::record::{FileEntry, ShareRecord};
use crate::ttl::parse_ttl;
use crate::vcs::VersionControl;
use crate::{FILES_DIR, MANIFEST_FILE, PATCH_FILE, Result, ShareError};

/// Inputs for [`ShareStore::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// TTL text such as `2h30m`; one day when absent.
    pub ttl: Option<String>,
    /// Explicit id; a timestamp id is generated when absent.
    pub id: Option<String>,
    pub note: Option<String>,
    /// Files to share, absolute or relative to the caller's working directory.
    pub paths: Vec<PathBuf>,
}

/// Why an input path was left out of a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Missing, or not a regular file.
    NotAFile,
    /// Resolves outside the repository root.
    PathEscape,
    /// Same repository path given more than once.
    Duplicate,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotAFile => write!(f, "not a file"),
            SkipReason::PathEscape => write!(f, "outside repository"),
            SkipReason::Duplicate => write!(f, "duplicate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPath {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Outcome of a successful create.
#[derive(Debug, Clone)]
pub struct CreateReport {
    pub record: ShareRecord,
    pub skipped: Vec<SkippedPath>,
    /// Size of the recorded diff; zero when git produced nothing.
    pub diff_len: usize,
    /// An existing share with the same id was replaced.
    pub replaced: bool,
}

/// A row of [`ShareStore::list`].
#[derive(Debug, Clone)]
pub enum ListedShare {
    Valid(ShareRecord),
    Broken { id: String, reason: String },
}

impl ListedShare {
    pub fn id(&self) -> &str {
        match self {
            ListedShare::Valid(record) => &record.id,
            ListedShare::Broken { id, .. } => id,
        }
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, ListedShare::Broken { .. })
    }
}

/// Generate an id from the local wall clock (`YYYYMMDD_HHMMSS`).
pub fn generate_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn fallback_creator() -> String {
    ["USERNAME", "USER"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_default()
}

/// File accepted into a share.
struct Accepted {
    source: PathBuf,
    rel: String,
}

/// Store of share records over a [`ShareBackend`].
#[derive(Debug, Clone)]
pub struct ShareStore<B> {
    backend: B,
}

impl<B: ShareBackend> ShareStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Snapshot `request.paths` into a new share.
    ///
    /// Paths that are missing, not regular files or outside the repository
    /// are skipped with a warning. Fails with `EmptyShare`, persisting
    /// nothing, when no path survives.
    pub fn create(
        &self,
        vcs: &dyn VersionControl,
        cwd: &Path,
        request: CreateRequest,
    ) -> Result<CreateReport> {
        let ttl = parse_ttl(request.ttl.as_deref())?;
        let root = canonical_dir(&vcs.repo_root()?);
        let id = request.id.unwrap_or_else(generate_id);
        validate_share_id(&id)?;

        let (accepted, skipped) = accept_paths(&root, cwd, &request.paths)?;
        if accepted.is_empty() {
            return Err(ShareError::EmptyShare);
        }

        let base_revision = vcs.current_revision();
        if base_revision.is_none() {
            debug!("No base revision available; diff will be taken against HEAD if possible");
        }
        let creator = vcs.user_name().unwrap_or_else(fallback_creator);
        let mut record = ShareRecord::new(id.clone(), Utc::now().trunc_subsecs(0), ttl)?
            .with_creator(creator)
            .with_note(request.note.unwrap_or_default())
            .with_base_revision(base_revision);

        let replaced = self.backend.contains(&id)?;
        if replaced {
            warn!(share_id = %id, "Share already exists; overwriting");
            self.backend.remove(&id)?;
        }

        let diff_len = match self.write_record(vcs, &mut record, &accepted) {
            Ok(len) => len,
            Err(e) => {
                if let Err(cleanup) = self.backend.remove(&id) {
                    warn!(share_id = %id, error = %cleanup, "Failed to clean up partial share");
                }
                return Err(e);
            }
        };

        info!(share_id = %id, files = record.files.len(), "Share created");
        Ok(CreateReport {
            record,
            skipped,
            diff_len,
            replaced,
        })
    }

    fn write_record(
        &self,
        vcs: &dyn VersionControl,
        record: &mut ShareRecord,
        accepted: &[Accepted],
    ) -> Result<usize> {
        for file in accepted {
            let mut source = HashingReader::new(fs::File::open(&file.source)?);
            self.backend
                .write(&record.id, &format!("{FILES_DIR}/{}", file.rel), &mut source)?;
            record.files.push(FileEntry {
                path: file.rel.clone(),
                sha256: source.finish(),
            });
        }

        let rels: Vec<String> = accepted.iter().map(|f| f.rel.clone()).collect();
        let diff = match vcs.diff(&rels, record.base_revision.as_deref()) {
            Ok(diff) => diff,
            Err(e) => {
                warn!(share_id = %record.id, error = %e, "Diff unavailable; recording empty patch");
                Vec::new()
            }
        };
        self.backend.write(&record.id, PATCH_FILE, &mut &diff[..])?;

        let manifest = record.to_manifest()?;
        self.backend.write(&record.id, MANIFEST_FILE, &mut &manifest[..])?;
        Ok(diff.len())
    }

    /// Load the record for `id`.
    pub fn get(&self, id: &str) -> Result<ShareRecord> {
        validate_share_id(id)?;
        let bytes = self
            .backend
            .read(id, MANIFEST_FILE)?
            .ok_or_else(|| ShareError::NotFound(id.to_string()))?;
        ShareRecord::from_manifest(&bytes).map_err(|e| ShareError::CorruptMetadata {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Raw manifest bytes as stored.
    pub fn manifest_bytes(&self, id: &str) -> Result<Vec<u8>> {
        validate_share_id(id)?;
        self.backend
            .read(id, MANIFEST_FILE)?
            .ok_or_else(|| ShareError::NotFound(id.to_string()))
    }

    /// Every share area, ordered by id. Unreadable manifests are reported as
    /// broken rows instead of failing the listing.
    pub fn list(&self) -> Result<Vec<ListedShare>> {
        let mut ids = self.backend.share_ids()?;
        ids.sort();

        Ok(ids
            .into_iter()
            .map(|id| match self.get(&id) {
                Ok(record) => ListedShare::Valid(record),
                Err(e) => {
                    debug!(share_id = %id, error = %e, "Broken share");
                    ListedShare::Broken {
                        id,
                        reason: e.to_string(),
                    }
                }
            })
            .collect())
    }

    /// Delete a share's entire storage area.
    pub fn remove(&self, id: &str) -> Result<()> {
        validate_share_id(id)?;
        if !self.backend.remove(id)? {
            return Err(ShareError::NotFound(id.to_string()));
        }
        info!(share_id = %id, "Share removed");
        Ok(())
    }

    /// The stored diff; empty when none was recorded.
    pub fn patch(&self, id: &str) -> Result<Vec<u8>> {
        validate_share_id(id)?;
        Ok(self.backend.read(id, PATCH_FILE)?.unwrap_or_default())
    }

    /// Relative paths present in the share's file area.
    pub fn file_names(&self, id: &str) -> Result<Vec<String>> {
        validate_share_id(id)?;
        self.backend.list(id, FILES_DIR)
    }

    /// Open one snapshotted file.
    pub fn open_file(&self, id: &str, rel: &str) -> Result<Box<dyn Read + '_>> {
        validate_share_id(id)?;
        self.backend
            .open(id, &format!("{FILES_DIR}/{rel}"))?
            .ok_or_else(|| ShareError::NotFound(format!("{id}/{FILES_DIR}/{rel}")))
    }

    /// On-disk location of a share, when the backend has one.
    pub fn location(&self, id: &str) -> Option<PathBuf> {
        self.backend.location(id)
    }
}

/// Split inputs into accepted files and skipped paths.
fn accept_paths(
    root: &Path,
    cwd: &Path,
    inputs: &[PathBuf],
) -> Result<(Vec<Accepted>, Vec<SkippedPath>)> {
    let mut accepted: Vec<Accepted> = Vec::new();
    let mut skipped = Vec::new();

    for input in inputs {
        let skip = |reason: SkipReason| {
            debug!(path = %input.display(), %reason, "Skipping path");
            SkippedPath {
                path: input.clone(),
                reason,
            }
        };

        let abs = absolutize(cwd, input)?;
        if !abs.is_file() {
            skipped.push(skip(SkipReason::NotAFile));
            continue;
        }

        // Resolve directory symlinks for naming, and the file itself to catch
        // links that point out of the tree.
        let named = match (abs.parent(), abs.file_name()) {
            (Some(parent), Some(name)) => canonical_dir(parent).join(name),
            _ => abs.clone(),
        };
        let target = dunce::canonicalize(&abs)?;
        let rel = match (
            relative_to_root(root, &named),
            relative_to_root(root, &target),
        ) {
            (Ok(rel), Ok(_)) => rel,
            _ => {
                skipped.push(skip(SkipReason::PathEscape));
                continue;
            }
        };

        if accepted.iter().any(|a| a.rel == rel) {
            skipped.push(skip(SkipReason::Duplicate));
            continue;
        }
        accepted.push(Accepted { source: abs, rel });
    }

    Ok((accepted, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FsBackend, MemoryBackend};
    use crate::vcs::fake::FakeVcs;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn repo() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = canonical_dir(dir.path());
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub fn a() {}\n").unwrap();
        fs::write(root.join("README.md"), "# readme\n").unwrap();
        (dir, root)
    }

    fn request(id: &str, paths: &[&str]) -> CreateRequest {
        CreateRequest {
            ttl: Some("2h".into()),
            id: Some(id.into()),
            note: Some("wip".into()),
            paths: paths.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn test_create_records_files_diff_and_metadata() {
        let (_dir, root) = repo();
        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(MemoryBackend::new());

        let report = store
            .create(&vcs, &root, request("s1", &["src/lib.rs", "README.md"]))
            .unwrap();

        let record = &report.record;
        assert_eq!(record.id, "s1");
        assert_eq!(record.creator, "tester");
        assert_eq!(record.note, "wip");
        assert_eq!(record.base_revision.as_deref(), Some("0123abcd"));
        assert_eq!(
            record.expires_at.unwrap() - record.created_at,
            chrono::Duration::hours(2)
        );
        let paths: Vec<_> = record.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/lib.rs", "README.md"]);
        assert_eq!(
            record.files[1].sha256,
            crate::fingerprint(&b"# readme\n"[..]).unwrap()
        );

        assert_eq!(store.get("s1").unwrap(), report.record);
        assert_eq!(store.patch("s1").unwrap(), b"diff --git a/x b/x\n".to_vec());
        assert_eq!(
            store.file_names("s1").unwrap(),
            vec!["README.md".to_string(), "src/lib.rs".to_string()]
        );
        assert_eq!(
            vcs.diffed.borrow()[0],
            vec!["src/lib.rs".to_string(), "README.md".to_string()]
        );
    }

    #[test]
    fn test_recorded_digest_describes_stored_blob() {
        let (_dir, root) = repo();
        let big = vec![b'x'; (1 << 20) + 5];
        fs::write(root.join("big.bin"), &big).unwrap();
        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(MemoryBackend::new());

        let report = store
            .create(&vcs, &root, request("s1", &["big.bin", "README.md"]))
            .unwrap();
        for entry in &report.record.files {
            let blob = store
                .backend()
                .read("s1", &format!("{FILES_DIR}/{}", entry.path))
                .unwrap()
                .unwrap();
            assert_eq!(entry.sha256, crate::fingerprint(&blob[..]).unwrap());
        }
        assert_eq!(
            report.record.files[0].sha256,
            crate::fingerprint(&big[..]).unwrap()
        );
    }

    #[test]
    fn test_create_with_no_existing_files_persists_nothing() {
        let (_dir, root) = repo();
        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(FsBackend::new(root.join(".git/dv-share")));

        let err = store
            .create(&vcs, &root, request("empty", &["missing.txt", "src"]))
            .unwrap_err();
        assert!(matches!(err, ShareError::EmptyShare));
        assert!(!root.join(".git/dv-share/empty").exists());
    }

    #[test]
    fn test_create_skips_escaping_path_but_keeps_others() {
        let (_dir, root) = repo();
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.txt");
        fs::write(&secret, "nope").unwrap();

        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(MemoryBackend::new());
        let mut req = request("s1", &["lib.rs", "../README.md", "../../escape.txt"]);
        req.paths.push(secret.clone());

        let report = store.create(&vcs, &root.join("src"), req).unwrap();
        let paths: Vec<_> = report.record.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/lib.rs", "README.md"]);
        assert!(
            report
                .skipped
                .iter()
                .any(|s| s.path == secret && s.reason == SkipReason::PathEscape)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_tree_is_escape() {
        let (_dir, root) = repo();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), root.join("link")).unwrap();

        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(MemoryBackend::new());
        let err = store
            .create(&vcs, &root, request("s1", &["link"]))
            .unwrap_err();
        assert!(matches!(err, ShareError::EmptyShare));
    }

    #[test]
    fn test_duplicates_are_skipped() {
        let (_dir, root) = repo();
        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(MemoryBackend::new());
        let report = store
            .create(&vcs, &root, request("s1", &["README.md", "./README.md"]))
            .unwrap();
        assert_eq!(report.record.files.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::Duplicate);
    }

    #[test]
    fn test_diff_failure_is_recorded_as_empty() {
        let (_dir, root) = repo();
        let mut vcs = FakeVcs::new(&root);
        vcs.diff = Err(ShareError::Git("no HEAD".into()));
        vcs.revision = None;
        let store = ShareStore::new(MemoryBackend::new());

        let report = store
            .create(&vcs, &root, request("s1", &["README.md"]))
            .unwrap();
        assert_eq!(report.diff_len, 0);
        assert_eq!(report.record.base_revision, None);
        assert!(store.patch("s1").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_ttl_and_id() {
        let (_dir, root) = repo();
        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(MemoryBackend::new());

        let mut req = request("s1", &["README.md"]);
        req.ttl = Some("0s".into());
        assert!(matches!(
            store.create(&vcs, &root, req),
            Err(ShareError::InvalidDuration(_))
        ));

        let req = request("../evil", &["README.md"]);
        assert!(matches!(
            store.create(&vcs, &root, req),
            Err(ShareError::InvalidId(_))
        ));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_collision_replaces_previous_share() {
        let (_dir, root) = repo();
        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(MemoryBackend::new());

        store
            .create(&vcs, &root, request("same", &["src/lib.rs"]))
            .unwrap();
        let report = store
            .create(&vcs, &root, request("same", &["README.md"]))
            .unwrap();

        assert!(report.replaced);
        assert_eq!(store.file_names("same").unwrap(), vec!["README.md".to_string()]);
    }

    #[test]
    fn test_get_and_remove_unknown() {
        let store = ShareStore::new(MemoryBackend::new());
        assert!(matches!(store.get("nope"), Err(ShareError::NotFound(_))));
        assert!(matches!(store.remove("nope"), Err(ShareError::NotFound(_))));
    }

    #[test]
    fn test_list_sorted_and_flags_broken() {
        let (_dir, root) = repo();
        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(MemoryBackend::new());
        assert!(store.list().unwrap().is_empty());

        store
            .create(&vcs, &root, request("b", &["README.md"]))
            .unwrap();
        store.backend().put("a", MANIFEST_FILE, "{ broken");
        store.backend().put("c", "files/x", "orphan");

        let listed = store.list().unwrap();
        let ids: Vec<_> = listed.iter().map(ListedShare::id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(listed[0].is_broken());
        assert!(!listed[1].is_broken());
        assert!(listed[2].is_broken());
        assert!(matches!(
            store.get("a"),
            Err(ShareError::CorruptMetadata { .. })
        ));
    }

    #[test]
    fn test_remove_deletes_whole_area() {
        let (_dir, root) = repo();
        let vcs = FakeVcs::new(&root);
        let store = ShareStore::new(FsBackend::new(root.join(".git/dv-share")));
        store
            .create(&vcs, &root, request("s1", &["src/lib.rs"]))
            .unwrap();
        assert!(root.join(".git/dv-share/s1/files/src/lib.rs").is_file());
        assert!(root.join(".git/dv-share/s1/manifest.json").is_file());
        assert!(root.join(".git/dv-share/s1/share.patch").is_file());

        store.remove("s1").unwrap();
        assert!(!root.join(".git/dv-share/s1").exists());
    }

    #[test]
    fn test_generated_id_shape() {
        let id = generate_id();
        assert_eq!(id.len(), 15);
        assert_eq!(&id[8..9], "_");
        assert!(validate_share_id(&id).is_ok());
    }
}
