//! End-to-end share lifecycle over the filesystem backend.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use dvshare_share::{
    ApplyMode, ApplyReport, CreateRequest, FsBackend, ImportedShare, ListedShare, MergeOutcome,
    Packager, Reconciler, Result, ShareConfig, ShareError, ShareSource, ShareStore,
    VersionControl, sweep,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Repository stand-in: fixed root, canned diff, records merges.
struct StubRepo {
    root: PathBuf,
    diff: Vec<u8>,
    merge_ok: bool,
    merged: RefCell<usize>,
}

impl StubRepo {
    fn new(root: &Path) -> Self {
        Self {
            root: dunce::canonicalize(root).unwrap(),
            diff: b"diff --git a/src/main.rs b/src/main.rs\n".to_vec(),
            merge_ok: true,
            merged: RefCell::new(0),
        }
    }
}

impl VersionControl for StubRepo {
    fn repo_root(&self) -> Result<PathBuf> {
        Ok(self.root.clone())
    }

    fn current_revision(&self) -> Option<String> {
        Some("feedface".into())
    }

    fn user_name(&self) -> Option<String> {
        Some("alice".into())
    }

    fn diff(&self, _paths: &[String], _base: Option<&str>) -> Result<Vec<u8>> {
        Ok(self.diff.clone())
    }

    fn apply_three_way(&self, _patch: &[u8]) -> Result<MergeOutcome> {
        *self.merged.borrow_mut() += 1;
        Ok(MergeOutcome {
            success: self.merge_ok,
            code: Some(if self.merge_ok { 0 } else { 1 }),
            stdout: String::new(),
            stderr: if self.merge_ok {
                String::new()
            } else {
                "error: patch failed".into()
            },
        })
    }
}

fn working_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "remember\n").unwrap();
    dir
}

fn store_for(repo: &Path) -> ShareStore<FsBackend> {
    let config = ShareConfig::default();
    ShareStore::new(FsBackend::new(config.store_root(repo)))
}

fn create(store: &ShareStore<FsBackend>, vcs: &StubRepo, cwd: &Path, id: &str, ttl: &str) {
    store
        .create(
            vcs,
            cwd,
            CreateRequest {
                ttl: Some(ttl.into()),
                id: Some(id.into()),
                note: Some("wip".into()),
                paths: vec!["src/main.rs".into(), "notes.txt".into()],
            },
        )
        .unwrap();
}

#[test]
fn share_travels_from_sender_to_receiver() {
    let sender = working_tree();
    let vcs = StubRepo::new(sender.path());
    let store = store_for(sender.path());
    create(&store, &vcs, sender.path(), "handoff", "2h");

    let share_dir = sender.path().join(".git/dv-share/handoff");
    assert!(share_dir.join("manifest.json").is_file());
    assert!(share_dir.join("share.patch").is_file());
    assert!(share_dir.join("files/src/main.rs").is_file());

    let archive = Packager::export_to_dir(&store, "handoff", &sender.path().join("simlog")).unwrap();
    assert_eq!(archive, sender.path().join("simlog/dvshare_handoff.zip"));

    // Receiver has an older copy of one of the files.
    let receiver = working_tree();
    fs::write(receiver.path().join("notes.txt"), "stale\n").unwrap();
    let receiver_vcs = StubRepo::new(receiver.path());

    let imported = ImportedShare::open(&archive).unwrap();
    let record = imported.record().unwrap().unwrap();
    assert_eq!(record.id, "handoff");
    assert_eq!(record.creator, "alice");
    assert_eq!(record.base_revision.as_deref(), Some("feedface"));
    assert_eq!(record.files.len(), 2);

    let report = Reconciler::new(&receiver_vcs, receiver.path())
        .with_verification(true)
        .apply(&imported, ApplyMode::Copy)
        .unwrap();
    match report {
        ApplyReport::Copied { written, backups, .. } => {
            assert_eq!(written, 2);
            // src/main.rs is already identical on the receiving side.
            assert_eq!(backups, vec![receiver.path().join("notes.txt.bak")]);
        }
        other => panic!("unexpected report: {other:?}"),
    }
    assert_eq!(
        fs::read_to_string(receiver.path().join("notes.txt.bak")).unwrap(),
        "stale\n"
    );
    assert_eq!(
        fs::read_to_string(receiver.path().join("notes.txt")).unwrap(),
        "remember\n"
    );
    assert_eq!(*receiver_vcs.merged.borrow(), 0);

    let extracted = imported.root().to_path_buf();
    drop(imported);
    assert!(!extracted.exists());
}

#[test]
fn patch_mode_merges_and_reports_failure() {
    let sender = working_tree();
    let vcs = StubRepo::new(sender.path());
    let store = store_for(sender.path());
    create(&store, &vcs, sender.path(), "p", "1h");
    let bytes = Packager::export(&dvshare_share::StoredShare::new(&store, "p").unwrap()).unwrap();

    let receiver = working_tree();
    let ok_vcs = StubRepo::new(receiver.path());
    let imported = ImportedShare::from_archive_bytes(&bytes).unwrap();
    let report = Reconciler::new(&ok_vcs, receiver.path())
        .apply(&imported, ApplyMode::Patch)
        .unwrap();
    assert!(matches!(report, ApplyReport::Patched { .. }));
    assert_eq!(*ok_vcs.merged.borrow(), 1);

    let mut failing = StubRepo::new(receiver.path());
    failing.merge_ok = false;
    let err = Reconciler::new(&failing, receiver.path())
        .apply(&imported, ApplyMode::Patch)
        .unwrap_err();
    assert!(matches!(err, ShareError::PatchFailed { .. }));
    assert!(!receiver.path().join("notes.txt.bak").exists());
}

#[test]
fn list_remove_and_prune() {
    let repo = working_tree();
    let vcs = StubRepo::new(repo.path());
    let store = store_for(repo.path());
    create(&store, &vcs, repo.path(), "a", "1s");
    create(&store, &vcs, repo.path(), "b", "1d");
    create(&store, &vcs, repo.path(), "c", "1d");

    // A hand-damaged share shows up as broken and is pruned.
    fs::write(repo.path().join(".git/dv-share/c/manifest.json"), "{").unwrap();

    let rows = store.list().unwrap();
    let ids: Vec<&str> = rows.iter().map(ListedShare::id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(rows[2].is_broken());

    let report = sweep(&store, Utc::now() + Duration::minutes(1)).unwrap();
    assert_eq!(report.expired, vec!["a".to_string()]);
    assert_eq!(report.corrupt, vec!["c".to_string()]);
    assert!(!repo.path().join(".git/dv-share/a").exists());

    store.remove("b").unwrap();
    assert!(store.list().unwrap().is_empty());
    assert!(matches!(store.remove("b"), Err(ShareError::NotFound(_))));
}

#[test]
fn empty_create_leaves_no_trace() {
    let repo = working_tree();
    let vcs = StubRepo::new(repo.path());
    let store = store_for(repo.path());

    let err = store
        .create(
            &vcs,
            repo.path(),
            CreateRequest {
                id: Some("nothing".into()),
                paths: vec!["missing.txt".into(), "src".into()],
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ShareError::EmptyShare));
    assert_eq!(err.exit_code(), 1);
    assert!(!repo.path().join(".git/dv-share/nothing").exists());
}
