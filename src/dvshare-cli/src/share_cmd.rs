//! The share commands: create, pack, list, info, remove, prune and apply.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use dvshare_share::record::timestamp;
use dvshare_share::{
    ApplyMode, ApplyReport, CreateRequest, FsBackend, GitVcs, ImportedShare, ListedShare,
    Packager, Reconciler, ShareConfig, ShareError, ShareStore, VersionControl, format_ttl, sweep,
};

use crate::cli::args::{ApplyArgs, CreateArgs, PackArgs, ShareIdArgs};
use crate::styled_output::{print_warning, println_dim, println_success};

/// Everything a command needs: the repository, its configuration and its store.
pub struct ShareContext {
    cwd: PathBuf,
    root: PathBuf,
    vcs: GitVcs,
    config: ShareConfig,
    store: ShareStore<FsBackend>,
}

impl ShareContext {
    /// Discover the repository containing `cwd` and load its configuration.
    pub fn open(cwd: &Path) -> Result<Self> {
        let vcs = GitVcs::discover(cwd)?;
        let root = vcs.repo_root()?;
        let config = ShareConfig::load(&root)?;
        apply_git_timeout(&config);
        Ok(Self::new(cwd, vcs, config)?)
    }

    /// Build a context around an already located repository.
    pub fn new(cwd: &Path, vcs: GitVcs, config: ShareConfig) -> dvshare_share::Result<Self> {
        let root = vcs.repo_root()?;
        let store = ShareStore::new(FsBackend::new(config.store_root(&root)));
        Ok(Self {
            cwd: cwd.to_path_buf(),
            root,
            vcs,
            config,
            store,
        })
    }

    pub fn store(&self) -> &ShareStore<FsBackend> {
        &self.store
    }
}

/// Export the configured git timeout unless the environment already sets one.
fn apply_git_timeout(config: &ShareConfig) {
    if std::env::var_os(dvshare_share::vcs::GIT_TIMEOUT_ENV).is_some() {
        return;
    }
    // SAFETY: the CLI is single-threaded here and no git call is in flight.
    unsafe {
        std::env::set_var(
            dvshare_share::vcs::GIT_TIMEOUT_ENV,
            config.git_timeout_secs.to_string(),
        )
    };
    debug!(secs = config.git_timeout_secs, "Git timeout configured");
}

pub fn run_create(ctx: &ShareContext, args: CreateArgs) -> Result<()> {
    let ttl = args.ttl.unwrap_or_else(|| ctx.config.default_ttl.clone());
    let report = ctx.store.create(
        &ctx.vcs,
        &ctx.cwd,
        CreateRequest {
            ttl: Some(ttl),
            id: args.id,
            note: args.note,
            paths: args.files,
        },
    )?;

    for skipped in &report.skipped {
        print_warning(&format!("skip ({}): {}", skipped.reason, skipped.path.display()));
    }

    let record = &report.record;
    println_success(&format!("created {}", record.id));
    println!("  files: {}", record.files.len());
    if let Some(path) = ctx.store.location(&record.id) {
        println!("  path : {}", path.display());
    }
    if let Some(expires_at) = record.expires_at {
        println!(
            "  ttl  : {} (expires {})",
            format_ttl(expires_at - record.created_at),
            timestamp::format(&expires_at)
        );
    }
    if report.diff_len == 0 {
        println_dim("no diff recorded; apply will copy files");
    }
    println!("  next : dvshare pack {}", record.id);
    Ok(())
}

pub fn run_pack(ctx: &ShareContext, args: PackArgs) -> Result<()> {
    let out_dir = match args.out {
        Some(out) => ctx.cwd.join(out),
        None => ctx.config.pack_root(&ctx.root),
    };
    let archive = Packager::export_to_dir(&ctx.store, &args.id, &out_dir)?;
    println_success(&format!("packed -> {}", archive.display()));
    println!("  send this zip to your co-worker");
    Ok(())
}

pub fn run_list(ctx: &ShareContext) -> Result<()> {
    let rows = ctx.store.list()?;
    let mut stdout = std::io::stdout().lock();
    for line in format_list(&rows) {
        writeln!(stdout, "{line}")?;
    }
    Ok(())
}

pub fn run_info(ctx: &ShareContext, args: ShareIdArgs) -> Result<()> {
    // Validates the manifest before showing it verbatim.
    ctx.store.get(&args.id)?;
    let bytes = ctx.store.manifest_bytes(&args.id)?;
    let manifest: serde_json::Value = serde_json::from_slice(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);

    let path = ctx
        .store
        .location(&args.id)
        .unwrap_or_else(|| ctx.config.store_root(&ctx.root).join(&args.id));
    println!("[path] {}", path.display());
    Ok(())
}

pub fn run_remove(ctx: &ShareContext, args: ShareIdArgs) -> Result<()> {
    ctx.store.remove(&args.id)?;
    println_success(&format!("removed {}", args.id));
    Ok(())
}

pub fn run_prune(ctx: &ShareContext) -> Result<()> {
    let report = sweep(&ctx.store, Utc::now())?;
    println_success(&format!("pruned {} expired share(s)", report.count()));
    Ok(())
}

pub fn run_apply(ctx: &ShareContext, args: ApplyArgs) -> Result<()> {
    let source = ctx.cwd.join(&args.source);
    let share = ImportedShare::open(&source)?;
    let reconciler = Reconciler::new(&ctx.vcs, &ctx.root)
        .with_backup_suffix(ctx.config.backup_suffix.clone())
        .with_verification(ctx.config.verify_fingerprints);

    match reconciler.apply(&share, ApplyMode::from(args.mode)) {
        Ok(ApplyReport::Patched { stdout, stderr }) => {
            echo_merge_output(&stdout, &stderr);
            println_success("patch applied");
        }
        Ok(ApplyReport::Copied {
            written, fell_back, ..
        }) => {
            if fell_back {
                println_dim("share has no diff; copying files");
            }
            println_success(&format!(
                "copied {} file(s); backups: *{}",
                written, ctx.config.backup_suffix
            ));
        }
        Err(ShareError::PatchFailed {
            code,
            stdout,
            stderr,
        }) => {
            echo_merge_output(&stdout, &stderr);
            return Err(ShareError::PatchFailed {
                code,
                stdout,
                stderr,
            }
            .into());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn echo_merge_output(stdout: &str, stderr: &str) {
    print!("{stdout}");
    eprint!("{stderr}");
}

fn format_expiry(expires_at: Option<chrono::DateTime<Utc>>) -> String {
    expires_at
        .map(|ts| timestamp::format(&ts))
        .unwrap_or_else(|| "-".to_string())
}

/// Lines of the `list` table, or `no shares` when the store is empty.
pub fn format_list(rows: &[ListedShare]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["no shares".to_string()];
    }

    let mut lines = vec![format!("{:<18} {:<20} {:>3}  NOTE", "ID", "EXPIRES", "N")];
    for row in rows {
        let line = match row {
            ListedShare::Valid(record) => format!(
                "{:<18} {:<20} {:>3}  {}",
                record.id,
                format_expiry(record.expires_at),
                record.files.len(),
                record.note
            ),
            ListedShare::Broken { id, .. } => {
                format!("{:<18} {:<20} {:>3}  (broken manifest)", id, "?", 0)
            }
        };
        lines.push(line);
    }
    lines
}
