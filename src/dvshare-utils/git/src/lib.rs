//! Git utilities for dvshare.
//!
//! Every call shells out to the `git` binary found on `PATH` and is bounded by
//! a timeout (`DVSHARE_GIT_TIMEOUT_SECS`, default 30s, `0` disables it).

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Default timeout for git operations in seconds
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the git timeout.
pub const GIT_TIMEOUT_ENV: &str = "DVSHARE_GIT_TIMEOUT_SECS";

/// Captured result of a finished git process.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, if the process was not killed by a signal.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Get the configured git timeout duration. `None` means wait forever.
pub fn git_timeout() -> Option<Duration> {
    parse_git_timeout(std::env::var(GIT_TIMEOUT_ENV).ok().as_deref())
}

/// Timeout for a raw `DVSHARE_GIT_TIMEOUT_SECS` value. Unset or unparsable
/// values use the default; `0` disables the timeout.
pub fn parse_git_timeout(raw: Option<&str>) -> Option<Duration> {
    let secs = raw
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_GIT_TIMEOUT_SECS);
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> io::Result<ExitStatus> {
    let Some(timeout) = timeout else {
        return child.wait();
    };
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("git timed out after {}s", timeout.as_secs()),
            ));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Execute a git command with the configured timeout.
///
/// Output pipes are drained on helper threads so a large diff cannot stall the
/// child while we poll for its exit.
pub fn run_git(args: &[&str], cwd: &Path) -> io::Result<GitOutput> {
    run_git_with_timeout(args, cwd, git_timeout())
}

/// Execute a git command with an explicit timeout.
pub fn run_git_with_timeout(
    args: &[&str],
    cwd: &Path,
    timeout: Option<Duration>,
) -> io::Result<GitOutput> {
    debug!(cwd = %cwd.display(), "git {}", args.join(" "));
    let mut child = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_timeout(&mut child, timeout) {
        Ok(status) => status,
        Err(e) => {
            warn!("git {} failed: {}", args.join(" "), e);
            return Err(e);
        }
    };

    Ok(GitOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn trimmed_stdout(args: &[&str], cwd: &Path) -> Option<String> {
    let output = run_git(args, cwd).ok()?;
    if !output.success() {
        return None;
    }
    let value = output.stdout_lossy().trim().to_string();
    (!value.is_empty()).then_some(value)
}

/// Get the git repository root.
pub fn get_repo_root(cwd: &Path) -> Option<PathBuf> {
    trimmed_stdout(&["rev-parse", "--show-toplevel"], cwd).map(PathBuf::from)
}

/// Get the current commit hash.
pub fn get_commit_hash(cwd: &Path) -> Option<String> {
    trimmed_stdout(&["rev-parse", "HEAD"], cwd)
}

/// Get the configured `user.name`.
pub fn get_user_name(cwd: &Path) -> Option<String> {
    trimmed_stdout(&["config", "user.name"], cwd)
}

/// Binary-safe diff of `paths` (relative to `cwd`) against `base`, or `HEAD`
/// when no base is known.
pub fn diff_binary(cwd: &Path, base: Option<&str>, paths: &[String]) -> io::Result<GitOutput> {
    let mut args = vec!["diff", "--binary", base.unwrap_or("HEAD"), "--"];
    args.extend(paths.iter().map(String::as_str));
    run_git(&args, cwd)
}

/// Apply a patch with `git apply --3way --reject`.
///
/// Hunks that cannot be merged are left as `.rej` files next to their targets.
/// Git releases that refuse to combine the two flags are retried with
/// `--3way` alone, which leaves conflict markers in the files instead.
pub fn apply_three_way(cwd: &Path, patch: &[u8]) -> io::Result<GitOutput> {
    let mut file = tempfile::Builder::new()
        .prefix("dvshare_")
        .suffix(".patch")
        .tempfile()?;
    file.write_all(patch)?;
    file.flush()?;

    let patch_path = file.path().to_string_lossy().into_owned();
    let output = run_git(&["apply", "--3way", "--reject", &patch_path], cwd)?;
    if refuses_reject_with_three_way(output.code(), &output.stderr_lossy()) {
        debug!("git does not combine --3way with --reject; retrying with --3way");
        return run_git(&["apply", "--3way", &patch_path], cwd);
    }
    Ok(output)
}

/// Usage error from git releases that predate `--3way --reject`.
fn refuses_reject_with_three_way(code: Option<i32>, stderr: &str) -> bool {
    code == Some(128) && stderr.contains("cannot be used together")
}
