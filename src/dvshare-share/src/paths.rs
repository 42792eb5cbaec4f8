//! Path handling shared by create, import and apply.
//!
//! Everything stored in a share is addressed by a repository-relative,
//! forward-slash path that must stay inside its root.

use std::path::{Component, Path, PathBuf};

use path_absolutize::Absolutize;

use crate::{Result, ShareError};

/// Reject ids that cannot safely name a directory in the store.
pub fn validate_share_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0']);
    if bad {
        return Err(ShareError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Join `rel` components with `/` regardless of host separator.
pub fn to_slash(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically absolutize `path` against `cwd`, collapsing `.` and `..`.
pub fn absolutize(cwd: &Path, path: &Path) -> Result<PathBuf> {
    Ok(path.absolutize_from(cwd)?.into_owned())
}

/// Express `path` relative to `root`, failing with `PathEscape` when it is
/// not strictly inside it.
pub fn relative_to_root(root: &Path, path: &Path) -> Result<String> {
    let escape = || ShareError::PathEscape {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };
    let rel = path.strip_prefix(root).map_err(|_| escape())?;
    if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(escape());
    }
    let rel = to_slash(rel);
    if rel.is_empty() {
        return Err(escape());
    }
    Ok(rel)
}

/// Resolve a relative entry name (archive member, stored file) under `dest`.
///
/// Absolute names, parent-directory hops, drive prefixes and NUL bytes are
/// rejected so nothing is ever written outside `dest`.
pub fn safe_join(dest: &Path, name: &str) -> Result<PathBuf> {
    let escape = || ShareError::PathEscape {
        path: PathBuf::from(name),
        root: dest.to_path_buf(),
    };
    if name.is_empty() || name.contains('\0') {
        return Err(escape());
    }

    let mut out = dest.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(escape());
            }
        }
    }
    if depth == 0 {
        return Err(escape());
    }
    Ok(out)
}

/// Canonical form of a directory, falling back to the input when it cannot
/// be resolved.
pub fn canonical_dir(dir: &Path) -> PathBuf {
    dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}
