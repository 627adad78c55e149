//! # Path Safety Checker
//!
//! Decides whether a directory may be enumerated and whether the files in it
//! may be executed. A directory another user can write to is a place where an
//! attacker can drop a binary named like a tool the agent expects, so such
//! directories are never scanned.
//!
//! ## Threat Model
//!
//! - **Planted Binaries**: group- or world-writable directories are rejected.
//! - **Foreign Ownership**: directories owned by anyone but the current user or
//!   root are rejected.
//! - **CWD Injection**: the working directory (and `""` / `.` PATH entries that
//!   alias it) is rejected outright.
//! - **Symlink Redirects**: links are resolved and the target is checked.
//!
//! The check is a pure predicate with no side effects.

use serde::Serialize;
use std::path::Path;

/// Result of [`check_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSafety {
    pub safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PathSafety {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

/// Checks whether `path` is a directory that is safe to enumerate.
///
/// # Example
///
/// ```rust
/// use toolguard_discovery::check_path;
///
/// assert!(!check_path(".".as_ref()).safe);
/// assert!(!check_path("".as_ref()).safe);
/// ```
pub fn check_path(path: &Path) -> PathSafety {
    let raw = path.as_os_str();
    if raw.is_empty() || raw == "." {
        return PathSafety::unsafe_because("current directory is never scanned");
    }

    let resolved = match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) => {
            return PathSafety::unsafe_because(format!("cannot resolve {}: {e}", path.display()))
        }
    };

    if let Ok(cwd) = std::env::current_dir().and_then(std::fs::canonicalize) {
        if cwd == resolved {
            return PathSafety::unsafe_because("path resolves to the current directory");
        }
    }

    let meta = match std::fs::metadata(&resolved) {
        Ok(m) => m,
        Err(e) => {
            return PathSafety::unsafe_because(format!("cannot stat {}: {e}", resolved.display()))
        }
    };
    if !meta.is_dir() {
        return PathSafety::unsafe_because(format!("{} is not a directory", resolved.display()));
    }

    check_ownership(&resolved, &meta)
}

#[cfg(unix)]
fn check_ownership(resolved: &Path, meta: &std::fs::Metadata) -> PathSafety {
    use std::os::unix::fs::MetadataExt;

    let mode = meta.mode();
    if mode & 0o022 != 0 {
        return PathSafety::unsafe_because(format!(
            "{} is writable by group or others (mode {:o})",
            resolved.display(),
            mode & 0o7777
        ));
    }

    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    let owner = meta.uid();
    if owner != euid && owner != 0 {
        return PathSafety::unsafe_because(format!(
            "{} is owned by uid {owner}, not the current user or root",
            resolved.display()
        ));
    }

    PathSafety::safe()
}

#[cfg(not(unix))]
fn check_ownership(_resolved: &Path, _meta: &std::fs::Metadata) -> PathSafety {
    // No POSIX mode bits or owner uid to inspect.
    PathSafety::safe()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn private_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();
        dir
    }

    #[test]
    fn test_rejects_cwd_sentinels() {
        assert!(!check_path(Path::new("")).safe);
        let dot = check_path(Path::new("."));
        assert!(!dot.safe);
        assert!(dot.reason.unwrap().contains("current directory"));
    }

    #[test]
    fn test_private_dir_is_safe() {
        let dir = private_dir();
        let result = check_path(dir.path());
        assert!(result.safe, "{:?}", result.reason);
    }

    #[test]
    fn test_rejects_world_writable() {
        let dir = private_dir();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o777)).unwrap();
        let result = check_path(dir.path());
        assert!(!result.safe);
        assert!(result.reason.unwrap().contains("writable"));
    }

    #[test]
    fn test_rejects_group_writable() {
        let dir = private_dir();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o770)).unwrap();
        assert!(!check_path(dir.path()).safe);
    }

    #[test]
    fn test_rejects_missing_and_non_directory() {
        let dir = private_dir();
        assert!(!check_path(&dir.path().join("absent")).safe);

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(!check_path(&file).safe);
    }

    #[test]
    fn test_symlink_checks_target() {
        let dir = private_dir();
        let target = dir.path().join("open");
        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o777)).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(!check_path(&link).safe);
    }
}
