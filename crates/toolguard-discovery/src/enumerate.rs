//! # Executable Enumerator
//!
//! Lists candidate executables under a set of root directories, in the order
//! a shell would resolve them.
//!
//! - Roots are visited in caller order; within a root, entries are sorted by
//!   file name so enumeration is deterministic.
//! - Dotfiles, directories and non-executable files are ignored.
//! - A name found under an earlier root shadows the same name under later
//!   roots, exactly like `PATH` lookup.
//! - Two entries that canonicalize to the same file are one candidate.
//! - A symlink whose target lives in an unsafe directory is never a candidate,
//!   even when the root holding the link is safe.
//!
//! Root safety is checked by the scanner before enumeration; the directory of
//! every resolved target is checked here.

use crate::safety::check_path;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use toolguard_registry::SourceKind;
use tracing::debug;

/// One executable that may be probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// File name, used for skip-list matching.
    pub name: String,
    /// Absolute path as found under its root (not canonicalized).
    pub path: PathBuf,
    pub source: SourceKind,
    pub mtime: DateTime<Utc>,
}

/// Output of [`enumerate`].
#[derive(Debug, Default)]
pub struct Enumeration {
    pub candidates: Vec<Candidate>,
    /// Paths hidden by an earlier root's file of the same name, or aliases of
    /// an already listed file.
    pub shadowed: Vec<PathBuf>,
    /// Roots or entries that could not be read.
    pub errors: Vec<(PathBuf, String)>,
    /// Entries that resolve into an unsafe directory, with the reason.
    pub unsafe_targets: Vec<(PathBuf, String)>,
}

/// Enumerates executables under `roots`.
pub fn enumerate(roots: &[PathBuf]) -> Enumeration {
    let mut out = Enumeration::default();
    let mut names = HashSet::new();
    let mut canonical = HashSet::new();
    let mut dir_verdicts: HashMap<PathBuf, Option<String>> = HashMap::new();

    for root in roots {
        let mut entries: Vec<PathBuf> = match fs::read_dir(root) {
            Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(e) => {
                out.errors.push((root.clone(), e.to_string()));
                continue;
            }
        };
        entries.sort();

        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            // Follows symlinks: a link to an executable is an executable.
            let meta = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    out.errors.push((path, e.to_string()));
                    continue;
                }
            };
            if !meta.is_file() || !is_executable(&meta) {
                continue;
            }

            let real = match fs::canonicalize(&path) {
                Ok(real) => real,
                Err(e) => {
                    out.errors.push((path, e.to_string()));
                    continue;
                }
            };
            let dir = real.parent().map(Path::to_path_buf).unwrap_or_default();
            let verdict = dir_verdicts
                .entry(dir.clone())
                .or_insert_with(|| unsafe_reason(&dir));
            if let Some(reason) = verdict {
                debug!(path = %path.display(), target = %real.display(), "target in unsafe directory");
                out.unsafe_targets.push((path, reason.clone()));
                continue;
            }

            if names.contains(&name) || !canonical.insert(real) {
                debug!(path = %path.display(), "shadowed executable");
                out.shadowed.push(path);
                continue;
            }
            names.insert(name.clone());

            let mtime = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

            out.candidates.push(Candidate {
                source: classify(&path),
                name,
                path: absolutize(&path),
                mtime,
            });
        }
    }

    out
}

/// Classifies an executable by its first bytes.
///
/// Scripts are shims; the interpreter named on the shebang line picks the
/// family. Anything else, including files whose header cannot be read, is
/// treated as native.
pub fn classify(path: &Path) -> SourceKind {
    let mut head = [0u8; 256];
    let n = match fs::File::open(path).and_then(|mut f| f.read(&mut head)) {
        Ok(n) => n,
        Err(_) => return SourceKind::Native,
    };
    let head = &head[..n];

    if !head.starts_with(b"#!") {
        return SourceKind::Native;
    }
    let line_end = head.iter().position(|&b| b == b'\n').unwrap_or(head.len());
    let line = String::from_utf8_lossy(&head[2..line_end]);

    // `#!/usr/bin/env node` names the interpreter in the second word.
    let mut words = line.split_whitespace();
    let first = words.next().unwrap_or_default();
    let interp = if first.ends_with("/env") {
        words.find(|w| !w.starts_with('-')).unwrap_or_default()
    } else {
        first
    };
    let interp = interp.rsplit('/').next().unwrap_or(interp);

    if interp.starts_with("node") || interp == "bun" || interp == "deno" {
        SourceKind::NodeShim
    } else if interp.starts_with("python") {
        SourceKind::PythonShim
    } else {
        SourceKind::Shim
    }
}

/// `None` if `dir` passes the path safety check.
pub(crate) fn unsafe_reason(dir: &Path) -> Option<String> {
    let safety = check_path(dir);
    (!safety.safe).then(|| {
        let reason = safety.reason.unwrap_or_default();
        format!("unsafe directory {}: {reason}", dir.display())
    })
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}
