//! # Persistent Storage Layer
//!
//! Durable state lives in two places on disk:
//!
//! | Location | Content | Written |
//! |----------|---------|---------|
//! | registry file | one JSON [`Registry`] document | whole file, once per batch |
//! | cache directory | `<tool name>.json` per tool, the raw [`CapabilityMetadata`] | per successful probe |
//!
//! Every write goes to a temp file in the destination directory, is synced,
//! then renamed over the target. A crash mid-write leaves the previous file
//! intact. Concurrent writers serialize at the rename: the last one wins and
//! batches are never merged.
//!
//! [`MemoryStore`] implements the same trait without touching disk and is
//! what tests and embedders without a filesystem use.
//!
//! ## Security Notes
//!
//! - Tool names come from untrusted tool output. They are checked with
//!   [`is_valid_tool_name`] before being used as file names.
//! - The registry file holds no secrets, but it steers which binaries an agent
//!   runs; keep its directory owned by the invoking user.

use crate::models::{
    is_valid_tool_name, CapabilityMetadata, Registry, RegistryError, Result,
};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Load/save access to a registry and its metadata cache.
///
/// Implementations must make `save` atomic: a reader sees either the old
/// registry or the new one, never a mix.
pub trait RegistryStore: Send + Sync {
    /// Loads the registry, returning an empty one if none exists yet.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Corrupted`] or [`RegistryError::Invalid`] if the stored
    /// document cannot be trusted; callers must not overwrite it blindly.
    fn load(&self) -> Result<Registry>;

    /// Replaces the stored registry.
    fn save(&self, registry: &Registry) -> Result<()>;

    /// Stores a tool's capability document. Returns where it was written, if
    /// the store has a meaningful location for it.
    fn write_metadata(&self, name: &str, metadata: &CapabilityMetadata) -> Result<Option<PathBuf>>;

    /// Reads a tool's cached capability document.
    fn read_metadata(&self, name: &str) -> Result<Option<CapabilityMetadata>>;

    /// Deletes a tool's cached document. Returns whether one existed.
    fn remove_metadata(&self, name: &str) -> Result<bool>;

    /// Deletes every cached document. Returns how many were removed.
    fn clear_metadata(&self) -> Result<usize>;
}

/// File-backed store: a JSON registry file plus a cache directory.
///
/// # Example
///
/// ```rust,no_run
/// use toolguard_registry::storage::{FileStore, RegistryStore};
///
/// let store = FileStore::new("/home/me/.local/share/toolguard/registry.json",
///                            "/home/me/.cache/toolguard/metadata");
/// let mut registry = store.load().unwrap();
/// registry.mark_scanned(chrono::Utc::now());
/// store.save(&registry).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    registry_file: PathBuf,
    cache_dir: PathBuf,
}

impl FileStore {
    /// Creates a store. Nothing is touched until the first load or save.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(registry_file: P, cache_dir: Q) -> Self {
        Self {
            registry_file: registry_file.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Path of the registry file.
    pub fn registry_file(&self) -> &Path {
        &self.registry_file
    }

    /// Path of the metadata cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache file for a tool, after validating the name.
    pub fn metadata_path(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_tool_name(name) {
            return Err(RegistryError::InvalidToolName(name.to_string()));
        }
        Ok(self.cache_dir.join(format!("{name}.json")))
    }
}

impl RegistryStore for FileStore {
    fn load(&self) -> Result<Registry> {
        let bytes = match fs::read(&self.registry_file) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.registry_file.display(), "no registry file, starting empty");
                return Ok(Registry::new());
            }
            Err(source) => {
                return Err(RegistryError::Read {
                    path: self.registry_file.clone(),
                    source,
                })
            }
        };

        let registry: Registry =
            serde_json::from_slice(&bytes).map_err(|source| RegistryError::Corrupted {
                path: self.registry_file.clone(),
                source,
            })?;

        registry
            .check_invariants()
            .map_err(|reason| RegistryError::Invalid {
                path: self.registry_file.clone(),
                reason,
            })?;

        Ok(registry)
    }

    fn save(&self, registry: &Registry) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(registry)?;
        bytes.push(b'\n');
        write_atomic(&self.registry_file, &bytes)?;
        debug!(
            path = %self.registry_file.display(),
            tools = registry.len(),
            "registry saved"
        );
        Ok(())
    }

    fn write_metadata(&self, name: &str, metadata: &CapabilityMetadata) -> Result<Option<PathBuf>> {
        let path = self.metadata_path(name)?;
        let bytes = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&path, &bytes)?;
        Ok(Some(path))
    }

    fn read_metadata(&self, name: &str) -> Result<Option<CapabilityMetadata>> {
        let path = self.metadata_path(name)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(RegistryError::Read { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| RegistryError::Corrupted { path, source })
    }

    fn remove_metadata(&self, name: &str) -> Result<bool> {
        let path = self.metadata_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(RegistryError::WriteFailed { path, source }),
        }
    }

    fn clear_metadata(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(RegistryError::Read {
                    path: self.cache_dir.clone(),
                    source,
                })
            }
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| RegistryError::Read {
                    path: self.cache_dir.clone(),
                    source,
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
                fs::remove_file(&path)
                    .map_err(|source| RegistryError::WriteFailed { path: path.clone(), source })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Writes `bytes` to `path` via temp file, fsync, and rename.
///
/// The temp file lives in the destination directory so the rename never
/// crosses filesystems.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let fail = |source: io::Error| RegistryError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

/// In-memory store for tests and embedders.
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    registry: Mutex<Option<Registry>>,
    metadata: Mutex<HashMap<String, CapabilityMetadata>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with a registry.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry: Mutex::new(Some(registry)),
            metadata: Mutex::new(HashMap::new()),
        }
    }

    /// True once a registry has been saved or pre-loaded.
    pub fn has_saved(&self) -> bool {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<Registry> {
        Ok(self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default())
    }

    fn save(&self, registry: &Registry) -> Result<()> {
        *self.registry.lock().unwrap_or_else(PoisonError::into_inner) = Some(registry.clone());
        Ok(())
    }

    fn write_metadata(&self, name: &str, metadata: &CapabilityMetadata) -> Result<Option<PathBuf>> {
        if !is_valid_tool_name(name) {
            return Err(RegistryError::InvalidToolName(name.to_string()));
        }
        self.metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), metadata.clone());
        Ok(None)
    }

    fn read_metadata(&self, name: &str) -> Result<Option<CapabilityMetadata>> {
        Ok(self
            .metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }

    fn remove_metadata(&self, name: &str) -> Result<bool> {
        Ok(self
            .metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some())
    }

    fn clear_metadata(&self) -> Result<usize> {
        let mut map = self.metadata.lock().unwrap_or_else(PoisonError::into_inner);
        let n = map.len();
        map.clear();
        Ok(n)
    }
}
