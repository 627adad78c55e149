//! # Registry - In-Memory Operations
//!
//! The [`Registry`] value is passed explicitly through every scan and store
//! call; there is no process-wide registry. This module holds the operations
//! that keep its invariants: names are unique, paths are absolute.
//!
//! ## Usage Flow
//!
//! 1. **Load**: a [`RegistryStore`](crate::storage::RegistryStore) returns a `Registry`
//! 2. **Mutate**: the scanner upserts entries, refresh/clear remove them
//! 3. **Save**: the store writes the whole value back atomically

use crate::models::{Registry, RegistryEntry, RegistryError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;

/// Outcome of [`Registry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No entry had this name before.
    Inserted,
    /// An existing entry was replaced.
    Updated,
}

impl Registry {
    /// Creates an empty registry with the current format version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True if the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up an entry by tool name.
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.tools.iter().find(|e| e.name == name)
    }

    /// Looks up an entry by executable path.
    pub fn get_by_path(&self, path: &Path) -> Option<&RegistryEntry> {
        self.tools.iter().find(|e| e.path == path)
    }

    /// Mutable lookup by tool name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut RegistryEntry> {
        self.tools.iter_mut().find(|e| e.name == name)
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }

    /// Inserts or replaces the entry with the same name.
    ///
    /// When replacing, the original `discovered_at` is kept and any keys the
    /// previous entry carried in `extra` survive unless the new entry sets them.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RelativePath`] if the entry path is not absolute.
    pub fn upsert(&mut self, mut entry: RegistryEntry) -> Result<Upsert> {
        if !entry.path.is_absolute() {
            return Err(RegistryError::RelativePath(entry.path));
        }

        match self.get_mut(&entry.name) {
            Some(existing) => {
                entry.discovered_at = existing.discovered_at;
                for (k, v) in std::mem::take(&mut existing.extra) {
                    entry.extra.entry(k).or_insert(v);
                }
                *existing = entry;
                Ok(Upsert::Updated)
            }
            None => {
                self.tools.push(entry);
                Ok(Upsert::Inserted)
            }
        }
    }

    /// Removes an entry by name.
    pub fn remove(&mut self, name: &str) -> Option<RegistryEntry> {
        let idx = self.tools.iter().position(|e| e.name == name)?;
        Some(self.tools.remove(idx))
    }

    /// Removes every entry. Unknown top-level keys are kept.
    pub fn clear(&mut self) {
        self.tools.clear();
        self.last_scan = None;
    }

    /// Records the completion of a scan.
    pub fn mark_scanned(&mut self, at: DateTime<Utc>) {
        self.last_scan = Some(at);
    }

    /// Checks the invariants a loaded registry must satisfy.
    ///
    /// Returns a description of the first violation.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for entry in &self.tools {
            if !seen.insert(entry.name.as_str()) {
                return Err(format!("duplicate tool name '{}'", entry.name));
            }
            if !entry.path.is_absolute() {
                return Err(format!(
                    "tool '{}' has relative path '{}'",
                    entry.name,
                    entry.path.display()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use chrono::TimeZone;
    use serde_json::{json, Map};
    use std::path::PathBuf;

    fn entry(name: &str, path: &str) -> RegistryEntry {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        RegistryEntry {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            path: PathBuf::from(path),
            source: SourceKind::Native,
            discovered_at: t,
            last_verified: t,
            mtime: t,
            digest: None,
            metadata_file: None,
            trust: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_upsert_insert_then_update() {
        let mut registry = Registry::new();
        assert_eq!(registry.upsert(entry("gh", "/usr/bin/gh")).unwrap(), Upsert::Inserted);

        let mut newer = entry("gh", "/opt/bin/gh");
        newer.discovered_at = Utc::now();
        newer.version = "2.0.0".to_string();
        assert_eq!(registry.upsert(newer).unwrap(), Upsert::Updated);

        assert_eq!(registry.len(), 1);
        let gh = registry.get("gh").unwrap();
        assert_eq!(gh.version, "2.0.0");
        assert_eq!(gh.path, PathBuf::from("/opt/bin/gh"));
        assert_eq!(gh.discovered_at, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_upsert_keeps_unknown_entry_keys() {
        let mut registry = Registry::new();
        let mut first = entry("jq", "/usr/bin/jq");
        first.extra.insert("pinned".to_string(), json!(true));
        registry.upsert(first).unwrap();
        registry.upsert(entry("jq", "/usr/bin/jq")).unwrap();
        assert_eq!(registry.get("jq").unwrap().extra["pinned"], json!(true));
    }

    #[test]
    fn test_upsert_rejects_relative_path() {
        let mut registry = Registry::new();
        let err = registry.upsert(entry("rel", "bin/rel")).unwrap_err();
        assert!(matches!(err, RegistryError::RelativePath(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_by_path_and_remove() {
        let mut registry = Registry::new();
        registry.upsert(entry("a", "/bin/a")).unwrap();
        registry.upsert(entry("b", "/bin/b")).unwrap();

        assert_eq!(registry.get_by_path(Path::new("/bin/b")).unwrap().name, "b");
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.names(), vec!["b"]);
    }

    #[test]
    fn test_clear_keeps_extra_keys() {
        let mut registry = Registry::new();
        registry.extra.insert("owner".to_string(), json!("ops"));
        registry.upsert(entry("a", "/bin/a")).unwrap();
        registry.mark_scanned(Utc::now());

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.last_scan.is_none());
        assert_eq!(registry.extra["owner"], json!("ops"));
    }

    #[test]
    fn test_check_invariants() {
        let mut registry = Registry::new();
        registry.tools.push(entry("a", "/bin/a"));
        assert!(registry.check_invariants().is_ok());

        registry.tools.push(entry("a", "/bin/a2"));
        assert!(registry.check_invariants().unwrap_err().contains("duplicate"));

        let mut registry = Registry::new();
        registry.tools.push(entry("r", "relative"));
        assert!(registry.check_invariants().unwrap_err().contains("relative"));
    }
}
