//! # Integration Tests for the Tool Registry
//!
//! ## Test Categories
//!
//! 1. **Round-trip**: save then load yields equal entries
//! 2. **Forward compatibility**: unknown keys survive verbatim
//! 3. **Wire format**: timestamps are ISO-8601 strings on disk

use crate::digest::{format_digest, hash_bytes};
use crate::models::{
    Recommendation, Registry, RegistryEntry, SourceKind, TrustLevel, TrustSummary,
};
use crate::storage::{FileStore, RegistryStore};
use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_entry(name: &str, source: SourceKind) -> RegistryEntry {
    let discovered = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    RegistryEntry {
        name: name.to_string(),
        version: "3.1.4".to_string(),
        path: PathBuf::from(format!("/usr/local/bin/{name}")),
        source,
        discovered_at: discovered,
        last_verified: discovered + chrono::Duration::hours(5),
        mtime: Utc.timestamp_opt(1_767_000_000, 123_456_789).unwrap(),
        digest: Some(format_digest(&hash_bytes(name.as_bytes()))),
        metadata_file: Some(PathBuf::from(format!("/cache/{name}.json"))),
        trust: Some(TrustSummary {
            level: TrustLevel::Unsigned,
            recommendation: Recommendation::Confirm,
            evaluated_at: discovered,
            digest: format_digest(&hash_bytes(name.as_bytes())),
        }),
        extra: Map::new(),
    }
}

fn file_store(dir: &tempfile::TempDir) -> FileStore {
    FileStore::new(dir.path().join("registry.json"), dir.path().join("metadata"))
}

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_save_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);

    let mut registry = Registry::new();
    registry.upsert(sample_entry("deployctl", SourceKind::Native)).unwrap();
    registry.upsert(sample_entry("fmt-js", SourceKind::NodeShim)).unwrap();
    registry.upsert(sample_entry("lint-py", SourceKind::PythonShim)).unwrap();
    registry.mark_scanned(Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap());

    store.save(&registry).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded.version, registry.version);
    assert_eq!(loaded.last_scan, registry.last_scan);
    assert_eq!(loaded.len(), 3);
    for entry in &registry.tools {
        assert_eq!(loaded.get(&entry.name), Some(entry));
    }
}

#[test]
fn test_subsecond_mtime_survives_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);

    let mut registry = Registry::new();
    let entry = sample_entry("precise", SourceKind::Native);
    let mtime = entry.mtime;
    registry.upsert(entry).unwrap();
    store.save(&registry).unwrap();

    assert_eq!(store.load().unwrap().get("precise").unwrap().mtime, mtime);
}

// =============================================================================
// Forward Compatibility Tests
// =============================================================================

#[test]
fn test_unknown_keys_are_preserved_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);

    let doc = json!({
        "version": "1.0",
        "lastScan": "2026-10-01T08:30:00Z",
        "tools": [{
            "name": "gh",
            "version": "2.60.0",
            "path": "/usr/bin/gh",
            "source": "native",
            "discoveredAt": "2026-09-01T00:00:00Z",
            "lastVerified": "2026-10-01T08:30:00Z",
            "mtime": "2026-08-15T11:11:11Z",
            "aliases": ["github"]
        }],
        "scanRoots": ["/usr/bin", "/usr/local/bin"],
        "futureFeature": { "nested": [1, 2, { "deep": null }] }
    });
    std::fs::write(store.registry_file(), serde_json::to_vec(&doc).unwrap()).unwrap();

    let mut registry = store.load().unwrap();
    assert_eq!(registry.extra["scanRoots"], doc["scanRoots"]);
    assert_eq!(registry.get("gh").unwrap().extra["aliases"], json!(["github"]));

    registry.mark_scanned(Utc::now());
    store.save(&registry).unwrap();

    let raw: Value = serde_json::from_slice(&std::fs::read(store.registry_file()).unwrap()).unwrap();
    assert_eq!(raw["futureFeature"], doc["futureFeature"]);
    assert_eq!(raw["scanRoots"], doc["scanRoots"]);
    assert_eq!(raw["tools"][0]["aliases"], json!(["github"]));
}

// =============================================================================
// Wire Format Tests
// =============================================================================

#[test]
fn test_timestamps_are_iso8601_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir);

    let mut registry = Registry::new();
    registry.upsert(sample_entry("clock", SourceKind::Shim)).unwrap();
    store.save(&registry).unwrap();

    let raw: Value = serde_json::from_slice(&std::fs::read(store.registry_file()).unwrap()).unwrap();
    let tool = &raw["tools"][0];
    assert_eq!(tool["discoveredAt"], "2026-03-01T12:00:00Z");
    assert_eq!(tool["source"], "shim");
    assert_eq!(tool["trust"]["level"], "UNSIGNED");
    assert!(raw["lastScan"].is_null());
    assert!(tool["mtime"].as_str().unwrap().starts_with("2025-12-29T"));
}
