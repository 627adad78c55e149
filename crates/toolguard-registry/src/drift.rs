//! # Capability Drift Detection
//!
//! Compares the capability document cached from the previous scan with the
//! one just probed and categorizes what changed. A tool that quietly grows a
//! destructive command, or drops the trust claims it used to make, deserves
//! more attention than one that bumped its version string.
//!
//! ## Drift Categories
//!
//! | Level | Example | Suggested response |
//! |-------|---------|--------------------|
//! | None | Identical documents | Nothing |
//! | Minor | Version bump, reworded description | Log |
//! | Major | Command added or removed, options changed | Review |
//! | Critical | Command became destructive, trust block removed or changed | Re-evaluate trust |
//!
//! Comparison is structural and deterministic: the same pair of documents
//! always yields the same report, with changes listed in command-path order.

use crate::digest::{metadata_fingerprint, to_hex};
use crate::models::{CapabilityMetadata, CommandNode, DriftLevel, DriftReport};
use std::collections::BTreeMap;

/// Detects and categorizes drift between two versions of a tool's metadata.
///
/// # Example
///
/// ```rust
/// use toolguard_registry::drift::detect_drift;
/// use toolguard_registry::{CapabilityMetadata, DriftLevel};
///
/// let old: CapabilityMetadata = serde_json::from_value(serde_json::json!({
///     "schemaVersion": "1.0", "name": "t", "version": "1.0.0", "description": "d"
/// })).unwrap();
/// let mut new = old.clone();
/// new.version = "1.1.0".to_string();
///
/// assert_eq!(detect_drift(&old, &new).level, DriftLevel::Minor);
/// ```
pub fn detect_drift(old: &CapabilityMetadata, new: &CapabilityMetadata) -> DriftReport {
    let old_fp = metadata_fingerprint(old);
    let new_fp = metadata_fingerprint(new);

    if old_fp == new_fp {
        return DriftReport {
            level: DriftLevel::None,
            changes: Vec::new(),
            old_fingerprint: Some(to_hex(&old_fp)),
            new_fingerprint: to_hex(&new_fp),
        };
    }

    let mut found: Vec<(String, DriftLevel)> = Vec::new();
    let mut record = |msg: String, l: DriftLevel| found.push((msg, l));

    if old.name != new.name {
        record(
            format!("Tool name changed: '{}' -> '{}'", old.name, new.name),
            DriftLevel::Critical,
        );
    }
    if old.version != new.version {
        record(
            format!("Version changed: '{}' -> '{}'", old.version, new.version),
            DriftLevel::Minor,
        );
    }
    if old.description != new.description {
        record("Description modified".to_string(), DriftLevel::Minor);
    }
    if old.schema_version != new.schema_version {
        record(
            format!(
                "Protocol version changed: '{}' -> '{}'",
                old.schema_version, new.schema_version
            ),
            DriftLevel::Major,
        );
    }

    let old_cmds = flatten(old);
    let new_cmds = flatten(new);

    for path in old_cmds.keys() {
        if !new_cmds.contains_key(path) {
            record(format!("Command '{path}' removed"), DriftLevel::Major);
        }
    }
    for (path, node) in &new_cmds {
        match old_cmds.get(path) {
            None if node.is_destructive() => record(
                format!("Destructive command '{path}' added"),
                DriftLevel::Critical,
            ),
            None => record(format!("Command '{path}' added"), DriftLevel::Major),
            Some(prev) => {
                for (msg, l) in compare_commands(path, prev, node) {
                    record(msg, l);
                }
            }
        }
    }

    match (&old.trust, &new.trust) {
        (Some(_), None) => record("Trust block removed".to_string(), DriftLevel::Critical),
        (None, Some(_)) => record("Trust block added".to_string(), DriftLevel::Minor),
        (Some(a), Some(b)) if a != b => {
            record("Trust block changed".to_string(), DriftLevel::Critical)
        }
        _ => {}
    }

    if found.is_empty() {
        // Only unknown keys differ.
        found.push(("Metadata modified".to_string(), DriftLevel::Minor));
    }

    let level = found
        .iter()
        .map(|(_, l)| *l)
        .max()
        .unwrap_or(DriftLevel::None);

    DriftReport {
        level,
        changes: found.into_iter().map(|(msg, _)| msg).collect(),
        old_fingerprint: Some(to_hex(&old_fp)),
        new_fingerprint: to_hex(&new_fp),
    }
}

/// Creates a drift report for a tool with no previous metadata.
pub fn new_tool_report(metadata: &CapabilityMetadata) -> DriftReport {
    DriftReport {
        level: DriftLevel::None,
        changes: vec!["New tool registration".to_string()],
        old_fingerprint: None,
        new_fingerprint: to_hex(&metadata_fingerprint(metadata)),
    }
}

fn flatten(metadata: &CapabilityMetadata) -> BTreeMap<String, &CommandNode> {
    let mut out = BTreeMap::new();
    for (name, node) in &metadata.commands {
        collect(name.clone(), node, &mut out);
    }
    out
}

fn collect<'a>(path: String, node: &'a CommandNode, out: &mut BTreeMap<String, &'a CommandNode>) {
    for (name, child) in &node.commands {
        collect(format!("{path} {name}"), child, out);
    }
    out.insert(path, node);
}

/// Compares one command's own fields. Children are compared by path elsewhere.
fn compare_commands(path: &str, old: &CommandNode, new: &CommandNode) -> Vec<(String, DriftLevel)> {
    let mut changes = Vec::new();

    if !old.is_destructive() && new.is_destructive() {
        changes.push((
            format!("Command '{path}' is now destructive"),
            DriftLevel::Critical,
        ));
    } else if old.effects != new.effects {
        changes.push((
            format!("Command '{path}' effects changed"),
            DriftLevel::Major,
        ));
    }

    if old.arguments != new.arguments {
        changes.push((
            format!("Command '{path}' arguments changed"),
            DriftLevel::Major,
        ));
    }
    if old.options != new.options {
        let old_names: Vec<&str> = old.options.iter().map(|o| o.name.as_str()).collect();
        let new_names: Vec<&str> = new.options.iter().map(|o| o.name.as_str()).collect();
        let level = if old_names == new_names {
            DriftLevel::Minor
        } else {
            DriftLevel::Major
        };
        changes.push((format!("Command '{path}' options changed"), level));
    }
    if old.description != new.description {
        changes.push((
            format!("Command '{path}' description modified"),
            DriftLevel::Minor,
        ));
    }

    changes
}
