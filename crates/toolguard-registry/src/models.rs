//! # Core Data Models for the Tool Registry
//!
//! This module defines the types persisted by the registry and the capability
//! documents probed from tools. Everything that crosses the disk boundary is
//! serialized with camelCase keys so the on-disk format stays stable for other
//! consumers of the registry file.
//!
//! ## Threat Model
//!
//! The types in this module help defend against:
//!
//! - **Path Confusion**: Registry entries always carry absolute executable paths.
//! - **Cache Escapes**: Tool names become cache file names, so they are restricted
//!   to a conservative character set (see [`is_valid_tool_name`]).
//! - **Silent Format Loss**: Unknown keys are captured and written back verbatim.
//!
//! ## References
//!
//! - NIST FIPS 180-4 for hash size (SHA-256 = 32 bytes)
//! - SLSA v1.0 provenance levels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// SHA-256 hash output size in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte SHA-256 content digest.
pub type Hash = [u8; HASH_SIZE];

/// Format tag written into every registry file.
pub const REGISTRY_FORMAT_VERSION: &str = "1.0";

/// Longest tool name accepted as a cache key.
pub const MAX_TOOL_NAME_LEN: usize = 128;

/// Returns true if `name` is usable as a registry key and cache file name.
///
/// Names must be non-empty, at most [`MAX_TOOL_NAME_LEN`] bytes, must not start
/// with `.`, and may only contain ASCII alphanumerics and `.`, `_`, `+`, `-`.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_LEN
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'+' | b'-'))
}

/// How a discovered executable is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A compiled binary (ELF, Mach-O, PE).
    Native,
    /// A script with an interpreter line that is neither node nor python.
    Shim,
    /// A script launched through node (typically an npm bin shim).
    NodeShim,
    /// A script launched through python (typically a pip entry point).
    PythonShim,
}

/// Ordinal confidence in a binary, lowest first.
///
/// `ProvenanceFail` sorts above `Unsigned` only because it is reached after
/// signing succeeded; it is its own branch, not a strictly better outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    /// Declared checksum does not match the binary.
    Compromised,
    /// No signature, or the signature did not verify.
    Unsigned,
    /// Signature verification was disabled.
    Unverified,
    /// Signed, but the build attestation did not check out.
    ProvenanceFail,
    /// Signed, and provenance verified or absent.
    Verified,
}

impl TrustLevel {
    /// Recommendation implied by this level.
    pub fn recommendation(self) -> Recommendation {
        match self {
            TrustLevel::Compromised => Recommendation::Block,
            TrustLevel::Unsigned | TrustLevel::ProvenanceFail => Recommendation::Confirm,
            TrustLevel::Unverified => Recommendation::Sandbox,
            TrustLevel::Verified => Recommendation::Execute,
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrustLevel::Compromised => "COMPROMISED",
            TrustLevel::Unsigned => "UNSIGNED",
            TrustLevel::Unverified => "UNVERIFIED",
            TrustLevel::ProvenanceFail => "PROVENANCE_FAIL",
            TrustLevel::Verified => "VERIFIED",
        };
        f.write_str(s)
    }
}

/// What an agent should do with a binary at a given trust level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    /// Run it.
    Execute,
    /// Run it only inside a sandbox.
    Sandbox,
    /// Ask a human first.
    Confirm,
    /// Never run it.
    Block,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Recommendation::Execute => "execute",
            Recommendation::Sandbox => "sandbox",
            Recommendation::Confirm => "confirm",
            Recommendation::Block => "block",
        })
    }
}

/// Last trust evaluation recorded for display. Never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustSummary {
    pub level: TrustLevel,
    pub recommendation: Recommendation,
    pub evaluated_at: DateTime<Utc>,
    /// `sha256:<hex>` digest the evaluation saw.
    pub digest: String,
}

/// One row of the registry: the last known state of a discovered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Unique key within a registry.
    pub name: String,

    /// Version declared by the tool's capability metadata.
    pub version: String,

    /// Absolute path of the executable.
    pub path: PathBuf,

    /// Packaging classification.
    pub source: SourceKind,

    /// When the tool was first discovered.
    pub discovered_at: DateTime<Utc>,

    /// When the tool was last probed or trust-evaluated.
    pub last_verified: DateTime<Utc>,

    /// Executable modification time at the last probe. Used for staleness.
    pub mtime: DateTime<Utc>,

    /// `sha256:<hex>` content digest, if computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Location of the cached capability document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_file: Option<PathBuf>,

    /// Most recent trust evaluation, for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<TrustSummary>,

    /// Keys this version does not understand, written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The persisted registry document.
///
/// Entries are kept in insertion order on disk, but order carries no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    /// Format version tag.
    pub version: String,

    /// Completion time of the last scan, `null` if never scanned.
    #[serde(default)]
    pub last_scan: Option<DateTime<Utc>>,

    /// Discovered tools.
    #[serde(default)]
    pub tools: Vec<RegistryEntry>,

    /// Unknown top-level keys, round-tripped verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: REGISTRY_FORMAT_VERSION.to_string(),
            last_scan: None,
            tools: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// The machine-readable document a tool emits from its metadata flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityMetadata {
    /// Protocol version marker.
    pub schema_version: String,

    pub name: String,
    pub version: String,
    pub description: String,

    /// Top-level commands keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, CommandNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<TrustBlock>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CapabilityMetadata {
    /// Total number of commands at every depth.
    pub fn command_count(&self) -> usize {
        self.commands.values().map(CommandNode::subtree_size).sum()
    }
}

/// One node of the command tree. Children are keyed by name, so sibling
/// names are distinct and the structure cannot contain cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandNode {
    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ArgumentSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Effects>,

    /// Subcommands keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, CommandNode>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandNode {
    /// True if the command declares itself destructive.
    pub fn is_destructive(&self) -> bool {
        self.effects
            .as_ref()
            .and_then(|e| e.destructive)
            .unwrap_or(false)
    }

    /// This command plus every nested subcommand.
    fn subtree_size(&self) -> usize {
        1 + self
            .commands
            .values()
            .map(CommandNode::subtree_size)
            .sum::<usize>()
    }
}

/// A positional argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub variadic: bool,
}

/// A named option (`--flag`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Side-effect profile of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemAccess>,
}

/// Filesystem access a command may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilesystemAccess {
    None,
    Read,
    Write,
    ReadWrite,
}

/// Trust claims a tool makes about itself. All of it is unverified input until
/// the trust evaluator checks it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustBlock {
    /// Where the tool says it came from (registry name, vendor, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default)]
    pub verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl TrustBlock {
    /// Declared content checksum, if any.
    pub fn checksum(&self) -> Option<&str> {
        self.integrity.as_ref()?.checksum.as_deref()
    }

    /// Declared signature, if any.
    pub fn signature(&self) -> Option<&Signature> {
        self.integrity.as_ref()?.signature.as_ref()
    }
}

/// Content integrity claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integrity {
    /// Declared digest, `sha256:<hex>` or bare hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// A detached keyless signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// Algorithm family, e.g. `sigstore`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Expected certificate identity (SAN).
    pub identity: String,

    /// Expected OIDC issuer of the certificate.
    pub issuer: String,

    /// Offline bundle locator. Relative paths resolve next to the binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
}

/// Build attestation claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Where to fetch the attestation.
    pub url: String,

    /// Attestation format tag, e.g. `slsa-provenance-v1`.
    pub format: String,

    /// Level the tool claims. The attestation body overrides it.
    pub slsa_level: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
}

/// Severity of change between two capability documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftLevel {
    /// Documents are identical.
    None,
    /// Version bumps and wording changes.
    Minor,
    /// Commands added or removed.
    Major,
    /// New destructive behavior or altered trust claims.
    Critical,
}

/// What changed between the cached and newly probed capability documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub level: DriftLevel,
    pub changes: Vec<String>,
    /// Fingerprint of the previous document, hex.
    pub old_fingerprint: Option<String>,
    /// Fingerprint of the new document, hex.
    pub new_fingerprint: String,
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry or a cache file exists but is not valid JSON for its type.
    #[error("Corrupted file {}: {source}", path.display())]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The registry parsed but violates an invariant.
    #[error("Invalid registry {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    /// Reading a file failed for a reason other than absence.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The temp-file write or atomic rename failed.
    #[error("Failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested tool was not found in the registry.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// The name cannot be used as a registry key.
    #[error("Invalid tool name: {0:?}")]
    InvalidToolName(String),

    /// Entries must point at absolute paths.
    #[error("Executable path must be absolute: {}", .0.display())]
    RelativePath(PathBuf),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
