//! Configuration types for Toolguard.
//!
//! The config is a resolved value: nothing here reads files or the
//! environment. Callers (the CLI, an embedding agent) fill it in.

use crate::error::ToolguardError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use toolguard_discovery::{ProbeConfig, ScanOptions, DEFAULT_PARALLELISM};
use toolguard_discovery::probe::DEFAULT_MAX_OUTPUT;
use toolguard_trust::{ProvenanceOptions, SignatureOptions, TrustOptions};

/// Directory name used under the platform data and cache directories.
const APP_DIR: &str = "toolguard";

/// Highest SLSA build level defined by the framework.
const MAX_SLSA_LEVEL: u8 = 4;

/// Configuration for the Toolguard facade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolguardConfig {
    /// Where the registry and metadata cache live.
    pub paths: PathsConfig,

    /// Discovery configuration.
    pub scan: ScanConfig,

    /// Trust evaluation configuration.
    pub trust: TrustConfig,
}

impl ToolguardConfig {
    /// Rejects values no component can run with.
    ///
    /// # Errors
    ///
    /// [`ToolguardError::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.scan.parallelism == 0 {
            return Err(ToolguardError::Config(
                "scan.parallelism must be at least 1".to_string(),
            ));
        }
        if self.scan.help_timeout_ms == 0 || self.scan.agent_timeout_ms == 0 {
            return Err(ToolguardError::Config(
                "probe timeouts must be non-zero".to_string(),
            ));
        }
        if self.trust.min_slsa_level > MAX_SLSA_LEVEL {
            return Err(ToolguardError::Config(format!(
                "trust.min_slsa_level must be at most {MAX_SLSA_LEVEL}, got {}",
                self.trust.min_slsa_level
            )));
        }
        if self.trust.verifier_program.as_os_str().is_empty() {
            return Err(ToolguardError::Config(
                "trust.verifier_program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Registry and cache locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// The registry JSON document.
    pub registry_file: PathBuf,

    /// One `<tool>.json` capability document per registered tool.
    pub cache_dir: PathBuf,
}

impl PathsConfig {
    /// XDG-style defaults: `<data_dir>/toolguard/registry.json` and
    /// `<cache_dir>/toolguard/metadata/`.
    ///
    /// Falls back to `./.toolguard` when the platform has no such directories.
    pub fn from_dirs() -> Self {
        let fallback = || PathBuf::from(".").join(format!(".{APP_DIR}"));
        let data = dirs::data_dir().map_or_else(fallback, |d| d.join(APP_DIR));
        let cache = dirs::cache_dir().map_or_else(fallback, |d| d.join(APP_DIR));
        Self {
            registry_file: data.join("registry.json"),
            cache_dir: cache.join("metadata"),
        }
    }

    /// Both files under one directory. Handy for tests and portable installs.
    pub fn under<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        Self {
            registry_file: root.join("registry.json"),
            cache_dir: root.join("metadata"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::from_dirs()
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Roots scanned when the caller names none.
    pub safe_paths: Vec<PathBuf>,

    /// Exact names or globs never probed.
    pub skip: Vec<String>,

    /// Concurrent probes.
    pub parallelism: usize,

    /// Skip executables whose mtime is unchanged since the last scan.
    pub incremental: bool,

    pub help_timeout_ms: u64,
    pub agent_timeout_ms: u64,

    /// Cap on captured `--agent` output.
    pub max_output_bytes: usize,
}

impl ScanConfig {
    /// Runtime scanner options for this config.
    pub fn to_options(&self) -> ScanOptions {
        ScanOptions::new()
            .with_parallelism(self.parallelism)
            .with_incremental(self.incremental)
            .with_skip(self.skip.iter().cloned())
            .with_probe(
                ProbeConfig::new()
                    .with_help_timeout(Duration::from_millis(self.help_timeout_ms))
                    .with_agent_timeout(Duration::from_millis(self.agent_timeout_ms))
                    .with_max_output_bytes(self.max_output_bytes),
            )
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            safe_paths: Vec::new(),
            skip: Vec::new(),
            parallelism: DEFAULT_PARALLELISM,
            incremental: true,
            help_timeout_ms: 5_000,
            agent_timeout_ms: 10_000,
            max_output_bytes: DEFAULT_MAX_OUTPUT,
        }
    }
}

/// Trust evaluation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub verify_signatures: bool,
    pub verify_provenance: bool,

    /// Signature verifier executable, looked up on `PATH` if relative.
    pub verifier_program: PathBuf,

    pub signature_timeout_ms: u64,
    pub provenance_timeout_ms: u64,

    /// Minimum attested SLSA build level.
    pub min_slsa_level: u8,

    /// Empty means any builder.
    pub allowed_builders: Vec<String>,
    /// Empty means any identity.
    pub allowed_identities: Vec<String>,
    /// Empty means any issuer.
    pub allowed_issuers: Vec<String>,

    /// Raise attestation fetch/parse failures instead of downgrading.
    pub hard_fail: bool,

    /// Accept `http://` attestation URLs. Local test servers only.
    pub allow_http_attestations: bool,
}

impl TrustConfig {
    /// Runtime evaluator options for this config.
    pub fn to_options(&self) -> TrustOptions {
        TrustOptions {
            verify_signatures: self.verify_signatures,
            verify_provenance: self.verify_provenance,
            signature: SignatureOptions {
                allowed_identities: self.allowed_identities.clone(),
                allowed_issuers: self.allowed_issuers.clone(),
            },
            provenance: ProvenanceOptions {
                min_slsa_level: self.min_slsa_level,
                allowed_builders: self.allowed_builders.clone(),
                hard_fail: self.hard_fail,
                allow_http: self.allow_http_attestations,
            },
        }
    }

    pub fn signature_timeout(&self) -> Duration {
        Duration::from_millis(self.signature_timeout_ms)
    }

    pub fn provenance_timeout(&self) -> Duration {
        Duration::from_millis(self.provenance_timeout_ms)
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            verify_signatures: true,
            verify_provenance: true,
            verifier_program: PathBuf::from("cosign"),
            signature_timeout_ms: 30_000,
            provenance_timeout_ms: 30_000,
            min_slsa_level: 1,
            allowed_builders: Vec::new(),
            allowed_identities: Vec::new(),
            allowed_issuers: Vec::new(),
            hard_fail: false,
            allow_http_attestations: false,
        }
    }
}
