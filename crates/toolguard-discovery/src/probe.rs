//! # Two-Phase Prober
//!
//! Decides whether an unknown executable is capability-aware without ever
//! passing it a flag it has not documented.
//!
//! ## Protocol
//!
//! ```text
//!   <binary> --help            (phase 1, read-only on every sane CLI)
//!        │
//!        ├─ spawn error / non-zero exit / timeout ──▶ NotAdvertised
//!        ├─ output lacks --agent, -A, "agent protocol" ──▶ NotAdvertised
//!        ▼
//!   <binary> --agent           (phase 2)
//!        │
//!        ├─ non-zero exit / empty stdout ──▶ NoMetadata
//!        ├─ timeout ──▶ ProbeError::Timeout
//!        ├─ stdout over limit ──▶ ProbeError::OutputTooLarge
//!        ├─ not JSON ──▶ ProbeError::InvalidJson
//!        ├─ schema violation ──▶ ProbeError::SchemaInvalid
//!        ▼
//!   Metadata(CapabilityMetadata)
//! ```
//!
//! ## Threat Model
//!
//! - **Unknown Flags**: only the two fixed flags are ever passed. Phase 2 is
//!   unreachable unless phase 1 succeeded and advertised the flag.
//! - **Shell Injection**: the binary is spawned directly; no shell, no
//!   arguments derived from tool output.
//! - **Hangs and Floods**: each phase has its own deadline, stdout is capped,
//!   and the process group is killed on expiry.
//!
//! Neither phase is retried.

use crate::error::{DiscoveryError, ProbeError};
use crate::process::{run_bounded, RunError};
use crate::schema::{CapabilitySchema, SchemaValidator};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolguard_registry::CapabilityMetadata;
use tracing::debug;

/// Phase 1 argument.
pub const HELP_FLAG: &str = "--help";

/// Phase 2 argument.
pub const AGENT_FLAG: &str = "--agent";

/// Default stdout capture limit for phase 2 (10 MiB).
pub const DEFAULT_MAX_OUTPUT: usize = 10 * 1024 * 1024;

/// Help output is only scanned for markers, so it gets a smaller cap.
const HELP_OUTPUT_LIMIT: usize = 1024 * 1024;

/// Timeouts and limits for one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub help_timeout: Duration,
    pub agent_timeout: Duration,
    pub max_output_bytes: usize,
}

impl ProbeConfig {
    /// Defaults: 5 s help, 10 s agent, 10 MiB output.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            help_timeout: Duration::from_secs(5),
            agent_timeout: Duration::from_secs(10),
            max_output_bytes: DEFAULT_MAX_OUTPUT,
        }
    }

    #[must_use]
    pub const fn with_help_timeout(mut self, timeout: Duration) -> Self {
        self.help_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What a successful probe learned.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Phase 1 failed or did not mention the metadata flag. Phase 2 never ran.
    NotAdvertised,
    /// Phase 2 ran but exited non-zero or printed nothing.
    NoMetadata,
    /// A schema-valid capability document.
    Metadata(Box<CapabilityMetadata>),
}

/// Recognizes help text that documents the metadata flag.
#[derive(Debug)]
struct HelpMarkers {
    long_flag: Regex,
    short_flag: Regex,
    keyword: Regex,
}

impl HelpMarkers {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            long_flag: Regex::new(r"(?i)(?:^|[^A-Za-z0-9_-])--agent(?:[^A-Za-z0-9_-]|$)")?,
            // Case-sensitive: `-a` is a different, very common flag.
            short_flag: Regex::new(r"(?m)(?:^|[\s,\[|(])-A(?:[\s,\]|)=]|$)")?,
            keyword: Regex::new(r"(?i)\bagent[- ]?protocol\b")?,
        })
    }

    fn matches(&self, help: &str) -> bool {
        self.long_flag.is_match(help) || self.short_flag.is_match(help) || self.keyword.is_match(help)
    }
}

/// Runs the two-phase protocol against executables.
///
/// A `Prober` is immutable and cheap to share across scan workers.
pub struct Prober {
    config: ProbeConfig,
    validator: Arc<dyn SchemaValidator>,
    markers: HelpMarkers,
}

impl Prober {
    /// Creates a prober with the built-in capability schema.
    pub fn new(config: ProbeConfig) -> Result<Self, DiscoveryError> {
        let schema = CapabilitySchema::new()?;
        Self::with_validator(config, Arc::new(schema))
    }

    /// Creates a prober with a caller-supplied validator.
    pub fn with_validator(
        config: ProbeConfig,
        validator: Arc<dyn SchemaValidator>,
    ) -> Result<Self, DiscoveryError> {
        let markers =
            HelpMarkers::new().map_err(|e| DiscoveryError::Config(format!("help markers: {e}")))?;
        Ok(Self {
            config,
            validator,
            markers,
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Phase 1: does `<path> --help` succeed and mention the metadata flag?
    pub async fn help_check(&self, path: &Path) -> bool {
        let output = match run_bounded(
            path,
            &[HELP_FLAG],
            self.config.help_timeout,
            HELP_OUTPUT_LIMIT,
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "help check failed");
                return false;
            }
        };
        if !output.status.success() {
            debug!(path = %path.display(), status = %output.status, "help exited non-zero");
            return false;
        }
        self.markers.matches(&output.combined())
    }

    /// Phase 2: runs `<path> --agent` and parses the document.
    ///
    /// Callers must only invoke this after [`help_check`](Self::help_check)
    /// returned true; [`probe`](Self::probe) enforces that ordering.
    pub async fn fetch_metadata(&self, path: &Path) -> Result<ProbeOutcome, ProbeError> {
        let output = run_bounded(
            path,
            &[AGENT_FLAG],
            self.config.agent_timeout,
            self.config.max_output_bytes,
        )
        .await
        .map_err(|e| match e {
            RunError::Timeout { timeout, .. } => ProbeError::Timeout(timeout),
            other => ProbeError::Execution(other.to_string()),
        })?;

        if !output.status.success() {
            debug!(path = %path.display(), status = %output.status, "metadata flag exited non-zero");
            return Ok(ProbeOutcome::NoMetadata);
        }
        if output.stdout_truncated {
            return Err(ProbeError::OutputTooLarge(self.config.max_output_bytes));
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(ProbeOutcome::NoMetadata);
        }

        let document: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(ProbeError::InvalidJson)?;

        let validation = self.validator.validate(&document);
        if !validation.valid {
            return Err(ProbeError::SchemaInvalid(validation.errors));
        }

        let metadata: CapabilityMetadata = serde_json::from_value(document)
            .map_err(|e| ProbeError::SchemaInvalid(vec![e.to_string()]))?;
        Ok(ProbeOutcome::Metadata(Box::new(metadata)))
    }

    /// Runs both phases. Phase 2 runs only if phase 1 advertised the flag.
    pub async fn probe(&self, path: &Path) -> Result<ProbeOutcome, ProbeError> {
        if !self.help_check(path).await {
            return Ok(ProbeOutcome::NotAdvertised);
        }
        self.fetch_metadata(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> HelpMarkers {
        HelpMarkers::new().unwrap()
    }

    #[test]
    fn test_long_flag_marker() {
        let m = markers();
        assert!(m.matches("Options:\n  --agent    Print capability metadata\n"));
        assert!(m.matches("usage: tool [--AGENT]"));
        assert!(!m.matches("  --agent-id <ID>  agent identifier"));
        assert!(!m.matches("  --user-agent <UA>"));
    }

    #[test]
    fn test_short_alias_is_case_sensitive() {
        let m = markers();
        assert!(m.matches("  -A, --all-output   ..."));
        assert!(m.matches("usage: tool [-A]"));
        assert!(!m.matches("  -a, --all   show all"));
        assert!(!m.matches("  -Abc"));
    }

    #[test]
    fn test_protocol_keyword_marker() {
        let m = markers();
        assert!(m.matches("Supports the Agent Protocol."));
        assert!(m.matches("implements agent-protocol v1"));
        assert!(m.matches("AGENTPROTOCOL"));
        assert!(!m.matches("A tool for agents and protocols"));
    }

    #[test]
    fn test_probe_config_builder() {
        let config = ProbeConfig::new()
            .with_help_timeout(Duration::from_millis(250))
            .with_agent_timeout(Duration::from_secs(2))
            .with_max_output_bytes(4096);
        assert_eq!(config.help_timeout, Duration::from_millis(250));
        assert_eq!(config.agent_timeout, Duration::from_secs(2));
        assert_eq!(config.max_output_bytes, 4096);
        assert_eq!(ProbeConfig::default(), ProbeConfig::new());
    }
}
