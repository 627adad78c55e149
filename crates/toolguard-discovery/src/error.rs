//! Error types for tool discovery.
//!
//! Probe errors describe one candidate and never abort a batch; discovery
//! errors describe the batch itself.

use std::time::Duration;
use thiserror::Error;
use toolguard_registry::RegistryError;

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Batch-level failures.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The registry could not be loaded or saved. Nothing was persisted.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A skip-list entry could not be compiled.
    #[error("Invalid skip pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The capability schema or help markers failed to compile.
    #[error("Invalid probe configuration: {0}")]
    Config(String),
}

/// Why the metadata phase of a probe failed.
///
/// Returning "not capability-aware" is not an error; see
/// [`ProbeOutcome`](crate::probe::ProbeOutcome).
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The metadata invocation did not finish in time. The process group was killed.
    #[error("metadata probe timed out after {0:?}")]
    Timeout(Duration),

    /// Non-empty stdout that is not JSON.
    #[error("metadata output is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// JSON that does not satisfy the capability schema.
    #[error("metadata failed schema validation: {}", .0.join("; "))]
    SchemaInvalid(Vec<String>),

    /// Stdout exceeded the capture limit.
    #[error("metadata output exceeded {0} bytes")]
    OutputTooLarge(usize),

    /// The binary could not be executed for the metadata phase.
    #[error("failed to execute metadata probe: {0}")]
    Execution(String),
}
