//! Error types for Toolguard Core.

use thiserror::Error;
use toolguard_discovery::DiscoveryError;
use toolguard_registry::RegistryError;
use toolguard_trust::TrustError;

/// Core error type for Toolguard operations.
///
/// Per-candidate scan failures and failed trust checks are values in the
/// returned results, not errors. Only whole-operation failures land here.
#[derive(Debug, Error)]
pub enum ToolguardError {
    /// The registry or metadata cache could not be read or written.
    #[error("Registry error: {0}")]
    Registry(RegistryError),

    /// Discovery could not start (bad skip pattern, schema).
    #[error("Discovery error: {0}")]
    Discovery(DiscoveryError),

    /// Trust evaluation hit an environment problem.
    #[error("Trust evaluation error: {0}")]
    Trust(#[from] TrustError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The named tool is not registered.
    #[error("Tool not found: {0}")]
    NotFound(String),
}

impl From<RegistryError> for ToolguardError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(name) => Self::NotFound(name),
            other => Self::Registry(other),
        }
    }
}

impl From<DiscoveryError> for ToolguardError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Registry(inner) => inner.into(),
            other => Self::Discovery(other),
        }
    }
}
