//! Error types for trust evaluation.
//!
//! Verification failures are not errors: they lower the trust level. These
//! variants cover a broken environment, plus attestation problems when the
//! caller asked for hard-fail mode.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for trust operations.
pub type Result<T> = std::result::Result<T, TrustError>;

#[derive(Debug, Error)]
pub enum TrustError {
    /// The signature verification program is not installed.
    #[error("signature verifier '{}' is not installed", program.display())]
    VerifierNotInstalled { program: PathBuf },

    /// The signature verifier did not answer in time.
    #[error("signature verifier '{}' timed out after {timeout:?}", program.display())]
    VerifierTimeout { program: PathBuf, timeout: Duration },

    /// The binary under evaluation could not be read.
    #[error("cannot read binary {}: {source}", path.display())]
    BinaryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fetching the attestation failed (hard-fail mode only).
    #[error("attestation fetch failed: {0}")]
    AttestationFetch(String),

    /// The attestation was not a decodable envelope (hard-fail mode only).
    #[error("attestation parse failed: {0}")]
    AttestationParse(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
