//! # Toolguard Trust
//!
//! Decides whether a discovered binary may be executed by an autonomous agent.
//!
//! ## Threat Model
//!
//! | Threat | Defense |
//! |--------|---------|
//! | Binary replaced after discovery | digest recomputed on every evaluation |
//! | Tool lies about its checksum | mismatch is `COMPROMISED`, overriding everything |
//! | Forged signer | identity/issuer checked by cosign, optional allow-lists |
//! | Binary built somewhere unexpected | SLSA subject, level and builder checks |
//! | Attestation server down | downgrade to `PROVENANCE_FAIL`, or hard-fail on request |
//!
//! No cryptographic primitives live here: signatures are checked by the
//! external verifier, provenance by digest binding.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use toolguard_trust::{TrustEvaluator, TrustOptions};
//!
//! # async fn run() -> Result<(), toolguard_trust::TrustError> {
//! let evaluator = TrustEvaluator::system()?;
//! let result = evaluator
//!     .evaluate(Path::new("/usr/local/bin/deployctl"), None, &TrustOptions::new())
//!     .await?;
//! println!("{} ({}): {}", result.level, result.recommendation, result.reason);
//! # Ok(())
//! # }
//! ```
//!
//! ## References
//!
//! - Sigstore cosign `verify-blob` <https://docs.sigstore.dev/cosign/verifying/verify/>
//! - DSSE envelope format <https://github.com/secure-systems-lab/dsse>
//! - SLSA v1.0 provenance <https://slsa.dev/spec/v1.0/provenance>

mod error;
pub mod evaluator;
pub mod provenance;
pub mod signature;

pub use error::{Result, TrustError};
pub use evaluator::{HashCheck, TrustChecks, TrustEvaluationResult, TrustEvaluator, TrustOptions};
pub use provenance::{
    HttpProvenanceVerifier, ProvenanceOptions, ProvenanceVerdict, ProvenanceVerifier,
};
pub use signature::{CosignVerifier, SignatureOptions, SignatureVerdict, SignatureVerifier};
pub use toolguard_registry::{Recommendation, TrustLevel};
