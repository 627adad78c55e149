//! # Trust Evaluator
//!
//! Combines the checksum, signature and provenance checks into one ordinal
//! [`TrustLevel`] and an execution [`Recommendation`].
//!
//! ## Decision Order
//!
//! First match wins; the order is fixed.
//!
//! | # | Condition | Level | Recommendation |
//! |---|-----------|-------|----------------|
//! | 1 | declared checksum ≠ computed digest | `COMPROMISED` | block |
//! | 2 | signature checks disabled | `UNVERIFIED` | sandbox |
//! | 3 | no signature block | `UNSIGNED` | confirm |
//! | 4 | signature rejected | `UNSIGNED` | confirm |
//! | 5 | provenance disabled or absent | `VERIFIED` | execute |
//! | 6 | provenance rejected | `PROVENANCE_FAIL` | confirm |
//! | 7 | otherwise | `VERIFIED` | execute |
//!
//! A checksum mismatch dominates everything, including a valid signature.
//! The binary is rehashed on every call; nothing cached is trusted.
//!
//! ## Concurrency
//!
//! The evaluator holds no mutable state. Evaluations of different binaries
//! may run concurrently.

use crate::error::{Result, TrustError};
use crate::provenance::{
    HttpProvenanceVerifier, ProvenanceOptions, ProvenanceVerdict, ProvenanceVerifier,
    DEFAULT_PROVENANCE_TIMEOUT,
};
use crate::signature::{
    CosignVerifier, SignatureOptions, SignatureVerdict, SignatureVerifier, DEFAULT_SIGNATURE_TIMEOUT,
    DEFAULT_VERIFIER,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use toolguard_registry::digest::{digest_matches, format_digest, hash_file};
use toolguard_registry::{Hash, Recommendation, TrustBlock, TrustLevel, TrustSummary};
use tracing::info;

/// Options for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustOptions {
    pub verify_signatures: bool,
    pub verify_provenance: bool,
    pub signature: SignatureOptions,
    pub provenance: ProvenanceOptions,
}

impl TrustOptions {
    /// Both checks enabled, no allow-lists, minimum SLSA level 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            verify_signatures: true,
            verify_provenance: true,
            signature: SignatureOptions::default(),
            provenance: ProvenanceOptions::default(),
        }
    }

    #[must_use]
    pub fn with_signatures(mut self, enabled: bool) -> Self {
        self.verify_signatures = enabled;
        self
    }

    #[must_use]
    pub fn with_provenance(mut self, enabled: bool) -> Self {
        self.verify_provenance = enabled;
        self
    }

    #[must_use]
    pub fn with_min_slsa_level(mut self, level: u8) -> Self {
        self.provenance.min_slsa_level = level;
        self
    }

    #[must_use]
    pub fn with_hard_fail(mut self, hard_fail: bool) -> Self {
        self.provenance.hard_fail = hard_fail;
        self
    }
}

impl Default for TrustOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// The checksum comparison, always performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashCheck {
    /// `sha256:<hex>` of the binary as read now.
    pub computed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<String>,
    /// `None` when no checksum was declared.
    pub matches: Option<bool>,
}

/// Which checks ran and what they found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustChecks {
    pub hash: HashCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ProvenanceVerdict>,
}

/// Result of one evaluation. Never persisted as a source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustEvaluationResult {
    pub level: TrustLevel,
    pub recommendation: Recommendation,
    pub reason: String,
    pub checks: TrustChecks,
    pub evaluated_at: DateTime<Utc>,
}

impl TrustEvaluationResult {
    /// Condensed form for display in a registry entry.
    pub fn summary(&self) -> TrustSummary {
        TrustSummary {
            level: self.level,
            recommendation: self.recommendation,
            evaluated_at: self.evaluated_at,
            digest: self.checks.hash.computed.clone(),
        }
    }
}

/// Evaluates binaries against their trust claims.
#[derive(Clone)]
pub struct TrustEvaluator {
    signature: Arc<dyn SignatureVerifier>,
    provenance: Arc<dyn ProvenanceVerifier>,
}

impl TrustEvaluator {
    pub fn new(
        signature: Arc<dyn SignatureVerifier>,
        provenance: Arc<dyn ProvenanceVerifier>,
    ) -> Self {
        Self {
            signature,
            provenance,
        }
    }

    /// cosign on `PATH` plus HTTPS attestation fetches, with default timeouts.
    pub fn system() -> Result<Self> {
        Self::with_verifier(
            PathBuf::from(DEFAULT_VERIFIER),
            DEFAULT_SIGNATURE_TIMEOUT,
            DEFAULT_PROVENANCE_TIMEOUT,
        )
    }

    /// Uses `program` as the signature verifier.
    pub fn with_verifier(
        program: PathBuf,
        signature_timeout: Duration,
        provenance_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self::new(
            Arc::new(CosignVerifier::new(program, signature_timeout)),
            Arc::new(HttpProvenanceVerifier::new(provenance_timeout)?),
        ))
    }

    /// Evaluates `binary` against `trust`.
    ///
    /// # Errors
    ///
    /// Only environment problems: the binary cannot be read, the signature
    /// verifier is missing or times out, or an attestation cannot be fetched
    /// or parsed in hard-fail mode. Failed checks lower the level instead.
    pub async fn evaluate(
        &self,
        binary: &Path,
        trust: Option<&TrustBlock>,
        options: &TrustOptions,
    ) -> Result<TrustEvaluationResult> {
        let digest = hash_binary(binary).await?;
        let declared = trust.and_then(TrustBlock::checksum).map(str::to_string);
        let matches = declared.as_deref().map(|d| digest_matches(d, &digest));
        let mut checks = TrustChecks {
            hash: HashCheck {
                computed: format_digest(&digest),
                declared,
                matches,
            },
            signature: None,
            provenance: None,
        };

        let (level, reason) = self
            .decide(binary, &digest, trust, options, &mut checks)
            .await?;

        info!(binary = %binary.display(), %level, %reason, "trust evaluated");
        Ok(TrustEvaluationResult {
            level,
            recommendation: level.recommendation(),
            reason,
            checks,
            evaluated_at: Utc::now(),
        })
    }

    async fn decide(
        &self,
        binary: &Path,
        digest: &Hash,
        trust: Option<&TrustBlock>,
        options: &TrustOptions,
        checks: &mut TrustChecks,
    ) -> Result<(TrustLevel, String)> {
        if checks.hash.matches == Some(false) {
            return Ok((
                TrustLevel::Compromised,
                format!(
                    "declared checksum does not match binary ({})",
                    checks.hash.computed
                ),
            ));
        }

        if !options.verify_signatures {
            return Ok((
                TrustLevel::Unverified,
                "signature verification disabled".to_string(),
            ));
        }

        let Some(signature) = trust.and_then(TrustBlock::signature) else {
            return Ok((TrustLevel::Unsigned, "no signature declared".to_string()));
        };

        let verdict = self
            .signature
            .verify(binary, signature, &options.signature)
            .await?;
        let signed = verdict.verified;
        let signature_error = verdict.error.clone();
        checks.signature = Some(verdict);
        if !signed {
            return Ok((
                TrustLevel::Unsigned,
                format!(
                    "signature verification failed: {}",
                    signature_error.unwrap_or_else(|| "unknown error".to_string())
                ),
            ));
        }

        let provenance = trust.and_then(|t| t.provenance.as_ref());
        let provenance = match provenance {
            Some(p) if options.verify_provenance => p,
            Some(_) => {
                return Ok((
                    TrustLevel::Verified,
                    "signature verified; provenance verification disabled".to_string(),
                ))
            }
            None => {
                return Ok((
                    TrustLevel::Verified,
                    "signature verified; no provenance declared".to_string(),
                ))
            }
        };

        let verdict = self
            .provenance
            .verify(binary, digest, provenance, &options.provenance)
            .await?;
        let outcome = if verdict.verified {
            (
                TrustLevel::Verified,
                format!(
                    "signature and SLSA level {} provenance verified",
                    verdict.slsa_level.unwrap_or(provenance.slsa_level)
                ),
            )
        } else {
            (
                TrustLevel::ProvenanceFail,
                format!(
                    "provenance verification failed: {}",
                    verdict.error.as_deref().unwrap_or("unknown error")
                ),
            )
        };
        checks.provenance = Some(verdict);
        Ok(outcome)
    }
}

async fn hash_binary(binary: &Path) -> Result<Hash> {
    let path = binary.to_path_buf();
    let joined = tokio::task::spawn_blocking(move || hash_file(&path)).await;
    match joined {
        Ok(Ok(hash)) => Ok(hash),
        Ok(Err(source)) => Err(TrustError::BinaryUnreadable {
            path: binary.to_path_buf(),
            source,
        }),
        Err(e) => Err(TrustError::BinaryUnreadable {
            path: binary.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        }),
    }
}
