//! # Signature Verifier
//!
//! Checks a detached keyless signature by shelling out to an external
//! verifier (cosign by default). No signature math happens in-process.
//!
//! ```text
//! <verifier> verify-blob --certificate-identity <identity>
//!                        --certificate-oidc-issuer <issuer>
//!                        [--bundle <path>] <target>
//! ```
//!
//! Success requires exit status zero AND a certificate identity equal to the
//! expected one. When the verifier does not print the identity, a zero exit
//! already implies it matched `--certificate-identity`.
//!
//! Only a missing verifier or a timeout is an error; every other outcome is
//! a verdict with `verified: false` and the verifier's diagnostics.

use crate::error::{Result, TrustError};
use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toolguard_discovery::{run_bounded, RunError};
use toolguard_registry::Signature;
use tracing::{debug, info, warn};

/// Default verifier program, looked up on `PATH`.
pub const DEFAULT_VERIFIER: &str = "cosign";

/// Default verifier timeout. Keyless verification talks to a transparency log.
pub const DEFAULT_SIGNATURE_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_VERIFIER_OUTPUT: usize = 1024 * 1024;

/// Signature families the external verifier understands.
const SUPPORTED_KINDS: &[&str] = &["sigstore", "cosign", "keyless"];

/// Outcome of a signature check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureVerdict {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SignatureVerdict {
    pub fn verified(identity: impl Into<String>) -> Self {
        Self {
            verified: true,
            identity: Some(identity.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            verified: false,
            identity: None,
            error: Some(error.into()),
        }
    }
}

/// Caller policy applied on top of the tool's own claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureOptions {
    /// If non-empty, the signing identity must be one of these.
    pub allowed_identities: Vec<String>,
    /// If non-empty, the OIDC issuer must be one of these.
    pub allowed_issuers: Vec<String>,
}

impl SignatureOptions {
    /// Checks the allow-lists. Returns the rejection reason, if any.
    pub fn check(&self, signature: &Signature) -> Option<String> {
        if !self.allowed_identities.is_empty()
            && !self.allowed_identities.iter().any(|i| i == &signature.identity)
        {
            return Some(format!(
                "identity '{}' is not in the allowed identity list",
                signature.identity
            ));
        }
        if !self.allowed_issuers.is_empty()
            && !self.allowed_issuers.iter().any(|i| i == &signature.issuer)
        {
            return Some(format!(
                "issuer '{}' is not in the allowed issuer list",
                signature.issuer
            ));
        }
        None
    }
}

/// Verifies a detached signature over a file.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(
        &self,
        target: &Path,
        signature: &Signature,
        options: &SignatureOptions,
    ) -> Result<SignatureVerdict>;
}

/// [`SignatureVerifier`] backed by the cosign CLI.
#[derive(Debug, Clone)]
pub struct CosignVerifier {
    program: PathBuf,
    timeout: Duration,
}

impl CosignVerifier {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn arguments(target: &Path, signature: &Signature) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "verify-blob".into(),
            "--certificate-identity".into(),
            signature.identity.clone().into(),
            "--certificate-oidc-issuer".into(),
            signature.issuer.clone().into(),
        ];
        if let Some(bundle) = &signature.bundle {
            args.push("--bundle".into());
            args.push(resolve_bundle(target, bundle).into_os_string());
        }
        args.push(target.as_os_str().to_owned());
        args
    }
}

impl Default for CosignVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_VERIFIER, DEFAULT_SIGNATURE_TIMEOUT)
    }
}

#[async_trait]
impl SignatureVerifier for CosignVerifier {
    async fn verify(
        &self,
        target: &Path,
        signature: &Signature,
        options: &SignatureOptions,
    ) -> Result<SignatureVerdict> {
        if !SUPPORTED_KINDS.contains(&signature.kind.to_ascii_lowercase().as_str()) {
            return Ok(SignatureVerdict::rejected(format!(
                "unsupported signature type '{}'",
                signature.kind
            )));
        }
        if let Some(reason) = options.check(signature) {
            info!(target = %target.display(), %reason, "signature rejected by policy");
            return Ok(SignatureVerdict::rejected(reason));
        }

        let args = Self::arguments(target, signature);
        let output = match run_bounded(&self.program, &args, self.timeout, MAX_VERIFIER_OUTPUT).await {
            Ok(output) => output,
            Err(e) if e.is_not_found() => {
                return Err(TrustError::VerifierNotInstalled {
                    program: self.program.clone(),
                })
            }
            Err(RunError::Timeout { timeout, .. }) => {
                return Err(TrustError::VerifierTimeout {
                    program: self.program.clone(),
                    timeout,
                })
            }
            Err(e) => {
                warn!(program = %self.program.display(), error = %e, "signature verifier could not run");
                return Ok(SignatureVerdict::rejected(e.to_string()));
            }
        };

        let text = output.combined();
        let diagnostics = text.trim();
        if !output.status.success() {
            debug!(target = %target.display(), status = %output.status, "signature verification failed");
            let message = if diagnostics.is_empty() {
                format!("verifier exited with {}", output.status)
            } else {
                diagnostics.to_string()
            };
            return Ok(SignatureVerdict::rejected(message));
        }

        let identity = extract_identity(&text).unwrap_or_else(|| signature.identity.clone());
        if identity != signature.identity {
            return Ok(SignatureVerdict {
                verified: false,
                identity: Some(identity.clone()),
                error: Some(format!(
                    "certificate identity '{identity}' does not match expected '{}'",
                    signature.identity
                )),
            });
        }

        info!(target = %target.display(), %identity, "signature verified");
        Ok(SignatureVerdict::verified(identity))
    }
}

/// A relative bundle locator is resolved next to the binary.
pub fn resolve_bundle(target: &Path, bundle: &str) -> PathBuf {
    let path = Path::new(bundle);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    target
        .parent()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Pulls the certificate identity out of verifier output, if printed.
fn extract_identity(text: &str) -> Option<String> {
    const PREFIXES: &[&str] = &[
        "certificate identity:",
        "certificate subject:",
        "identity:",
        "subject:",
    ];
    text.lines().find_map(|line| {
        let trimmed = line.trim();
        let lower = trimmed.to_ascii_lowercase();
        PREFIXES.iter().find_map(|prefix| {
            lower
                .starts_with(prefix)
                .then(|| trimmed[prefix.len()..].trim().to_string())
                .filter(|v| !v.is_empty())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(bundle: Option<&str>) -> Signature {
        Signature {
            kind: "sigstore".to_string(),
            identity: "https://github.com/acme/deployctl/.github/workflows/release.yml@refs/tags/v2.4.1"
                .to_string(),
            issuer: "https://token.actions.githubusercontent.com".to_string(),
            bundle: bundle.map(str::to_string),
        }
    }

    #[test]
    fn test_arguments_order_and_bundle_resolution() {
        let args = CosignVerifier::arguments(Path::new("/opt/bin/deployctl"), &sig(Some("deployctl.bundle")));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[0], "verify-blob");
        assert_eq!(args[1], "--certificate-identity");
        assert_eq!(args[3], "--certificate-oidc-issuer");
        assert_eq!(args[5], "--bundle");
        assert_eq!(args[6], "/opt/bin/deployctl.bundle");
        assert_eq!(args[7], "/opt/bin/deployctl");
    }

    #[test]
    fn test_absolute_bundle_kept() {
        assert_eq!(
            resolve_bundle(Path::new("/opt/bin/x"), "/var/sig/x.bundle"),
            PathBuf::from("/var/sig/x.bundle")
        );
    }

    #[test]
    fn test_allow_lists() {
        let s = sig(None);
        assert!(SignatureOptions::default().check(&s).is_none());

        let only_other = SignatureOptions {
            allowed_identities: vec!["someone-else".to_string()],
            allowed_issuers: vec![],
        };
        assert!(only_other.check(&s).unwrap().contains("identity"));

        let issuer_only = SignatureOptions {
            allowed_identities: vec![],
            allowed_issuers: vec!["https://accounts.google.com".to_string()],
        };
        assert!(issuer_only.check(&s).unwrap().contains("issuer"));
    }

    #[test]
    fn test_extract_identity() {
        assert_eq!(
            extract_identity("tlog entry verified\nCertificate subject: dev@example.com\nVerified OK"),
            Some("dev@example.com".to_string())
        );
        assert_eq!(extract_identity("Verified OK"), None);
    }

    #[tokio::test]
    async fn test_missing_verifier_is_an_error() {
        let verifier = CosignVerifier::new("/nonexistent/cosign", Duration::from_secs(1));
        let err = verifier
            .verify(Path::new("/bin/sh"), &sig(None), &SignatureOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::VerifierNotInstalled { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_rejected_without_running() {
        let verifier = CosignVerifier::new("/nonexistent/cosign", Duration::from_secs(1));
        let mut s = sig(None);
        s.kind = "gpg".to_string();
        let verdict = verifier
            .verify(Path::new("/bin/sh"), &s, &SignatureOptions::default())
            .await
            .unwrap();
        assert!(!verdict.verified);
        assert!(verdict.error.unwrap().contains("gpg"));
    }
}
