//! # Provenance Verifier
//!
//! Fetches a SLSA build attestation and checks it describes the binary on
//! disk.
//!
//! ## Accepted Documents
//!
//! - a bare DSSE envelope: `{"payloadType", "payload", "signatures"}`
//! - a Sigstore bundle wrapping one under `dsseEnvelope`
//! - JSON Lines (`*.intoto.jsonl`), first non-empty line
//!
//! The payload is base64 (standard alphabet, URL-safe accepted) and decodes to
//! an in-toto statement.
//!
//! ## Checks
//!
//! 1. some `subject[].digest.sha256` equals the binary's digest
//! 2. the attested level is at least the configured minimum
//! 3. the attested builder matches the builder the tool declared, if any
//! 4. the attested builder is in the allow-list, if one is configured
//!
//! The level inside the attestation is authoritative; the level the tool
//! declares is only used when the attestation carries none.
//!
//! Envelope signatures are not checked here. DSSE signature validation is the
//! job of the external verifier, and the subject digest binds the statement to
//! the binary.

use crate::error::{Result, TrustError};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use toolguard_registry::digest::to_hex;
use toolguard_registry::{Hash, Provenance};
use tracing::{info, warn};

/// Default fetch timeout.
pub const DEFAULT_PROVENANCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Attestations larger than this are rejected.
pub const MAX_ATTESTATION_BYTES: usize = 16 * 1024 * 1024;

/// Outcome of a provenance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceVerdict {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slsa_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProvenanceVerdict {
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            verified: false,
            slsa_level: None,
            builder: None,
            error: Some(error.into()),
        }
    }
}

/// Caller policy for provenance checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceOptions {
    pub min_slsa_level: u8,
    /// If non-empty, the attested builder must be one of these.
    pub allowed_builders: Vec<String>,
    /// Raise fetch and parse failures instead of returning a failed verdict.
    pub hard_fail: bool,
    /// Permit `http://` attestation URLs. Only for local test servers.
    pub allow_http: bool,
}

impl Default for ProvenanceOptions {
    fn default() -> Self {
        Self {
            min_slsa_level: 1,
            allowed_builders: Vec::new(),
            hard_fail: false,
            allow_http: false,
        }
    }
}

/// Verifies build provenance for a binary with a known digest.
#[async_trait]
pub trait ProvenanceVerifier: Send + Sync {
    async fn verify(
        &self,
        binary: &Path,
        digest: &Hash,
        provenance: &Provenance,
        options: &ProvenanceOptions,
    ) -> Result<ProvenanceVerdict>;
}

/// Fetches attestations over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpProvenanceVerifier {
    client: reqwest::Client,
    max_body: usize,
}

impl HttpProvenanceVerifier {
    /// Builds a verifier whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("toolguard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            max_body: MAX_ATTESTATION_BYTES,
        })
    }

    /// Lowers (or raises) the attestation size cap.
    #[must_use]
    pub fn with_max_attestation_bytes(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }

    async fn fetch(&self, url: &str, options: &ProvenanceOptions) -> std::result::Result<Vec<u8>, String> {
        let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid attestation URL '{url}': {e}"))?;
        match parsed.scheme() {
            "https" => {}
            "http" if options.allow_http => {}
            other => return Err(format!("attestation URL must use https, got '{other}'")),
        }

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| format!("GET {url}: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("GET {url}: HTTP {status}"));
        }
        let too_large = || format!("attestation exceeds {} bytes", self.max_body);
        if response
            .content_length()
            .is_some_and(|len| len > self.max_body as u64)
        {
            return Err(too_large());
        }

        // Content-Length may be absent or wrong; enforce the cap while reading.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("reading {url}: {e}"))?
        {
            if body.len() + chunk.len() > self.max_body {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl ProvenanceVerifier for HttpProvenanceVerifier {
    async fn verify(
        &self,
        binary: &Path,
        digest: &Hash,
        provenance: &Provenance,
        options: &ProvenanceOptions,
    ) -> Result<ProvenanceVerdict> {
        let body = match self.fetch(&provenance.url, options).await {
            Ok(body) => body,
            Err(e) if options.hard_fail => return Err(TrustError::AttestationFetch(e)),
            Err(e) => {
                warn!(binary = %binary.display(), error = %e, "attestation fetch failed");
                return Ok(ProvenanceVerdict::rejected(e));
            }
        };

        let statement = match parse_attestation(&body) {
            Ok(statement) => statement,
            Err(e) if options.hard_fail => return Err(TrustError::AttestationParse(e)),
            Err(e) => {
                warn!(binary = %binary.display(), error = %e, "attestation parse failed");
                return Ok(ProvenanceVerdict::rejected(e));
            }
        };

        let verdict = check_statement(&statement, digest, provenance, options);
        if verdict.verified {
            info!(
                binary = %binary.display(),
                level = ?verdict.slsa_level,
                builder = verdict.builder.as_deref().unwrap_or("-"),
                "provenance verified"
            );
        }
        Ok(verdict)
    }
}

/// Decodes an attestation document into its in-toto statement.
pub fn parse_attestation(body: &[u8]) -> std::result::Result<Value, String> {
    let document: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(whole) => {
            // JSON Lines: one envelope per line.
            let text = std::str::from_utf8(body).map_err(|_| format!("attestation is not JSON: {whole}"))?;
            let line = text
                .lines()
                .find(|l| !l.trim().is_empty())
                .ok_or_else(|| "attestation is empty".to_string())?;
            serde_json::from_str(line).map_err(|e| format!("attestation is not JSON: {e}"))?
        }
    };

    let envelope = document.get("dsseEnvelope").unwrap_or(&document);
    let payload = envelope
        .get("payload")
        .and_then(Value::as_str)
        .ok_or_else(|| "envelope has no payload".to_string())?;
    if let Some(kind) = envelope.get("payloadType").and_then(Value::as_str) {
        if kind != "application/vnd.in-toto+json" {
            return Err(format!("unexpected payload type '{kind}'"));
        }
    }

    let decoded = decode_base64(payload)?;
    serde_json::from_slice(&decoded).map_err(|e| format!("payload is not a JSON statement: {e}"))
}

fn decode_base64(payload: &str) -> std::result::Result<Vec<u8>, String> {
    let payload = payload.trim();
    STANDARD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .or_else(|_| URL_SAFE_NO_PAD.decode(payload))
        .map_err(|e| format!("payload is not base64: {e}"))
}

/// Applies the subject, level and builder checks to a decoded statement.
pub fn check_statement(
    statement: &Value,
    digest: &Hash,
    declared: &Provenance,
    options: &ProvenanceOptions,
) -> ProvenanceVerdict {
    let expected = to_hex(digest);
    let subject_matches = statement
        .get("subject")
        .and_then(Value::as_array)
        .is_some_and(|subjects| {
            subjects.iter().any(|s| {
                s.pointer("/digest/sha256")
                    .and_then(Value::as_str)
                    .is_some_and(|d| d.eq_ignore_ascii_case(&expected))
            })
        });

    let builder = statement
        .pointer("/predicate/runDetails/builder/id")
        .or_else(|| statement.pointer("/predicate/builder/id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let level = match attested_level(statement) {
        Some(level) => {
            if level != declared.slsa_level {
                warn!(
                    declared = declared.slsa_level,
                    attested = level,
                    "attested SLSA level differs from declared level; using attested"
                );
            }
            level
        }
        None => declared.slsa_level,
    };

    let failure = if !subject_matches {
        Some(format!("no attestation subject matches sha256:{expected}"))
    } else if level < options.min_slsa_level {
        Some(format!(
            "SLSA level {level} is below required minimum {}",
            options.min_slsa_level
        ))
    } else if let (Some(claimed), Some(actual)) = (&declared.builder, &builder) {
        (claimed != actual)
            .then(|| format!("attested builder '{actual}' does not match declared '{claimed}'"))
    } else {
        None
    };
    let failure = failure.or_else(|| {
        if options.allowed_builders.is_empty() {
            return None;
        }
        match &builder {
            Some(b) if options.allowed_builders.contains(b) => None,
            Some(b) => Some(format!("builder '{b}' is not in the allowed builder list")),
            None => Some("attestation names no builder".to_string()),
        }
    });

    ProvenanceVerdict {
        verified: failure.is_none(),
        slsa_level: Some(level),
        builder,
        error: failure,
    }
}

/// Reads `predicate.slsaLevel`, as a number or a `SLSA_BUILD_LEVEL_N` string.
fn attested_level(statement: &Value) -> Option<u8> {
    let raw = statement
        .pointer("/predicate/slsaLevel")
        .or_else(|| statement.get("slsaLevel"))?;
    match raw {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(s) => s
            .rsplit(|c: char| !c.is_ascii_digit())
            .next()
            .and_then(|digits| digits.parse().ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolguard_registry::digest::hash_bytes;

    const BUILDER: &str = "https://github.com/slsa-framework/slsa-github-generator/.github/workflows/builder_go_slsa3.yml@refs/tags/v2.0.0";

    fn statement(digest: &Hash, level: Value) -> Value {
        json!({
            "_type": "https://in-toto.io/Statement/v1",
            "subject": [{ "name": "deployctl", "digest": { "sha256": to_hex(digest) } }],
            "predicateType": "https://slsa.dev/provenance/v1",
            "predicate": {
                "slsaLevel": level,
                "runDetails": { "builder": { "id": BUILDER } }
            }
        })
    }

    fn declared(level: u8) -> Provenance {
        Provenance {
            url: "https://example.test/deployctl.intoto.jsonl".to_string(),
            format: "slsa-provenance-v1".to_string(),
            slsa_level: level,
            builder: None,
        }
    }

    #[test]
    fn test_matching_statement_verifies() {
        let digest = hash_bytes(b"binary");
        let verdict = check_statement(&statement(&digest, json!(3)), &digest, &declared(3), &ProvenanceOptions::default());
        assert!(verdict.verified, "{:?}", verdict.error);
        assert_eq!(verdict.slsa_level, Some(3));
        assert_eq!(verdict.builder.as_deref(), Some(BUILDER));
    }

    #[test]
    fn test_subject_mismatch() {
        let digest = hash_bytes(b"binary");
        let other = hash_bytes(b"other");
        let verdict = check_statement(&statement(&other, json!(3)), &digest, &declared(3), &ProvenanceOptions::default());
        assert!(!verdict.verified);
        assert!(verdict.error.unwrap().contains("subject"));
    }

    #[test]
    fn test_attested_level_overrides_declared() {
        let digest = hash_bytes(b"binary");
        let options = ProvenanceOptions {
            min_slsa_level: 3,
            ..Default::default()
        };
        let verdict = check_statement(&statement(&digest, json!("SLSA_BUILD_LEVEL_2")), &digest, &declared(3), &options);
        assert!(!verdict.verified);
        assert_eq!(verdict.slsa_level, Some(2));
    }

    #[test]
    fn test_builder_allow_list() {
        let digest = hash_bytes(b"binary");
        let options = ProvenanceOptions {
            allowed_builders: vec!["https://example.test/trusted-builder".to_string()],
            ..Default::default()
        };
        let verdict = check_statement(&statement(&digest, json!(3)), &digest, &declared(3), &options);
        assert!(!verdict.verified);
        assert!(verdict.error.unwrap().contains("allowed builder"));
    }

    #[test]
    fn test_declared_builder_must_match() {
        let digest = hash_bytes(b"binary");
        let mut claim = declared(3);
        claim.builder = Some("https://example.test/other".to_string());
        let verdict = check_statement(&statement(&digest, json!(3)), &digest, &claim, &ProvenanceOptions::default());
        assert!(!verdict.verified);
    }

    #[test]
    fn test_parse_envelope_shapes() {
        let digest = hash_bytes(b"binary");
        let inner = statement(&digest, json!(2)).to_string();

        let bare = json!({
            "payloadType": "application/vnd.in-toto+json",
            "payload": STANDARD.encode(&inner),
            "signatures": [{ "sig": "AAAA" }]
        });
        assert_eq!(parse_attestation(bare.to_string().as_bytes()).unwrap()["predicate"]["slsaLevel"], 2);

        let bundle = json!({ "dsseEnvelope": { "payload": URL_SAFE_NO_PAD.encode(&inner), "signatures": [] } });
        assert!(parse_attestation(bundle.to_string().as_bytes()).is_ok());

        let jsonl = format!("{}\n{}\n", bare, bare);
        assert!(parse_attestation(jsonl.as_bytes()).is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_attestation(b"<html>nope</html>").is_err());
        assert!(parse_attestation(br#"{"payload": "%%%"}"#).is_err());
        assert!(parse_attestation(br#"{"signatures": []}"#).unwrap_err().contains("payload"));
    }
}
