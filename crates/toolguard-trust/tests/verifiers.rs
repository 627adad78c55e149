//! # Verifier Integration Tests
//!
//! The cosign verifier runs against a shell stand-in for the real CLI; the
//! provenance verifier fetches attestations from a local wiremock server.

#![cfg(unix)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use toolguard_registry::digest::{format_digest, hash_bytes};
use toolguard_registry::{Integrity, Provenance, Signature, TrustBlock};
use toolguard_trust::{
    CosignVerifier, HttpProvenanceVerifier, ProvenanceOptions, ProvenanceVerifier,
    SignatureOptions, SignatureVerifier, TrustError, TrustEvaluator, TrustLevel, TrustOptions,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BINARY: &[u8] = b"#!/bin/sh\necho deployctl\n";
const IDENTITY: &str = "https://github.com/acme/deployctl/.github/workflows/release.yml@refs/tags/v2.4.1";
const ISSUER: &str = "https://token.actions.githubusercontent.com";
const BUILDER: &str = "https://github.com/slsa-framework/slsa-github-generator/.github/workflows/generator_generic_slsa3.yml@refs/tags/v2.0.0";

// ============================================================================
// Fixtures
// ============================================================================

fn write_binary(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("deployctl");
    std::fs::write(&path, BINARY).unwrap();
    path
}

/// Installs a fake cosign that records its arguments and runs `body`.
fn fake_cosign(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("cosign");
    let script = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > \"{}\"\n{body}\n",
        dir.path().join("cosign.args").display()
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn recorded_args(dir: &TempDir) -> Vec<String> {
    std::fs::read_to_string(dir.path().join("cosign.args"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn signature() -> Signature {
    Signature {
        kind: "sigstore".to_string(),
        identity: IDENTITY.to_string(),
        issuer: ISSUER.to_string(),
        bundle: Some("deployctl.sigstore.json".to_string()),
    }
}

fn provenance(url: String) -> Provenance {
    Provenance {
        url,
        format: "slsa-provenance-v1".to_string(),
        slsa_level: 3,
        builder: None,
    }
}

/// A JSON Lines attestation wrapping a statement about `subject`.
fn attestation(subject: &[u8], level: u8) -> String {
    let statement = json!({
        "_type": "https://in-toto.io/Statement/v1",
        "subject": [{
            "name": "deployctl",
            "digest": { "sha256": toolguard_registry::digest::to_hex(&hash_bytes(subject)) }
        }],
        "predicateType": "https://slsa.dev/provenance/v1",
        "predicate": {
            "slsaLevel": level,
            "runDetails": { "builder": { "id": BUILDER } }
        }
    });
    let envelope = json!({
        "dsseEnvelope": {
            "payloadType": "application/vnd.in-toto+json",
            "payload": STANDARD.encode(statement.to_string()),
            "signatures": [{ "sig": "MEUCIQ" }]
        }
    });
    format!("{envelope}\n")
}

async fn serve(body: String, status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/deployctl.intoto.jsonl"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

/// Serves one chunked response without a Content-Length header and returns
/// its URL.
async fn serve_chunked(chunks: usize, chunk_len: usize) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        if socket.write_all(head).await.is_err() {
            return;
        }
        let mut frame = format!("{chunk_len:x}\r\n").into_bytes();
        frame.extend(std::iter::repeat(b' ').take(chunk_len));
        frame.extend_from_slice(b"\r\n");
        for _ in 0..chunks {
            // The client hangs up once the cap is hit.
            if socket.write_all(&frame).await.is_err() {
                return;
            }
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
    });
    format!("http://{addr}/deployctl.intoto.jsonl")
}

fn attestation_url(server: &MockServer) -> String {
    format!("{}/deployctl.intoto.jsonl", server.uri())
}

fn local_options() -> ProvenanceOptions {
    ProvenanceOptions {
        allow_http: true,
        ..ProvenanceOptions::default()
    }
}

// ============================================================================
// Cosign Verifier
// ============================================================================

#[tokio::test]
async fn test_cosign_success_passes_identity_issuer_and_bundle() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let cosign = fake_cosign(&dir, "echo 'Verified OK' >&2\nexit 0");

    let verifier = CosignVerifier::new(cosign, Duration::from_secs(5));
    let verdict = verifier
        .verify(&binary, &signature(), &SignatureOptions::default())
        .await
        .unwrap();

    assert!(verdict.verified, "{verdict:?}");
    assert_eq!(verdict.identity.as_deref(), Some(IDENTITY));

    let args = recorded_args(&dir);
    assert_eq!(args[0], "verify-blob");
    assert!(args.windows(2).any(|w| w[0] == "--certificate-identity" && w[1] == IDENTITY));
    assert!(args.windows(2).any(|w| w[0] == "--certificate-oidc-issuer" && w[1] == ISSUER));
    let bundle = dir.path().join("deployctl.sigstore.json");
    assert!(args
        .windows(2)
        .any(|w| w[0] == "--bundle" && Path::new(&w[1]) == bundle));
    assert_eq!(args.last().map(String::as_str), binary.to_str());
}

#[tokio::test]
async fn test_cosign_failure_is_a_rejected_verdict() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let cosign = fake_cosign(&dir, "echo 'Error: none of the expected identities matched' >&2\nexit 1");

    let verifier = CosignVerifier::new(cosign, Duration::from_secs(5));
    let verdict = verifier
        .verify(&binary, &signature(), &SignatureOptions::default())
        .await
        .unwrap();

    assert!(!verdict.verified);
    assert!(verdict.error.unwrap().contains("expected identities"));
}

#[tokio::test]
async fn test_cosign_reporting_a_different_identity_is_rejected() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let cosign = fake_cosign(
        &dir,
        "echo 'Certificate subject: https://github.com/mallory/fork/.github/workflows/release.yml@refs/heads/main'\nexit 0",
    );

    let verifier = CosignVerifier::new(cosign, Duration::from_secs(5));
    let verdict = verifier
        .verify(&binary, &signature(), &SignatureOptions::default())
        .await
        .unwrap();

    assert!(!verdict.verified);
    assert!(verdict.identity.unwrap().contains("mallory"));
}

#[tokio::test]
async fn test_disallowed_issuer_never_invokes_cosign() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let cosign = fake_cosign(&dir, "exit 0");

    let options = SignatureOptions {
        allowed_identities: Vec::new(),
        allowed_issuers: vec!["https://accounts.google.com".to_string()],
    };
    let verdict = CosignVerifier::new(cosign, Duration::from_secs(5))
        .verify(&binary, &signature(), &options)
        .await
        .unwrap();

    assert!(!verdict.verified);
    assert!(recorded_args(&dir).is_empty());
}

#[tokio::test]
async fn test_missing_cosign_is_an_error() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);

    let err = CosignVerifier::new(dir.path().join("no-cosign"), Duration::from_secs(5))
        .verify(&binary, &signature(), &SignatureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::VerifierNotInstalled { .. }));
}

#[tokio::test]
async fn test_cosign_that_cannot_be_spawned_is_a_rejected_verdict() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let cosign = fake_cosign(&dir, "exit 0");
    std::fs::set_permissions(&cosign, std::fs::Permissions::from_mode(0o644)).unwrap();

    let verdict = CosignVerifier::new(cosign, Duration::from_secs(5))
        .verify(&binary, &signature(), &SignatureOptions::default())
        .await
        .unwrap();

    assert!(!verdict.verified);
    assert!(verdict.error.unwrap().contains("failed to spawn"));
    assert!(recorded_args(&dir).is_empty());
}

#[tokio::test]
async fn test_hanging_cosign_times_out() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let cosign = fake_cosign(&dir, "sleep 30");

    let err = CosignVerifier::new(cosign, Duration::from_millis(300))
        .verify(&binary, &signature(), &SignatureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::VerifierTimeout { .. }));
}

// ============================================================================
// HTTP Provenance Verifier
// ============================================================================

#[tokio::test]
async fn test_attestation_over_local_server_verifies() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let server = serve(attestation(BINARY, 3), 200).await;

    let verifier = HttpProvenanceVerifier::new(Duration::from_secs(5)).unwrap();
    let verdict = verifier
        .verify(
            &binary,
            &hash_bytes(BINARY),
            &provenance(attestation_url(&server)),
            &local_options(),
        )
        .await
        .unwrap();

    assert!(verdict.verified, "{verdict:?}");
    assert_eq!(verdict.slsa_level, Some(3));
    assert_eq!(verdict.builder.as_deref(), Some(BUILDER));
}

#[tokio::test]
async fn test_attestation_for_other_artifact_is_rejected() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let server = serve(attestation(b"some other build", 3), 200).await;

    let verdict = HttpProvenanceVerifier::new(Duration::from_secs(5))
        .unwrap()
        .verify(
            &binary,
            &hash_bytes(BINARY),
            &provenance(attestation_url(&server)),
            &local_options(),
        )
        .await
        .unwrap();

    assert!(!verdict.verified);
    assert!(verdict.error.unwrap().contains("subject"));
}

#[tokio::test]
async fn test_missing_attestation_soft_fails() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let server = serve(String::new(), 404).await;

    let verdict = HttpProvenanceVerifier::new(Duration::from_secs(5))
        .unwrap()
        .verify(
            &binary,
            &hash_bytes(BINARY),
            &provenance(attestation_url(&server)),
            &local_options(),
        )
        .await
        .unwrap();

    assert!(!verdict.verified);
    assert!(verdict.error.unwrap().contains("404"));
}

#[tokio::test]
async fn test_missing_attestation_hard_fails_on_request() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let server = serve(String::new(), 404).await;

    let options = ProvenanceOptions {
        hard_fail: true,
        ..local_options()
    };
    let err = HttpProvenanceVerifier::new(Duration::from_secs(5))
        .unwrap()
        .verify(
            &binary,
            &hash_bytes(BINARY),
            &provenance(attestation_url(&server)),
            &options,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::AttestationFetch(_)));
}

#[tokio::test]
async fn test_garbage_attestation_hard_fails_as_parse_error() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let server = serve("<html>not found</html>".to_string(), 200).await;

    let options = ProvenanceOptions {
        hard_fail: true,
        ..local_options()
    };
    let err = HttpProvenanceVerifier::new(Duration::from_secs(5))
        .unwrap()
        .verify(
            &binary,
            &hash_bytes(BINARY),
            &provenance(attestation_url(&server)),
            &options,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::AttestationParse(_)));
}

#[tokio::test]
async fn test_plain_http_refused_without_opt_in() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let server = serve(attestation(BINARY, 3), 200).await;

    let verdict = HttpProvenanceVerifier::new(Duration::from_secs(5))
        .unwrap()
        .verify(
            &binary,
            &hash_bytes(BINARY),
            &provenance(attestation_url(&server)),
            &ProvenanceOptions::default(),
        )
        .await
        .unwrap();

    assert!(!verdict.verified);
    assert!(verdict.error.unwrap().contains("https"));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_oversized_attestation_without_length_is_cut_off() {
    // Threat: endless chunked body exhausting memory
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let url = serve_chunked(64, 256).await;

    let verdict = HttpProvenanceVerifier::new(Duration::from_secs(5))
        .unwrap()
        .with_max_attestation_bytes(1024)
        .verify(&binary, &hash_bytes(BINARY), &provenance(url), &local_options())
        .await
        .unwrap();

    assert!(!verdict.verified);
    assert!(verdict.error.unwrap().contains("exceeds 1024 bytes"));
}

// ============================================================================
// End to End
// ============================================================================

#[tokio::test]
async fn test_signed_and_attested_binary_is_verified() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let cosign = fake_cosign(&dir, "exit 0");
    let server = serve(attestation(BINARY, 2), 200).await;

    let trust = TrustBlock {
        source: Some("github:acme/deployctl".to_string()),
        verified: false,
        integrity: Some(Integrity {
            checksum: Some(format_digest(&hash_bytes(BINARY))),
            signature: Some(signature()),
        }),
        provenance: Some(provenance(attestation_url(&server))),
    };
    let mut options = TrustOptions::new().with_min_slsa_level(2);
    options.provenance.allow_http = true;

    let evaluator =
        TrustEvaluator::with_verifier(cosign, Duration::from_secs(5), Duration::from_secs(5))
            .unwrap();
    let result = evaluator.evaluate(&binary, Some(&trust), &options).await.unwrap();

    assert_eq!(result.level, TrustLevel::Verified, "{}", result.reason);
    assert_eq!(result.checks.provenance.unwrap().slsa_level, Some(2));
}

#[tokio::test]
async fn test_attested_level_below_minimum_is_provenance_fail() {
    let dir = TempDir::new().unwrap();
    let binary = write_binary(&dir);
    let cosign = fake_cosign(&dir, "exit 0");
    let server = serve(attestation(BINARY, 1), 200).await;

    let trust = TrustBlock {
        source: None,
        verified: false,
        integrity: Some(Integrity {
            checksum: None,
            signature: Some(signature()),
        }),
        provenance: Some(provenance(attestation_url(&server))),
    };
    let mut options = TrustOptions::new().with_min_slsa_level(3);
    options.provenance.allow_http = true;

    let evaluator =
        TrustEvaluator::with_verifier(cosign, Duration::from_secs(5), Duration::from_secs(5))
            .unwrap();
    let result = evaluator.evaluate(&binary, Some(&trust), &options).await.unwrap();

    assert_eq!(result.level, TrustLevel::ProvenanceFail);
    assert!(result.reason.contains("below required minimum"));
}
