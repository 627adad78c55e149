//! # Content Digests
//!
//! SHA-256 hashing for executables and capability documents. Binaries are
//! streamed through a fixed-size buffer so multi-hundred-megabyte tools never
//! need to fit in memory.
//!
//! ## Formats
//!
//! | Form | Example | Used for |
//! |------|---------|----------|
//! | raw | `[u8; 32]` | comparisons |
//! | hex | `9f86d0...` | attestation subjects |
//! | prefixed | `sha256:9f86d0...` | registry entries, declared checksums |
//!
//! Declared checksums are compared on the decoded bytes, so `SHA256:ABCD...`
//! and `abcd...` denote the same digest but any other difference is a mismatch.
//!
//! ## References
//!
//! - NIST FIPS 180-4 - Secure Hash Standard
//! - in-toto attestation framework, `DigestSet`

use crate::models::{CapabilityMetadata, Hash, HASH_SIZE};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size for streaming hashes.
const CHUNK_SIZE: usize = 64 * 1024;

/// Algorithm prefix used in `sha256:<hex>` strings.
pub const DIGEST_PREFIX: &str = "sha256:";

/// Hashes everything `reader` yields.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<Hash> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// Streams the file at `path` and returns its digest.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be opened or read.
pub fn hash_file<P: AsRef<Path>>(path: P) -> io::Result<Hash> {
    let file = File::open(path)?;
    hash_reader(file)
}

/// Hashes an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

/// Lowercase hex encoding of a digest.
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// `sha256:<hex>` encoding of a digest.
pub fn format_digest(hash: &Hash) -> String {
    format!("{DIGEST_PREFIX}{}", to_hex(hash))
}

/// Parses `sha256:<hex>` or bare hex into a digest.
///
/// The prefix is matched case-insensitively. Returns `None` for any other
/// algorithm, malformed hex, or a wrong length.
pub fn parse_digest(s: &str) -> Option<Hash> {
    let s = s.trim();
    let hex_part = match s.split_once(':') {
        Some((algo, rest)) if algo.eq_ignore_ascii_case("sha256") => rest,
        Some(_) => return None,
        None => s,
    };
    let bytes = hex::decode(hex_part).ok()?;
    if bytes.len() != HASH_SIZE {
        return None;
    }
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(&bytes);
    Some(hash)
}

/// True if `declared` parses to exactly `actual`.
pub fn digest_matches(declared: &str, actual: &Hash) -> bool {
    parse_digest(declared).is_some_and(|d| &d == actual)
}

/// Fingerprint of a capability document.
///
/// `serde_json` maps are key-sorted, so the fingerprint does not depend on
/// the key order the tool happened to print.
pub fn metadata_fingerprint(metadata: &CapabilityMetadata) -> Hash {
    match serde_json::to_value(metadata).and_then(|v| serde_json::to_vec(&v)) {
        Ok(bytes) => hash_bytes(&bytes),
        Err(_) => [0u8; HASH_SIZE],
    }
}
