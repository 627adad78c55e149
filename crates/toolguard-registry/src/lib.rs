//! # Toolguard Registry - Durable Tool Index
//!
//! The registry records every capability-aware tool the scanner has found:
//! where it lives, what version it declared, when it was last probed, and the
//! last trust verdict shown for it. Alongside it, a metadata cache keeps the
//! full capability document each tool emitted.
//!
//! ## Purpose
//!
//! 1. **Data Model** - [`RegistryEntry`], [`Registry`], [`CapabilityMetadata`]
//!    with its recursive command tree, and the [`TrustBlock`] claims a tool
//!    makes about itself.
//!
//! 2. **Atomic Persistence** - [`FileStore`] writes the registry and cache files
//!    via temp-file-then-rename, so a crash never corrupts durable state.
//!
//! 3. **Content Digests** - streaming SHA-256 of executables ([`digest`]).
//!
//! 4. **Drift Detection** - categorized differences between the cached and the
//!    freshly probed capability document ([`drift`]).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       TOOL REGISTRY                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────────┐          ┌──────────────────────────┐  │
//! │  │     Registry     │  load    │      RegistryStore       │  │
//! │  │  (plain value)   │◀────────▶│                          │  │
//! │  │                  │  save    │  FileStore   MemoryStore │  │
//! │  │ • unique names   │          │  • registry.json         │  │
//! │  │ • absolute paths │          │  • metadata/<name>.json  │  │
//! │  └──────────────────┘          └──────────────────────────┘  │
//! │                                                              │
//! │  ┌──────────────────┐          ┌──────────────────────────┐  │
//! │  │   Hash Engine    │          │     Drift Detector       │  │
//! │  │  streaming SHA-256│         │  None/Minor/Major/Crit.  │  │
//! │  └──────────────────┘          └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## On-Disk Format
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "lastScan": "2026-10-16T09:12:44.120Z",
//!   "tools": [
//!     {
//!       "name": "deployctl",
//!       "version": "2.4.1",
//!       "path": "/usr/local/bin/deployctl",
//!       "source": "native",
//!       "discoveredAt": "2026-09-01T10:00:00Z",
//!       "lastVerified": "2026-10-16T09:12:43Z",
//!       "mtime": "2026-08-30T17:21:08.551Z",
//!       "digest": "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
//!       "metadataFile": "/home/me/.cache/toolguard/metadata/deployctl.json"
//!     }
//!   ]
//! }
//! ```
//!
//! Unknown top-level keys (and unknown per-entry keys) are preserved verbatim.
//!
//! ## Usage
//!
//! ```rust
//! use toolguard_registry::{MemoryStore, RegistryStore};
//!
//! let store = MemoryStore::new();
//! let mut registry = store.load().unwrap();
//! registry.mark_scanned(chrono::Utc::now());
//! store.save(&registry).unwrap();
//! assert!(store.load().unwrap().last_scan.is_some());
//! ```
//!
//! ## Security Considerations
//!
//! - **Hash Algorithm**: SHA-256, 128-bit collision resistance.
//! - **Untrusted Names**: tool names originate in tool output and are validated
//!   before touching the filesystem.
//! - **Time-of-Check to Time-of-Use**: a cached digest is display data only;
//!   trust decisions always rehash the binary.
//!
//! ## References
//!
//! - NIST FIPS 180-4 - Secure Hash Standard
//! - SLSA v1.0 - Supply-chain Levels for Software Artifacts <https://slsa.dev/spec/v1.0/>

pub mod digest;
pub mod drift;
pub mod models;
pub mod registry;
pub mod storage;

pub use models::{
    ArgumentSpec, CapabilityMetadata, CommandNode, DriftLevel, DriftReport, Effects,
    FilesystemAccess, Hash, Integrity, OptionSpec, Provenance, Recommendation, Registry,
    RegistryEntry, RegistryError, Result, Signature, SourceKind, TrustBlock, TrustLevel,
    TrustSummary,
};
pub use registry::Upsert;
pub use storage::{FileStore, MemoryStore, RegistryStore};

#[cfg(test)]
mod tests;
