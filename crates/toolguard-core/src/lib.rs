//! # Toolguard Core
//!
//! Unified discovery and trust facade for agent tools.
//! Orchestrates the Registry Store, the Scanner and the Trust Evaluator.
//!
//! ## Threat Coverage
//!
//! Toolguard sits between an autonomous agent and the executables on the
//! machine it runs on:
//!
//! | Layer | Component | Threats Blocked |
//! |-------|-----------|-----------------|
//! | Discovery | Scanner | Planted binaries in writable dirs, flag confusion, hung probes |
//! | State | Registry Store | Torn writes, path traversal through tool names |
//! | Trust | Trust Evaluator | Swapped binaries, forged signers, unattested builds |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       TOOLGUARD CORE                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │                    ┌─────────────────┐                          │
//! │                    │    Toolguard    │  ← Unified Facade        │
//! │                    └────────┬────────┘                          │
//! │                             │                                   │
//! │         ┌───────────────────┼───────────────────┐               │
//! │         ▼                   ▼                   ▼               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │   Scanner   │───▶│  Registry   │◀───│    Trust    │          │
//! │  │  (probing)  │    │   Store     │    │  Evaluator  │          │
//! │  └─────────────┘    └─────────────┘    └─────────────┘          │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use toolguard_core::{Recommendation, Toolguard, ToolguardConfig};
//!
//! # async fn run() -> toolguard_core::Result<()> {
//! let mut config = ToolguardConfig::default();
//! config.scan.safe_paths = vec!["/usr/local/bin".into()];
//!
//! let guard = Toolguard::new(config)?;
//! guard.scan(&[], &CancellationToken::new()).await?;
//!
//! for tool in guard.list()? {
//!     let trust = guard.evaluate(&tool.name).await?;
//!     if trust.recommendation == Recommendation::Block {
//!         eprintln!("{}: {}", tool.name, trust.reason);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Scan failures are per candidate and never abort the batch
//! - The registry is written once per batch, atomically
//! - A failed trust check lowers the level; only environment problems error
//! - A checksum mismatch is `COMPROMISED` no matter what else verifies
//!
//! ## References
//!
//! - Sigstore: <https://www.sigstore.dev/>
//! - SLSA: <https://slsa.dev/>
//! - XDG Base Directory Specification

mod config;
mod error;
mod toolguard;

pub use config::{PathsConfig, ScanConfig, ToolguardConfig, TrustConfig};
pub use error::ToolguardError;
pub use toolguard::{ClearReport, ToolInfo, Toolguard};

// Re-export component types for convenience
pub use toolguard_discovery::{
    CandidateStatus, FailureKind, ScanEvent, ScanFailure, ScanPhase, ScanProgress, ScanResult,
    ToolDetail, ToolStatus,
};
pub use toolguard_registry::{
    CapabilityMetadata, DriftLevel, DriftReport, Recommendation, RegistryEntry, TrustBlock,
    TrustLevel, TrustSummary,
};
pub use toolguard_trust::{TrustEvaluationResult, TrustEvaluator};

/// Core result type for Toolguard operations.
pub type Result<T> = std::result::Result<T, ToolguardError>;
