//! # Toolguard Discovery
//!
//! Finds capability-aware executables on a machine without trusting them.
//!
//! ## Threat Model
//!
//! Everything on `PATH` is potentially hostile to the agent that will later
//! call it. Discovery defends against:
//!
//! - **Planted binaries** in writable or foreign-owned directories
//!   ([`check_path`] runs before any directory is listed).
//! - **Unexpected flags**: an executable only ever sees `--help`, and sees
//!   `--agent` only if its help text documented it ([`Prober`]).
//! - **Hanging or flooding tools**: every subprocess is deadline-bound, output
//!   is capped, and the process group is killed on expiry ([`process`]).
//! - **Partial state**: one registry write per batch, atomically
//!   ([`Scanner::scan`]).
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`check_path`] | Directory safety predicate |
//! | [`enumerate()`] | Executable listing with PATH shadowing |
//! | [`SkipList`] | Exact-name and glob exclusions |
//! | [`Prober`] | Two-phase capability probe |
//! | [`Scanner`] | Bounded-parallel batch discovery |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use tokio_util::sync::CancellationToken;
//! use toolguard_discovery::{ScanOptions, Scanner};
//! use toolguard_registry::MemoryStore;
//!
//! # async fn run() -> Result<(), toolguard_discovery::DiscoveryError> {
//! let scanner = Scanner::new(ScanOptions::new().with_parallelism(2))?;
//! let store = MemoryStore::new();
//! let result = scanner
//!     .scan(&[PathBuf::from("/usr/local/bin")], &store, &CancellationToken::new())
//!     .await?;
//! println!("{} discovered, {} failed", result.discovered, result.failed);
//! # Ok(())
//! # }
//! ```

pub mod enumerate;
mod error;
pub mod probe;
pub mod process;
mod progress;
pub mod safety;
pub mod scanner;
pub mod schema;
mod skiplist;

pub use enumerate::{classify, enumerate, Candidate, Enumeration};
pub use error::{DiscoveryError, ProbeError, Result};
pub use probe::{ProbeConfig, ProbeOutcome, Prober, AGENT_FLAG, HELP_FLAG};
pub use process::{run_bounded, CapturedOutput, RunError};
pub use progress::{CandidateStatus, NoProgress, ScanEvent, ScanPhase, ScanProgress};
pub use safety::{check_path, PathSafety};
pub use scanner::{
    FailureKind, ScanFailure, ScanOptions, ScanResult, Scanner, ToolDetail, ToolStatus,
    DEFAULT_PARALLELISM,
};
pub use schema::{capability_schema, CapabilitySchema, SchemaValidator, Validation};
pub use skiplist::SkipList;
