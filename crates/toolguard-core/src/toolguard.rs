//! The unified Toolguard facade.
//!
//! [`Toolguard`] ties the registry store, the scanner and the trust evaluator
//! together behind the operations a CLI or agent runtime needs: scan, list,
//! get, refresh, clear and evaluate.

use crate::{config::ToolguardConfig, error::ToolguardError, Result};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolguard_discovery::{ScanProgress, ScanResult, Scanner};
use toolguard_registry::{
    CapabilityMetadata, FileStore, RegistryEntry, RegistryStore, TrustBlock,
};
use toolguard_trust::{TrustEvaluationResult, TrustEvaluator, TrustOptions};

use tracing::{debug, info, warn};

/// A registered tool together with its cached capability document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub entry: RegistryEntry,
    /// `None` if the cache file was deleted out from under the registry.
    pub metadata: Option<CapabilityMetadata>,
}

/// What [`Toolguard::clear`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub tools: usize,
    pub metadata_files: usize,
}

/// The unified Toolguard facade.
///
/// # Security Model
///
/// - Discovery never runs anything in an unsafe root and never passes an
///   executable more than `--help` or `--agent`.
/// - Evaluation rehashes the binary on every call; the cached trust summary
///   in the registry is for display only.
///
/// # Example
///
/// ```rust,no_run
/// use tokio_util::sync::CancellationToken;
/// use toolguard_core::{Toolguard, ToolguardConfig};
///
/// # async fn run() -> toolguard_core::Result<()> {
/// let guard = Toolguard::new(ToolguardConfig::default())?;
/// let scan = guard
///     .scan(&["/usr/local/bin".into()], &CancellationToken::new())
///     .await?;
/// println!("{} discovered, {} failed", scan.discovered, scan.failed);
///
/// let trust = guard.evaluate("deployctl").await?;
/// println!("{}: {}", trust.level, trust.reason);
/// # Ok(())
/// # }
/// ```
pub struct Toolguard {
    /// Configuration.
    config: ToolguardConfig,

    /// Registry and metadata cache.
    store: Arc<dyn RegistryStore>,

    /// Discovery pipeline.
    scanner: Scanner,

    /// Trust pipeline.
    evaluator: TrustEvaluator,

    /// Resolved once from `config.trust`.
    trust_options: TrustOptions,
}

impl Toolguard {
    /// Creates a facade over the file-backed store named in `config.paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration fails [`ToolguardConfig::validate`]
    /// - A skip pattern does not compile
    /// - The HTTP client for attestation fetches cannot be built
    pub fn new(config: ToolguardConfig) -> Result<Self> {
        let store = FileStore::new(&config.paths.registry_file, &config.paths.cache_dir);
        Self::with_store(config, Arc::new(store))
    }

    /// Creates a facade over an explicit store (e.g. a
    /// [`MemoryStore`](toolguard_registry::MemoryStore)).
    pub fn with_store(config: ToolguardConfig, store: Arc<dyn RegistryStore>) -> Result<Self> {
        config.validate()?;
        let scanner = Scanner::new(config.scan.to_options())?;
        let evaluator = TrustEvaluator::with_verifier(
            config.trust.verifier_program.clone(),
            config.trust.signature_timeout(),
            config.trust.provenance_timeout(),
        )?;
        let trust_options = config.trust.to_options();

        info!(
            registry = %config.paths.registry_file.display(),
            parallelism = config.scan.parallelism,
            "Toolguard initialized"
        );

        Ok(Self {
            config,
            store,
            scanner,
            evaluator,
            trust_options,
        })
    }

    /// Replaces the trust evaluator, e.g. with custom verifiers.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: TrustEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Installs a scan progress observer.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ScanProgress>) -> Self {
        self.scanner = self.scanner.with_progress(progress);
        self
    }

    pub fn config(&self) -> &ToolguardConfig {
        &self.config
    }

    /// Scans `roots`, or the configured safe paths when `roots` is empty.
    ///
    /// # Errors
    ///
    /// Only whole-batch failures: the registry cannot be loaded or saved.
    pub async fn scan(&self, roots: &[PathBuf], cancel: &CancellationToken) -> Result<ScanResult> {
        let roots = if roots.is_empty() {
            self.config.scan.safe_paths.as_slice()
        } else {
            roots
        };
        if roots.is_empty() {
            warn!("scan requested with no roots");
        }
        Ok(self.scanner.scan(roots, self.store.as_ref(), cancel).await?)
    }

    /// Every registered tool, ordered by name.
    pub fn list(&self) -> Result<Vec<RegistryEntry>> {
        let mut tools = self.store.load()?.tools;
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    /// One registered tool and its cached capability document.
    ///
    /// # Errors
    ///
    /// [`ToolguardError::NotFound`] if `name` is not registered.
    pub fn get(&self, name: &str) -> Result<ToolInfo> {
        let registry = self.store.load()?;
        let entry = registry
            .get(name)
            .cloned()
            .ok_or_else(|| ToolguardError::NotFound(name.to_string()))?;
        let metadata = self.store.read_metadata(name)?;
        if metadata.is_none() {
            debug!(tool = name, "no cached metadata for registered tool");
        }
        Ok(ToolInfo { entry, metadata })
    }

    /// Re-probes one tool, or all of them with `None`.
    ///
    /// # Errors
    ///
    /// [`ToolguardError::NotFound`] if `name` is not registered.
    pub async fn refresh(&self, name: Option<&str>, cancel: &CancellationToken) -> Result<ScanResult> {
        let names = name.map(|n| vec![n.to_string()]);
        Ok(self
            .scanner
            .refresh(names.as_deref(), self.store.as_ref(), cancel)
            .await?)
    }

    /// Empties the registry and deletes every cached document.
    pub fn clear(&self) -> Result<ClearReport> {
        let mut registry = self.store.load()?;
        let tools = registry.len();
        registry.clear();
        self.store.save(&registry)?;
        let metadata_files = self.store.clear_metadata()?;
        info!(tools, metadata_files, "registry cleared");
        Ok(ClearReport {
            tools,
            metadata_files,
        })
    }

    /// Evaluates a registered tool against the trust block it declared.
    ///
    /// The summary is cached on the entry and `lastVerified` is bumped. If the
    /// entry disappeared or moved while the evaluation ran, the result is
    /// still returned but nothing is cached.
    ///
    /// # Errors
    ///
    /// [`ToolguardError::NotFound`] for unknown names; environment problems
    /// (unreadable binary, missing verifier) from the evaluator; registry
    /// load/save failures.
    pub async fn evaluate(&self, name: &str) -> Result<TrustEvaluationResult> {
        let info = self.get(name)?;
        let trust = info.metadata.as_ref().and_then(|m| m.trust.as_ref());
        let result = self
            .evaluator
            .evaluate(&info.entry.path, trust, &self.trust_options)
            .await?;

        let mut registry = self.store.load()?;
        match registry.get_mut(name) {
            Some(entry) if entry.path == info.entry.path => {
                entry.trust = Some(result.summary());
                entry.last_verified = result.evaluated_at;
                self.store.save(&registry)?;
            }
            _ => warn!(tool = name, "entry changed during evaluation; summary not cached"),
        }
        Ok(result)
    }

    /// Evaluates an arbitrary binary. Nothing is read from or written to the
    /// registry.
    pub async fn evaluate_binary(
        &self,
        binary: &Path,
        trust: Option<&TrustBlock>,
    ) -> Result<TrustEvaluationResult> {
        Ok(self
            .evaluator
            .evaluate(binary, trust, &self.trust_options)
            .await?)
    }
}
