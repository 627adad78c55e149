//! # Scanner
//!
//! Turns a set of root directories into registry updates.
//!
//! ## Pipeline
//!
//! ```text
//! roots ──▶ Path Safety ──▶ Enumerate ──▶ Skip-list ──▶ Incremental filter
//!                                                             │
//!                           ┌─────────────────────────────────┘
//!                           ▼
//!              ┌────────────────────────┐
//!              │ bounded worker pool    │  Semaphore(parallelism)
//!              │ probe ─▶ hash          │  per-candidate deadline
//!              └───────────┬────────────┘
//!                          ▼
//!        aggregate in enumeration order (deterministic)
//!          upsert entries, write metadata cache, collect failures
//!                          ▼
//!                 one registry save per batch
//! ```
//!
//! ## Counting
//!
//! Every executable the enumerator yields lands in exactly one of
//! `discovered`, `updated`, `failed`, `skipped`. Shadowed names, skip-list hits,
//! unchanged files in incremental mode, tools that are not capability-aware,
//! and candidates never started because of cancellation are `skipped`.
//!
//! ## Cancellation
//!
//! When the [`CancellationToken`] fires, candidates waiting for a worker slot
//! are counted as skipped, in-flight probes are abandoned (their process
//! groups killed) and recorded as `Cancelled` failures. Completed probes are
//! kept, and [`Scanner::scan`] still saves the registry.

use crate::enumerate::{classify, enumerate, unsafe_reason, Candidate};
use crate::error::{DiscoveryError, ProbeError, Result};
use crate::probe::{ProbeConfig, ProbeOutcome, Prober};
use crate::progress::{notify, CandidateStatus, NoProgress, ScanEvent, ScanPhase, ScanProgress};
use crate::safety::check_path;
use crate::schema::SchemaValidator;
use crate::skiplist::SkipList;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use toolguard_registry::digest::{format_digest, hash_file};
use toolguard_registry::drift::{detect_drift, new_tool_report};
use toolguard_registry::models::is_valid_tool_name;
use toolguard_registry::{
    DriftReport, Registry, RegistryEntry, RegistryError, RegistryStore,
    SourceKind, Upsert,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default worker count.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Scan behavior.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum concurrent probes. Zero is treated as one.
    pub parallelism: usize,
    /// Skip executables whose registered mtime is unchanged.
    pub incremental: bool,
    /// Exact names or globs to never probe.
    pub skip: Vec<String>,
    pub probe: ProbeConfig,
}

impl ScanOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            incremental: true,
            skip: Vec::new(),
            probe: ProbeConfig::new(),
        }
    }

    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    #[must_use]
    pub fn with_skip<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip = patterns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a candidate failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Timeout,
    InvalidJson,
    SchemaInvalid,
    OutputTooLarge,
    Execution,
    /// The document declared an empty name.
    MissingName,
    /// The declared name is not usable as a cache key.
    InvalidName,
    /// An earlier candidate in the same batch declared this name.
    DuplicateName,
    Cache,
    Registry,
    Cancelled,
    /// The worker task died.
    Panicked,
}

impl From<&ProbeError> for FailureKind {
    fn from(e: &ProbeError) -> Self {
        match e {
            ProbeError::Timeout(_) => Self::Timeout,
            ProbeError::InvalidJson(_) => Self::InvalidJson,
            ProbeError::SchemaInvalid(_) => Self::SchemaInvalid,
            ProbeError::OutputTooLarge(_) => Self::OutputTooLarge,
            ProbeError::Execution(_) => Self::Execution,
        }
    }
}

/// A per-candidate failure. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Discovered,
    Updated,
}

/// One tool added or updated by the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDetail {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub source: SourceKind,
    pub status: ToolStatus,
    /// Commands declared at every depth.
    pub commands: usize,
    /// Always present for new tools; for updates, only when the previous
    /// metadata was cached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftReport>,
}

/// Outcome of one scan or refresh batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovered: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Entries pruned from the registry.
    pub removed: usize,
    pub cancelled: bool,
    pub tools: Vec<ToolDetail>,
    pub errors: Vec<ScanFailure>,
    pub warnings: Vec<String>,
}

impl ScanResult {
    fn new(scan_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            scan_id,
            started_at: now,
            finished_at: now,
            discovered: 0,
            updated: 0,
            failed: 0,
            skipped: 0,
            removed: 0,
            cancelled: false,
            tools: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchMode {
    Scan,
    Refresh,
}

enum WorkerOutcome {
    Probed {
        outcome: ProbeOutcome,
        digest: Option<String>,
    },
    Failed(FailureKind, String),
    /// Cancelled before acquiring a worker slot.
    NotStarted,
    /// Cancelled while probing.
    Abandoned,
}

/// Orchestrates discovery over a registry.
pub struct Scanner {
    options: ScanOptions,
    prober: Arc<Prober>,
    skip: SkipList,
    progress: Arc<dyn ScanProgress>,
}

impl Scanner {
    /// Creates a scanner with the built-in capability schema.
    ///
    /// # Errors
    ///
    /// Fails if a skip pattern does not compile.
    pub fn new(options: ScanOptions) -> Result<Self> {
        let prober = Prober::new(options.probe)?;
        Self::build(options, prober)
    }

    /// Creates a scanner that validates documents with `validator`.
    pub fn with_validator(options: ScanOptions, validator: Arc<dyn SchemaValidator>) -> Result<Self> {
        let prober = Prober::with_validator(options.probe, validator)?;
        Self::build(options, prober)
    }

    fn build(options: ScanOptions, prober: Prober) -> Result<Self> {
        let skip = SkipList::new(&options.skip)?;
        Ok(Self {
            options,
            prober: Arc::new(prober),
            skip,
            progress: Arc::new(NoProgress),
        })
    }

    /// Installs a progress observer.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ScanProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Loads the registry from `store`, scans `roots`, and saves it once.
    ///
    /// # Errors
    ///
    /// Only whole-batch failures: the registry cannot be loaded (nothing is
    /// probed) or cannot be saved (the batch is discarded).
    pub async fn scan(
        &self,
        roots: &[PathBuf],
        store: &dyn RegistryStore,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        let mut registry = store.load()?;
        let result = self.scan_registry(roots, &mut registry, store, cancel).await;
        self.persist(&registry, store)?;
        Ok(result)
    }

    /// Scans `roots` into an explicit registry value.
    ///
    /// Metadata documents are written to `store` as probes succeed; the
    /// registry itself is only mutated in memory. The caller saves it.
    pub async fn scan_registry(
        &self,
        roots: &[PathBuf],
        registry: &mut Registry,
        store: &dyn RegistryStore,
        cancel: &CancellationToken,
    ) -> ScanResult {
        let mut result = ScanResult::new(Uuid::new_v4());
        let scan_id = result.scan_id;
        info!(%scan_id, roots = roots.len(), incremental = self.options.incremental, "scan started");
        self.emit(&ScanEvent::Started {
            scan_id,
            roots: roots.len(),
        });

        self.emit(&ScanEvent::Phase(ScanPhase::Safety));
        let mut safe_roots = Vec::with_capacity(roots.len());
        for root in roots {
            let safety = check_path(root);
            if safety.safe {
                safe_roots.push(root.clone());
            } else {
                let reason = safety.reason.unwrap_or_default();
                warn!(%scan_id, root = %root.display(), %reason, "skipping unsafe root");
                result
                    .warnings
                    .push(format!("skipped unsafe root {}: {reason}", root.display()));
                self.emit(&ScanEvent::RootRejected {
                    path: root.clone(),
                    reason,
                });
            }
        }

        self.emit(&ScanEvent::Phase(ScanPhase::Enumerate));
        let listing = enumerate(&safe_roots);
        for (path, error) in listing.errors {
            result
                .warnings
                .push(format!("cannot read {}: {error}", path.display()));
        }
        result.skipped += listing.shadowed.len();
        for (path, reason) in listing.unsafe_targets {
            warn!(%scan_id, path = %path.display(), %reason, "skipping executable");
            result
                .warnings
                .push(format!("skipped {}: {reason}", path.display()));
            result.skipped += 1;
        }

        let mut queue = Vec::with_capacity(listing.candidates.len());
        for candidate in listing.candidates {
            if self.skip.matches(&candidate.name, &candidate.path) {
                debug!(%scan_id, path = %candidate.path.display(), "skip-listed");
                result.skipped += 1;
            } else if self.options.incremental && is_unchanged(registry, &candidate) {
                debug!(%scan_id, path = %candidate.path.display(), "unchanged since last scan");
                result.skipped += 1;
            } else {
                queue.push(candidate);
            }
        }

        self.probe_and_apply(BatchMode::Scan, queue, registry, store, cancel, &mut result)
            .await;
        registry.mark_scanned(result.finished_at);
        result
    }

    /// Re-probes registered tools, ignoring incremental mode and the skip-list.
    ///
    /// `names = None` refreshes every entry. Entries whose executable is gone,
    /// or that no longer produce capability metadata, are pruned and counted
    /// in `removed`. Entries whose directory has become unsafe are kept but
    /// not run, and count as `skipped`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if a requested name is not registered, plus
    /// the load/save failures of [`scan`](Self::scan).
    pub async fn refresh(
        &self,
        names: Option<&[String]>,
        store: &dyn RegistryStore,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        let mut registry = store.load()?;
        let mut result = ScanResult::new(Uuid::new_v4());
        let scan_id = result.scan_id;
        info!(%scan_id, "refresh started");

        let selected: Vec<RegistryEntry> = match names {
            Some(names) => names
                .iter()
                .map(|n| {
                    registry
                        .get(n)
                        .cloned()
                        .ok_or_else(|| RegistryError::NotFound(n.clone()))
                })
                .collect::<std::result::Result<_, _>>()?,
            None => registry.tools.clone(),
        };

        self.emit(&ScanEvent::Phase(ScanPhase::Safety));
        let mut queue = Vec::with_capacity(selected.len());
        for entry in selected {
            let meta = match std::fs::metadata(&entry.path) {
                Ok(meta) => meta,
                Err(e) => {
                    info!(%scan_id, tool = %entry.name, error = %e, "pruning missing executable");
                    self.prune(&mut registry, store, &entry.name, &mut result);
                    continue;
                }
            };
            if let Some((dir, reason)) = unsafe_location(&entry.path) {
                warn!(%scan_id, tool = %entry.name, dir = %dir.display(), %reason, "skipping tool in unsafe directory");
                result
                    .warnings
                    .push(format!("skipped {}: {reason}", entry.name));
                result.skipped += 1;
                self.emit(&ScanEvent::RootRejected { path: dir, reason });
                continue;
            }
            queue.push(Candidate {
                name: file_name(&entry.path),
                source: classify(&entry.path),
                mtime: meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(entry.mtime),
                path: entry.path,
            });
        }

        self.probe_and_apply(BatchMode::Refresh, queue, &mut registry, store, cancel, &mut result)
            .await;
        self.persist(&registry, store)?;
        Ok(result)
    }

    fn persist(&self, registry: &Registry, store: &dyn RegistryStore) -> Result<()> {
        self.emit(&ScanEvent::Phase(ScanPhase::Persist));
        store.save(registry).map_err(DiscoveryError::from)
    }

    async fn probe_and_apply(
        &self,
        mode: BatchMode,
        queue: Vec<Candidate>,
        registry: &mut Registry,
        store: &dyn RegistryStore,
        cancel: &CancellationToken,
        result: &mut ScanResult,
    ) {
        self.emit(&ScanEvent::Phase(ScanPhase::Probe));
        self.emit(&ScanEvent::Queued { total: queue.len() });

        let outcomes = self.run_workers(&queue, cancel).await;
        let mut seen_names = HashSet::new();

        for (candidate, outcome) in queue.iter().zip(outcomes) {
            let status =
                self.apply_one(mode, candidate, outcome, registry, store, &mut seen_names, result);
            self.emit(&ScanEvent::CandidateFinished {
                path: candidate.path.clone(),
                status,
            });
        }

        result.cancelled = cancel.is_cancelled();
        result.finished_at = Utc::now();
        info!(
            scan_id = %result.scan_id,
            discovered = result.discovered,
            updated = result.updated,
            failed = result.failed,
            skipped = result.skipped,
            removed = result.removed,
            cancelled = result.cancelled,
            "scan finished"
        );
        self.emit(&ScanEvent::Finished {
            scan_id: result.scan_id,
            discovered: result.discovered,
            updated: result.updated,
            failed: result.failed,
            skipped: result.skipped,
        });
    }

    /// Probes `queue` with bounded parallelism. Results are index-aligned
    /// with `queue` regardless of completion order.
    async fn run_workers(
        &self,
        queue: &[Candidate],
        cancel: &CancellationToken,
    ) -> Vec<WorkerOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.options.parallelism.max(1)));
        let mut set = JoinSet::new();

        for (idx, candidate) in queue.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let prober = Arc::clone(&self.prober);
            let progress = Arc::clone(&self.progress);
            let cancel = cancel.clone();
            let path = candidate.path.clone();

            set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (idx, WorkerOutcome::NotStarted),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return (idx, WorkerOutcome::NotStarted),
                    },
                };
                notify(progress.as_ref(), &ScanEvent::ProbeStarted { path: path.clone() });

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => WorkerOutcome::Abandoned,
                    outcome = probe_one(&prober, &path) => outcome,
                };
                drop(permit);
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<WorkerOutcome>> = (0..queue.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "probe worker died"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    WorkerOutcome::Failed(FailureKind::Panicked, "probe worker panicked".to_string())
                })
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_one(
        &self,
        mode: BatchMode,
        candidate: &Candidate,
        outcome: WorkerOutcome,
        registry: &mut Registry,
        store: &dyn RegistryStore,
        seen_names: &mut HashSet<String>,
        result: &mut ScanResult,
    ) -> CandidateStatus {
        let (metadata, digest) = match outcome {
            WorkerOutcome::Probed {
                outcome: ProbeOutcome::Metadata(metadata),
                digest,
            } => (*metadata, digest),
            WorkerOutcome::Probed { .. } => {
                // A registered tool that stopped answering is pruned on refresh.
                let stale = registry.get_by_path(&candidate.path).map(|e| e.name.clone());
                match (mode, stale) {
                    (BatchMode::Refresh, Some(stale)) => self.prune(registry, store, &stale, result),
                    _ => result.skipped += 1,
                }
                return CandidateStatus::Skipped;
            }
            WorkerOutcome::NotStarted => {
                result.skipped += 1;
                return CandidateStatus::Skipped;
            }
            WorkerOutcome::Abandoned => {
                return fail(result, candidate, FailureKind::Cancelled, "scan cancelled during probe");
            }
            WorkerOutcome::Failed(kind, message) => {
                return fail(result, candidate, kind, message);
            }
        };

        let name = metadata.name.clone();
        if name.trim().is_empty() {
            return fail(result, candidate, FailureKind::MissingName, "metadata declares an empty name");
        }
        if !is_valid_tool_name(&name) {
            return fail(
                result,
                candidate,
                FailureKind::InvalidName,
                format!("declared name {name:?} is not a valid tool name"),
            );
        }
        if !seen_names.insert(name.clone()) {
            return fail(
                result,
                candidate,
                FailureKind::DuplicateName,
                format!("name {name:?} already declared by another executable in this batch"),
            );
        }

        let previous = match store.read_metadata(&name) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(tool = %name, error = %e, "ignoring unreadable cached metadata");
                None
            }
        };
        let metadata_file = match store.write_metadata(&name, &metadata) {
            Ok(path) => path,
            Err(e) => return fail(result, candidate, FailureKind::Cache, e.to_string()),
        };

        let now = Utc::now();
        let trust = registry
            .get(&name)
            .filter(|old| old.digest.is_some() && old.digest == digest)
            .and_then(|old| old.trust.clone());
        let entry = RegistryEntry {
            name: name.clone(),
            version: metadata.version.clone(),
            path: candidate.path.clone(),
            source: candidate.source,
            discovered_at: now,
            last_verified: now,
            mtime: candidate.mtime,
            digest,
            metadata_file,
            trust,
            extra: Default::default(),
        };

        let upsert = match registry.upsert(entry) {
            Ok(u) => u,
            Err(e) => return fail(result, candidate, FailureKind::Registry, e.to_string()),
        };

        // The executable used to answer to another name.
        let renamed: Vec<String> = registry
            .tools
            .iter()
            .filter(|e| e.path == candidate.path && e.name != name)
            .map(|e| e.name.clone())
            .collect();
        for old in renamed {
            self.prune(registry, store, &old, result);
        }

        let (status, drift) = match upsert {
            Upsert::Inserted => {
                result.discovered += 1;
                (ToolStatus::Discovered, Some(new_tool_report(&metadata)))
            }
            Upsert::Updated => {
                result.updated += 1;
                let drift = previous.as_ref().map(|old| detect_drift(old, &metadata));
                (ToolStatus::Updated, drift)
            }
        };
        let commands = metadata.command_count();
        debug!(tool = %name, path = %candidate.path.display(), ?status, commands, "tool recorded");

        result.tools.push(ToolDetail {
            name,
            version: metadata.version,
            path: candidate.path.clone(),
            source: candidate.source,
            status,
            commands,
            drift,
        });
        match status {
            ToolStatus::Discovered => CandidateStatus::Discovered,
            ToolStatus::Updated => CandidateStatus::Updated,
        }
    }

    fn prune(
        &self,
        registry: &mut Registry,
        store: &dyn RegistryStore,
        name: &str,
        result: &mut ScanResult,
    ) {
        if registry.remove(name).is_none() {
            return;
        }
        if let Err(e) = store.remove_metadata(name) {
            result
                .warnings
                .push(format!("failed to remove cached metadata for {name}: {e}"));
        }
        result.removed += 1;
    }

    fn emit(&self, event: &ScanEvent) {
        notify(self.progress.as_ref(), event);
    }
}

async fn probe_one(prober: &Prober, path: &Path) -> WorkerOutcome {
    match prober.probe(path).await {
        Ok(ProbeOutcome::Metadata(metadata)) => {
            let digest = compute_digest(path).await;
            WorkerOutcome::Probed {
                outcome: ProbeOutcome::Metadata(metadata),
                digest,
            }
        }
        Ok(outcome) => WorkerOutcome::Probed {
            outcome,
            digest: None,
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "probe failed");
            WorkerOutcome::Failed(FailureKind::from(&e), e.to_string())
        }
    }
}

async fn compute_digest(path: &Path) -> Option<String> {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || hash_file(owned)).await {
        Ok(Ok(hash)) => Some(format_digest(&hash)),
        Ok(Err(e)) => {
            debug!(path = %path.display(), error = %e, "could not hash executable");
            None
        }
        Err(_) => None,
    }
}

fn fail(
    result: &mut ScanResult,
    candidate: &Candidate,
    kind: FailureKind,
    message: impl Into<String>,
) -> CandidateStatus {
    result.failed += 1;
    result.errors.push(ScanFailure {
        path: candidate.path.clone(),
        kind,
        message: message.into(),
    });
    CandidateStatus::Failed
}

fn is_unchanged(registry: &Registry, candidate: &Candidate) -> bool {
    registry
        .get_by_path(&candidate.path)
        .is_some_and(|entry| entry.mtime == candidate.mtime)
}

/// First unsafe directory on the way to `path`: the directory holding the
/// registered path, then the directory of its resolved target.
fn unsafe_location(path: &Path) -> Option<(PathBuf, String)> {
    let listed = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let resolved = std::fs::canonicalize(path)
        .ok()
        .and_then(|real| real.parent().map(Path::to_path_buf));
    std::iter::once(listed)
        .chain(resolved)
        .find_map(|dir| unsafe_reason(&dir).map(|reason| (dir, reason)))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
