//! Toolguard CLI - discover agent tools and decide whether to trust them.
//!
//! Results are printed as JSON on stdout; logs go to stderr (`RUST_LOG`
//! overrides the default `info` filter).

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use toolguard_core::{Recommendation, Toolguard, ToolguardConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status of `trust` when the recommendation is `block`.
const EXIT_BLOCKED: u8 = 2;

#[derive(Parser)]
#[command(name = "toolguard")]
#[command(version)]
#[command(about = "Toolguard - discovery and trust verification for agent tools")]
struct Cli {
    /// Registry file (default: <data dir>/toolguard/registry.json)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Metadata cache directory (default: <cache dir>/toolguard/metadata)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Emit compact instead of pretty JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe executables under the given directories (default: $PATH)
    Scan {
        paths: Vec<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,
    },
    /// List registered tools
    List,
    /// Show one registered tool and its capability document
    Get { name: String },
    /// Re-probe one registered tool, or all of them
    Refresh {
        name: Option<String>,

        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Remove every registered tool and cached document
    Clear,
    /// Evaluate whether a registered tool may be executed
    Trust {
        name: String,

        #[command(flatten)]
        trust: TrustArgs,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Concurrent probes
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Probe every executable, even if unchanged since the last scan
    #[arg(long)]
    full: bool,

    /// Names or globs to never probe (repeatable)
    #[arg(long = "skip", value_name = "PATTERN")]
    skip: Vec<String>,

    /// Timeout for `--help`, in milliseconds
    #[arg(long)]
    help_timeout_ms: Option<u64>,

    /// Timeout for `--agent`, in milliseconds
    #[arg(long)]
    agent_timeout_ms: Option<u64>,
}

#[derive(Args)]
struct TrustArgs {
    /// Skip signature verification (result is at best UNVERIFIED)
    #[arg(long)]
    no_signatures: bool,

    /// Skip provenance verification
    #[arg(long)]
    no_provenance: bool,

    /// Minimum attested SLSA build level
    #[arg(long)]
    min_slsa_level: Option<u8>,

    /// Fail instead of downgrading when an attestation cannot be fetched
    #[arg(long)]
    hard_fail: bool,

    /// Signature verifier executable
    #[arg(long, value_name = "PROGRAM")]
    verifier: Option<PathBuf>,

    /// Accepted builder IDs (repeatable)
    #[arg(long = "allow-builder", value_name = "ID")]
    allowed_builders: Vec<String>,

    /// Accepted certificate identities (repeatable)
    #[arg(long = "allow-identity", value_name = "IDENTITY")]
    allowed_identities: Vec<String>,

    /// Accepted OIDC issuers (repeatable)
    #[arg(long = "allow-issuer", value_name = "URL")]
    allowed_issuers: Vec<String>,
}

impl ScanArgs {
    fn apply(self, config: &mut ToolguardConfig) {
        if let Some(n) = self.parallelism {
            config.scan.parallelism = n;
        }
        if self.full {
            config.scan.incremental = false;
        }
        config.scan.skip.extend(self.skip);
        if let Some(ms) = self.help_timeout_ms {
            config.scan.help_timeout_ms = ms;
        }
        if let Some(ms) = self.agent_timeout_ms {
            config.scan.agent_timeout_ms = ms;
        }
    }
}

impl TrustArgs {
    fn apply(self, config: &mut ToolguardConfig) {
        let trust = &mut config.trust;
        trust.verify_signatures &= !self.no_signatures;
        trust.verify_provenance &= !self.no_provenance;
        trust.hard_fail |= self.hard_fail;
        if let Some(level) = self.min_slsa_level {
            trust.min_slsa_level = level;
        }
        if let Some(program) = self.verifier {
            trust.verifier_program = program;
        }
        trust.allowed_builders.extend(self.allowed_builders);
        trust.allowed_identities.extend(self.allowed_identities);
        trust.allowed_issuers.extend(self.allowed_issuers);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ToolguardConfig::default();
    if let Some(path) = cli.registry {
        config.paths.registry_file = path;
    }
    if let Some(dir) = cli.cache_dir {
        config.paths.cache_dir = dir;
    }
    config.scan.safe_paths = path_roots();

    let cancel = CancellationToken::new();
    let printer = Printer {
        compact: cli.compact,
    };

    match cli.command {
        Commands::Scan { paths, scan } => {
            scan.apply(&mut config);
            let guard = Toolguard::new(config)?;
            let stop = cancel_on_ctrl_c(cancel.clone());
            let result = guard.scan(&paths, &cancel).await?;
            stop.abort();
            printer.print(&result)?;
        }
        Commands::List => {
            let guard = Toolguard::new(config)?;
            printer.print(&guard.list()?)?;
        }
        Commands::Get { name } => {
            let guard = Toolguard::new(config)?;
            printer.print(&guard.get(&name)?)?;
        }
        Commands::Refresh { name, scan } => {
            scan.apply(&mut config);
            let guard = Toolguard::new(config)?;
            let stop = cancel_on_ctrl_c(cancel.clone());
            let result = guard.refresh(name.as_deref(), &cancel).await?;
            stop.abort();
            printer.print(&result)?;
        }
        Commands::Clear => {
            let guard = Toolguard::new(config)?;
            printer.print(&guard.clear()?)?;
        }
        Commands::Trust { name, trust } => {
            trust.apply(&mut config);
            let guard = Toolguard::new(config)?;
            let result = guard
                .evaluate(&name)
                .await
                .with_context(|| format!("evaluating trust for {name}"))?;
            printer.print(&result)?;
            if result.recommendation == Recommendation::Block {
                return Ok(ExitCode::from(EXIT_BLOCKED));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Directories on `$PATH`, in order. Scanned when no paths are given.
fn path_roots() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect())
        .unwrap_or_default()
}

/// Cancels `token` on the first Ctrl-C. Abort the handle once the work is done.
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupted; finishing with partial results");
                token.cancel();
            }
            Err(e) => info!(error = %e, "ctrl-c handler unavailable"),
        }
    })
}

struct Printer {
    compact: bool,
}

impl Printer {
    fn print<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        println!("{json}");
        Ok(())
    }
}
