//! linkmedicd - watches one network interface and repairs it when it stalls
//!
//! Samples link health every poll interval, asks the configured oracle what
//! is wrong, and runs whitelisted remediation commands the gate authorizes.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use linkmedic_common::config::OracleBackend;
use linkmedic_common::{ActionWhitelist, AuditLog, Config, SecureExecutor};
use linkmedicd::{oracle, DecisionGate, HostSampler, LoopSettings, Orchestrator};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OracleArg {
    Ollama,
    Rules,
}

impl From<OracleArg> for OracleBackend {
    fn from(arg: OracleArg) -> Self {
        match arg {
            OracleArg::Ollama => OracleBackend::Ollama,
            OracleArg::Rules => OracleBackend::Rules,
        }
    }
}

#[derive(Parser)]
#[command(name = "linkmedicd")]
#[command(about = "Network link health monitor and remediation daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Interface to monitor
    #[arg(short, long)]
    interface: Option<String>,

    /// Seconds between polls
    #[arg(long)]
    interval: Option<f64>,

    /// Oracle HTTP endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Oracle model name
    #[arg(long)]
    model: Option<String>,

    /// Oracle backend
    #[arg(long, value_enum)]
    oracle: Option<OracleArg>,

    /// Log remediation commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(interface) = &self.interface {
            config.daemon.interface = interface.clone();
        }
        if let Some(interval) = self.interval {
            config.daemon.poll_interval_secs = interval;
        }
        if let Some(endpoint) = &self.endpoint {
            config.oracle.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.model {
            config.oracle.model = model.clone();
        }
        if let Some(backend) = self.oracle {
            config.oracle.backend = backend.into();
        }
        if self.dry_run {
            config.executor.dry_run = true;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Flip the shutdown flag on SIGINT or SIGTERM
async fn wait_for_signal(tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                    _ = term.recv() => info!("SIGTERM received"),
                }
            }
            Err(e) => {
                warn!("Cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("SIGINT received");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Interrupt received");
    }

    info!("Finishing current cycle before shutdown");
    let _ = tx.send(true);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    info!("linkmedicd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let whitelist = ActionWhitelist::load_or_builtin(config.daemon.whitelist_path.as_deref())
        .context("Failed to load action whitelist")?;
    info!("Whitelist: {}", whitelist.names().join(", "));

    let audit = AuditLog::new(config.audit_path());
    info!("Audit trail: {}", audit.path().display());

    let executor = SecureExecutor::new(whitelist, audit.clone(), config.executor.clone());
    if executor.is_dry_run() {
        warn!("DRY RUN: remediation commands will be logged, not executed");
    }

    let oracle = oracle::from_config(&config.oracle, config.detector)
        .context("Failed to initialise oracle")?;
    info!("Oracle: {:?} ({})", config.oracle.backend, config.oracle.model);

    let settings = LoopSettings::from_config(&config).context("Invalid configuration")?;
    let gate = DecisionGate::new(&config.gate, settings.oracle_timeout);
    let sampler = HostSampler::new(&config.sampler);

    let mut orchestrator =
        Orchestrator::new(settings, Box::new(sampler), oracle, gate, executor, audit);

    let (tx, rx) = watch::channel(false);
    let signals = tokio::spawn(wait_for_signal(tx));

    orchestrator.run(rx).await;

    signals.abort();
    if let Err(e) = signals.await {
        if !e.is_cancelled() {
            error!("Signal task failed: {}", e);
        }
    }

    info!("linkmedicd stopped");
    Ok(())
}
