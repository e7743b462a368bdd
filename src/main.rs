#![forbid(unsafe_code)]

//! `agent-relay` — background worker binary.
//!
//! Bootstraps configuration, connects the work queue database, repairs any
//! state left behind by a previous run, and drives the poll loop until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_relay::config::{GlobalConfig, StrategyKind};
use agent_relay::driver::oneshot::OneShotDriver;
use agent_relay::driver::pty::PtyDriver;
use agent_relay::driver::AgentDriver;
use agent_relay::notify::client::HubClient;
use agent_relay::orchestrator::worker::Worker;
use agent_relay::persistence::db;
use agent_relay::queue::{self, WorkQueue};
use agent_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-relay", about = "Background worker for queued agent work requests", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the default working directory for sessions.
    #[arg(long)]
    workdir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-relay worker bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;

    if let Some(ws) = args.workdir {
        let canonical = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workdir override: {err}")))?;
        config.default_working_dir = canonical;
    }

    config.load_credentials();
    let config = Arc::new(config);
    info!(worker_id = config.worker_id, "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let pool = Arc::new(db::connect(config.db_path()).await?);
    let work_queue = WorkQueue::new(Arc::clone(&pool));
    info!("database connected");

    // ── Repair state from a previous run ────────────────
    let recovered = work_queue.recover_orphaned().await?;
    if recovered > 0 {
        warn!(recovered, "failed messages orphaned by a previous run");
    }
    let counts = work_queue.reconcile_stale().await?;
    if counts.completed + counts.failed > 0 {
        info!(
            completed = counts.completed,
            failed = counts.failed,
            "stale sessions reconciled on startup"
        );
    }

    // ── Background reconciliation sweep ─────────────────
    let ct = CancellationToken::new();
    let reconcile_handle = queue::spawn_reconcile_task(work_queue.clone(), ct.clone());

    // ── Hub client ──────────────────────────────────────
    let (hub, hub_task) = HubClient::start(&config.hub, &config.worker_id);
    let hub = Arc::new(hub);

    // ── Execution driver ────────────────────────────────
    let driver: Arc<dyn AgentDriver> = match config.agent_cli.strategy {
        StrategyKind::Pty => Arc::new(PtyDriver::new(
            config.agent_cli.clone(),
            config.timeouts,
            config.input,
            config.markers.clone(),
        )?),
        StrategyKind::Oneshot => Arc::new(OneShotDriver::new(config.agent_cli.clone())),
    };
    info!(strategy = ?config.agent_cli.strategy, "execution driver ready");

    // ── Poll loop ───────────────────────────────────────
    let worker = Worker::new(
        Arc::clone(&config),
        work_queue,
        Arc::clone(&driver),
        Arc::clone(&hub),
    );
    let worker_ct = ct.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_ct).await });

    info!("agent-relay worker ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = worker_handle.await;
    let _ = reconcile_handle.await;
    hub_task.abort();
    info!("agent-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
