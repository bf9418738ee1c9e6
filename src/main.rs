//! caption-relay - live caption relay
//!
//! Tails the CSV collaboration file written by a speech-to-text tool and
//! posts each new caption line to a captioning endpoint, in order, one
//! request at a time.
//!
//! # Usage
//!
//! ```bash
//! # One-time setup
//! caption-relay config set delivery.endpoint_base "https://.../closedcaption?id=...&signature=..."
//! caption-relay config set source.collaboration_file ./Output.csv
//!
//! # Relay until Ctrl+C, with the status API on port 8090
//! caption-relay run --status-addr 127.0.0.1:8090
//!
//! # Send a recorded file, or a single line
//! caption-relay replay captions.csv
//! caption-relay send '"2020-01-01 10:00:00","Alice","Hello","こんにちは"'
//! ```
//!
//! # Environment Variables
//!
//! - `CAPTION_RELAY_CONFIG`: settings file path (default: ./caption_relay.toml)
//! - `CAPTION_RELAY_ENDPOINT`: overrides `delivery.endpoint_base`
//! - `CAPTION_RELAY_FILE`: overrides `source.collaboration_file`
//! - `CAPTION_RELAY_CORS_ORIGINS`: extra origins allowed by the status API
//! - `RUST_LOG`: logging level (default: info)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use caption_relay::acquisition::{clear_collaboration_file, parse_caption_line, CollabFileTailer};
use caption_relay::api::{self, StatusState};
use caption_relay::config::{mask_endpoint, run_config_watcher, ConfigEvent, RelayConfig, SharedDeliveryConfig};
use caption_relay::pipeline::{DeliverySession, WorkerStats};
use caption_relay::types::DeliveryFailure;
use caption_relay::HttpTransport;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "caption-relay")]
#[command(about = "Relay live caption lines to an HTTP captioning endpoint")]
#[command(version)]
struct CliArgs {
    /// Settings file (default: $CAPTION_RELAY_CONFIG or ./caption_relay.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Watch the collaboration file and relay new captions until Ctrl+C (default)
    Run(RunArgs),

    /// Relay every line of a caption CSV file, then exit
    Replay {
        /// CSV file in collaboration-file format
        file: PathBuf,
        /// Pause between lines, to mimic live pacing
        #[arg(long, default_value = "0", value_name = "MS")]
        delay_ms: u64,
    },

    /// Relay a single caption line
    Send {
        /// `"<timestamp>","<speaker>","<original>","<translated>"`
        line: String,
    },

    /// Inspect or edit the settings file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Serve the status API on this address (overrides server.addr)
    #[arg(long, value_name = "HOST:PORT", env = "CAPTION_RELAY_STATUS_ADDR")]
    status_addr: Option<String>,

    /// Keep an existing collaboration file instead of clearing it at startup
    #[arg(long)]
    keep_file: bool,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective settings (proxy password masked)
    Show,
    /// Set one dotted key, e.g. `delivery.include_speaker_name true`
    Set { key: String, value: String },
    /// Print the settings file path in use
    Path,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    StatusApi,
    Tailer,
    FailureReporter,
    ConfigWatcher,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::StatusApi => write!(f, "StatusApi"),
            TaskName::Tailer => write!(f, "Tailer"),
            TaskName::FailureReporter => write!(f, "FailureReporter"),
            TaskName::ConfigWatcher => write!(f, "ConfigWatcher"),
        }
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load the settings file (or defaults) with environment overrides applied.
fn load_config(path: &Path) -> Result<RelayConfig> {
    let config = RelayConfig::load_or_default(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    Ok(config.with_env_overrides())
}

/// Cancellation token that fires on Ctrl+C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        shutdown_token.cancel();
    });
    cancel_token
}

/// Turn each surfaced delivery failure into a user-visible warning.
///
/// Ends when the worker exits. Returns the number of notifications shown.
async fn report_failures(mut failures: mpsc::UnboundedReceiver<DeliveryFailure>) -> u64 {
    let mut shown = 0u64;
    while let Some(failure) = failures.recv().await {
        shown += 1;
        warn!(seq = failure.seq, caption = %failure.display_text, "{}", failure);
    }
    shown
}

fn print_summary(stats: &WorkerStats, notifications: u64) {
    println!("received:    {}", stats.received);
    println!("delivered:   {}", stats.delivered);
    println!("failed:      {} ({} notified, {} suppressed)", stats.failed, notifications, stats.suppressed);
    println!("dropped:     {} (malformed)", stats.dropped);
}

// ============================================================================
// Task Supervisor
// ============================================================================

/// Monitor all spawned tasks and handle failures.
///
/// Returns when cancellation is requested, when a task fails, or when every
/// task has completed. A failing task cancels the rest.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring...");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {:#}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

/// `run`: tail the collaboration file until Ctrl+C.
async fn run_relay(config_path: PathBuf, args: RunArgs) -> Result<()> {
    let relay_config = load_config(&config_path)?;
    relay_config
        .validate()
        .context("Settings are incomplete; fix them with `caption-relay config set <KEY> <VALUE>`")?;
    let collab_file = relay_config
        .collaboration_file()
        .map(Path::to_path_buf)
        .context("source.collaboration_file is not set")?;

    if relay_config.source.clear_on_start && !args.keep_file {
        clear_collaboration_file(&collab_file)
            .with_context(|| format!("Failed to clear {}", collab_file.display()))?;
    }

    let delivery = relay_config.delivery_config();
    info!("Starting caption relay");
    info!(endpoint = %mask_endpoint(&delivery.endpoint_base), language = %delivery.language, speaker_names = delivery.include_speaker_name, "Delivery");
    info!(file = %collab_file.display(), poll_ms = relay_config.source.poll_interval_ms, "Source");
    if delivery.uses_proxy() {
        info!(explicit = delivery.proxy_url.is_some(), authenticated = delivery.proxy_credentials().is_some(), "Proxy enabled");
    }

    let cancel_token = shutdown_on_ctrl_c();
    let shared = SharedDeliveryConfig::new(delivery);
    let (session, failures) =
        DeliverySession::start(shared.clone(), HttpTransport::new(), cancel_token.child_token());

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: collaboration file tailer
    let tailer = CollabFileTailer::new(
        collab_file,
        Duration::from_millis(relay_config.source.poll_interval_ms),
    );
    let ingress = session.ingress();
    let token = cancel_token.clone();
    task_set.spawn(async move {
        let forwarded = tailer.run(ingress, token).await;
        info!(forwarded, "[Tailer] Stopped");
        Ok(TaskName::Tailer)
    });

    // Task 2: failure notifications
    task_set.spawn(async move {
        let shown = report_failures(failures).await;
        info!(shown, "[FailureReporter] Stopped");
        Ok(TaskName::FailureReporter)
    });

    // Task 3: settings hot reload
    if config_path.exists() {
        let (tx, mut rx) = mpsc::channel::<ConfigEvent>(8);
        let watcher = run_config_watcher(config_path.clone(), shared.clone(), tx, cancel_token.clone());
        task_set.spawn(async move {
            let drain = async {
                while let Some(event) = rx.recv().await {
                    match event {
                        ConfigEvent::Reloaded(changes) => {
                            info!(changed = changes.len(), "Settings reloaded");
                        }
                        ConfigEvent::Error(e) => warn!(error = %e, "Settings reload rejected"),
                    }
                }
            };
            tokio::join!(watcher, drain);
            Ok(TaskName::ConfigWatcher)
        });
    } else {
        info!(path = %config_path.display(), "No settings file, hot reload disabled");
    }

    // Task 4: status API
    if let Some(addr) = args.status_addr.or_else(|| relay_config.server.addr.clone()) {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind status API on {addr}"))?;
        let app = api::create_app(StatusState::new(session.status(), shared.clone()));
        let token = cancel_token.clone();
        task_set.spawn(async move {
            info!("[StatusApi] Task starting");
            api::serve(listener, app, token)
                .await
                .context("Status API server error")?;
            info!("[StatusApi] Graceful shutdown complete");
            Ok(TaskName::StatusApi)
        });
    }

    let supervised = run_supervisor(&mut task_set, cancel_token.clone()).await;

    cancel_token.cancel();
    let stats = session.stop().await.context("Delivery worker panicked")?;
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => info!("Task {} stopped", task_name),
            Ok(Err(e)) => warn!("Task stopped with error during shutdown: {:#}", e),
            Err(e) => warn!("Task panicked during shutdown: {}", e),
        }
    }

    info!(%stats, "Caption relay shut down");
    supervised
}

/// `replay`: relay every line of `file`, then exit.
async fn run_replay(config_path: PathBuf, file: PathBuf, delay_ms: u64) -> Result<()> {
    let relay_config = load_config(&config_path)?;
    relay_config
        .validate_delivery()
        .context("Delivery settings are incomplete")?;

    let contents = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let cancel_token = shutdown_on_ctrl_c();
    let (session, failures) = DeliverySession::start(
        SharedDeliveryConfig::new(relay_config.delivery_config()),
        HttpTransport::new(),
        cancel_token.child_token(),
    );
    let reporter = tokio::spawn(report_failures(failures));

    let mut queued = 0u64;
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        if cancel_token.is_cancelled() {
            break;
        }
        session.enqueue(line).context("Delivery queue closed early")?;
        queued += 1;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
    info!(queued, file = %file.display(), "All lines queued, waiting for delivery");

    let stats = session.finish().await.context("Delivery worker panicked")?;
    let notifications = reporter.await.context("Failure reporter panicked")?;
    print_summary(&stats, notifications);
    Ok(())
}

/// `send`: relay one line and report whether it was accepted.
async fn run_send(config_path: PathBuf, line: String) -> Result<()> {
    let relay_config = load_config(&config_path)?;
    relay_config
        .validate_delivery()
        .context("Delivery settings are incomplete")?;
    parse_caption_line(&line).context("Not a valid caption line")?;

    let cancel_token = shutdown_on_ctrl_c();
    let (session, failures) = DeliverySession::start(
        SharedDeliveryConfig::new(relay_config.delivery_config()),
        HttpTransport::new(),
        cancel_token.child_token(),
    );
    let status = session.status();
    session.enqueue(line).context("Delivery queue closed early")?;

    let stats = session.finish().await.context("Delivery worker panicked")?;
    drop(failures);

    if stats.delivered == 1 {
        println!("delivered: {}", status.read().await.last_message);
        Ok(())
    } else {
        let last_error = status.read().await.last_error.clone();
        anyhow::bail!("caption not delivered: {last_error}")
    }
}

fn run_config_command(config_path: &Path, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = load_config(config_path)?;
            println!("# {}", config_path.display());
            print!("{}", config.redacted().to_toml()?);
            if let Err(e) = config.validate() {
                eprintln!("{e}");
            }
        }
        ConfigCommand::Set { key, value } => {
            let mut config = RelayConfig::load_or_default(config_path)?;
            config.set_value(&key, &value)?;
            config.save_to_file(config_path)?;
            println!("{key} updated in {}", config_path.display());
        }
        ConfigCommand::Path => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.json_logs);

    let config_path = RelayConfig::resolve_path(args.config.as_deref());

    match args.command.unwrap_or(SubCommand::Run(RunArgs::default())) {
        SubCommand::Run(run_args) => run_relay(config_path, run_args).await,
        SubCommand::Replay { file, delay_ms } => run_replay(config_path, file, delay_ms).await,
        SubCommand::Send { line } => run_send(config_path, line).await,
        SubCommand::Config(command) => run_config_command(&config_path, command),
    }
}
