//! fleetd — the fleetscale daemon.
//!
//! Single binary that assembles a backlog-scaled worker fleet:
//! - Work queue + ingestion trigger
//! - Backlog metric source
//! - Worker pool on the local compute platform
//! - Fleet manager control loop
//!
//! # Usage
//!
//! ```text
//! fleetd init --output fleet.toml
//! fleetd check --config fleet.toml
//! fleetd run --config fleet.toml --ingest-rate 2 --status-file status.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use fleet_core::{FleetConfig, FleetSettings, FleetStatus, LoopPhase};
use fleetscale_capacity::allocate;
use fleetscale_manager::FleetManager;
use fleetscale_metrics::QueueBacklogSource;
use fleetscale_policy::StepPolicy;
use fleetscale_queue::{IngestionTrigger, WorkQueue};
use fleetscale_worker::{LocalPlatform, WorkerContext, WorkerPool};

#[derive(Parser)]
#[command(name = "fleetd", about = "Backlog-driven worker fleet daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the fleet until Ctrl-C.
    Run {
        /// Fleet configuration file.
        #[arg(long, default_value = "fleet.toml")]
        config: PathBuf,

        /// Write the status snapshot here after every tick.
        #[arg(long)]
        status_file: Option<PathBuf>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,

        /// Synthetic uploads per second (0 disables).
        #[arg(long, default_value = "0")]
        ingest_rate: u32,

        /// Simulated processing time per notification, in milliseconds.
        #[arg(long, default_value = "5000")]
        processing_ms: u64,

        /// Bucket uploads arrive in.
        #[arg(long, default_value = "uploads")]
        bucket: String,

        /// Bucket renditions are written to.
        #[arg(long, default_value = "renditions")]
        output_bucket: String,
    },

    /// Validate a configuration and show what it does.
    Check {
        #[arg(long, default_value = "fleet.toml")]
        config: PathBuf,
    },

    /// Write a configuration with every default spelled out.
    Init {
        #[arg(long, default_value = "fleet.toml")]
        output: PathBuf,

        /// Fleet name.
        #[arg(long, default_value = "workers")]
        name: String,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_json = matches!(cli.command, Command::Run { log_json: true, .. });
    init_tracing(log_json);

    match cli.command {
        Command::Run {
            config,
            status_file,
            log_json: _,
            ingest_rate,
            processing_ms,
            bucket,
            output_bucket,
        } => {
            let settings = load_settings(&config)?;
            run_fleet(
                settings,
                RunOptions {
                    status_file,
                    ingest_rate,
                    processing: Duration::from_millis(processing_ms),
                    bucket,
                    output_bucket,
                },
            )
            .await
        }
        Command::Check { config } => {
            let settings = load_settings(&config)?;
            print!("{}", describe(&settings)?);
            Ok(())
        }
        Command::Init {
            output,
            name,
            force,
        } => init_config(&output, &name, force),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,fleetd=debug,fleetscale=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_settings(path: &Path) -> anyhow::Result<FleetSettings> {
    let config = FleetConfig::from_file(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let settings = config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(settings)
}

struct RunOptions {
    status_file: Option<PathBuf>,
    ingest_rate: u32,
    processing: Duration,
    bucket: String,
    output_bucket: String,
}

async fn run_fleet(settings: FleetSettings, opts: RunOptions) -> anyhow::Result<()> {
    info!(fleet = %settings.name, "fleetd starting");

    // ── Initialize subsystems ──────────────────────────────────

    let queue = WorkQueue::new(settings.source_id.clone());
    let trigger = Arc::new(IngestionTrigger::new(opts.bucket.clone(), queue.clone()));
    let source = Arc::new(QueueBacklogSource::new().with_queue(queue.clone()));

    let pool = Arc::new(WorkerPool::new(
        WorkerContext::new(queue.clone(), opts.output_bucket.clone(), opts.processing),
        &settings.capacity,
    ));
    let platform = Arc::new(LocalPlatform::new(pool.clone()));

    let mut manager = FleetManager::new(settings, source, platform)?;
    let size = manager.bootstrap().await?;
    info!(size, "fleet bootstrapped");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let ingest_handle = (opts.ingest_rate > 0).then(|| {
        let trigger = trigger.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(ingest(trigger, opts.ingest_rate, shutdown))
    });

    let status_handle = opts.status_file.map(|path| {
        let status = manager.subscribe();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(write_status_loop(path, status, shutdown))
    });

    let manager_shutdown = shutdown_rx.clone();
    let manager_handle = tokio::spawn(async move {
        manager.run(manager_shutdown).await;
        manager.status()
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let final_status = manager_handle.await?;
    if let Some(handle) = ingest_handle {
        let _ = handle.await;
    }
    if let Some(handle) = status_handle {
        let _ = handle.await;
    }

    queue.close();
    pool.shutdown().await;

    let counters = pool.context().counters();
    info!(
        size = final_status.current_size,
        ticks = final_status.ticks,
        processed = counters.processed,
        renditions = counters.renditions,
        dropped = counters.dropped,
        uploads = trigger.enqueued(),
        "fleetd stopped"
    );
    Ok(())
}

/// Feed the trigger `rate` synthetic uploads per second.
async fn ingest(trigger: Arc<IngestionTrigger>, rate: u32, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1) / rate);
    let mut seq: u64 = 0;
    info!(rate, bucket = %trigger.bucket(), "synthetic ingestion started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                seq += 1;
                let key = format!("incoming/upload-{seq:06}.png");
                if let Err(e) = trigger.object_created(&key) {
                    warn!(error = %e, "ingestion stopped");
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Rewrite the status file whenever a tick completes.
async fn write_status_loop(
    path: PathBuf,
    mut status: watch::Receiver<FleetStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_written = None;
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                if snapshot.phase != LoopPhase::Idle || last_written == Some(snapshot.ticks) {
                    continue;
                }
                match write_status(&path, &snapshot) {
                    Ok(()) => {
                        debug!(path = %path.display(), ticks = snapshot.ticks, "status written");
                        last_written = Some(snapshot.ticks);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to write status"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Write `status` as pretty JSON, replacing the file atomically.
fn write_status(path: &Path, status: &FleetStatus) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(status)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Human-readable summary of a validated configuration.
fn describe(settings: &FleetSettings) -> anyhow::Result<String> {
    let policy = StepPolicy::new(&settings.steps)?;
    let mut out = String::new();

    out.push_str(&format!(
        "fleet {}: {}..={} instances, cooldown {}s, polling {} every {}s\n",
        settings.name,
        settings.min_instances,
        settings.max_instances,
        settings.cooldown.as_secs(),
        settings.source_id,
        settings.poll_interval.as_secs(),
    ));

    out.push_str("\nstep rules:\n");
    for rule in policy.rules().iter() {
        let lower = rule.lower.map_or("-inf".to_string(), |v| v.to_string());
        let upper = rule.upper.map_or("+inf".to_string(), |v| v.to_string());
        out.push_str(&format!("  [{lower}, {upper})  {:+}\n", rule.delta));
    }

    out.push_str("\nallocation:\n");
    for size in settings.min_instances..=settings.max_instances {
        let allocation = allocate(size, &settings.capacity);
        let parts: Vec<String> = allocation
            .classes
            .iter()
            .map(|c| format!("{}={}", c.class, c.units))
            .collect();
        out.push_str(&format!("  {size:>4}  {}\n", parts.join(" ")));
    }

    Ok(out)
}

fn init_config(output: &Path, name: &str, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    let toml = FleetConfig::scaffold(name).to_toml_string()?;
    std::fs::write(output, toml)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(path = %output.display(), "configuration written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_load_round_trips_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");

        init_config(&path, "renderers", false).unwrap();
        let settings = load_settings(&path).unwrap();

        assert_eq!(settings.name, "renderers");
        assert_eq!(settings.min_instances, 1);
        assert_eq!(settings.max_instances, 10);
        assert_eq!(settings.cooldown, Duration::from_secs(200));
        assert_eq!(settings.capacity.len(), 2);
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "# mine").unwrap();

        assert!(init_config(&path, "workers", false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine");

        init_config(&path, "workers", true).unwrap();
        assert!(load_settings(&path).is_ok());
    }

    #[test]
    fn load_reports_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "[fleet]\nmin_instances = 5\nmax_instances = 2\n").unwrap();

        let err = load_settings(&path).unwrap_err();
        assert!(format!("{err:#}").contains("invalid configuration"));
    }

    #[test]
    fn describe_lists_rules_and_every_size() {
        let settings = FleetSettings::default();
        let text = describe(&settings).unwrap();

        assert!(text.contains("[-inf, 10)  -1"));
        assert!(text.contains("[40, 100)  +1"));
        assert!(text.contains("[100, +inf)  +3"));
        assert!(text.contains("     5  guaranteed=4 spot=1"));
        assert!(text.contains("    10  guaranteed=5 spot=5"));
    }

    #[test]
    fn status_file_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let status = FleetStatus {
            fleet: "workers".into(),
            current_size: 3,
            min_size: 1,
            max_size: 10,
            last_delta: Some(1),
            last_adjustment_at: Some(1_000),
            last_backlog: Some(42.0),
            class_units: allocate(3, &FleetSettings::default().capacity),
            shortfall: 0,
            last_error: None,
            phase: LoopPhase::Idle,
            ticks: 7,
        };

        write_status(&path, &status).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["current_size"], 3);
        assert_eq!(json["ticks"], 7);
        assert_eq!(json["phase"], "idle");
        assert!(!dir.path().join("status.tmp").exists());
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "fleetd",
            "run",
            "--config",
            "f.toml",
            "--ingest-rate",
            "4",
            "--log-json",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                config,
                ingest_rate,
                log_json,
                processing_ms,
                ..
            } => {
                assert_eq!(config, PathBuf::from("f.toml"));
                assert_eq!(ingest_rate, 4);
                assert!(log_json);
                assert_eq!(processing_ms, 5000);
            }
            _ => panic!("expected run"),
        }
    }
}
