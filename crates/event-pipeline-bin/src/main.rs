//! eventctl binary entry point.
//!
//! Usage:
//!   eventctl log <type> [--data JSON] [--session-id ID] [--notification-id ID]
//!   eventctl flush
//!   eventctl status [--list]
//!
//! Pending events live in `~/.event-pipeline/events.sqlite` (or the configured
//! `database_path`) and survive between invocations.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use event_pipeline::{
    Clock, DeadlineBudget, DrainReport, EventData, EventPipeline, EventStore, HttpEventSender,
    NewEvent, SqliteEventStore, StaticHost, SystemClock,
};
use event_pipeline_config::{init_logging_with, Config, LogConfig, Paths};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// eventctl: durable event delivery from the command line.
#[derive(Parser, Debug)]
#[command(name = "eventctl")]
#[command(about = "Log events to a collector, queueing them on disk while it is unreachable")]
struct Args {
    /// Base directory for config, database, and device id.
    #[arg(long, env = "EVENT_PIPELINE_HOME", global = true)]
    home: Option<PathBuf>,

    /// Collector base URL (overrides the config file).
    #[arg(long, global = true)]
    collector_url: Option<String>,

    /// Device id (defaults to one generated and stored on first use).
    #[arg(long, env = "EVENT_PIPELINE_DEVICE_ID", global = true)]
    device_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one event, queueing it if the collector is unreachable.
    Log {
        /// Event type, e.g. app.open or custom.purchase
        event_type: String,

        /// JSON object payload.
        #[arg(long)]
        data: Option<String>,

        /// Session id to attach.
        #[arg(long)]
        session_id: Option<String>,

        /// Notification id to correlate with.
        #[arg(long)]
        notification_id: Option<String>,
    },
    /// Retry every queued event once.
    Flush,
    /// Show queue status.
    Status {
        /// List each pending event.
        #[arg(long)]
        list: bool,
    },
}

fn parse_data(raw: &str) -> anyhow::Result<EventData> {
    match serde_json::from_str::<Value>(raw).context("--data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--data must be a JSON object, got {other}"),
    }
}

fn load_or_create_device_id(paths: &Paths) -> anyhow::Result<String> {
    let path = paths.device_id_file();
    if path.exists() {
        let id = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let id = id.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    std::fs::write(&path, &id).with_context(|| format!("failed to write {}", path.display()))?;
    info!(device_id = %id, "Generated device id");
    Ok(id)
}

fn print_report(report: &DrainReport) {
    println!(
        "delivered={} retried={} discarded={} expired={} corrupt={} stop={:?}",
        report.delivered,
        report.retried,
        report.discarded,
        report.expired,
        report.corrupt,
        report.stop
    );
}

/// Drain on the foreground task; a background drain would die with the process.
async fn drain(pipeline: &EventPipeline) -> anyhow::Result<()> {
    tokio::select! {
        report = pipeline.flush_and_wait() => match report {
            Some(report) => print_report(&report),
            None => warn!("Drain did not run"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, pending events stay queued");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let paths = match &args.home {
        Some(home) => Paths::with_base_dir(home.clone()),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let mut config = Config::load(&paths)?;
    if let Some(url) = &args.collector_url {
        config.collector_url = url.clone();
        config.validate()?;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    init_logging_with(LogConfig {
        service_name: "eventctl".into(),
        default_level: config.log_level.clone(),
        json: args.json_logs,
        log_path: None,
    })?;

    let device_id = match &args.device_id {
        Some(id) => id.clone(),
        None => load_or_create_device_id(&paths)?,
    };
    let database = config.database_file(&paths);
    info!(
        collector_url = %config.collector_url,
        database = %database.display(),
        device_id = %device_id,
        "Configuration loaded"
    );

    let store = Arc::new(SqliteEventStore::open(&database)?);
    let sender = Arc::new(HttpEventSender::new(config.sender_config())?);

    // Not ready until the command itself decides to drain.
    let host = Arc::new(StaticHost::ready(device_id.clone()));
    host.set_ready(false);

    let pipeline = EventPipeline::builder(store.clone(), sender, host.clone())
        .budget(Arc::new(DeadlineBudget::new(config.drain_budget())))
        .retry_policy(config.retry_policy())
        .logger_config(config.logger_config())
        .build();

    match args.command {
        Command::Log {
            event_type,
            data,
            session_id,
            notification_id,
        } => {
            let mut event = NewEvent::new(event_type);
            if let Some(raw) = data {
                event = event.with_data(parse_data(&raw)?);
            }
            if let Some(session_id) = session_id {
                event = event.with_session_id(session_id);
            }
            if let Some(notification_id) = notification_id {
                event = event.with_notification_id(notification_id);
            }

            let before = pipeline.pending_count()?;
            pipeline.log(event).await?;
            if pipeline.pending_count()? > before {
                println!("queued");
                host.set_ready(true);
                drain(&pipeline).await?;
            } else {
                println!("sent");
            }
        }
        Command::Flush => {
            host.set_ready(true);
            drain(&pipeline).await?;
        }
        Command::Status { list } => {
            println!("device_id: {device_id}");
            println!("collector: {}", config.collector_url);
            println!("database:  {}", database.display());
            println!("pending:   {}", pipeline.pending_count()?);

            if list {
                let now = SystemClock.now_millis();
                for id in store.pending_ids()? {
                    match store.load(id) {
                        Ok(Some(record)) => {
                            let age = chrono::Duration::milliseconds(now - record.timestamp());
                            println!(
                                "  #{id} {} retries={} age={}s{}",
                                record.event_type(),
                                record.retry_count(),
                                age.num_seconds(),
                                if record.is_expired(now) { " (expired)" } else { "" }
                            );
                        }
                        Ok(None) => {}
                        Err(e) => println!("  #{id} unreadable: {e}"),
                    }
                }
            }
        }
    }

    Ok(())
}
