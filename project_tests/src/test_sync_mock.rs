//! # Sync Scheduler Mock Run
//!
//! Starts a `SyncScheduler` in mock mode (or any mode given on the command
//! line), prints a summary of every published snapshot for a while, then
//! tears the session down.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use lib_realtime::loggers::{init_tracing, LoggingOptions};
use lib_realtime::{load_config, RuntimeMode, SyncScheduler, SystemData};

#[derive(Parser, Debug)]
#[command(about = "Run the dashboard sync layer and print its snapshots")]
struct Args {
    /// Optional JSON config file; environment variables still apply on top.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Runtime mode override: auto, mock or live.
    #[arg(long, default_value = "mock")]
    mode: RuntimeMode,

    /// How long to observe snapshots before tearing down, in seconds.
    #[arg(long, default_value_t = 20)]
    seconds: u64,

    /// Print the full snapshot as JSON instead of a one-line summary.
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn summary(snapshot: &SystemData) -> String {
    format!(
        "[{}] mode={} conn={} ai={:?} cameras={} alerts={} detections={}{}",
        snapshot
            .last_update
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".into()),
        snapshot.mode,
        snapshot.connection_state,
        snapshot.ai_model_status,
        snapshot.cameras.len(),
        snapshot.alerts.len(),
        snapshot.detections.len(),
        snapshot
            .error
            .as_deref()
            .map(|e| format!(" error=\"{}\"", e))
            .unwrap_or_default(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // // Statement: Keep the guard alive for the whole run
    let _guard = init_tracing(LoggingOptions {
        level: args.log_level.clone(),
        ..LoggingOptions::default()
    })?;

    let mut config = load_config(args.config.as_deref()).context("loading configuration")?;
    config.mode_override = Some(args.mode);

    let scheduler = SyncScheduler::from_config(config)?;
    println!("[*] Sync scheduler started in {} mode", scheduler.mode());

    let mut updates = scheduler.subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&*snapshot)?);
                } else {
                    println!("{}", summary(&snapshot));
                }
            }
        }
    }

    if let Some(alert) = scheduler.snapshot().alerts.first() {
        scheduler.acknowledge_alert(&alert.id).await?;
        println!("[*] Acknowledged alert {}", alert.id);
    }

    scheduler.teardown().await;
    println!("[*] Torn down; final snapshot: {}", summary(&scheduler.snapshot()));
    Ok(())
}
