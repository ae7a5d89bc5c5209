use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crash_guard::effects::EffectExecutor;
use crash_guard::replay::{self, LatestFix, Pacing};
use crash_guard::runtime::{self, RiderCommand, Runtime};
use crash_guard::{CollisionDetector, DetectorConfig};

#[derive(Parser, Debug)]
#[command(name = "crash_guard")]
#[command(about = "Replay rider sensor data through crash detection and SOS escalation", long_about = None)]
struct Args {
    /// Recorded samples (JSON array, optionally .gz)
    #[arg(long, value_name = "FILE")]
    replay: PathBuf,

    /// Detector config JSON (missing fields use defaults)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Playback speed factor (0 = no sleeps, countdowns still resolve before the next sample)
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Simulate the rider cancelling each countdown after N seconds
    #[arg(long, value_name = "SECONDS")]
    cancel_after: Option<u64>,

    /// Read rider commands from stdin ("c" = cancel, "sos" = trigger now)
    #[arg(long)]
    interactive: bool,

    /// Write run summary JSON here
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DetectorConfig::default(),
    };
    info!(
        "Crash Guard starting: thresholds {:?}, cooldown {}ms, countdown {}s/{}s (critical/other)",
        config.thresholds,
        config.cooldown_ms,
        config.critical_countdown_secs,
        config.default_countdown_secs
    );

    let records = replay::load_records(&args.replay)
        .with_context(|| format!("loading recording {}", args.replay.display()))?;

    let fix = LatestFix::new();
    let runtime = Runtime::new(
        CollisionDetector::new(&config),
        EffectExecutor::logging(),
        fix.clone(),
    );

    let (sample_tx, sample_rx) = mpsc::channel(500);
    let (command_tx, command_rx) = mpsc::channel::<RiderCommand>(16);

    let pacing = if args.speed > 0.0 {
        Pacing::Recorded(args.speed)
    } else {
        Pacing::Lockstep(runtime.subscribe())
    };
    let feed = tokio::spawn(replay::replay_feed(records, sample_tx, fix, pacing));

    if let Some(secs) = args.cancel_after {
        tokio::spawn(runtime::auto_cancel(
            runtime.subscribe(),
            command_tx.clone(),
            Duration::from_secs(secs),
        ));
    }
    if args.interactive {
        spawn_command_reader(command_tx.clone());
    }
    drop(command_tx);

    let summary = runtime.run(sample_rx, command_rx).await;

    match feed.await {
        Ok(Ok(sent)) => info!("Replay complete: {} samples sent", sent),
        Ok(Err(e)) => warn!("Replay stopped early: {}", e),
        Err(e) => warn!("Replay task failed: {}", e),
    }

    println!("\n=== Crash Guard Summary ===");
    println!("Samples processed: {}", summary.stats.samples_processed);
    println!("Minor bumps:       {}", summary.stats.minor_bumps);
    println!("Escalations:       {}", summary.stats.escalations);
    println!("  cancelled:       {}", summary.stats.cancelled);
    println!("  triggered:       {}", summary.stats.triggered);
    println!(
        "Suppressed:        {} (cooldown) / {} (active countdown)",
        summary.stats.suppressed_cooldown, summary.stats.suppressed_active_session
    );
    for event in summary.history.iter().rev() {
        println!(
            "  {} {:>8} {:6.1} m/s² {}",
            event.id,
            event.crash_type.as_str(),
            event.g_force,
            if event.reported { "REPORTED" } else { "" }
        );
    }

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
        let filename = dir.join(format!("crash_guard_{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
        std::fs::write(&filename, serde_json::to_string_pretty(&summary)?)?;
        println!("Saved summary to {}", filename.display());
    }

    Ok(())
}

/// Stdin reader on a plain thread so a pending read never blocks shutdown
fn spawn_command_reader(tx: mpsc::Sender<RiderCommand>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim().to_lowercase().as_str() {
                "c" | "cancel" | "ok" => RiderCommand::Cancel,
                "sos" | "help" => RiderCommand::TriggerNow,
                "" => continue,
                other => {
                    warn!("Unknown command '{}' (use 'c' or 'sos')", other);
                    continue;
                }
            };
            if tx.blocking_send(command).is_err() {
                break;
            }
        }
    });
}
