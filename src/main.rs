//! Signal recorder - derives mouth and hand signals from detected landmarks
//!
//! Drives the frame pipeline from a recorded detection stream standing in for
//! the live camera and vision library.
//!
//! Module structure:
//! - `domain/` - Core types (Frame, landmarks, DisplayState, Sample)
//! - `io/` - External interfaces (ingest channel, replay reader, CSV export)
//! - `services/` - Logic (projection, classifiers, session, pipeline)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use signal_recorder::infra::{Config, Metrics};
use signal_recorder::io::{create_pipeline_channel, run_replay, CsvExporter, ReplayOptions};
use signal_recorder::services::{FramePipeline, MouthThreshold, RecordingSession, ReplayDetector};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Signal recorder - mouth/hand state derivation and CSV recording
#[derive(Parser, Debug)]
#[command(name = "signal-recorder", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON Lines detection stream to replay
    #[arg(short, long)]
    replay: PathBuf,

    /// Deliver every frame instead of pacing by timestamp and dropping while busy
    #[arg(long)]
    lossless: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    // Default: INFO, use RUST_LOG=debug for per-frame classification events
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("signal-recorder starting");

    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));
    info!(
        config_file = %config.config_file(),
        camera = ?config.camera_position(),
        orientation = %config.device_orientation().as_str(),
        view_width = %config.view_width(),
        view_height = %config.view_height(),
        mouth_threshold = %config.mouth_threshold(),
        output_dir = %config.output_dir().display(),
        timestamp_source = ?config.timestamp_source(),
        queue_depth = %config.queue_depth(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let session = RecordingSession::new(CsvExporter::new(config.output_dir()), metrics.clone());
    let threshold = MouthThreshold::new(config.mouth_threshold());
    let mut pipeline =
        FramePipeline::new(&config, ReplayDetector::new(), session, threshold, metrics.clone());

    // Stand-in for the UI: log every display change
    let mut display_rx = pipeline.subscribe();
    tokio::spawn(async move {
        while display_rx.changed().await.is_ok() {
            let state = *display_rx.borrow_and_update();
            info!(
                mouth = state.mouth.map(|m| m.as_str()).unwrap_or("-"),
                left_hand = state.left_hand.map(|h| h.as_str()).unwrap_or("-"),
                right_hand = state.right_hand.map(|h| h.as_str()).unwrap_or("-"),
                "display_changed"
            );
        }
    });

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let (sender, input_rx) = create_pipeline_channel(config.queue_depth(), metrics.clone());

    let options = ReplayOptions {
        lossless: args.lossless,
        paced: !args.lossless,
        camera: config.camera_position(),
        orientation: config.device_orientation(),
    };
    let replay_path = args.replay.clone();
    let replay_shutdown = shutdown_rx.clone();
    // Sender is moved in so the channel closes when the replay ends
    let replay_task =
        tokio::spawn(async move { run_replay(&replay_path, &sender, options, replay_shutdown).await });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    info!("pipeline_started");
    pipeline.run(input_rx, shutdown_rx).await;

    metrics.report().log();

    match replay_task.await.context("replay task panicked")? {
        Ok(stats) => info!(frames = stats.frames_sent, dropped = stats.frames_dropped, "replay_complete"),
        Err(e) => {
            error!(error = %e, "replay_failed");
            return Err(e).with_context(|| format!("replay of {} failed", args.replay.display()));
        }
    }

    info!("signal-recorder shutdown complete");
    Ok(())
}
