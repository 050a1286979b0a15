//! Synthetic replay generator
//!
//! Writes a deterministic JSON Lines detection stream for `signal-recorder --replay`:
//! a start/stop bracket around N frames in which the mouth opens and closes and
//! each arm is raised and lowered on its own schedule.
//!
//! Usage:
//!   cargo run --bin signal-synth -- --frames 300 --out replays/demo.jsonl

use anyhow::Context;
use clap::Parser;
use serde_json::{json, Map, Value};
use std::f64::consts::TAU;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

const FRAME_WIDTH: u32 = 480;
const FRAME_HEIGHT: u32 = 640;
const START_TS: u64 = 1_700_000_000_000;
/// Frames per full mouth open/close cycle
const MOUTH_PERIOD: f64 = 60.0;

#[derive(Parser, Debug)]
#[command(name = "signal-synth", version)]
#[command(about = "Generate a synthetic detection replay")]
struct Args {
    /// Number of frames to generate
    #[arg(short, long, default_value = "300")]
    frames: u32,

    /// Output file
    #[arg(short, long)]
    out: PathBuf,

    /// Frame rate used to space timestamps
    #[arg(long, default_value = "30")]
    fps: f64,
}

/// Lip contour at height `y`, horizontally centered on the frame
fn lip(y: f64) -> Value {
    let cx = FRAME_WIDTH as f64 / 2.0;
    let points: Vec<[f64; 2]> = (-4..=4).map(|i| [cx + i as f64 * 6.0, y]).collect();
    json!(points)
}

fn joint(x: f64, y: f64) -> Value {
    json!({ "x": x, "y": y, "likelihood": 0.98 })
}

/// Shoulder, elbow, wrist joints for one arm; raised arms put the wrist and elbow above the shoulder
fn arm(pose: &mut Map<String, Value>, side: &str, x: f64, raised: bool) {
    let shoulder_y = 380.0;
    let (elbow_y, wrist_y) = if raised { (330.0, 270.0) } else { (440.0, 500.0) };
    pose.insert(format!("{side}_shoulder"), joint(x, shoulder_y));
    pose.insert(format!("{side}_elbow"), joint(x, elbow_y));
    pose.insert(format!("{side}_wrist"), joint(x, wrist_y));
}

fn frame_record(index: u32, ts: u64) -> Value {
    let phase = (index as f64 / MOUTH_PERIOD) * TAU;
    let gap = 2.0 + 14.0 * (0.5 - 0.5 * phase.cos());
    let upper_y = 300.0;

    let mut pose = Map::new();
    pose.insert("nose".to_string(), joint(240.0, 250.0));
    arm(&mut pose, "left", 170.0, (index / 45) % 2 == 1);
    arm(&mut pose, "right", 310.0, (index / 30) % 3 == 0);

    json!({
        "type": "frame",
        "ts": ts,
        "width": FRAME_WIDTH,
        "height": FRAME_HEIGHT,
        "camera": "front",
        "orientation": "portrait",
        "faces": [{
            "contours": {
                "upper_lip_bottom": lip(upper_y),
                "lower_lip_top": lip(upper_y + gap),
            }
        }],
        "pose": pose,
    })
}

/// Frame indices of the threshold change and its reset: halfway and three quarters in
fn threshold_schedule(frames: u32) -> (u32, u32) {
    let reset_at = (u64::from(frames) * 3 / 4) as u32;
    (frames / 2, reset_at)
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.fps > 0.0, "--fps must be positive");

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;
    let mut out = BufWriter::new(file);

    let frame_interval_ms = (1000.0 / args.fps).round().max(1.0) as u64;
    let (threshold_at, reset_at) = threshold_schedule(args.frames);

    writeln!(out, "# signal-synth frames={} fps={}", args.frames, args.fps)?;
    writeln!(out, "{}", json!({ "type": "start" }))?;
    for index in 0..args.frames {
        if index == threshold_at && index > 0 {
            writeln!(out, "{}", json!({ "type": "threshold", "value": 8 }))?;
        }
        if index == reset_at && index > threshold_at {
            writeln!(out, "{}", json!({ "type": "threshold_reset" }))?;
        }
        let ts = START_TS + index as u64 * frame_interval_ms;
        writeln!(out, "{}", frame_record(index, ts))?;
    }
    writeln!(out, "{}", json!({ "type": "stop" }))?;
    out.flush().with_context(|| format!("Failed to write {}", args.out.display()))?;

    info!(path = %args.out.display(), frames = args.frames, "replay_generated");
    Ok(())
}
