//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{CameraPosition, DeviceOrientation};
use crate::services::classifier::DEFAULT_MOUTH_THRESHOLD;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Where a sample's timestamp key comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Capture timestamp carried by the frame
    #[default]
    Frame,
    /// Wall clock when the frame is ingested
    WallClock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub position: CameraPosition,
    #[serde(default)]
    pub orientation: DeviceOrientation,
    /// Preview layer width in points
    #[serde(default = "default_view_width")]
    pub view_width: f64,
    /// Preview layer height in points
    #[serde(default = "default_view_height")]
    pub view_height: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: CameraPosition::default(),
            orientation: DeviceOrientation::default(),
            view_width: default_view_width(),
            view_height: default_view_height(),
        }
    }
}

fn default_view_width() -> f64 {
    390.0
}

fn default_view_height() -> f64 {
    844.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Rounded lip distance at or below which the mouth counts as closed
    #[serde(default = "default_mouth_threshold")]
    pub mouth_threshold: i64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { mouth_threshold: default_mouth_threshold() }
    }
}

fn default_mouth_threshold() -> i64 {
    DEFAULT_MOUTH_THRESHOLD
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// Directory that receives data<N>.csv exports
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub timestamp_source: TimestampSource,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self { output_dir: default_output_dir(), timestamp_source: TimestampSource::default() }
    }
}

fn default_output_dir() -> String {
    "recordings".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Frames queued ahead of the worker before new ones are dropped
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { queue_depth: default_queue_depth() }
    }
}

fn default_queue_depth() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    camera_position: CameraPosition,
    device_orientation: DeviceOrientation,
    view_width: f64,
    view_height: f64,
    mouth_threshold: i64,
    output_dir: PathBuf,
    timestamp_source: TimestampSource,
    queue_depth: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            camera_position: toml_config.camera.position,
            device_orientation: toml_config.camera.orientation,
            view_width: toml_config.camera.view_width,
            view_height: toml_config.camera.view_height,
            mouth_threshold: toml_config.classifier.mouth_threshold,
            output_dir: PathBuf::from(toml_config.recording.output_dir),
            timestamp_source: toml_config.recording.timestamp_source,
            // A zero-capacity mpsc channel panics on creation
            queue_depth: toml_config.pipeline.queue_depth.max(1),
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file,
        }
    }

    /// Determine config file path from an explicit argument or the environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn camera_position(&self) -> CameraPosition {
        self.camera_position
    }

    pub fn device_orientation(&self) -> DeviceOrientation {
        self.device_orientation
    }

    pub fn view_width(&self) -> f64 {
        self.view_width
    }

    pub fn view_height(&self) -> f64 {
        self.view_height
    }

    pub fn mouth_threshold(&self) -> i64 {
        self.mouth_threshold
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn timestamp_source(&self) -> TimestampSource {
        self.timestamp_source
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests and embedders to redirect exports
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Builder method to select the sample timestamp source
    pub fn with_timestamp_source(mut self, source: TimestampSource) -> Self {
        self.timestamp_source = source;
        self
    }

    #[cfg(test)]
    pub fn with_mouth_threshold(mut self, threshold: i64) -> Self {
        self.mouth_threshold = threshold;
        self
    }
}
