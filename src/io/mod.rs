//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `ingest_channel` - Typed channel carrying frames and controls to the pipeline
//! - `replay` - JSON Lines detection stream reader
//! - `export` - Recording output to numbered CSV files

pub mod export;
pub mod ingest_channel;
pub mod replay;

// Re-export commonly used types
pub use export::{CsvExporter, ExportError};
pub use ingest_channel::{create_pipeline_channel, ControlCommand, FrameSender, Offer, PipelineInput};
pub use replay::{run_replay, ReplayError, ReplayOptions, ReplayStats};
