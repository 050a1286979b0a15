//! Services - signal derivation and recording state
//!
//! This module contains the core logic:
//! - `projection` - Frame-pixel to view coordinate mapping
//! - `classifier` - Mouth and hand state classification
//! - `detector` - Vision detector interface and replay backend
//! - `session` - Recording session state machine
//! - `pipeline` - Frame worker tying the above together

pub mod classifier;
pub mod detector;
pub mod pipeline;
pub mod projection;
pub mod session;

// Re-export commonly used types
pub use classifier::MouthThreshold;
pub use detector::{DetectorError, ReplayDetector, VisionDetector};
pub use pipeline::FramePipeline;
pub use session::{ExportReport, RecordingSession};
