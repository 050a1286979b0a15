//! Recording session state machine
//!
//! `Idle -> start -> Recording -> stop -> Idle`. The whole session state sits
//! behind one mutex so the frame worker and control callers never interleave
//! inside a sample update.

use crate::domain::sample::{Sample, SampleField};
use crate::infra::metrics::Metrics;
use crate::io::export::{CsvExporter, ExportError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct SessionState {
    samples: FxHashMap<u64, Sample>,
    recording: bool,
    session_id: Option<Uuid>,
    /// Key of the sample opened by the latest frame
    current_ts: Option<u64>,
}

/// Outcome of a stop
#[derive(Debug)]
pub struct ExportReport {
    /// `None` when stop was called while idle
    pub session_id: Option<Uuid>,
    pub samples_total: usize,
    pub rows_written: usize,
    pub rows_incomplete: usize,
    pub outcome: Result<PathBuf, ExportError>,
}

impl ExportReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.outcome.as_ref().ok()
    }
}

/// Cloneable handle to the shared session
#[derive(Clone)]
pub struct RecordingSession {
    state: Arc<Mutex<SessionState>>,
    exporter: CsvExporter,
    metrics: Arc<Metrics>,
}

impl RecordingSession {
    pub fn new(exporter: CsvExporter, metrics: Arc<Metrics>) -> Self {
        Self { state: Arc::new(Mutex::new(SessionState::default())), exporter, metrics }
    }

    /// Begin a new recording. Returns false (and changes nothing) if one is already active.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if state.recording {
            warn!(session_id = ?state.session_id, "recording_already_active");
            return false;
        }

        let session_id = Uuid::now_v7();
        state.samples.clear();
        state.current_ts = None;
        state.session_id = Some(session_id);
        state.recording = true;

        info!(session_id = %session_id, "recording_started");
        true
    }

    /// End the recording and export it. Always exports, even when idle.
    pub fn stop(&self) -> ExportReport {
        let (session_id, samples) = {
            let mut state = self.state.lock();
            let was_recording = state.recording;
            state.recording = false;
            let session_id = if was_recording { state.session_id } else { None };
            (session_id, Self::drain_locked(&mut state))
        };

        if session_id.is_none() {
            warn!("stop_while_idle_exporting_empty");
        }

        let samples_total = samples.len();
        let report = match self.exporter.export(&samples) {
            Ok((path, rendered)) => {
                info!(
                    session_id = ?session_id,
                    path = %path.display(),
                    rows = rendered.rows,
                    incomplete = rendered.incomplete,
                    "recording_exported"
                );
                ExportReport {
                    session_id,
                    samples_total,
                    rows_written: rendered.rows,
                    rows_incomplete: rendered.incomplete,
                    outcome: Ok(path),
                }
            }
            Err(e) => {
                error!(session_id = ?session_id, error = %e, samples = samples_total, "recording_export_failed");
                ExportReport {
                    session_id,
                    samples_total,
                    rows_written: 0,
                    rows_incomplete: 0,
                    outcome: Err(e),
                }
            }
        };

        self.metrics.record_export(report.is_ok(), report.rows_written, report.rows_incomplete);
        report
    }

    /// Open (or replace) the sample at `ts`. No-op when idle.
    pub fn begin_sample(&self, ts: u64) -> bool {
        let mut state = self.state.lock();
        if !state.recording {
            return false;
        }

        if state.samples.insert(ts, Sample::new(ts)).is_some() {
            debug!(ts = ts, "sample_replaced");
        }
        state.current_ts = Some(ts);
        self.metrics.record_sample_begun();
        true
    }

    /// Write one field into the sample at `ts`
    pub fn update_field(&self, ts: u64, field: SampleField) -> bool {
        self.update_fields(ts, std::slice::from_ref(&field))
    }

    /// Write several fields under a single lock
    pub fn update_fields(&self, ts: u64, fields: &[SampleField]) -> bool {
        let mut state = self.state.lock();
        if !state.recording {
            return false;
        }
        match state.samples.get_mut(&ts) {
            Some(sample) => {
                for field in fields {
                    sample.apply(*field);
                }
                true
            }
            None => false,
        }
    }

    /// Take all samples sorted by timestamp and leave the session empty
    pub fn drain_and_clear(&self) -> Vec<Sample> {
        Self::drain_locked(&mut self.state.lock())
    }

    fn drain_locked(state: &mut SessionState) -> Vec<Sample> {
        state.current_ts = None;
        let mut samples: Vec<Sample> = state.samples.drain().map(|(_, s)| s).collect();
        samples.sort_by_key(|s| s.ts);
        samples
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn session_id(&self) -> Option<Uuid> {
        let state = self.state.lock();
        state.recording.then_some(state.session_id).flatten()
    }

    pub fn current_ts(&self) -> Option<u64> {
        self.state.lock().current_ts
    }

    pub fn sample_count(&self) -> usize {
        self.state.lock().samples.len()
    }
}
