//! In-memory state of one orchestrated upload call.

use tracing::trace;
use weavedrop_protocol::UploadProgress;
use weavedrop_transfer::{Phase, ProgressMeter, TransferRecord};

use crate::error::UploadError;

/// Mutable state owned by a single `upload` call and dropped when it returns.
///
/// Only the orchestrator and the engine running on the same task touch it.
#[derive(Debug)]
pub struct UploadSession {
    id: String,
    phase: Phase,
    attempt: u32,
    meter: ProgressMeter,
    transfer: Option<TransferRecord>,
    last_error: Option<UploadError>,
    confirmed: bool,
}

impl UploadSession {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            phase: Phase::Idle,
            attempt: 0,
            meter: ProgressMeter::new(total_bytes),
            transfer: None,
            last_error: None,
            confirmed: false,
        }
    }

    /// Starts a new attempt: resets the phase and drops the previous transfer.
    ///
    /// Returns the 1-based attempt number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.phase = Phase::Idle;
        self.transfer = None;
        self.confirmed = false;
        self.meter.restart_attempt();
        self.attempt
    }

    /// Moves to `next`, rejecting backward or post-terminal transitions.
    pub fn enter(&mut self, next: Phase) -> Result<(), UploadError> {
        self.phase = self
            .phase
            .transition(next)
            .map_err(|e| UploadError::unknown(e.to_string()))?;
        trace!(session = %self.id, attempt = self.attempt, phase = ?next, "phase");
        Ok(())
    }

    /// Records an acknowledged chunk and returns the progress to report.
    ///
    /// Returns `None` once the whole payload is acknowledged; that report is
    /// made by [`complete_progress`](Self::complete_progress).
    pub fn record_chunk(&mut self, chunk_bytes: u64, attempt_bytes: u64) -> Option<UploadProgress> {
        self.meter.record(chunk_bytes, attempt_bytes)
    }

    /// Final progress report for a completed attempt.
    pub fn complete_progress(&mut self) -> UploadProgress {
        self.meter.complete()
    }

    pub fn set_transfer(&mut self, record: TransferRecord) {
        self.transfer = Some(record);
    }

    pub fn set_error(&mut self, err: UploadError) {
        self.last_error = Some(err);
    }

    pub fn set_confirmed(&mut self, confirmed: bool) {
        self.confirmed = confirmed;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.meter.reported_bytes()
    }

    pub fn total_bytes(&self) -> u64 {
        self.meter.total_bytes()
    }

    pub fn transfer(&self) -> Option<&TransferRecord> {
        self.transfer.as_ref()
    }

    pub fn last_error(&self) -> Option<&UploadError> {
        self.last_error.as_ref()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}
