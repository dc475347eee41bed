//! Single-slot coordinator for ingestion batches.
//!
//! At most one batch runs at a time. The running slot is represented by a
//! [`JobGuard`]; dropping the guard without finishing it marks the job as
//! failed (or cancelled, when cancellation was requested), so the
//! coordinator never stays in [`JobState::Running`].

use chrono::{DateTime, Utc};
use mizan_core::error::{MizanError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// State of the ingestion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub state: JobState,
    /// Fraction of documents processed, in [0, 1]
    pub progress: f32,
    pub total_documents: usize,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            progress: 0.0,
            total_documents: 0,
            message: None,
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    snapshot: JobSnapshot,
    token: Option<CancellationToken>,
}

/// Owns the ingestion state machine. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct IngestionCoordinator {
    slot: Arc<Mutex<Slot>>,
}

impl IngestionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> JobState {
        self.slot.lock().snapshot.state
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.slot.lock().snapshot.clone()
    }

    /// Claim the slot for a batch of `total_documents`.
    ///
    /// Fails with a job conflict while another batch is running.
    pub fn try_start(&self, total_documents: usize) -> Result<JobGuard> {
        let mut slot = self.slot.lock();
        if slot.snapshot.state == JobState::Running {
            return Err(MizanError::job_conflict(
                "an ingestion batch is already running",
            ));
        }

        let token = CancellationToken::new();
        slot.snapshot = JobSnapshot {
            state: JobState::Running,
            progress: 0.0,
            total_documents,
            message: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        };
        slot.token = Some(token.clone());
        info!("Ingestion batch started ({} documents)", total_documents);

        Ok(JobGuard {
            slot: self.slot.clone(),
            token,
            finished: false,
        })
    }

    /// Request cancellation of the running batch. Returns false when idle.
    pub fn cancel(&self) -> bool {
        let slot = self.slot.lock();
        match (&slot.token, slot.snapshot.state) {
            (Some(token), JobState::Running) => {
                info!("Cancellation requested for running ingestion batch");
                token.cancel();
                true
            }
            _ => false,
        }
    }
}

/// Holds the running slot until finished or dropped.
#[derive(Debug)]
pub struct JobGuard {
    slot: Arc<Mutex<Slot>>,
    token: CancellationToken,
    finished: bool,
}

impl JobGuard {
    /// Token observed between documents.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn set_progress(&self, fraction: f32) {
        self.slot.lock().snapshot.progress = fraction.clamp(0.0, 1.0);
    }

    pub fn complete(mut self, message: Option<String>) {
        self.finish(JobState::Completed, message);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.finish(JobState::Failed, Some(message.into()));
    }

    pub fn cancelled(mut self) {
        self.finish(JobState::Cancelled, Some("cancelled by request".to_string()));
    }

    fn finish(&mut self, state: JobState, message: Option<String>) {
        let mut slot = self.slot.lock();
        slot.snapshot.state = state;
        slot.snapshot.message = message;
        slot.snapshot.finished_at = Some(Utc::now());
        if state == JobState::Completed {
            slot.snapshot.progress = 1.0;
        }
        slot.token = None;
        self.finished = true;
        info!("Ingestion batch finished: {:?}", state);
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.token.is_cancelled() {
            self.finish(JobState::Cancelled, Some("cancelled by request".to_string()));
        } else {
            warn!("Ingestion job guard dropped while running");
            self.finish(
                JobState::Failed,
                Some("ingestion batch ended unexpectedly".to_string()),
            );
        }
    }
}
