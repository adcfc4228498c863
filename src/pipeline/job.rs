use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::stage::{Stage, StageDefinition, StageStatus};

/// Why a stage status write was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionRejected {
    #[error("job has been cancelled")]
    Cancelled,

    #[error("no stage at position {0}")]
    UnknownStage(usize),

    #[error("stage {index} cannot move from {from} to {to}")]
    Illegal {
        index: usize,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("an earlier stage failed; no further stages may run")]
    Halted,

    #[error("stage {0} is already running")]
    AlreadyRunning(usize),
}

/// One run of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Free-text label supplied by the caller.
    pub theme: String,
    pub stages: Vec<Stage>,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(theme: String, definitions: &[StageDefinition]) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            theme,
            stages: definitions.iter().cloned().map(Stage::pending).collect(),
            cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Write a new status for the stage at `index`.
    ///
    /// Every write goes through here so the record can never hold two
    /// running stages, a stage past a failure that left `Pending`, or any
    /// change made after cancellation.
    pub fn advance(&mut self, index: usize, next: StageStatus) -> Result<(), TransitionRejected> {
        if self.cancelled {
            return Err(TransitionRejected::Cancelled);
        }
        let current = self
            .stages
            .get(index)
            .map(|s| s.status)
            .ok_or(TransitionRejected::UnknownStage(index))?;

        if !current.can_advance_to(next) {
            return Err(TransitionRejected::Illegal {
                index,
                from: current,
                to: next,
            });
        }
        if next == StageStatus::Running {
            if self.has_failed() {
                return Err(TransitionRejected::Halted);
            }
            if let Some(running) = self.running_stage() {
                return Err(TransitionRejected::AlreadyRunning(running));
            }
        }

        self.stages[index].status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Idempotently raise the cancellation flag. Returns `true` on the first
    /// call. A job that already completed or failed is left untouched.
    pub fn cancel(&mut self) -> bool {
        if self.cancelled || self.has_failed() || self.is_complete() {
            return false;
        }
        self.cancelled = true;
        self.updated_at = Utc::now();
        true
    }

    pub fn running_stage(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.status == StageStatus::Running)
    }

    pub fn has_failed(&self) -> bool {
        self.stages.iter().any(|s| s.status == StageStatus::Failed)
    }

    pub fn is_complete(&self) -> bool {
        !self.has_failed()
            && self
                .stages
                .iter()
                .all(|s| s.status == StageStatus::Completed)
    }

    /// No further stage writes will ever happen: complete, failed or cancelled.
    pub fn is_settled(&self) -> bool {
        self.cancelled || self.has_failed() || self.is_complete()
    }

    /// Independent copy of the stage sequence plus the derived flags.
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            stages: self.stages.clone(),
            is_complete: self.is_complete(),
            has_failed: self.has_failed(),
        }
    }
}

/// What a status call returns: a snapshot of the stages at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub stages: Vec<Stage>,
    pub is_complete: bool,
    pub has_failed: bool,
}

impl StatusReport {
    /// Polling stops once this is true.
    pub fn is_terminal(&self) -> bool {
        self.is_complete || self.has_failed
    }
}
