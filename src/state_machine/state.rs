use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::{Job, JobFailure, SynthesisOutput};

/// Lifecycle status of a synthesis job.
///
/// Each job flows through: CREATED → PROCESSING → READY | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Processing,
    Ready,
    Failed,
}

impl JobStatus {
    /// `Ready` and `Failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    ///
    /// `Created` may skip straight to a terminal state when the
    /// `Processing` write could not be persisted.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Created, JobStatus::Processing) => true,
            (JobStatus::Created | JobStatus::Processing, JobStatus::Ready | JobStatus::Failed) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Created => write!(f, "CREATED"),
            JobStatus::Processing => write!(f, "PROCESSING"),
            JobStatus::Ready => write!(f, "READY"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATED" => Ok(JobStatus::Created),
            "PROCESSING" => Ok(JobStatus::Processing),
            "READY" => Ok(JobStatus::Ready),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A status write that would break monotonicity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for job {job_id}: {from} -> {to}")]
pub struct InvalidTransition {
    pub job_id: String,
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Job {
    /// Move the job to `next`, bumping `updated_at`.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record one more execution attempt.
    pub fn record_attempt(&mut self, attempt: u32) {
        // Attempts only ever grow; a stale callback must not lower the count.
        self.attempt_count = self.attempt_count.max(attempt);
        self.updated_at = Utc::now();
    }

    /// Finalize as `Ready` with the synthesis result.
    pub fn complete(&mut self, output: SynthesisOutput) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Ready)?;
        self.result = Some(output);
        self.failure = None;
        Ok(())
    }

    /// Finalize as `Failed`, discarding any partial result.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), InvalidTransition> {
        self.transition(JobStatus::Failed)?;
        self.result = None;
        self.failure = Some(failure);
        Ok(())
    }
}
