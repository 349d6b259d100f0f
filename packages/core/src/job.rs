//! Job domain types for generation requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::QueueError;

/// Longest id accepted on lookup. Generated ids are 26 characters.
pub const MAX_JOB_ID_LEN: usize = 64;

/// Unique identifier for a job.
///
/// Ids double as artifact path components, so every constructor validates
/// that the value is 1..=64 ASCII alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Create a new unique job ID (a ULID rendered in Crockford base-32).
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Parse a job ID supplied by a caller.
    ///
    /// Rejects anything that is not plain ASCII alphanumeric, which rules out
    /// `/`, `\`, `..` and every other path trick before the id reaches storage.
    pub fn parse(s: &str) -> Result<Self, QueueError> {
        if s.is_empty() {
            return Err(QueueError::InvalidInput("job id must not be empty".into()));
        }
        if s.len() > MAX_JOB_ID_LEN {
            return Err(QueueError::InvalidInput(format!(
                "job id longer than {MAX_JOB_ID_LEN} characters"
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(QueueError::InvalidInput(
                "job id may only contain ASCII letters and digits".into(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = QueueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Current status of a job in its lifecycle.
///
/// Transitions only move forward: `queued -> running -> finished` or
/// `queued -> running -> failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the pending queue.
    #[default]
    Queued,
    /// Taken by the worker and being generated.
    Running,
    /// Artifact written.
    Finished,
    /// Generation failed; no artifact.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    /// States a job may be in immediately before moving to `self`.
    ///
    /// `running -> running` is allowed so progress can be reported.
    pub fn predecessors(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[],
            JobStatus::Running => &[JobStatus::Queued, JobStatus::Running],
            JobStatus::Finished | JobStatus::Failed => &[JobStatus::Running],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single prompt-to-video request and its tracked lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Text prompt supplied by the client. Never blank.
    pub prompt: String,
    pub status: JobStatus,
    /// 0..=100, non-decreasing while running.
    pub percent_complete: u8,
    /// Producer replica that accepted the request.
    pub accepted_by: String,
    /// Worker boot session that took the job off the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_session: Option<String>,
    /// Diagnostics only; queue order is enqueue order.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job, rejecting empty prompts.
    pub fn new(prompt: impl Into<String>, accepted_by: impl Into<String>) -> Result<Self, QueueError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QueueError::InvalidInput("prompt must not be empty".into()));
        }

        let now = Utc::now();
        Ok(Self {
            id: JobId::new(),
            prompt,
            status: JobStatus::Queued,
            percent_complete: 0,
            accepted_by: accepted_by.into(),
            worker_session: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Check that moving to `status` at `percent` keeps the lifecycle monotonic.
    pub fn check_update(&self, status: JobStatus, percent: u8) -> Result<(), QueueError> {
        if percent > 100 {
            return Err(QueueError::InvalidInput(format!(
                "percent_complete {percent} exceeds 100"
            )));
        }
        if !self.status.can_transition_to(status) {
            return Err(QueueError::InvalidTransition(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, status
            )));
        }
        if self.status == JobStatus::Running
            && status == JobStatus::Running
            && percent < self.percent_complete
        {
            return Err(QueueError::InvalidTransition(format!(
                "job {} progress cannot drop from {} to {}",
                self.id, self.percent_complete, percent
            )));
        }
        Ok(())
    }

    /// Render the client-facing view, stamped with the answering replica.
    pub fn view(&self, handled_by: impl Into<String>) -> JobView {
        JobView {
            job_id: self.id.clone(),
            status: self.status,
            percent_complete: self.percent_complete,
            handled_by: handled_by.into(),
        }
    }
}

/// What producers return about a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub percent_complete: u8,
    /// Replica that served this response. Observational only.
    pub handled_by: String,
}
