//! Job repository: status records plus the pending queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use queue_core::{Job, JobId, JobStatus, QueueError};
use serde::{Deserialize, Serialize};
use surrealdb::method::Stream;
use tokio::time::Instant;

use crate::{DbError, get_db};

/// Sleep between queue checks when live notifications are unavailable.
const FALLBACK_POLL: Duration = Duration::from_millis(500);

/// Repository for job persistence operations.
pub struct JobRepository;

/// Internal record type for SurrealDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    job_id: JobId,
    prompt: String,
    status: JobStatus,
    percent_complete: u8,
    accepted_by: String,
    #[serde(default)]
    worker_session: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            prompt: job.prompt.clone(),
            status: job.status,
            percent_complete: job.percent_complete,
            accepted_by: job.accepted_by.clone(),
            worker_session: job.worker_session.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

impl From<JobRecord> for Job {
    fn from(r: JobRecord) -> Self {
        Job {
            id: r.job_id,
            prompt: r.prompt,
            status: r.status,
            percent_complete: r.percent_complete,
            accepted_by: r.accepted_by,
            worker_session: r.worker_session,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Queue entry. Only the id is read back; ordering happens in the query.
#[derive(Debug, Clone, Deserialize)]
struct PendingRecord {
    job_id: JobId,
}

/// Record write and queue append commit together, so no reader can see the
/// queue entry without its job record.
const ENQUEUE: &str = r#"
BEGIN TRANSACTION;
CREATE type::thing('job', $id) CONTENT $record;
CREATE type::thing('pending', $id) SET job_id = $id, enqueued_at = time::now();
COMMIT TRANSACTION;
"#;

const QUEUE_HEAD: &str =
    "SELECT job_id, enqueued_at FROM pending ORDER BY enqueued_at ASC, job_id ASC LIMIT 1";

/// Conditional status write. The WHERE clause is the monotonicity guard, so
/// a stale or out-of-order update matches nothing instead of overwriting.
const UPDATE_STATUS: &str = r#"
UPDATE type::thing('job', $id)
SET status = $status, percent_complete = $percent, updated_at = $now
WHERE status IN $from
    AND (status != "running" OR $status != "running" OR percent_complete <= $percent)
RETURN AFTER
"#;

/// The pending delete and the move to `running` commit together, so a
/// dequeued id is always a running job owned by the claiming session.
/// A taker that loses the race removes nothing and updates nothing.
const CLAIM: &str = r#"
BEGIN TRANSACTION;
DELETE type::thing('pending', $id);
UPDATE type::thing('job', $id)
SET status = "running", percent_complete = 0, worker_session = $session, updated_at = $now
WHERE status = "queued"
RETURN AFTER;
COMMIT TRANSACTION;
"#;

const FAIL_ORPHANED: &str = r#"
UPDATE job
SET status = "failed", updated_at = $now
WHERE status = "running" AND (worker_session = NONE OR worker_session != $session)
RETURN AFTER
"#;

impl JobRepository {
    /// Create a queued job and append it to the pending queue.
    ///
    /// Fails with `InvalidInput` for an empty prompt, before touching the store.
    pub async fn create(prompt: &str, accepted_by: &str) -> Result<Job, DbError> {
        let job = Job::new(prompt, accepted_by)?;
        let db = get_db()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = db
                .query(ENQUEUE)
                .bind(("id", job.id.to_string()))
                .bind(("record", JobRecord::from(&job)))
                .await
                .and_then(|response| response.check())
                .map_err(DbError::from);

            match result {
                Ok(_) => break,
                Err(e) if e.is_retryable() && attempt < 5 => {
                    tracing::debug!(job_id = %job.id, attempt, "Enqueue conflicted; retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(job_id = %job.id, accepted_by, "Job enqueued");
        Ok(job)
    }

    /// Get a job by ID.
    pub async fn get(id: &JobId) -> Result<Job, DbError> {
        let db = get_db()?;

        let record: Option<JobRecord> = db.select(("job", id.to_string())).await?;

        record
            .map(Job::from)
            .ok_or_else(|| QueueError::NotFound(format!("job {id}")).into())
    }

    /// Look up a job by a caller-supplied id string.
    ///
    /// The id is validated on every lookup, not just at creation.
    pub async fn lookup(raw_id: &str) -> Result<Job, DbError> {
        let id = JobId::parse(raw_id)?;
        Self::get(&id).await
    }

    /// Claim the oldest queued job for `session`, if any, without waiting.
    ///
    /// The claim removes the pending entry and moves the job to `running` at
    /// 0% in one transaction. An entry whose job is no longer `queued` (or
    /// has no record at all) is dropped and the next head is tried.
    pub async fn try_dequeue(session: &str) -> Result<Option<Job>, DbError> {
        let db = get_db()?;

        loop {
            let mut response = db.query(QUEUE_HEAD).await?;
            let head: Vec<PendingRecord> = response.take(0)?;
            let Some(head) = head.into_iter().next() else {
                return Ok(None);
            };

            let claimed: Result<Vec<JobRecord>, DbError> = async {
                let mut response = db
                    .query(CLAIM)
                    .bind(("id", head.job_id.to_string()))
                    .bind(("session", session.to_string()))
                    .bind(("now", Utc::now()))
                    .await?
                    .check()?;
                // BEGIN and COMMIT produce no results: 0 is the DELETE.
                Ok(response.take(1)?)
            }
            .await;

            match claimed {
                Ok(records) => match records.into_iter().next() {
                    Some(record) => {
                        tracing::debug!(job_id = %record.job_id, session, "Claimed job");
                        return Ok(Some(record.into()));
                    }
                    None => {
                        tracing::debug!(job_id = %head.job_id, "Skipped pending entry with no queued job");
                    }
                },
                // Another taker committed first; look at the new head.
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait up to `wait` for a queued job and claim it for `session`.
    ///
    /// Idle waiting is driven by a live query on the pending table rather
    /// than by polling; the subscription is opened before the first check so
    /// an enqueue racing with the check still wakes us.
    pub async fn dequeue(wait: Duration, session: &str) -> Result<Option<Job>, DbError> {
        let db = get_db()?;
        let deadline = Instant::now() + wait;

        let live: Result<Stream<Vec<PendingRecord>>, surrealdb::Error> =
            db.select("pending").live().await;
        let mut live = match live {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::debug!(error = %e, "Live query unavailable; falling back to polling");
                None
            }
        };

        loop {
            if let Some(job) = Self::try_dequeue(session).await? {
                return Ok(Some(job));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match live.as_mut() {
                Some(stream) => match tokio::time::timeout(remaining, stream.next()).await {
                    Ok(Some(_)) => {}
                    Ok(None) => live = None,
                    Err(_) => return Ok(None),
                },
                None => tokio::time::sleep(remaining.min(FALLBACK_POLL)).await,
            }
        }
    }

    /// Move a job to `status` at `percent`.
    ///
    /// Backward moves (including progress going down within `running`) are
    /// rejected with `InvalidTransition` and leave the record untouched.
    pub async fn update_status(id: &JobId, status: JobStatus, percent: u8) -> Result<Job, DbError> {
        if percent > 100 {
            return Err(QueueError::InvalidInput(format!("percent_complete {percent} exceeds 100")).into());
        }

        let db = get_db()?;
        let from: Vec<JobStatus> = status.predecessors().to_vec();

        let mut response = db
            .query(UPDATE_STATUS)
            .bind(("id", id.to_string()))
            .bind(("status", status))
            .bind(("percent", percent))
            .bind(("from", from))
            .bind(("now", Utc::now()))
            .await?;
        let updated: Vec<JobRecord> = response.take(0)?;

        match updated.into_iter().next() {
            Some(record) => Ok(record.into()),
            None => Err(Self::explain_rejection(id, status, percent).await),
        }
    }

    /// Fail every `running` job not owned by `session`.
    ///
    /// Run by a worker at boot: anything still running then was abandoned by
    /// a previous worker process. Jobs are never requeued.
    pub async fn fail_orphaned(session: &str) -> Result<Vec<JobId>, DbError> {
        let db = get_db()?;

        let mut response = db
            .query(FAIL_ORPHANED)
            .bind(("session", session.to_string()))
            .bind(("now", Utc::now()))
            .await?;
        let updated: Vec<JobRecord> = response.take(0)?;

        let ids: Vec<JobId> = updated.into_iter().map(|r| r.job_id).collect();
        for id in &ids {
            tracing::warn!(job_id = %id, "Failed job abandoned by a previous worker");
        }
        Ok(ids)
    }

    /// Number of jobs waiting in the pending queue.
    pub async fn pending_len() -> Result<u64, DbError> {
        let db = get_db()?;

        let mut result = db.query("SELECT count() FROM pending GROUP ALL").await?;

        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let counts: Vec<CountResult> = result.take(0)?;

        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }

    /// Work out why a conditional update matched nothing.
    async fn explain_rejection(id: &JobId, status: JobStatus, percent: u8) -> DbError {
        match Self::get(id).await {
            Ok(current) => match current.check_update(status, percent) {
                Err(e) => e.into(),
                // Raced with another writer between the update and this read.
                Ok(()) => QueueError::InvalidTransition(format!(
                    "job {id} changed concurrently; {} at {percent}% not applied",
                    status
                ))
                .into(),
            },
            Err(e) => e,
        }
    }
}
