//! Readiness gate persistence.
//!
//! One record, `readiness:gate`, written only by the worker and read by every
//! producer before it accepts a job. Reads always go to the store.

use chrono::{DateTime, Utc};
use queue_core::{QueueError, ReadinessState};
use serde::{Deserialize, Serialize};

use crate::{DbError, get_db};

/// Repository for the readiness gate.
pub struct ReadinessRepository;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReadinessRecord {
    state: String,
    #[serde(default)]
    reason: Option<String>,
    /// Worker boot session that owns this lifecycle.
    session: String,
    updated_at: DateTime<Utc>,
}

impl ReadinessRecord {
    fn new(state: &ReadinessState, session: &str) -> Self {
        let reason = match state {
            ReadinessState::Fault(reason) => Some(reason.clone()),
            _ => None,
        };
        Self {
            state: state.as_str().to_string(),
            reason,
            session: session.to_string(),
            updated_at: Utc::now(),
        }
    }

    fn state(&self) -> Result<ReadinessState, DbError> {
        match self.state.as_str() {
            "building" => Ok(ReadinessState::Building),
            "ready" => Ok(ReadinessState::Ready),
            "fault" => Ok(ReadinessState::Fault(self.reason.clone().unwrap_or_default())),
            other => Err(DbError::Serialization(format!("unknown readiness state {other:?}"))),
        }
    }
}

impl ReadinessRepository {
    /// Current gate state. A store that has never seen a worker is `Building`.
    pub async fn get_state() -> Result<ReadinessState, DbError> {
        match Self::load().await? {
            Some(record) => record.state(),
            None => Ok(ReadinessState::Building),
        }
    }

    /// Start (or restart) a lifecycle for `session`.
    ///
    /// A new session resets the gate so a restarted worker can rebuild;
    /// within one session this is only valid while still building.
    pub async fn mark_building(session: &str) -> Result<ReadinessState, DbError> {
        Self::transition(session, ReadinessState::Building).await
    }

    pub async fn mark_ready(session: &str) -> Result<ReadinessState, DbError> {
        Self::transition(session, ReadinessState::Ready).await
    }

    pub async fn mark_fault(session: &str, reason: impl Into<String>) -> Result<ReadinessState, DbError> {
        Self::transition(session, ReadinessState::Fault(reason.into())).await
    }

    async fn load() -> Result<Option<ReadinessRecord>, DbError> {
        let db = get_db()?;
        let record: Option<ReadinessRecord> = db.select(("readiness", "gate")).await?;
        Ok(record)
    }

    // Read-check-write is not atomic; the single worker is the only writer.
    async fn transition(session: &str, next: ReadinessState) -> Result<ReadinessState, DbError> {
        match Self::load().await? {
            Some(current) if current.session == session => {
                current.state()?.check_transition(&next)?;
            }
            Some(current) if next != ReadinessState::Building => {
                return Err(QueueError::InvalidTransition(format!(
                    "session {session} must mark building before {}; gate belongs to {}",
                    next.as_str(),
                    current.session
                ))
                .into());
            }
            // Fresh store or a new session: the lifecycle starts at building.
            _ => ReadinessState::Building.check_transition(&next)?,
        }

        let db = get_db()?;
        db.query("UPSERT type::thing('readiness', 'gate') CONTENT $record")
            .bind(("record", ReadinessRecord::new(&next, session)))
            .await?
            .check()?;

        tracing::info!(session, state = next.as_str(), "Readiness gate updated");
        Ok(next)
    }
}
