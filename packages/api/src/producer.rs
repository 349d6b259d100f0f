//! Producer operations shared by every front-end replica.
//!
//! Replicas hold no job state of their own: every call goes to the job store
//! or the artifact store, and the only thing a replica adds is its identity
//! in `handled_by`.

use std::sync::Arc;

use db::repositories::{JobRepository, ReadinessRepository};
use queue_core::{JobId, JobStatus, JobView, ModelStatus, QueueError};
use storage::{ArtifactStream, Storage};

use crate::error::ApiResult;

#[derive(Clone)]
pub struct Producer {
    replica_id: Arc<str>,
    storage: Storage,
}

impl Producer {
    pub fn new(replica_id: impl Into<String>, storage: Storage) -> Self {
        Self {
            replica_id: Arc::from(replica_id.into()),
            storage,
        }
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Current readiness of the inference worker.
    pub async fn model_status(&self) -> ApiResult<ModelStatus> {
        Ok(ReadinessRepository::get_state().await?.status())
    }

    /// Accept a prompt. Refused while the gate is not open; nothing is
    /// written in that case.
    pub async fn submit(&self, prompt: &str) -> ApiResult<JobView> {
        ReadinessRepository::get_state().await?.admit()?;

        let job = JobRepository::create(prompt, &self.replica_id).await?;
        tracing::info!(job_id = %job.id, replica = %self.replica_id, "Job accepted");
        Ok(job.view(self.replica_id.as_ref()))
    }

    /// Current view of a job. Reads only.
    pub async fn poll(&self, raw_id: &str) -> ApiResult<JobView> {
        let job = JobRepository::lookup(raw_id).await?;
        Ok(job.view(self.replica_id.as_ref()))
    }

    /// Open a finished job's video.
    ///
    /// The id is validated before any store is touched.
    pub async fn fetch_artifact(&self, raw_id: &str) -> ApiResult<ArtifactStream> {
        let id = JobId::parse(raw_id)?;
        let job = JobRepository::get(&id).await?;
        if job.status != JobStatus::Finished {
            return Err(QueueError::NotFound(format!("job {id} has no artifact yet")).into());
        }
        Ok(self.storage.open_artifact(&id).await?)
    }
}
