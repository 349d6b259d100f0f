//! Message types for the inference worker.

use chrono::{DateTime, Utc};
use queue_core::JobId;
use ractor::RpcReplyPort;

/// Messages for the InferenceWorker.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Open the readiness gate: fail orphans, load the model, mark ready or fault.
    Initialize,

    /// Wait for one job and process it, then poll again.
    Poll,

    /// Get worker counters.
    GetStats { reply: RpcReplyPort<WorkerStats> },

    /// Stop after the current job.
    Shutdown,
}

/// Counters reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker_id: String,
    pub session: String,
    pub ready: bool,
    pub finished: u64,
    pub failed: u64,
    /// Claimed jobs this worker could not finalize: another session ended
    /// them first, or the terminal write never reached the store.
    pub abandoned: u64,
    /// Jobs from earlier sessions failed at boot.
    pub orphaned: u64,
    pub last_job: Option<JobId>,
    pub started_at: DateTime<Utc>,
}

/// How a single claimed job ended for this worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Finished,
    Failed,
    Abandoned,
}
