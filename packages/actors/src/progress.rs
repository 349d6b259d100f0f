//! Progress reporting from a running pipeline to the job store.

use std::sync::Arc;

use db::repositories::JobRepository;
use queue_core::{JobId, JobStatus, clamp_running_percent};
use tokio::sync::{oneshot, watch};

/// Handle the pipeline uses to report percent complete.
///
/// Values are clamped to the running range and only strictly increasing
/// values are published. Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Arc<watch::Sender<u8>>,
}

impl ProgressSink {
    /// Create a sink and the receiver that observes it.
    pub fn channel() -> (Self, watch::Receiver<u8>) {
        let (tx, rx) = watch::channel(0);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// A sink nobody listens to.
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Report progress. Returns whether the value advanced.
    pub fn report(&self, percent: i64) -> bool {
        let next = clamp_running_percent(percent);
        self.tx.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Highest value reported so far.
    pub fn last(&self) -> u8 {
        *self.tx.borrow()
    }
}

/// Write published progress to the store until `stop` fires or the sink is dropped.
pub(crate) async fn forward_progress(
    job_id: JobId,
    mut rx: watch::Receiver<u8>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let percent = *rx.borrow_and_update();
                if let Err(e) = JobRepository::update_status(&job_id, JobStatus::Running, percent).await {
                    tracing::warn!(job_id = %job_id, percent, error = %e, "Progress update rejected");
                }
            }
        }
    }
}
