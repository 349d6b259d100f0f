//! The inference worker actor.
//!
//! One worker per deployment. It owns the model, opens the readiness gate,
//! and then processes queued jobs strictly one at a time.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use db::DbError;
use db::repositories::{JobRepository, ReadinessRepository};
use queue_core::{Job, JobId, JobStatus};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use storage::Storage;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::config::WorkerConfig;
use crate::messages::{JobOutcome, WorkerMessage, WorkerStats};
use crate::pipeline::{GenerationRequest, InferencePipeline, PipelineError};
use crate::progress::{ProgressSink, forward_progress};

/// Attempts at a terminal status write before the job is given up.
const TERMINAL_ATTEMPTS: u32 = 5;

/// State for the worker actor.
pub struct WorkerState {
    config: WorkerConfig,
    session: String,
    pipeline: Arc<dyn InferencePipeline>,
    storage: Storage,
    stats: WorkerStats,
    running: bool,
}

impl WorkerState {
    fn record(&mut self, job_id: JobId, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Finished => self.stats.finished += 1,
            JobOutcome::Failed => self.stats.failed += 1,
            JobOutcome::Abandoned => self.stats.abandoned += 1,
        }
        self.stats.last_job = Some(job_id);
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub config: WorkerConfig,
    pub pipeline: Arc<dyn InferencePipeline>,
    pub storage: Storage,
}

/// Actor that turns queued prompts into stored videos.
pub struct InferenceWorker;

impl Actor for InferenceWorker {
    type Msg = WorkerMessage;
    type State = WorkerState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let session = format!("{}-{}", args.config.worker_id, Ulid::new());
        tracing::info!(
            worker_id = %args.config.worker_id,
            session = %session,
            pipeline = args.pipeline.name(),
            "Starting inference worker"
        );

        let stats = WorkerStats {
            worker_id: args.config.worker_id.clone(),
            session: session.clone(),
            ready: false,
            finished: 0,
            failed: 0,
            abandoned: 0,
            orphaned: 0,
            last_job: None,
            started_at: Utc::now(),
        };

        myself.send_message(WorkerMessage::Initialize)?;

        Ok(WorkerState {
            config: args.config,
            session,
            pipeline: args.pipeline,
            storage: args.storage,
            stats,
            running: true,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Initialize => match initialize(state).await {
                Ok(()) => myself.send_message(WorkerMessage::Poll)?,
                Err(reason) => {
                    tracing::error!(session = %state.session, reason = %reason, "Worker initialization failed");
                    if let Err(e) = ReadinessRepository::mark_fault(&state.session, reason.clone()).await {
                        tracing::error!(session = %state.session, error = %e, "Could not record the fault");
                    }
                    state.running = false;
                    myself.stop(Some(reason));
                }
            },

            WorkerMessage::Poll => {
                if !state.running {
                    return Ok(());
                }

                match JobRepository::dequeue(state.config.dequeue_wait, &state.session).await {
                    Ok(Some(job)) => {
                        let job_id = job.id.clone();
                        let outcome = run_job(state, job).await;
                        state.record(job_id, outcome);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Dequeue failed; backing off");
                        tokio::time::sleep(state.config.error_backoff).await;
                    }
                }

                if state.running {
                    myself.send_message(WorkerMessage::Poll)?;
                }
            }

            WorkerMessage::GetStats { reply } => {
                let _ = reply.send(state.stats.clone());
            }

            WorkerMessage::Shutdown => {
                tracing::info!(worker_id = %state.config.worker_id, "Shutting down inference worker");
                state.running = false;
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Spawn a worker and return its handle.
pub async fn start_worker(
    args: WorkerArgs,
) -> Result<(ActorRef<WorkerMessage>, tokio::task::JoinHandle<()>), ActorProcessingErr> {
    let name = format!("inference-worker-{}", args.config.worker_id);
    let (actor, handle) = Actor::spawn(Some(name), InferenceWorker, args)
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {e}")))?;
    Ok((actor, handle))
}

/// Open a readiness session, fail orphans, then load the model.
///
/// `Err` carries the reason to record on the gate.
async fn initialize(state: &mut WorkerState) -> Result<(), String> {
    ReadinessRepository::mark_building(&state.session)
        .await
        .map_err(|e| format!("could not open readiness session: {e}"))?;

    let orphaned = JobRepository::fail_orphaned(&state.session)
        .await
        .map_err(|e| format!("could not fail orphaned jobs: {e}"))?;
    if !orphaned.is_empty() {
        tracing::warn!(count = orphaned.len(), "Failed jobs left running by a previous worker");
    }
    state.stats.orphaned = orphaned.len() as u64;

    state.pipeline.load().await.map_err(|e| e.to_string())?;

    ReadinessRepository::mark_ready(&state.session)
        .await
        .map_err(|e| format!("could not mark model ready: {e}"))?;
    state.stats.ready = true;
    tracing::info!(session = %state.session, "Model ready; accepting jobs");
    Ok(())
}

/// Run one claimed job to a terminal status.
///
/// An artifact is kept only if the `finished` write lands.
async fn run_job(state: &WorkerState, job: Job) -> JobOutcome {
    let job_id = job.id.clone();
    tracing::info!(job_id = %job_id, accepted_by = %job.accepted_by, "Job running");

    let (sink, progress_rx) = ProgressSink::channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    let writer = tokio::spawn(forward_progress(job_id.clone(), progress_rx, stop_rx));

    let request = GenerationRequest {
        job_id: job_id.clone(),
        prompt: job.prompt,
        params: state.config.params,
    };
    let pipeline = state.pipeline.clone();
    let task_sink = sink.clone();
    let generation = tokio::spawn(async move { pipeline.generate(request, task_sink).await });

    let result = match generation.await {
        Ok(result) => result,
        Err(join) if join.is_panic() => Err(PipelineError::Panicked(panic_message(join.into_panic()))),
        Err(join) => Err(PipelineError::Generation(join.to_string())),
    };

    let _ = stop_tx.send(());
    if let Err(e) = writer.await {
        tracing::warn!(job_id = %job_id, error = %e, "Progress writer ended abnormally");
    }

    let result = match result {
        Ok(bytes) => {
            if !still_owned(state, &job_id).await {
                tracing::warn!(job_id = %job_id, "Job was ended by another session; discarding output");
                return JobOutcome::Abandoned;
            }
            state
                .storage
                .put_artifact(&job_id, bytes)
                .await
                .map_err(|e| PipelineError::Artifact(e.to_string()))
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => match finalize(state, &job_id, JobStatus::Finished, 100).await {
            Ok(()) => {
                tracing::info!(job_id = %job_id, "Job finished");
                JobOutcome::Finished
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Finished status not recorded; removing artifact");
                if let Err(e) = state.storage.delete_artifact(&job_id).await {
                    tracing::error!(job_id = %job_id, error = %e, "Could not remove artifact");
                }
                JobOutcome::Abandoned
            }
        },
        Err(e) => {
            let percent = sink.last();
            tracing::error!(job_id = %job_id, percent, error = %e, "Job failed");
            match finalize(state, &job_id, JobStatus::Failed, percent).await {
                Ok(()) => JobOutcome::Failed,
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed status not recorded");
                    JobOutcome::Abandoned
                }
            }
        }
    }
}

/// Whether the job is still `running` under this worker's session.
///
/// A read error counts as owned; the terminal write decides in that case.
async fn still_owned(state: &WorkerState, job_id: &JobId) -> bool {
    match JobRepository::get(job_id).await {
        Ok(current) => {
            current.status == JobStatus::Running
                && current.worker_session.as_deref() == Some(state.session.as_str())
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Could not re-read job before storing output");
            true
        }
    }
}

/// Write a terminal status, retrying store errors with backoff.
///
/// A rejected transition is returned at once: someone else already ended
/// the job, and retrying cannot change that.
async fn finalize(state: &WorkerState, job_id: &JobId, status: JobStatus, percent: u8) -> Result<(), DbError> {
    let mut attempt = 1;
    loop {
        match JobRepository::update_status(job_id, status, percent).await {
            Ok(_) => return Ok(()),
            Err(e) if e.as_queue_error().is_some() || attempt >= TERMINAL_ATTEMPTS => return Err(e),
            Err(e) => {
                tracing::warn!(job_id = %job_id, %status, attempt, error = %e, "Terminal status write failed; retrying");
                tokio::time::sleep(state.config.error_backoff).await;
                attempt += 1;
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Wait up to `timeout` for the worker to report stats.
pub async fn worker_stats(
    actor: &ActorRef<WorkerMessage>,
    timeout: Duration,
) -> Option<WorkerStats> {
    match ractor::rpc::call(actor, |reply| WorkerMessage::GetStats { reply }, Some(timeout)).await {
        Ok(ractor::rpc::CallResult::Success(stats)) => Some(stats),
        _ => None,
    }
}
