#![allow(clippy::disallowed_methods)]

mod common;

use std::collections::HashSet;
use std::error::Error;
use std::time::Duration;

use queue_core::{Job, JobId, JobStatus, QueueError, ReadinessState};

use db::DbError;
use db::repositories::{JobRepository, ReadinessRepository};

fn claimed_id(job: Option<Job>) -> Option<JobId> {
    job.map(|job| job.id)
}

fn queue_err(result: Result<impl std::fmt::Debug, DbError>) -> QueueError {
    match result {
        Err(DbError::Queue(e)) => e,
        other => panic!("expected a queue error, got {other:?}"),
    }
}

#[tokio::test]
async fn create_then_get_is_queued_at_zero() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let job = JobRepository::create("a cat playing piano", "replica-a").await?;
    let loaded = JobRepository::get(&job.id).await?;

    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.status, JobStatus::Queued);
    assert_eq!(loaded.percent_complete, 0);
    assert_eq!(loaded.prompt, "a cat playing piano");
    assert_eq!(loaded.accepted_by, "replica-a");
    assert_eq!(JobRepository::pending_len().await?, 1);
    Ok(())
}

#[tokio::test]
async fn empty_prompt_creates_nothing() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let err = queue_err(JobRepository::create("", "replica-a").await);
    assert!(matches!(err, QueueError::InvalidInput(_)));
    assert_eq!(JobRepository::pending_len().await?, 0);
    Ok(())
}

#[tokio::test]
async fn lookup_validates_ids_before_reading() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let err = queue_err(JobRepository::lookup("../../etc/passwd").await);
    assert!(matches!(err, QueueError::InvalidInput(_)));

    let err = queue_err(JobRepository::lookup("01J9ZZZZZZZZZZZZZZZZZZZZZZ").await);
    assert!(matches!(err, QueueError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn dequeue_is_fifo_and_removes_entries() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let first = JobRepository::create("first", "r").await?;
    let second = JobRepository::create("second", "r").await?;
    let third = JobRepository::create("third", "r").await?;

    assert_eq!(claimed_id(JobRepository::try_dequeue("s").await?), Some(first.id));
    assert_eq!(claimed_id(JobRepository::try_dequeue("s").await?), Some(second.id));
    assert_eq!(claimed_id(JobRepository::try_dequeue("s").await?), Some(third.id));
    assert_eq!(claimed_id(JobRepository::try_dequeue("s").await?), None);
    assert_eq!(JobRepository::pending_len().await?, 0);
    Ok(())
}

#[tokio::test]
async fn dequeue_times_out_on_an_empty_queue() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let got = JobRepository::dequeue(Duration::from_millis(200), "s").await?;
    assert!(got.is_none());
    Ok(())
}

#[tokio::test]
async fn blocked_dequeue_wakes_on_enqueue() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let waiter = tokio::spawn(async { JobRepository::dequeue(Duration::from_secs(10), "s").await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let job = JobRepository::create("late arrival", "r").await?;

    let got = tokio::time::timeout(Duration::from_secs(5), waiter).await???;
    assert_eq!(claimed_id(got), Some(job.id));
    Ok(())
}

#[tokio::test]
async fn concurrent_producers_never_yield_duplicate_ids() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    for (producers, per_producer) in [(2usize, 10usize), (5, 7), (8, 3)] {
        let mut tasks = Vec::new();
        for p in 0..producers {
            tasks.push(tokio::spawn(async move {
                let mut created = Vec::new();
                for n in 0..per_producer {
                    let job = JobRepository::create(&format!("prompt {p}-{n}"), &format!("replica-{p}")).await?;
                    created.push(job.id);
                }
                Ok::<_, DbError>(created)
            }));
        }

        // Single consumer draining while producers are still appending.
        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while seen.len() < producers * per_producer {
                if let Some(job) = JobRepository::dequeue(Duration::from_secs(5), "consumer").await? {
                    seen.push(job.id);
                } else {
                    break;
                }
            }
            Ok::<_, DbError>(seen)
        });

        let mut created: HashSet<JobId> = HashSet::new();
        for task in tasks {
            created.extend(task.await??);
        }
        let seen = consumer.await??;

        let unique: HashSet<JobId> = seen.iter().cloned().collect();
        assert_eq!(unique.len(), seen.len(), "an id was dequeued twice");
        assert_eq!(unique, created, "every created job is dequeued exactly once");
        assert!(JobRepository::try_dequeue("consumer").await?.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn status_only_moves_forward() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let job = JobRepository::create("p", "r").await?;

    let err = queue_err(JobRepository::update_status(&job.id, JobStatus::Finished, 100).await);
    assert!(matches!(err, QueueError::InvalidTransition(_)));

    let running = JobRepository::try_dequeue("session-1").await?.expect("queued job");
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(running.worker_session.as_deref(), Some("session-1"));

    JobRepository::update_status(&job.id, JobStatus::Running, 30).await?;
    let err = queue_err(JobRepository::update_status(&job.id, JobStatus::Running, 20).await);
    assert!(matches!(err, QueueError::InvalidTransition(_)));
    assert_eq!(JobRepository::get(&job.id).await?.percent_complete, 30);

    let finished = JobRepository::update_status(&job.id, JobStatus::Finished, 100).await?;
    assert_eq!(finished.status, JobStatus::Finished);

    for (status, percent) in [(JobStatus::Running, 100), (JobStatus::Failed, 100), (JobStatus::Queued, 0)] {
        let err = queue_err(JobRepository::update_status(&job.id, status, percent).await);
        assert!(matches!(err, QueueError::InvalidTransition(_)));
    }

    let stored = JobRepository::get(&job.id).await?;
    assert_eq!(stored.status, JobStatus::Finished);
    assert_eq!(stored.percent_complete, 100);
    Ok(())
}

#[tokio::test]
async fn claim_moves_job_to_running_and_drops_its_entry() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let job = JobRepository::create("p", "r").await?;
    let claimed = JobRepository::try_dequeue("session-1").await?.expect("queued job");

    assert_eq!(claimed.id, job.id);
    let stored = JobRepository::get(&job.id).await?;
    assert_eq!(stored.status, JobStatus::Running);
    assert_eq!(stored.percent_complete, 0);
    assert_eq!(stored.worker_session.as_deref(), Some("session-1"));
    assert_eq!(JobRepository::pending_len().await?, 0);

    let missing = JobId::new();
    let err = queue_err(JobRepository::update_status(&missing, JobStatus::Running, 1).await);
    assert!(matches!(err, QueueError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn entries_without_a_queued_job_are_skipped() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let taken = JobRepository::create("taken", "r").await?;
    JobRepository::try_dequeue("session-1").await?.expect("queued job");
    // A stale entry for a job that is already running, then one with no record.
    common::push_raw_entry(taken.id.as_str()).await?;
    common::push_raw_entry(JobId::new().as_str()).await?;
    let next = JobRepository::create("next", "r").await?;

    let claimed = JobRepository::try_dequeue("session-2").await?.expect("next job");
    assert_eq!(claimed.id, next.id);
    assert_eq!(JobRepository::pending_len().await?, 0);

    let taken = JobRepository::get(&taken.id).await?;
    assert_eq!(taken.worker_session.as_deref(), Some("session-1"));
    Ok(())
}

#[tokio::test]
async fn failed_claim_leaves_the_job_queued() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let job = JobRepository::create("p", "r").await?;
    common::refuse_sessions("doomed").await?;

    let result = JobRepository::try_dequeue("doomed-1").await;
    assert!(matches!(result, Err(DbError::Connection(_))), "got {result:?}");
    assert_eq!(JobRepository::get(&job.id).await?.status, JobStatus::Queued);
    assert_eq!(JobRepository::pending_len().await?, 1);

    common::accept_sessions().await?;
    let claimed = JobRepository::try_dequeue("session-1").await?.expect("queued job");
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, JobStatus::Running);
    Ok(())
}

#[tokio::test]
async fn store_rejects_whitespace_only_prompts() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let err = queue_err(JobRepository::create(" \t\n", "r").await);
    assert!(matches!(err, QueueError::InvalidInput(_)));

    // The schema enforces the same rule for writers that skip the domain check.
    let result = db::get_db()?
        .query(
            "CREATE job:raw CONTENT { job_id: 'raw', prompt: '   ', status: 'queued', \
             percent_complete: 0, accepted_by: 'r', created_at: 'x', updated_at: 'x' }",
        )
        .await?
        .check();
    assert!(result.is_err());
    assert_eq!(JobRepository::pending_len().await?, 0);
    Ok(())
}

#[tokio::test]
async fn orphaned_running_jobs_fail_at_boot() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    let stale = JobRepository::create("stale", "r").await?;
    let mine = JobRepository::create("mine", "r").await?;
    let waiting = JobRepository::create("waiting", "r").await?;

    JobRepository::try_dequeue("old-boot").await?.expect("stale job");
    JobRepository::update_status(&stale.id, JobStatus::Running, 42).await?;
    JobRepository::try_dequeue("new-boot").await?.expect("own job");

    let failed = JobRepository::fail_orphaned("new-boot").await?;
    assert_eq!(failed, vec![stale.id.clone()]);

    let stale = JobRepository::get(&stale.id).await?;
    assert_eq!(stale.status, JobStatus::Failed);
    assert_eq!(stale.percent_complete, 42);
    assert_eq!(JobRepository::get(&mine.id).await?.status, JobStatus::Running);
    assert_eq!(JobRepository::get(&waiting.id).await?.status, JobStatus::Queued);
    Ok(())
}

#[tokio::test]
async fn readiness_gate_lifecycle() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    assert_eq!(ReadinessRepository::get_state().await?, ReadinessState::Building);

    ReadinessRepository::mark_building("boot-1").await?;
    ReadinessRepository::mark_building("boot-1").await?;
    ReadinessRepository::mark_ready("boot-1").await?;
    ReadinessRepository::mark_ready("boot-1").await?;
    assert_eq!(ReadinessRepository::get_state().await?, ReadinessState::Ready);

    let err = queue_err(ReadinessRepository::mark_building("boot-1").await);
    assert!(matches!(err, QueueError::InvalidTransition(_)));
    let err = queue_err(ReadinessRepository::mark_fault("boot-1", "late").await);
    assert!(matches!(err, QueueError::InvalidTransition(_)));

    // A restarted worker gets a fresh lifecycle.
    let err = queue_err(ReadinessRepository::mark_ready("boot-2").await);
    assert!(matches!(err, QueueError::InvalidTransition(_)));
    ReadinessRepository::mark_building("boot-2").await?;
    assert_eq!(ReadinessRepository::get_state().await?, ReadinessState::Building);
    ReadinessRepository::mark_fault("boot-2", "weights missing").await?;

    let state = ReadinessRepository::get_state().await?;
    assert_eq!(state, ReadinessState::Fault("weights missing".into()));
    let err = queue_err(ReadinessRepository::mark_ready("boot-2").await);
    assert!(matches!(err, QueueError::InvalidTransition(_)));
    Ok(())
}
