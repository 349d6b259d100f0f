#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use db::{DbConfig, DbError};
use storage::{Storage, StorageConfig, StorageError};

static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Canonical definitions of the job fields some tests tighten.
const RESTORE_JOB_FIELDS: &str = r#"
DEFINE FIELD OVERWRITE status ON job TYPE string
    ASSERT $value IN ["queued", "running", "finished", "failed"];
DEFINE FIELD OVERWRITE worker_session ON job TYPE option<string>;
"#;

pub async fn setup_db() -> Result<MutexGuard<'static, ()>, DbError> {
    let guard = TEST_LOCK.lock().await;
    db::init(DbConfig::memory()).await?;
    let db_conn = db::get_db()?;
    db_conn
        .query("DELETE pending; DELETE job; DELETE readiness;")
        .await?
        .check()?;
    restore_job_fields().await?;
    Ok(guard)
}

pub async fn restore_job_fields() -> Result<(), DbError> {
    db::get_db()?.query(RESTORE_JOB_FIELDS).await?.check()?;
    Ok(())
}

/// Make every job write that sets a session starting with `prefix` fail.
pub async fn refuse_sessions(prefix: &str) -> Result<(), DbError> {
    let statement = format!(
        "DEFINE FIELD OVERWRITE worker_session ON job TYPE option<string> \
         ASSERT $value = NONE OR !string::starts_with($value, '{prefix}');"
    );
    db::get_db()?.query(statement).await?.check()?;
    Ok(())
}

/// Make every job write that moves a job to `failed` fail.
pub async fn refuse_failed_status() -> Result<(), DbError> {
    db::get_db()?
        .query(
            "DEFINE FIELD OVERWRITE status ON job TYPE string \
             ASSERT $value IN ['queued', 'running', 'finished'];",
        )
        .await?
        .check()?;
    Ok(())
}

pub async fn memory_storage() -> Result<Storage, StorageError> {
    Storage::new(StorageConfig::memory()).await
}

pub async fn fs_storage(root: &Path) -> Result<Storage, StorageError> {
    Storage::new(StorageConfig::filesystem(root)).await
}

/// Poll `check` every 20ms until it yields a value or `timeout` passes.
pub async fn eventually<T, F, Fut>(timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
