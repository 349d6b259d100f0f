use std::sync::LazyLock;

use tokio::sync::{Mutex, MutexGuard};

use db::{DbConfig, DbError};

static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Canonical definitions of the fields some tests tighten.
const RESTORE_JOB_FIELDS: &str = r#"
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
    db_conn.query(RESTORE_JOB_FIELDS).await?.check()?;
    Ok(guard)
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

pub async fn accept_sessions() -> Result<(), DbError> {
    db::get_db()?.query(RESTORE_JOB_FIELDS).await?.check()?;
    Ok(())
}

/// Add a pending entry directly, bypassing job creation.
pub async fn push_raw_entry(id: &str) -> Result<(), DbError> {
    db::get_db()?
        .query("CREATE type::thing('pending', $id) SET job_id = $id")
        .bind(("id", id.to_string()))
        .await?
        .check()?;
    Ok(())
}
