//! Database schema definitions using SurrealQL.

use crate::{DbError, get_db};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes. Safe to run from
/// every process at startup.
pub async fn init_schema() -> Result<(), DbError> {
    let db = get_db()?;

    tracing::info!("Initializing job store schema");

    db.query(JOB_SCHEMA).await?.check()?;
    db.query(PENDING_SCHEMA).await?.check()?;
    db.query(READINESS_SCHEMA).await?.check()?;

    tracing::info!("Job store schema initialized");

    Ok(())
}

/// Per-job status records, keyed `job:<job_id>`.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS prompt ON job TYPE string ASSERT string::trim($value) != "";
DEFINE FIELD IF NOT EXISTS status ON job TYPE string
    ASSERT $value IN ["queued", "running", "finished", "failed"];
DEFINE FIELD IF NOT EXISTS percent_complete ON job TYPE int
    ASSERT $value >= 0 AND $value <= 100;
DEFINE FIELD IF NOT EXISTS accepted_by ON job TYPE string;
DEFINE FIELD IF NOT EXISTS worker_session ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON job TYPE string;

DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
"#;

/// Pending queue, keyed `pending:<job_id>`; one row per undequeued job.
const PENDING_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS pending SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON pending TYPE string;
DEFINE FIELD IF NOT EXISTS enqueued_at ON pending TYPE datetime DEFAULT time::now();

-- FIFO by the store's clock, ties broken by id
DEFINE INDEX IF NOT EXISTS pending_order ON pending FIELDS enqueued_at, job_id;
"#;

/// Single readiness gate record, `readiness:gate`.
const READINESS_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS readiness SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS state ON readiness TYPE string
    ASSERT $value IN ["building", "ready", "fault"];
DEFINE FIELD IF NOT EXISTS reason ON readiness TYPE option<string>;
DEFINE FIELD IF NOT EXISTS session ON readiness TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON readiness TYPE string;
"#;
