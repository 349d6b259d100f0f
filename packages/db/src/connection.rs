//! Database connection management with lazy initialization.

use std::sync::LazyLock;

use queue_core::QueueError;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Global database instance using lazy initialization.
static DB: LazyLock<OnceCell<Surreal<Any>>> = LazyLock::new(OnceCell::new);

/// Database connection wrapper.
pub type Database = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection endpoint: "mem://", "ws://host:port", "rocksdb://path", ...
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "vidqueue".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for a shared SurrealDB server, e.g. `ws://db:8000`.
    ///
    /// This is the deployment shape: all producer replicas and the worker
    /// point at the same server.
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            endpoint: url.into(),
            ..Default::default()
        }
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Build a config from environment variables.
    ///
    /// | Env Var        | Default    |
    /// |----------------|------------|
    /// | `DB_ENDPOINT`  | `mem://`   |
    /// | `DB_NAMESPACE` | `vidqueue` |
    /// | `DB_DATABASE`  | `main`     |
    /// | `DB_USER`      | unset      |
    /// | `DB_PASS`      | unset      |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = match (var("DB_USER"), var("DB_PASS")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };

        Self {
            endpoint: var("DB_ENDPOINT").unwrap_or(defaults.endpoint),
            namespace: var("DB_NAMESPACE").unwrap_or(defaults.namespace),
            database: var("DB_DATABASE").unwrap_or(defaults.database),
            credentials,
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Whether the store lives inside this process.
    ///
    /// An in-memory store is invisible to every other replica and to the
    /// worker, so it only suits tests and single-process demos.
    pub fn is_process_local(&self) -> bool {
        self.endpoint.starts_with("mem://")
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database not initialized - call init_db first")]
    NotInitialized,
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl DbError {
    /// The domain error carried by this failure, if any.
    pub fn as_queue_error(&self) -> Option<&QueueError> {
        match self {
            DbError::Queue(err) => Some(err),
            _ => None,
        }
    }

    /// Optimistic-concurrency conflicts that SurrealDB asks callers to retry.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, DbError::Connection(err) if err.to_string().contains("can be retried"))
    }
}

/// Initialize the database connection.
///
/// This should be called once at application startup before any database operations.
pub async fn init_db(config: DbConfig) -> Result<&'static Database, DbError> {
    DB.get_or_try_init(|| async {
        tracing::info!(endpoint = %config.endpoint, "Connecting to job store");

        let db = connect(&config.endpoint).await?;

        // Authenticate if credentials provided
        if let Some((username, password)) = &config.credentials {
            db.signin(Root {
                username,
                password,
            })
            .await?;
        }

        db.use_ns(&config.namespace).use_db(&config.database).await?;

        tracing::info!(
            namespace = %config.namespace,
            database = %config.database,
            "Connected to job store"
        );

        Ok(db)
    })
    .await
}

/// Get the database connection.
pub fn get_db() -> Result<&'static Database, DbError> {
    DB.get().ok_or(DbError::NotInitialized)
}

/// Check that the store answers.
pub async fn health_check() -> Result<(), DbError> {
    get_db()?.health().await?;
    Ok(())
}
