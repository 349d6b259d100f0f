//! Artifact store for finished videos.
//!
//! Backends:
//! - S3-compatible storage in production/staging
//! - On-disk storage for local dev and single-host deployments
//! - In-memory storage for tests
//!
//! Artifacts are addressed only by job id (`<job_id>/out.mp4`), written once
//! by the worker and read by any producer replica. This is a small wrapper
//! around `object_store`, which already provides all three backends.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;
use queue_core::JobId;

/// File name of every artifact under its job directory.
pub const ARTIFACT_FILE: &str = "out.mp4";

/// Content type served for artifacts.
pub const ARTIFACT_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(object_store::Error),
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::ObjectStore(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
}

const DEFAULT_FS_ROOT: &str = "./data/generated";

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            prefix: None,
        }
    }

    /// Build a config from environment variables.
    ///
    /// Selection rules:
    /// - If `STORAGE_BACKEND` is set: use it (`s3`, `filesystem`, `memory`)
    /// - Otherwise: default to filesystem (`./data/generated`)
    ///
    /// S3 env vars (S3-compatible):
    /// - `S3_BUCKET` (required when backend is `s3`)
    /// - `AWS_REGION` (default: `us-east-1`)
    /// - `S3_ENDPOINT` (optional, e.g. `http://localhost:9000`)
    /// - `S3_ALLOW_HTTP` (`true`/`false`, default: auto true if endpoint is http://)
    /// - `S3_VIRTUAL_HOSTED_STYLE` (`true`/`false`, default: false)
    /// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN` (optional)
    ///
    /// Filesystem env vars:
    /// - `STORAGE_FS_ROOT` (default: `./data/generated`); every replica and
    ///   the worker must mount the same directory
    ///
    /// Common:
    /// - `STORAGE_PREFIX` (optional, e.g. `videos/`)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("STORAGE_BACKEND").ok();
        let prefix = std::env::var("STORAGE_PREFIX").ok().and_then(non_empty);

        let fs_root = || {
            std::env::var("STORAGE_FS_ROOT")
                .ok()
                .and_then(non_empty)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FS_ROOT))
        };

        let cfg = match backend.as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("filesystem") | Some("fs") | None => Self::filesystem(fs_root()),
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported STORAGE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

/// Streamed artifact body plus its size.
pub struct ArtifactStream {
    pub size: u64,
    pub stream: BoxStream<'static, Result<Bytes, StorageError>>,
}

/// Handle to the artifact store; cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl Storage {
    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (backend, store): (&str, Arc<dyn ObjectStore>) = match cfg.backend {
            StorageBackendConfig::S3(s3) => ("s3", Arc::new(build_s3(s3)?)),
            StorageBackendConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                ("filesystem", Arc::new(fs))
            }
            StorageBackendConfig::Memory => ("memory", Arc::new(object_store::memory::InMemory::new())),
        };

        tracing::info!(backend, "Artifact store ready");

        Ok(Self {
            store,
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidKey("object key must not be empty".to_string()));
        }
        if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(StorageError::InvalidKey(format!("{key:?} is not a plain relative key")));
        }

        let joined = match self.prefix.as_deref() {
            Some(prefix) => {
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{prefix}/{key}")
                }
            }
            None => key.to_string(),
        };

        Ok(Path::from(joined))
    }

    /// Write a job's artifact.
    ///
    /// Bytes go to a `.partial` sibling first and are renamed into place, so
    /// readers never see a half-written video under the final key.
    pub async fn put_artifact(&self, job_id: &JobId, bytes: Bytes) -> Result<(), StorageError> {
        let partial = self.to_path(&partial_key(job_id))?;
        let target = self.to_path(&artifact_key(job_id))?;
        let len = bytes.len();

        self.store
            .put(&partial, object_store::PutPayload::from(bytes))
            .await?;

        if let Err(e) = self.store.rename(&partial, &target).await {
            if let Err(cleanup) = self.store.delete(&partial).await {
                tracing::warn!(job_id = %job_id, error = %cleanup, "Failed to remove partial artifact");
            }
            return Err(e.into());
        }

        tracing::info!(job_id = %job_id, bytes = len, key = %target, "Artifact written");
        Ok(())
    }

    pub async fn artifact_exists(&self, job_id: &JobId) -> Result<bool, StorageError> {
        let path = self.to_path(&artifact_key(job_id))?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Open a job's artifact for streaming.
    pub async fn open_artifact(&self, job_id: &JobId) -> Result<ArtifactStream, StorageError> {
        let path = self.to_path(&artifact_key(job_id))?;
        let res = self.store.get(&path).await?;
        let size = res.meta.size;
        let stream = res.into_stream().map(|chunk| chunk.map_err(StorageError::from)).boxed();
        Ok(ArtifactStream { size, stream })
    }

    /// Remove a job's artifact. Removing one that is absent is not an error.
    pub async fn delete_artifact(&self, job_id: &JobId) -> Result<(), StorageError> {
        let path = self.to_path(&artifact_key(job_id))?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                tracing::info!(job_id = %job_id, key = %path, "Artifact removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Object key of a job's artifact.
pub fn artifact_key(job_id: &JobId) -> String {
    format!("{job_id}/{ARTIFACT_FILE}")
}

fn partial_key(job_id: &JobId) -> String {
    format!("{job_id}/{ARTIFACT_FILE}.partial")
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool_env(var_name: &str) -> Result<Option<bool>, StorageError> {
    let v = match std::env::var(var_name) {
        Ok(v) => v,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(StorageError::InvalidConfig(format!(
                "failed reading {var_name}: {e}"
            )));
        }
    };

    let normalized = v.trim().to_ascii_lowercase();
    let parsed = match normalized.as_str() {
        "1" | "true" | "yes" | "y" => true,
        "0" | "false" | "no" | "n" => false,
        _ => {
            return Err(StorageError::InvalidConfig(format!(
                "invalid boolean for {var_name}={v} (expected true/false)"
            )));
        }
    };
    Ok(Some(parsed))
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = std::env::var("S3_BUCKET")
        .ok()
        .and_then(non_empty)
        .ok_or_else(|| {
            StorageError::InvalidConfig("S3_BUCKET is required for s3 backend".into())
        })?;

    let region = std::env::var("AWS_REGION")
        .ok()
        .and_then(non_empty)
        .unwrap_or_else(|| "us-east-1".to_string());

    let endpoint = std::env::var("S3_ENDPOINT").ok().and_then(non_empty);
    let allow_http = match parse_bool_env("S3_ALLOW_HTTP")? {
        Some(v) => v,
        None => endpoint
            .as_deref()
            .is_some_and(|e| e.trim_start().to_ascii_lowercase().starts_with("http://")),
    };

    let virtual_hosted_style = parse_bool_env("S3_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false);

    Ok(S3Config {
        bucket,
        region,
        endpoint,
        allow_http,
        access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok().and_then(non_empty),
        secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok().and_then(non_empty),
        session_token: std::env::var("AWS_SESSION_TOKEN").ok().and_then(non_empty),
        virtual_hosted_style,
    })
}

fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style);

    if let Some(endpoint) = cfg.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if cfg.allow_http {
        builder = builder.with_allow_http(true);
    }
    if let Some(access_key_id) = cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }
    if let Some(secret_access_key) = cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }
    if let Some(session_token) = cfg.session_token {
        builder = builder.with_token(session_token);
    }

    Ok(builder.build()?)
}
