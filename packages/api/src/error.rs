use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use db::DbError;
use queue_core::QueueError;
use serde_json::json;
use storage::StorageError;

/// Error type for producer operations and HTTP handlers.
///
/// Domain errors keep their meaning; store failures are internal.
/// Implements [`IntoResponse`] to produce `{error, message}` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("job store error: {0}")]
    Store(DbError),

    #[error("artifact store error: {0}")]
    Artifact(StorageError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Queue(e) => ApiError::Queue(e),
            other => ApiError::Store(other),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => {
                ApiError::Queue(QueueError::NotFound(format!("artifact {key} not found")))
            }
            StorageError::InvalidKey(msg) => ApiError::Queue(QueueError::InvalidInput(msg)),
            other => ApiError::Artifact(other),
        }
    }
}

impl ApiError {
    /// Status, machine-readable code and client message for this error.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Queue(e) => {
                let status = match e {
                    QueueError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    QueueError::NotFound(_) => StatusCode::NOT_FOUND,
                    QueueError::NotReady(_) | QueueError::Fault(_) => StatusCode::SERVICE_UNAVAILABLE,
                    QueueError::InvalidTransition(_) | QueueError::Internal(_) => {
                        return internal(self);
                    }
                };
                (status, e.code(), message(e))
            }
            ApiError::Store(_) | ApiError::Artifact(_) => internal(self),
        }
    }
}

fn message(err: &QueueError) -> String {
    match err {
        QueueError::InvalidInput(m)
        | QueueError::NotFound(m)
        | QueueError::NotReady(m)
        | QueueError::Fault(m)
        | QueueError::InvalidTransition(m)
        | QueueError::Internal(m) => m.clone(),
    }
}

fn internal(err: &ApiError) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = json!({
            "error": code,
            "message": message,
        });
        (status, axum::Json(body)).into_response()
    }
}
