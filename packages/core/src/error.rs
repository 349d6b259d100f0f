//! Error taxonomy shared by producers, the job store and the worker.

use thiserror::Error;

/// Domain errors raised by queue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Client-caused: empty prompt, malformed job id.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The job (or its artifact) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The readiness gate is still building; retry later.
    #[error("model not ready: {0}")]
    NotReady(String),

    /// The readiness gate is in its terminal fault state.
    #[error("model fault: {0}")]
    Fault(String),

    /// A state change was requested out of order.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Machine-readable code surfaced to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::InvalidInput(_) => "invalid_input",
            QueueError::NotFound(_) => "not_found",
            QueueError::NotReady(_) => "model_not_ready",
            QueueError::Fault(_) => "model_fault",
            QueueError::InvalidTransition(_) => "invalid_transition",
            QueueError::Internal(_) => "internal_error",
        }
    }
}
