//! The inference collaborator seam.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use queue_core::{GenerationParams, JobId};

use crate::progress::ProgressSink;

/// Errors raised while loading or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("model load failed: {0}")]
    Load(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("generation panicked: {0}")]
    Panicked(String),

    #[error("artifact write failed: {0}")]
    Artifact(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Future returned by pipeline operations. Owned so it can run on its own task.
pub type PipelineFuture<T> = Pin<Box<dyn Future<Output = Result<T, PipelineError>> + Send + 'static>>;

/// One prompt plus the deployment's fixed generation settings.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub job_id: JobId,
    pub prompt: String,
    pub params: GenerationParams,
}

/// Turns a prompt into encoded video bytes.
///
/// `load` runs once per worker session before any job is dequeued. `generate`
/// may report progress through the sink any number of times; values are
/// clamped and deduplicated by the sink.
pub trait InferencePipeline: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Prepare the model.
    fn load(&self) -> PipelineFuture<()>;

    /// Produce the MP4 payload for one request.
    fn generate(&self, request: GenerationRequest, progress: ProgressSink) -> PipelineFuture<Bytes>;
}
