//! Inference worker for the video job queue.
//!
//! This crate is the consumer side: a single Ractor actor that owns the
//! model, drives the readiness gate, and turns queued prompts into stored
//! videos one at a time.
//!
//! # Architecture
//!
//! - `InferenceWorker` - actor that dequeues, runs and finalizes jobs
//! - `InferencePipeline` - the collaborator that turns a prompt into MP4 bytes
//! - `ProcessPipeline` / `SyntheticPipeline` - the shipped collaborators
//! - `ProgressSink` - clamped, monotonic progress reporting
//!
//! # Usage
//!
//! ```ignore
//! use actors::{WorkerArgs, WorkerConfig, start_worker};
//!
//! let config = WorkerConfig::from_env()?;
//! let pipeline = config.build_pipeline();
//! let (worker, handle) = start_worker(WorkerArgs { config, pipeline, storage }).await?;
//! ```

mod config;
mod messages;
mod pipeline;
mod process;
mod progress;
mod synthetic;
mod worker_actor;

pub use config::{ConfigError, InferenceBackend, WorkerConfig};
pub use messages::{WorkerMessage, WorkerStats};
pub use pipeline::{GenerationRequest, InferencePipeline, PipelineError, PipelineFuture};
pub use process::{ProcessConfig, ProcessPipeline};
pub use progress::ProgressSink;
pub use synthetic::SyntheticPipeline;
pub use worker_actor::{InferenceWorker, WorkerArgs, start_worker, worker_stats};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
