//! Core domain types for the video generation job queue.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and JobStatus for generation requests
//! - ReadinessState for the gate that blocks submission until the worker is loaded
//! - GenerationParams passed to the inference collaborator
//! - QueueError, the error taxonomy shared by producers and the consumer

mod error;
mod job;
mod params;
mod readiness;

pub use error::QueueError;
pub use job::{Job, JobId, JobStatus, JobView, MAX_JOB_ID_LEN};
pub use params::{GenerationParams, RUNNING_PERCENT_CAP, clamp_running_percent};
pub use readiness::{ModelStatus, ReadinessState};
