//! Worker configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use queue_core::GenerationParams;

use crate::pipeline::InferencePipeline;
use crate::process::{ProcessConfig, ProcessPipeline};
use crate::synthetic::SyntheticPipeline;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration values: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// Which collaborator the worker runs.
#[derive(Debug, Clone)]
pub enum InferenceBackend {
    Process(ProcessConfig),
    Synthetic { step_delay: Duration },
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// How long one dequeue call waits before the loop checks back in.
    pub dequeue_wait: Duration,
    /// Pause after an unexpected store error.
    pub error_backoff: Duration,
    pub params: GenerationParams,
    pub backend: InferenceBackend,
}

impl WorkerConfig {
    /// Config for the synthetic pipeline with short waits, for tests and demos.
    pub fn synthetic(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            dequeue_wait: Duration::from_millis(200),
            error_backoff: Duration::from_millis(200),
            params: GenerationParams::default(),
            backend: InferenceBackend::Synthetic {
                step_delay: Duration::ZERO,
            },
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `WORKER_ID` | `HOSTNAME`, else `inference-worker` |
    /// | `DEQUEUE_WAIT_SECS` | `5` |
    /// | `ERROR_BACKOFF_SECS` | `5` |
    /// | `INFERENCE_BACKEND` | `process` (`process` or `synthetic`) |
    /// | `INFERENCE_COMMAND` | required for `process` |
    /// | `MODEL_DIR` | required for `process` |
    /// | `INFERENCE_DEVICE` | `auto` |
    /// | `INFERENCE_SCRATCH_DIR` | system temp dir |
    /// | `SYNTHETIC_STEP_MS` | `250` |
    /// | `GEN_NUM_FRAMES`, `GEN_OUTPUT_FPS`, `GEN_HEIGHT`, `GEN_WIDTH`, `GEN_INFERENCE_STEPS` | required for `process` |
    ///
    /// All missing required keys are reported in one error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorkerConfig::from_env`] with an arbitrary key source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let worker_id = get("WORKER_ID")
            .or_else(|| get("HOSTNAME"))
            .unwrap_or_else(|| "inference-worker".to_string());
        let dequeue_wait = Duration::from_secs(parse_or(&get, "DEQUEUE_WAIT_SECS", 5)?);
        let error_backoff = Duration::from_secs(parse_or(&get, "ERROR_BACKOFF_SECS", 5)?);

        let backend_name = get("INFERENCE_BACKEND").unwrap_or_else(|| "process".to_string());
        let defaults = GenerationParams::default();

        let (backend, params) = match backend_name.as_str() {
            "process" => {
                let mut missing = Vec::new();
                let mut require = |key: &str| {
                    let value = get(key);
                    if value.is_none() {
                        missing.push(key.to_string());
                    }
                    value
                };
                let program = require("INFERENCE_COMMAND");
                let model_dir = require("MODEL_DIR");
                let frames = require("GEN_NUM_FRAMES");
                let fps = require("GEN_OUTPUT_FPS");
                let height = require("GEN_HEIGHT");
                let width = require("GEN_WIDTH");
                let steps = require("GEN_INFERENCE_STEPS");

                let (
                    Some(program),
                    Some(model_dir),
                    Some(frames),
                    Some(fps),
                    Some(height),
                    Some(width),
                    Some(steps),
                ) = (program, model_dir, frames, fps, height, width, steps)
                else {
                    return Err(ConfigError::Missing(missing));
                };

                let params = GenerationParams {
                    frames: parse_int("GEN_NUM_FRAMES", &frames)?,
                    fps: parse_int("GEN_OUTPUT_FPS", &fps)?,
                    height: parse_int("GEN_HEIGHT", &height)?,
                    width: parse_int("GEN_WIDTH", &width)?,
                    inference_steps: parse_int("GEN_INFERENCE_STEPS", &steps)?,
                };
                let process = ProcessConfig {
                    program: PathBuf::from(program),
                    model_dir: PathBuf::from(model_dir),
                    device: get("INFERENCE_DEVICE").unwrap_or_else(|| "auto".to_string()),
                    scratch_dir: get("INFERENCE_SCRATCH_DIR")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| std::env::temp_dir().join("vidqueue")),
                };
                (InferenceBackend::Process(process), params)
            }
            "synthetic" => {
                let params = GenerationParams {
                    frames: parse_or(&get, "GEN_NUM_FRAMES", defaults.frames)?,
                    fps: parse_or(&get, "GEN_OUTPUT_FPS", defaults.fps)?,
                    height: parse_or(&get, "GEN_HEIGHT", defaults.height)?,
                    width: parse_or(&get, "GEN_WIDTH", defaults.width)?,
                    inference_steps: parse_or(&get, "GEN_INFERENCE_STEPS", defaults.inference_steps)?,
                };
                let step_delay = Duration::from_millis(parse_or(&get, "SYNTHETIC_STEP_MS", 250)?);
                (InferenceBackend::Synthetic { step_delay }, params)
            }
            other => {
                return Err(ConfigError::Invalid {
                    key: "INFERENCE_BACKEND".into(),
                    value: other.to_string(),
                    expected: "one of process|synthetic",
                });
            }
        };

        Ok(Self {
            worker_id,
            dequeue_wait,
            error_backoff,
            params,
            backend,
        })
    }

    /// Build the configured pipeline.
    pub fn build_pipeline(&self) -> Arc<dyn InferencePipeline> {
        match &self.backend {
            InferenceBackend::Process(cfg) => Arc::new(ProcessPipeline::new(cfg.clone())),
            InferenceBackend::Synthetic { step_delay } => Arc::new(SyntheticPipeline::new(*step_delay)),
        }
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        expected: "an integer",
    })
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) => parse_int(key, &value),
        None => Ok(default),
    }
}
