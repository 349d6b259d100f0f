//! Runs inference in an external program.
//!
//! The program is invoked as
//!
//! ```text
//! <program> --prompt <text> --output <file> --model-dir <dir> --device <dev>
//!           --frames <n> --fps <n> --height <n> --width <n> --steps <n>
//! ```
//!
//! Lines of the form `progress <n>` on stdout are forwarded as progress.
//! Everything else on stdout is logged at debug level. On exit status zero the
//! output file is read back as the payload and removed.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::pipeline::{GenerationRequest, InferencePipeline, PipelineError, PipelineFuture};
use crate::progress::ProgressSink;

/// Lines of stderr kept for the failure message.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub program: PathBuf,
    pub model_dir: PathBuf,
    pub device: String,
    /// Where the program writes its output before it is read back.
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProcessPipeline {
    config: Arc<ProcessConfig>,
}

impl ProcessPipeline {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl InferencePipeline for ProcessPipeline {
    fn name(&self) -> &str {
        "process"
    }

    fn load(&self) -> PipelineFuture<()> {
        let cfg = self.config.clone();
        Box::pin(async move {
            if resolve_program(&cfg.program).is_none() {
                return Err(PipelineError::Load(format!(
                    "inference program {} not found",
                    cfg.program.display()
                )));
            }

            let mut entries = tokio::fs::read_dir(&cfg.model_dir).await.map_err(|e| {
                PipelineError::Load(format!(
                    "model directory {} is not readable: {e}",
                    cfg.model_dir.display()
                ))
            })?;
            if entries.next_entry().await?.is_none() {
                return Err(PipelineError::Load(format!(
                    "model directory {} is empty",
                    cfg.model_dir.display()
                )));
            }

            tokio::fs::create_dir_all(&cfg.scratch_dir).await?;
            Ok(())
        })
    }

    fn generate(&self, request: GenerationRequest, progress: ProgressSink) -> PipelineFuture<Bytes> {
        let cfg = self.config.clone();
        Box::pin(async move {
            let output = cfg.scratch_dir.join(format!("{}.mp4", request.job_id));
            let params = request.params;

            let mut child = Command::new(&cfg.program)
                .arg("--prompt")
                .arg(&request.prompt)
                .arg("--output")
                .arg(&output)
                .arg("--model-dir")
                .arg(&cfg.model_dir)
                .arg("--device")
                .arg(&cfg.device)
                .arg("--frames")
                .arg(params.frames.to_string())
                .arg("--fps")
                .arg(params.fps.to_string())
                .arg("--height")
                .arg(params.height.to_string())
                .arg("--width")
                .arg(params.width.to_string())
                .arg("--steps")
                .arg(params.inference_steps.to_string())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| PipelineError::Generation("stdout not captured".into()))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| PipelineError::Generation("stderr not captured".into()))?;
            let stderr_tail = tokio::spawn(collect_tail(stderr));

            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                match parse_progress(&line) {
                    Some(percent) => {
                        progress.report(percent);
                    }
                    None => tracing::debug!(job_id = %request.job_id, line = %line, "Pipeline output"),
                }
            }

            let status = child.wait().await?;
            let tail = stderr_tail.await.unwrap_or_default();

            if !status.success() {
                remove_quietly(&output).await;
                return Err(PipelineError::Generation(format!(
                    "{} exited with {status}: {tail}",
                    cfg.program.display()
                )));
            }

            let bytes = tokio::fs::read(&output).await.map_err(|e| {
                PipelineError::Generation(format!("output {} unreadable: {e}", output.display()))
            })?;
            remove_quietly(&output).await;
            Ok(Bytes::from(bytes))
        })
    }
}

/// Parse a `progress <n>` line.
pub(crate) fn parse_progress(line: &str) -> Option<i64> {
    line.trim().strip_prefix("progress ")?.trim().parse().ok()
}

fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

async fn collect_tail(reader: impl AsyncRead + Unpin) -> String {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch output"),
    }
}
