//! A pipeline that fakes inference for local development and tests.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::pipeline::{GenerationRequest, InferencePipeline, PipelineFuture};
use crate::progress::ProgressSink;

/// Steps through `inference_steps` with a fixed delay, then returns a tiny
/// MP4 container holding only an `ftyp` box and the prompt in a `free` box.
#[derive(Debug, Clone)]
pub struct SyntheticPipeline {
    step_delay: Duration,
}

impl SyntheticPipeline {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

impl Default for SyntheticPipeline {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl InferencePipeline for SyntheticPipeline {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn load(&self) -> PipelineFuture<()> {
        Box::pin(async { Ok(()) })
    }

    fn generate(&self, request: GenerationRequest, progress: ProgressSink) -> PipelineFuture<Bytes> {
        let delay = self.step_delay;
        Box::pin(async move {
            let steps = request.params.inference_steps.max(1);
            for step in 0..steps {
                tokio::time::sleep(delay).await;
                progress.report(i64::from(step + 1) * 100 / i64::from(steps));
            }
            Ok(placeholder_mp4(&request.prompt))
        })
    }
}

pub(crate) fn placeholder_mp4(prompt: &str) -> Bytes {
    let ftyp: &[u8] = b"ftypisom\x00\x00\x02\x00isommp41";
    let mut out = BytesMut::with_capacity(4 + ftyp.len() + 8 + prompt.len());
    out.put_u32((4 + ftyp.len()) as u32);
    out.put_slice(ftyp);
    out.put_u32((8 + prompt.len()) as u32);
    out.put_slice(b"free");
    out.put_slice(prompt.as_bytes());
    out.freeze()
}
