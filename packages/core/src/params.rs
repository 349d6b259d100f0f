//! Generation parameters and progress helpers shared with the worker.

use serde::{Deserialize, Serialize};

/// Highest percent a job may report while still running; 100 is reserved
/// for the `finished` write.
pub const RUNNING_PERCENT_CAP: u8 = 99;

/// Per-deployment settings handed to the inference collaborator with every prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub frames: u32,
    pub fps: u32,
    pub height: u32,
    pub width: u32,
    pub inference_steps: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            frames: 121,
            fps: 24,
            height: 512,
            width: 768,
            inference_steps: 8,
        }
    }
}

/// Clamp a collaborator-reported value into the running range.
pub fn clamp_running_percent(percent: i64) -> u8 {
    percent.clamp(0, RUNNING_PERCENT_CAP as i64) as u8
}
