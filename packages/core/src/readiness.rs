//! Readiness gate published by the worker and consulted by every producer.

use serde::{Deserialize, Serialize};

use crate::QueueError;

/// Lifecycle of the inference worker's one-time initialization.
///
/// Starts `Building`, moves once to `Ready` or to the terminal `Fault`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ReadinessState {
    #[default]
    Building,
    Ready,
    Fault(String),
}

impl ReadinessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessState::Building => "building",
            ReadinessState::Ready => "ready",
            ReadinessState::Fault(_) => "fault",
        }
    }

    /// Validate a move to `next`.
    ///
    /// Re-applying the current state is accepted; anything other than
    /// `building -> ready | fault` is rejected.
    pub fn check_transition(&self, next: &ReadinessState) -> Result<(), QueueError> {
        use ReadinessState::*;
        match (self, next) {
            (Building, Building) | (Ready, Ready) | (Fault(_), Fault(_)) => Ok(()),
            (Building, Ready) | (Building, Fault(_)) => Ok(()),
            (from, to) => Err(QueueError::InvalidTransition(format!(
                "readiness cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            ))),
        }
    }

    /// Gate job creation: only `Ready` admits new work.
    pub fn admit(&self) -> Result<(), QueueError> {
        match self {
            ReadinessState::Ready => Ok(()),
            ReadinessState::Building => Err(QueueError::NotReady(self.message())),
            ReadinessState::Fault(reason) => Err(QueueError::Fault(reason.clone())),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ReadinessState::Building => "Model is loading; retry shortly".to_string(),
            ReadinessState::Ready => "Model is ready".to_string(),
            ReadinessState::Fault(reason) => format!("Model failed to load: {reason}"),
        }
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            ready: matches!(self, ReadinessState::Ready),
            building: matches!(self, ReadinessState::Building),
            message: self.message(),
        }
    }
}

/// Wire shape of `GET /model-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub ready: bool,
    pub building: bool,
    pub message: String,
}
