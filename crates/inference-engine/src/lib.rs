//! Trip Classification
//!
//! Runs the trip feature vector through a model runner and interprets the
//! runner's named outputs into an influenced / not influenced decision.

mod adapter;
mod interpreter;
mod runner;

pub use adapter::ClassificationAdapter;
pub use interpreter::OutputInterpreter;
pub use runner::MockModelRunner;
#[cfg(feature = "onnx")]
pub use runner::TractModelRunner;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Named raw outputs of one model run
pub type ModelOutputs = BTreeMap<String, serde_json::Value>;

/// Errors during classification
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("no usable outputs found for inference")]
    NoUsableOutputs,
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: usize, actual: usize },
}

/// Decision for one trip
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierInference {
    pub is_influenced: bool,
    /// Probability of the influenced class, when the model reported one
    pub probability: Option<f64>,
}

/// Numeric inference collaborator.
///
/// Implementations may block; callers run them off latency-sensitive paths.
pub trait ModelRunner: Send + Sync {
    /// Run one fixed-order, already-scaled feature vector
    fn run(&self, input: &[f32]) -> Result<ModelOutputs, ClassificationError>;

    /// Expected input length
    fn input_dimension(&self) -> usize {
        feature_engine::FEATURE_DIMENSION
    }
}
