//! Model Runner Implementations

use crate::{ClassificationError, ModelOutputs, ModelRunner};
use feature_engine::FEATURE_DIMENSION;
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone)]
enum MockBehaviour {
    Logistic { weights: Vec<f64>, bias: f64 },
    Fixed(ModelOutputs),
    Failing(String),
}

/// In-process model used when no model file is configured, and in tests
#[derive(Debug, Clone)]
pub struct MockModelRunner {
    behaviour: MockBehaviour,
}

impl MockModelRunner {
    /// Logistic regression over the scaled features
    pub fn logistic(weights: Vec<f64>, bias: f64) -> Self {
        Self {
            behaviour: MockBehaviour::Logistic { weights, bias },
        }
    }

    /// Always returns the given outputs
    pub fn fixed(outputs: ModelOutputs) -> Self {
        Self {
            behaviour: MockBehaviour::Fixed(outputs),
        }
    }

    /// Always fails with an inference error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Failing(message.into()),
        }
    }
}

impl Default for MockModelRunner {
    fn default() -> Self {
        info!("Creating mock model runner");
        // hour, day, speed std, course std, accel-y mean
        Self::logistic(vec![0.8, 0.4, 2.5, 1.5, 1.0], -3.0)
    }
}

impl ModelRunner for MockModelRunner {
    fn run(&self, input: &[f32]) -> Result<ModelOutputs, ClassificationError> {
        match &self.behaviour {
            MockBehaviour::Logistic { weights, bias } => {
                let z = input
                    .iter()
                    .zip(weights)
                    .fold(*bias, |acc, (x, w)| acc + *x as f64 * w);
                let p = 1.0 / (1.0 + (-z).exp());
                let label = i64::from(p >= 0.5);

                let mut outputs = ModelOutputs::new();
                outputs.insert("label".to_string(), json!([label]));
                outputs.insert("probabilities".to_string(), json!([[1.0 - p, p]]));
                Ok(outputs)
            }
            MockBehaviour::Fixed(outputs) => Ok(outputs.clone()),
            MockBehaviour::Failing(message) => {
                Err(ClassificationError::InferenceFailed(message.clone()))
            }
        }
    }

    fn input_dimension(&self) -> usize {
        match &self.behaviour {
            MockBehaviour::Logistic { weights, .. } => weights.len(),
            _ => FEATURE_DIMENSION,
        }
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    use super::*;
    use std::path::Path;
    use tract_onnx::prelude::*;

    /// ONNX model executed with tract
    pub struct TractModelRunner {
        plan: TypedRunnableModel<TypedModel>,
        output_names: Vec<String>,
        input_dimension: usize,
    }

    impl TractModelRunner {
        /// Load and optimize a model taking a `[1, input_dimension]` f32 tensor
        pub fn load(path: impl AsRef<Path>, input_dimension: usize) -> Result<Self, ClassificationError> {
            let path = path.as_ref();
            info!("Loading ONNX model from {}", path.display());

            let load = |e: TractError| ClassificationError::ModelLoad(e.to_string());
            let plan = tract_onnx::onnx()
                .model_for_path(path)
                .map_err(load)?
                .with_input_fact(0, f32::fact([1, input_dimension]).into())
                .map_err(load)?
                .into_optimized()
                .map_err(load)?
                .into_runnable()
                .map_err(load)?;

            let model = plan.model();
            let output_names = model
                .output_outlets()
                .map_err(load)?
                .iter()
                .map(|outlet| model.node(outlet.node).name.clone())
                .collect();

            Ok(Self {
                plan,
                output_names,
                input_dimension,
            })
        }

        fn tensor_to_json(tensor: &Tensor) -> Result<serde_json::Value, ClassificationError> {
            let failed = |e: TractError| ClassificationError::InferenceFailed(e.to_string());
            let flat: Vec<serde_json::Value> = if tensor.datum_type() == i64::datum_type() {
                tensor
                    .as_slice::<i64>()
                    .map_err(failed)?
                    .iter()
                    .map(|v| json!(v))
                    .collect()
            } else {
                tensor
                    .cast_to::<f32>()
                    .map_err(failed)?
                    .as_slice::<f32>()
                    .map_err(failed)?
                    .iter()
                    .map(|v| json!(*v as f64))
                    .collect()
            };

            // Rank 2 and above become rows of the last dimension
            let shape = tensor.shape();
            if shape.len() < 2 {
                return Ok(serde_json::Value::Array(flat));
            }
            let width = shape[shape.len() - 1].max(1);
            Ok(serde_json::Value::Array(
                flat.chunks(width)
                    .map(|row| serde_json::Value::Array(row.to_vec()))
                    .collect(),
            ))
        }
    }

    impl ModelRunner for TractModelRunner {
        fn run(&self, input: &[f32]) -> Result<ModelOutputs, ClassificationError> {
            let failed = |e: TractError| ClassificationError::InferenceFailed(e.to_string());
            let tensor = Tensor::from_shape(&[1, input.len()], input).map_err(failed)?;
            let results = self.plan.run(tvec!(tensor.into())).map_err(failed)?;

            let mut outputs = ModelOutputs::new();
            for (name, value) in self.output_names.iter().zip(results.iter()) {
                outputs.insert(name.clone(), Self::tensor_to_json(value)?);
            }
            Ok(outputs)
        }

        fn input_dimension(&self) -> usize {
            self.input_dimension
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::TractModelRunner;
