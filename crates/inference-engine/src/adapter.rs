//! Classification Adapter

use crate::interpreter::OutputInterpreter;
use crate::{ClassificationError, ClassifierInference, ModelRunner};
use feature_engine::{FeatureScaler, TripFeatureVector};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Scales the trip feature vector, runs the model and interprets its outputs
#[derive(Clone)]
pub struct ClassificationAdapter {
    runner: Arc<dyn ModelRunner>,
    interpreter: OutputInterpreter,
    scaler: Arc<FeatureScaler>,
}

impl ClassificationAdapter {
    pub fn new(runner: Arc<dyn ModelRunner>, scaler: FeatureScaler) -> Self {
        Self {
            runner,
            interpreter: OutputInterpreter::default(),
            scaler: Arc::new(scaler),
        }
    }

    pub fn with_interpreter(mut self, interpreter: OutputInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Classify synchronously; may block for the duration of the model run
    pub fn classify(&self, features: &TripFeatureVector) -> Result<ClassifierInference, ClassificationError> {
        let start = Instant::now();
        let input = self.scaler.scale_vector(features);

        let expected = self.runner.input_dimension();
        if input.len() != expected {
            return Err(ClassificationError::InvalidInputShape {
                expected,
                actual: input.len(),
            });
        }

        let outputs = self.runner.run(&input)?;
        let result = self.interpreter.interpret(&outputs);

        let elapsed = start.elapsed();
        metrics::histogram!("classification_latency_seconds").record(elapsed.as_secs_f64());
        match &result {
            Ok(inference) => {
                debug!("Classification completed in {:?}: {:?}", elapsed, inference);
                metrics::counter!("classifications_total", "status" => "ok").increment(1);
            }
            Err(e) => {
                warn!("Classification failed: {}", e);
                metrics::counter!("classifications_total", "status" => "error").increment(1);
            }
        }
        result
    }

    /// Classify on the blocking thread pool and await the result
    pub async fn classify_off_thread(
        &self,
        features: TripFeatureVector,
    ) -> Result<ClassifierInference, ClassificationError> {
        let adapter = self.clone();
        tokio::task::spawn_blocking(move || adapter.classify(&features))
            .await
            .map_err(|e| ClassificationError::InferenceFailed(format!("inference task failed: {}", e)))?
    }
}
