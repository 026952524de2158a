//! Model Output Interpretation

use crate::{ClassificationError, ClassifierInference, ModelOutputs};
use serde_json::Value;
use tracing::{debug, warn};

const LABEL_HINTS: [&str; 2] = ["label", "predicted"];
const PROBABILITY_HINTS: [&str; 2] = ["prob", "score"];

/// Maps raw named outputs onto a decision.
///
/// A discrete label wins when present; otherwise the influenced-class
/// probability is thresholded. Neither present is an error.
#[derive(Debug, Clone)]
pub struct OutputInterpreter {
    /// Index of the influenced class in probability outputs
    pub positive_class: usize,
    /// Probability at or above which a trip counts as influenced
    pub threshold: f64,
}

impl Default for OutputInterpreter {
    fn default() -> Self {
        Self {
            positive_class: 1,
            threshold: 0.5,
        }
    }
}

fn matches_hint(name: &str, hints: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    hints.iter().any(|hint| lower.contains(hint))
}

impl OutputInterpreter {
    pub fn interpret(&self, outputs: &ModelOutputs) -> Result<ClassifierInference, ClassificationError> {
        let label = outputs
            .iter()
            .filter(|(name, _)| {
                matches_hint(name, &LABEL_HINTS) && !matches_hint(name, &PROBABILITY_HINTS)
            })
            .find_map(|(name, value)| {
                let label = Self::parse_label(value);
                if label.is_none() {
                    warn!("Ignoring unparseable label output {}", name);
                }
                label
            });

        let probability = outputs
            .iter()
            .filter(|(name, _)| matches_hint(name, &PROBABILITY_HINTS))
            .find_map(|(name, value)| {
                let p = self.parse_probability(value);
                if p.is_none() {
                    warn!("Ignoring unparseable probability output {}", name);
                }
                p
            });

        debug!("Interpreted outputs: label={:?}, probability={:?}", label, probability);

        match (label, probability) {
            (Some(label), probability) => Ok(ClassifierInference {
                is_influenced: label == self.positive_class as i64,
                probability,
            }),
            (None, Some(p)) => Ok(ClassifierInference {
                is_influenced: p >= self.threshold,
                probability: Some(p),
            }),
            (None, None) => Err(ClassificationError::NoUsableOutputs),
        }
    }

    /// First scalar of a label output: number, numeric string or bool
    fn parse_label(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Array(items) => items.first().and_then(Self::parse_label),
            _ => None,
        }
    }

    /// Probability of the positive class
    fn parse_probability(&self, value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::as_probability),
            Value::Object(map) => self.class_map_probability(map),
            Value::Array(items) => match items.first()? {
                // [[p0, p1]] or [{class: p}]
                Value::Array(_) | Value::Object(_) => self.parse_probability(items.first()?),
                _ => {
                    let scores: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
                    if scores.len() != items.len() {
                        return None;
                    }
                    self.vector_probability(&scores)
                }
            },
            _ => None,
        }
    }

    fn class_map_probability(&self, map: &serde_json::Map<String, Value>) -> Option<f64> {
        let mut scores: Vec<(i64, f64)> = map
            .iter()
            .filter_map(|(class, p)| Some((class.trim().parse::<i64>().ok()?, p.as_f64()?)))
            .collect();
        scores.sort_by_key(|(class, _)| *class);
        let ordered: Vec<f64> = scores.iter().map(|(_, p)| *p).collect();
        let index = scores
            .iter()
            .position(|(class, _)| *class == self.positive_class as i64)?;
        Self::normalize(&ordered).get(index).copied()
    }

    fn vector_probability(&self, scores: &[f64]) -> Option<f64> {
        match scores.len() {
            0 => None,
            1 => Some(Self::as_probability(scores[0])),
            _ => Self::normalize(scores).get(self.positive_class).copied(),
        }
    }

    /// Scalar: pass through if already in [0, 1], else sigmoid
    fn as_probability(value: f64) -> f64 {
        if (0.0..=1.0).contains(&value) {
            value
        } else {
            1.0 / (1.0 + (-value).exp())
        }
    }

    /// Vector: pass through if already a distribution, else softmax
    fn normalize(scores: &[f64]) -> Vec<f64> {
        let sum: f64 = scores.iter().sum();
        let is_distribution =
            scores.iter().all(|p| (0.0..=1.0).contains(p)) && (sum - 1.0).abs() < 1e-3;
        if is_distribution {
            return scores.to_vec();
        }

        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.iter().map(|e| e / total).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs(value: Value) -> ModelOutputs {
        serde_json::from_value(value).unwrap()
    }

    fn interpret(value: Value) -> Result<ClassifierInference, ClassificationError> {
        OutputInterpreter::default().interpret(&outputs(value))
    }

    #[test]
    fn test_label_with_probabilities() {
        let result = interpret(json!({"label": [1], "probabilities": [[0.2, 0.8]]})).unwrap();
        assert!(result.is_influenced);
        assert_eq!(result.probability, Some(0.8));
    }

    #[test]
    fn test_probabilities_only() {
        let result = interpret(json!({"probabilities": [[0.1, 0.9]]})).unwrap();
        assert!(result.is_influenced);
        assert_eq!(result.probability, Some(0.9));
    }

    #[test]
    fn test_unknown_outputs_error() {
        let err = interpret(json!({"unknown": "invalid"})).unwrap_err();
        assert!(matches!(err, ClassificationError::NoUsableOutputs));
        assert_eq!(err.to_string(), "no usable outputs found for inference");
    }

    #[test]
    fn test_label_wins_over_probability() {
        let result = interpret(json!({"output_label": [0], "output_probability": [[0.3, 0.7]]})).unwrap();
        assert!(!result.is_influenced);
        assert_eq!(result.probability, Some(0.7));
    }

    #[test]
    fn test_label_only() {
        let result = interpret(json!({"predicted_class": ["1"]})).unwrap();
        assert!(result.is_influenced);
        assert_eq!(result.probability, None);
    }

    #[test]
    fn test_class_map_outputs() {
        let result = interpret(json!({"output_probability": [{"0": 0.65, "1": 0.35}]})).unwrap();
        assert!(!result.is_influenced);
        assert_eq!(result.probability, Some(0.35));

        let result = interpret(json!({"probabilities": {"1": 0.6, "0": 0.4}})).unwrap();
        assert!(result.is_influenced);
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let result = interpret(json!({"scores": [[0.0, 2.0]]})).unwrap();
        let expected = 2.0f64.exp() / (1.0 + 2.0f64.exp());
        assert!((result.probability.unwrap() - expected).abs() < 1e-12);
        assert!(result.is_influenced);
    }

    #[test]
    fn test_scalar_logit_is_sigmoided() {
        let result = interpret(json!({"score": -3.0})).unwrap();
        assert!(result.probability.unwrap() < 0.1);
        assert!(!result.is_influenced);

        let result = interpret(json!({"prob": 0.5})).unwrap();
        assert!(result.is_influenced);
    }

    #[test]
    fn test_unparseable_outputs_are_not_usable() {
        let err = interpret(json!({"label": [null], "probabilities": "high"})).unwrap_err();
        assert!(matches!(err, ClassificationError::NoUsableOutputs));
    }
}
