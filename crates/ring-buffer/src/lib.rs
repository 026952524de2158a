//! Sensor Sample Model and Sliding Windows
//!
//! Provides the raw sample types shared by every stage of the pipeline and a
//! fixed-capacity window that evicts its oldest entry on overflow.

mod buffer;

pub use buffer::RingBuffer;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of hardware sensor that produced a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    RotationVector,
    Magnetometer,
    Gravity,
    LinearAcceleration,
    Speed,
}

impl SensorKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::RotationVector => "rotation_vector",
            SensorKind::Magnetometer => "magnetometer",
            SensorKind::Gravity => "gravity",
            SensorKind::LinearAcceleration => "linear_acceleration",
            SensorKind::Speed => "speed",
        }
    }
}

/// A single reading from a sensor listener.
///
/// Samples are immutable once created; the builder-style `with_*` methods
/// consume the sample and return a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub id: Uuid,
    pub kind: SensorKind,
    pub values: Vec<f64>,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub accuracy: i32,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub trip_id: Option<Uuid>,
}

impl RawSample {
    /// Create a new sample with a fresh identifier
    pub fn new(kind: SensorKind, values: Vec<f64>, timestamp_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            values,
            timestamp_ms,
            accuracy: 0,
            location_id: None,
            trip_id: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: i32) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_location(mut self, location_id: Uuid) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_trip(mut self, trip_id: Uuid) -> Self {
        self.trip_id = Some(trip_id);
        self
    }

    /// Euclidean norm of the first three components (missing axes count as zero)
    pub fn magnitude(&self) -> f64 {
        self.values
            .iter()
            .take(3)
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    /// Value of a single axis, if present and finite
    pub fn axis(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().filter(|v| v.is_finite())
    }

    /// Whether every component is finite
    pub fn is_finite(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.is_finite())
    }
}

/// A position fix from the location collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp_ms: i64,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            latitude,
            longitude,
            timestamp_ms,
        }
    }

    pub fn has_finite_coordinates(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_uses_three_axes() {
        let sample = RawSample::new(SensorKind::Accelerometer, vec![3.0, 4.0, 12.0, 99.0], 0);
        assert!((sample.magnitude() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_magnitude_short_vector() {
        let sample = RawSample::new(SensorKind::Speed, vec![12.5], 0);
        assert!((sample.magnitude() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_detection() {
        let sample = RawSample::new(SensorKind::Gyroscope, vec![0.1, f64::NAN, 0.0], 0);
        assert!(!sample.is_finite());
        assert_eq!(sample.axis(1), None);
        assert_eq!(sample.axis(0), Some(0.1));
    }

    #[test]
    fn test_sample_deserializes_with_defaults() {
        let json = r#"{
            "id": "6a2f41a3-c54c-fce8-32d2-0324e1c32e22",
            "kind": "linear_acceleration",
            "values": [0.0, 1.5, 0.2],
            "timestamp_ms": 1700000000000
        }"#;
        let sample: RawSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.kind, SensorKind::LinearAcceleration);
        assert_eq!(sample.trip_id, None);
        assert_eq!(sample.accuracy, 0);
    }
}
