//! Trip Feature Accumulation and Vector Assembly

use crate::online::{
    haversine_distance_m, AccelerationYMean, CourseStd, DayOfWeekMean, HourOfDayMean,
    OnlineCalculator, SpeedStd,
};
use crate::FeatureError;
use chrono::FixedOffset;
use ring_buffer::{LocationSample, RawSample, SensorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// Model input order
pub const FEATURE_NAMES: [&str; 5] = [
    "hour_of_day_mean",
    "day_of_week_mean",
    "speed_std",
    "course_std",
    "accel_y_mean",
];

/// Number of features fed to the classifier
pub const FEATURE_DIMENSION: usize = FEATURE_NAMES.len();

/// Trip-level feature vector, unscaled
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TripFeatureVector {
    pub hour_of_day_mean: f64,
    pub day_of_week_mean: f64,
    pub speed_std: f64,
    pub course_std: f64,
    pub accel_y_mean: f64,
}

impl TripFeatureVector {
    /// Values in `FEATURE_NAMES` order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.hour_of_day_mean,
            self.day_of_week_mean,
            self.speed_std,
            self.course_std,
            self.accel_y_mean,
        ]
    }
}

#[derive(Debug, Deserialize)]
struct MinMaxFile {
    feature_names: Vec<String>,
    data_min: Vec<f64>,
    data_max: Vec<f64>,
}

/// Min-max scaler matching the training-time normalisation
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    ranges: HashMap<String, (f64, f64)>,
}

impl Default for FeatureScaler {
    fn default() -> Self {
        let ranges = [
            ("hour_of_day_mean", (0.0, 23.0)),
            ("day_of_week_mean", (0.0, 6.0)),
            ("speed_std", (0.0, 100.0)),
            ("course_std", (0.0, 360.0)),
            ("accel_y_mean", (-10.0, 10.0)),
        ]
        .into_iter()
        .map(|(name, range)| (name.to_string(), range))
        .collect();
        Self { ranges }
    }
}

impl FeatureScaler {
    /// Parse `{feature_names, data_min, data_max}`; features absent from the
    /// file keep their built-in range.
    pub fn from_json_str(json: &str) -> Result<Self, FeatureError> {
        let file: MinMaxFile =
            serde_json::from_str(json).map_err(|e| FeatureError::Parse(e.to_string()))?;

        if file.feature_names.len() != file.data_min.len()
            || file.feature_names.len() != file.data_max.len()
        {
            return Err(FeatureError::MismatchedRanges {
                names: file.feature_names.len(),
                mins: file.data_min.len(),
                maxs: file.data_max.len(),
            });
        }

        let mut scaler = Self::default();
        for ((name, min), max) in file
            .feature_names
            .into_iter()
            .zip(file.data_min)
            .zip(file.data_max)
        {
            scaler.ranges.insert(name, (min, max));
        }
        Ok(scaler)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeatureError> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FeatureError::Io(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Scale one feature into [0, 1]; unknown features and degenerate ranges map to 0
    pub fn scale(&self, name: &str, value: f64) -> f64 {
        let Some(&(min, max)) = self.ranges.get(name) else {
            warn!("No scaling range for feature {}", name);
            return 0.0;
        };
        let span = max - min;
        if !value.is_finite() || span.abs() <= f64::EPSILON {
            return 0.0;
        }
        ((value - min) / span).clamp(0.0, 1.0)
    }

    /// Scaled model input in `FEATURE_NAMES` order
    pub fn scale_vector(&self, features: &TripFeatureVector) -> Vec<f32> {
        FEATURE_NAMES
            .iter()
            .zip(features.to_vec())
            .map(|(name, value)| self.scale(name, value) as f32)
            .collect()
    }
}

/// Serializable checkpoint of a trip's accumulators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripFeatureSnapshot {
    pub trip_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub started_at_ms: i64,
    pub accel_count: u64,
    pub accel_mean: f64,
    pub speed_count: u64,
    pub speed_mean: f64,
    pub speed_m2: f64,
    pub course_count: u64,
    pub course_mean: f64,
    pub course_m2: f64,
    pub last_location: Option<LocationSample>,
    pub last_sensor_timestamp_ms: Option<i64>,
    pub distance_m: f64,
    pub sample_count: u64,
}

/// Per-trip feature accumulators.
///
/// Owned by exactly one trip; dropped when the trip ends.
#[derive(Debug, Clone)]
pub struct TripFeatureState {
    trip_id: Uuid,
    driver_id: Option<Uuid>,
    started_at_ms: i64,
    accel_y: AccelerationYMean,
    speed: SpeedStd,
    course: CourseStd,
    hour: HourOfDayMean,
    day: DayOfWeekMean,
    distance_m: f64,
    last_sensor_timestamp_ms: Option<i64>,
    sample_count: u64,
}

impl TripFeatureState {
    pub fn new(
        trip_id: Uuid,
        driver_id: Option<Uuid>,
        started_at_ms: i64,
        offset: FixedOffset,
    ) -> Self {
        Self {
            trip_id,
            driver_id,
            started_at_ms,
            accel_y: AccelerationYMean::new(),
            speed: SpeedStd::new(),
            course: CourseStd::new(),
            hour: HourOfDayMean::new(offset),
            day: DayOfWeekMean::new(offset),
            distance_m: 0.0,
            last_sensor_timestamp_ms: None,
            sample_count: 0,
        }
    }

    pub fn trip_id(&self) -> Uuid {
        self.trip_id
    }

    pub fn driver_id(&self) -> Option<Uuid> {
        self.driver_id
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn last_sensor_timestamp_ms(&self) -> Option<i64> {
        self.last_sensor_timestamp_ms
    }

    /// Whether anything usable was accumulated
    pub fn has_observations(&self) -> bool {
        self.sample_count > 0 || self.course.last_location().is_some()
    }

    /// Route one sensor sample into the calculators
    pub fn observe_sample(&mut self, sample: &RawSample) {
        self.sample_count += 1;
        self.last_sensor_timestamp_ms = Some(
            self.last_sensor_timestamp_ms
                .map_or(sample.timestamp_ms, |ts| ts.max(sample.timestamp_ms)),
        );

        self.hour.add(sample.timestamp_ms);
        self.day.add(sample.timestamp_ms);

        match sample.kind {
            SensorKind::Accelerometer => {
                if let Some(y) = sample.axis(1) {
                    self.accel_y.add(y);
                }
            }
            SensorKind::Speed => {
                if let Some(speed) = sample.axis(0) {
                    self.speed.add(speed);
                }
            }
            _ => {}
        }
    }

    /// Route one location fix into the course and distance accumulators
    pub fn observe_location(&mut self, location: &LocationSample) {
        if !self.course.accepts(location) {
            debug!("Trip {} ignoring location {}", self.trip_id, location.id);
            return;
        }
        if let Some(last) = self.course.last_location() {
            self.distance_m += haversine_distance_m(
                last.latitude,
                last.longitude,
                location.latitude,
                location.longitude,
            );
        }
        self.course.push(location);
    }

    /// Current unscaled feature vector
    pub fn feature_vector(&self) -> TripFeatureVector {
        TripFeatureVector {
            hour_of_day_mean: self.hour.result(),
            day_of_week_mean: self.day.result(),
            speed_std: self.speed.result().std_dev,
            course_std: self.course.result().std_dev,
            accel_y_mean: self.accel_y.result(),
        }
    }

    pub fn snapshot(&self) -> TripFeatureSnapshot {
        let speed = self.speed.welford();
        let course = self.course.welford();
        TripFeatureSnapshot {
            trip_id: self.trip_id,
            driver_id: self.driver_id,
            started_at_ms: self.started_at_ms,
            accel_count: self.accel_y.count(),
            accel_mean: self.accel_y.result(),
            speed_count: speed.count(),
            speed_mean: speed.mean(),
            speed_m2: speed.m2(),
            course_count: course.count(),
            course_mean: course.mean(),
            course_m2: course.m2(),
            last_location: self.course.last_location().cloned(),
            last_sensor_timestamp_ms: self.last_sensor_timestamp_ms,
            distance_m: self.distance_m,
            sample_count: self.sample_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online::training_offset;

    fn state() -> TripFeatureState {
        TripFeatureState::new(Uuid::new_v4(), None, 0, training_offset(3600))
    }

    #[test]
    fn test_routing_by_sensor_kind() {
        let mut state = state();
        state.observe_sample(&RawSample::new(SensorKind::Accelerometer, vec![0.0, 2.0, 9.8], 1_000));
        state.observe_sample(&RawSample::new(SensorKind::Accelerometer, vec![0.0, 4.0, 9.8], 1_020));
        state.observe_sample(&RawSample::new(SensorKind::Gyroscope, vec![0.0, 50.0, 0.0], 1_040));
        state.observe_sample(&RawSample::new(SensorKind::Speed, vec![10.0], 1_060));
        state.observe_sample(&RawSample::new(SensorKind::Speed, vec![14.0], 1_080));

        let features = state.feature_vector();
        assert!((features.accel_y_mean - 3.0).abs() < 1e-12);
        assert!((features.speed_std - 8.0f64.sqrt()).abs() < 1e-12);
        assert!((features.hour_of_day_mean - 1.0).abs() < 1e-12);
        assert_eq!(state.sample_count(), 5);
        assert_eq!(state.last_sensor_timestamp_ms(), Some(1_080));
    }

    #[test]
    fn test_distance_accumulates() {
        let mut state = state();
        state.observe_location(&LocationSample::new(0.0, 0.0, 1_000));
        state.observe_location(&LocationSample::new(0.0, 0.001, 2_000));
        state.observe_location(&LocationSample::new(0.0, 0.002, 3_000));
        // Out of order fix adds nothing
        state.observe_location(&LocationSample::new(0.0, 1.0, 2_500));

        assert!((state.distance_m() - 222.39).abs() < 0.5);
        assert!(state.feature_vector().course_std.abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_serializes_accumulators() {
        let mut state = state();
        state.observe_sample(&RawSample::new(SensorKind::Speed, vec![3.0], 10));
        state.observe_sample(&RawSample::new(SensorKind::Speed, vec![5.0], 20));
        state.observe_location(&LocationSample::new(1.0, 1.0, 30));

        let snapshot = state.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("speedM2"));

        let back: TripFeatureSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.speed_count, 2);
        assert!(back.last_location.is_some());
    }

    #[test]
    fn test_scaler_defaults_and_clamp() {
        let scaler = FeatureScaler::default();
        assert!((scaler.scale("accel_y_mean", 0.0) - 0.5).abs() < 1e-12);
        assert_eq!(scaler.scale("hour_of_day_mean", 40.0), 1.0);
        assert_eq!(scaler.scale("day_of_week_mean", -3.0), 0.0);
        assert_eq!(scaler.scale("unknown", 3.0), 0.0);
    }

    #[test]
    fn test_scaler_from_json_overrides() {
        let json = r#"{
            "feature_names": ["speed_std", "course_std"],
            "data_min": [0.0, 10.0],
            "data_max": [20.0, 10.0]
        }"#;
        let scaler = FeatureScaler::from_json_str(json).unwrap();
        assert!((scaler.scale("speed_std", 5.0) - 0.25).abs() < 1e-12);
        // Degenerate range
        assert_eq!(scaler.scale("course_std", 10.0), 0.0);
        // Untouched feature keeps its built-in range
        assert!((scaler.scale("day_of_week_mean", 3.0) - 0.5).abs() < 1e-12);

        let scaled = scaler.scale_vector(&TripFeatureVector {
            speed_std: 10.0,
            ..Default::default()
        });
        assert_eq!(scaled.len(), FEATURE_DIMENSION);
        assert!((scaled[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_scaler_rejects_mismatched_lengths() {
        let json = r#"{"feature_names": ["a", "b"], "data_min": [0.0], "data_max": [1.0, 2.0]}"#;
        assert!(matches!(
            FeatureScaler::from_json_str(json),
            Err(FeatureError::MismatchedRanges { names: 2, mins: 1, maxs: 2 })
        ));
    }
}
