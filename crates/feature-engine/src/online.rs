//! Incremental (single-pass) statistics calculators
//!
//! Every calculator accumulates in O(1) memory and can be reset so a new
//! trip starts from a clean state. Invalid input is dropped silently at this
//! boundary: it is expected sensor noise, not an error.

use chrono::{Datelike, FixedOffset, Offset, TimeZone, Timelike, Utc};
use ring_buffer::LocationSample;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mean Earth radius used for great-circle distances (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Common interface of the streaming calculators
pub trait OnlineCalculator {
    type Input;
    type Output;

    /// Feed one observation (invalid observations are ignored)
    fn add(&mut self, input: Self::Input);
    /// Forget everything accumulated so far
    fn reset(&mut self);
    /// Current result
    fn result(&self) -> Self::Output;
    /// Number of accepted observations
    fn count(&self) -> u64;
}

/// Welford running mean / variance accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn m2(&self) -> f64 {
        self.m2
    }

    /// Sample variance; zero until two observations exist
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Mean and sample standard deviation of a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanStd {
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&Welford> for MeanStd {
    fn from(w: &Welford) -> Self {
        Self {
            count: w.count(),
            mean: w.mean(),
            std_dev: w.std_dev(),
        }
    }
}

/// Running mean of longitudinal (Y axis) acceleration
#[derive(Debug, Clone, Default)]
pub struct AccelerationYMean {
    count: u64,
    mean: f64,
}

impl AccelerationYMean {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OnlineCalculator for AccelerationYMean {
    type Input = f64;
    type Output = f64;

    fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn result(&self) -> f64 {
        self.mean
    }

    fn count(&self) -> u64 {
        self.count
    }
}

/// Speed mean and standard deviation (m/s)
#[derive(Debug, Clone, Default)]
pub struct SpeedStd {
    stats: Welford,
}

impl SpeedStd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn welford(&self) -> &Welford {
        &self.stats
    }
}

impl OnlineCalculator for SpeedStd {
    type Input = f64;
    type Output = MeanStd;

    fn add(&mut self, speed: f64) {
        if !speed.is_finite() || speed < 0.0 {
            return;
        }
        self.stats.push(speed);
    }

    fn reset(&mut self) {
        self.stats = Welford::default();
    }

    fn result(&self) -> MeanStd {
        MeanStd::from(&self.stats)
    }

    fn count(&self) -> u64 {
        self.stats.count()
    }
}

/// Initial great-circle bearing from one fix to another, degrees in [0, 360)
pub fn bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let delta_lon = (lon2 - lon1).to_radians();

    let x = delta_lon.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lon.cos();

    let bearing = x.atan2(y).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Haversine distance between two fixes (meters)
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Course (bearing between consecutive fixes) mean and standard deviation
#[derive(Debug, Clone, Default)]
pub struct CourseStd {
    stats: Welford,
    last: Option<LocationSample>,
}

impl CourseStd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted fix (the anchor for the next bearing)
    pub fn last_location(&self) -> Option<&LocationSample> {
        self.last.as_ref()
    }

    pub fn welford(&self) -> &Welford {
        &self.stats
    }

    /// Whether a fix would be accepted as the next anchor
    pub fn accepts(&self, location: &LocationSample) -> bool {
        if !location.has_finite_coordinates() {
            return false;
        }
        match &self.last {
            Some(last) => location.id != last.id && location.timestamp_ms > last.timestamp_ms,
            None => true,
        }
    }

    /// Feed a fix; returns the bearing recorded for it, if any.
    ///
    /// The first accepted fix only sets the anchor. A fix at the anchor's
    /// exact coordinates advances the anchor without recording a bearing.
    pub fn push(&mut self, location: &LocationSample) -> Option<f64> {
        if !self.accepts(location) {
            debug!("Dropping location {} (duplicate, non-finite or out of order)", location.id);
            return None;
        }

        let bearing = self.last.as_ref().and_then(|last| {
            if last.latitude == location.latitude && last.longitude == location.longitude {
                None
            } else {
                Some(bearing_degrees(
                    last.latitude,
                    last.longitude,
                    location.latitude,
                    location.longitude,
                ))
            }
        });

        if let Some(b) = bearing {
            self.stats.push(b);
        }
        self.last = Some(location.clone());
        bearing
    }
}

impl OnlineCalculator for CourseStd {
    type Input = LocationSample;
    type Output = MeanStd;

    fn add(&mut self, location: LocationSample) {
        self.push(&location);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn result(&self) -> MeanStd {
        MeanStd::from(&self.stats)
    }

    fn count(&self) -> u64 {
        self.stats.count()
    }
}

/// Build the fixed training-time offset, falling back to UTC for an invalid value
pub fn training_offset(utc_offset_seconds: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_seconds).unwrap_or_else(|| Utc.fix())
}

/// Running mean of hour-of-day (0-23) in the training time zone
#[derive(Debug, Clone)]
pub struct HourOfDayMean {
    offset: FixedOffset,
    count: u64,
    mean: f64,
}

impl HourOfDayMean {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            count: 0,
            mean: 0.0,
        }
    }
}

impl OnlineCalculator for HourOfDayMean {
    type Input = i64;
    type Output = f64;

    fn add(&mut self, timestamp_ms: i64) {
        let Some(local) = self.offset.timestamp_millis_opt(timestamp_ms).single() else {
            return;
        };
        self.count += 1;
        self.mean += (local.hour() as f64 - self.mean) / self.count as f64;
    }

    fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
    }

    fn result(&self) -> f64 {
        self.mean
    }

    fn count(&self) -> u64 {
        self.count
    }
}

/// Running mean of day-of-week (Monday = 0 .. Sunday = 6) in the training time zone
#[derive(Debug, Clone)]
pub struct DayOfWeekMean {
    offset: FixedOffset,
    count: u64,
    mean: f64,
}

impl DayOfWeekMean {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            count: 0,
            mean: 0.0,
        }
    }
}

impl OnlineCalculator for DayOfWeekMean {
    type Input = i64;
    type Output = f64;

    fn add(&mut self, timestamp_ms: i64) {
        let Some(local) = self.offset.timestamp_millis_opt(timestamp_ms).single() else {
            return;
        };
        let day = local.weekday().num_days_from_monday() as f64;
        self.count += 1;
        self.mean += (day - self.mean) / self.count as f64;
    }

    fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
    }

    fn result(&self) -> f64 {
        self.mean
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // 2024-01-01T00:00:00Z, a Monday
    const NEW_YEAR_2024_MS: i64 = 1_704_067_200_000;

    fn two_pass_sample_std(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    }

    #[test]
    fn test_speed_mean_and_std() {
        let mut calc = SpeedStd::new();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            calc.add(v);
        }
        let result = calc.result();
        assert!((result.mean - 3.0).abs() < 1e-12);
        assert!((result.std_dev - 1.5811).abs() < 1e-4);
        assert_eq!(result.count, 5);
    }

    #[test]
    fn test_speed_rejects_invalid() {
        let mut calc = SpeedStd::new();
        calc.add(-1.0);
        calc.add(f64::NAN);
        calc.add(f64::INFINITY);
        assert_eq!(calc.count(), 0);

        calc.add(10.0);
        assert_eq!(calc.result().std_dev, 0.0);
    }

    #[test]
    fn test_accel_mean_ignores_non_finite() {
        let mut calc = AccelerationYMean::new();
        calc.add(1.0);
        calc.add(f64::NAN);
        calc.add(3.0);
        assert_eq!(calc.count(), 2);
        assert!((calc.result() - 2.0).abs() < 1e-12);

        calc.reset();
        assert_eq!(calc.count(), 0);
        assert_eq!(calc.result(), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert!((bearing_degrees(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!(bearing_degrees(0.0, 0.0, 1.0, 0.0).abs() < 1e-9);
        assert!((bearing_degrees(0.0, 0.0, -1.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((bearing_degrees(0.0, 0.0, 0.0, -1.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_one_degree_longitude_at_equator() {
        let d = haversine_distance_m(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() < 10.0);
    }

    #[test]
    fn test_course_accumulates_bearings() {
        let mut calc = CourseStd::new();
        assert_eq!(calc.push(&LocationSample::new(0.0, 0.0, 1_000)), None);
        let b = calc.push(&LocationSample::new(0.0, 1.0, 2_000));
        assert!((b.unwrap() - 90.0).abs() < 1e-6);
        calc.push(&LocationSample::new(1.0, 1.0, 3_000));

        let result = calc.result();
        assert_eq!(result.count, 2);
        assert!((result.mean - 45.0).abs() < 1e-3);
    }

    #[test]
    fn test_course_drops_invalid_fixes_without_state_change() {
        let mut calc = CourseStd::new();
        let anchor = LocationSample::new(10.0, 10.0, 5_000);
        calc.push(&anchor);

        // Duplicate identity
        let mut dup = LocationSample::new(10.5, 10.0, 6_000);
        dup.id = anchor.id;
        assert_eq!(calc.push(&dup), None);
        // Non-increasing timestamp
        assert_eq!(calc.push(&LocationSample::new(10.5, 10.0, 5_000)), None);
        // Non-finite coordinates
        assert_eq!(calc.push(&LocationSample::new(f64::NAN, 10.0, 7_000)), None);

        assert_eq!(calc.count(), 0);
        assert_eq!(calc.last_location().map(|l| l.id), Some(anchor.id));
    }

    #[test]
    fn test_course_coincident_fix_records_no_bearing() {
        let mut calc = CourseStd::new();
        calc.push(&LocationSample::new(5.0, 5.0, 1_000));
        assert_eq!(calc.push(&LocationSample::new(5.0, 5.0, 2_000)), None);
        assert_eq!(calc.count(), 0);
        assert_eq!(calc.last_location().map(|l| l.timestamp_ms), Some(2_000));
    }

    #[test]
    fn test_hour_of_day_uses_training_offset() {
        let mut calc = HourOfDayMean::new(training_offset(3600));
        // 2023-12-31T23:30Z is 00:30 on Monday in UTC+1
        calc.add(NEW_YEAR_2024_MS - 30 * 60 * 1000);
        // 2024-01-01T00:30Z is 01:30 in UTC+1
        calc.add(NEW_YEAR_2024_MS + 30 * 60 * 1000);
        assert!((calc.result() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_day_of_week_monday_is_zero() {
        let mut utc = DayOfWeekMean::new(training_offset(0));
        let mut plus_one = DayOfWeekMean::new(training_offset(3600));

        let sunday_late = NEW_YEAR_2024_MS - 30 * 60 * 1000;
        utc.add(sunday_late);
        plus_one.add(sunday_late);

        assert!((utc.result() - 6.0).abs() < 1e-12);
        assert!(plus_one.result().abs() < 1e-12);

        plus_one.reset();
        assert_eq!(plus_one.count(), 0);
    }

    #[test]
    fn test_invalid_offset_falls_back_to_utc() {
        assert_eq!(training_offset(100_000).local_minus_utc(), 0);
    }

    proptest! {
        #[test]
        fn prop_incremental_std_matches_two_pass(values in proptest::collection::vec(0.0f64..80.0, 1..300)) {
            let mut calc = SpeedStd::new();
            for v in &values {
                calc.add(*v);
            }
            let expected = two_pass_sample_std(&values);
            let actual = calc.result().std_dev;
            prop_assert!((expected - actual).abs() <= 1e-9 * expected.max(1.0));
        }

        #[test]
        fn prop_welford_mean_matches_average(values in proptest::collection::vec(-1e3f64..1e3, 1..300)) {
            let mut w = Welford::new();
            for v in &values {
                w.push(*v);
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            prop_assert!((w.mean() - mean).abs() <= 1e-9 * mean.abs().max(1.0));
        }
    }
}
