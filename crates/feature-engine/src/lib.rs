//! Feature Engineering Engine
//!
//! Spectral analysis of sensor windows, streaming trip statistics and the
//! scaled feature vector handed to the classifier.

mod features;
mod fft;
mod online;
mod statistics;

pub use features::{
    FeatureScaler, TripFeatureSnapshot, TripFeatureState, TripFeatureVector, FEATURE_DIMENSION,
    FEATURE_NAMES,
};
pub use fft::{FftAnalyzer, Spectrum};
pub use online::{
    bearing_degrees, haversine_distance_m, training_offset, AccelerationYMean, CourseStd,
    DayOfWeekMean, HourOfDayMean, MeanStd, OnlineCalculator, SpeedStd, Welford, EARTH_RADIUS_M,
};
pub use statistics::WindowStatistics;

use thiserror::Error;

/// Feature engine errors
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Failed to read scaling file: {0}")]
    Io(String),

    #[error("Failed to parse scaling file: {0}")]
    Parse(String),

    #[error("Scaling ranges disagree: {names} names, {mins} minimums, {maxs} maximums")]
    MismatchedRanges { names: usize, mins: usize, maxs: usize },
}
