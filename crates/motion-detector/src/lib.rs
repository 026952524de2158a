//! Motion State Detection
//!
//! Classifies windows of accelerometer magnitude into a coarse motion state
//! and only reports vehicle entry/exit once the new state has persisted for
//! a configured dwell time.

mod classifier;
mod debounce;
mod detector;

pub use classifier::{MotionClassifier, MotionConfig, WindowAnalysis};
pub use debounce::StateDebouncer;
pub use detector::MotionDetector;

use serde::{Deserialize, Serialize};

/// Coarse motion state of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionState {
    Stationary,
    Walking,
    Running,
    Vehicle,
    Unknown,
}

impl MotionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Stationary => "stationary",
            MotionState::Walking => "walking",
            MotionState::Running => "running",
            MotionState::Vehicle => "vehicle",
            MotionState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed (debounced) change of motion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionStateTransition {
    pub from: MotionState,
    pub to: MotionState,
    /// Timestamp of the sample that committed the change
    pub timestamp_ms: i64,
}

impl MotionStateTransition {
    pub fn entered_vehicle(&self) -> bool {
        self.to == MotionState::Vehicle && self.from != MotionState::Vehicle
    }

    pub fn left_vehicle(&self) -> bool {
        self.from == MotionState::Vehicle && self.to != MotionState::Vehicle
    }

    /// Whether the change concerns the vehicle state at all
    pub fn involves_vehicle(&self) -> bool {
        self.entered_vehicle() || self.left_vehicle()
    }
}
