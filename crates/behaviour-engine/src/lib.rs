//! Unsafe Behaviour Rule Engine
//!
//! Keeps one sliding window per signal (acceleration, rotation, speed) and
//! raises an event when the smoothed value crosses a configured threshold.
//! Thresholds and normalisation constants are configuration.

mod gate;
mod rules;

pub use gate::EventGate;
pub use rules::{BehaviourConfig, BehaviourEngine, STANDARD_GRAVITY};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of unsafe behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BehaviourType {
    HarshAcceleration,
    HarshBraking,
    Swerving,
    Speeding,
}

impl BehaviourType {
    pub const ALL: [BehaviourType; 4] = [
        BehaviourType::HarshAcceleration,
        BehaviourType::HarshBraking,
        BehaviourType::Swerving,
        BehaviourType::Speeding,
    ];

    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviourType::HarshAcceleration => "Harsh Acceleration",
            BehaviourType::HarshBraking => "Harsh Braking",
            BehaviourType::Swerving => "Swerving",
            BehaviourType::Speeding => "Speeding",
        }
    }
}

impl std::fmt::Display for BehaviourType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An emitted behaviour event; immutable after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsafeBehaviourEvent {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub behaviour_type: BehaviourType,
    /// Normalized excess over the threshold, in [0, 1]
    pub severity: f64,
    pub timestamp_ms: i64,
    pub location_id: Option<Uuid>,
}

/// Normalized exceedance: `clamp((measured - threshold) / max_excess, 0, 1)`
pub fn severity(measured: f64, threshold: f64, max_excess: f64) -> f64 {
    if max_excess <= 0.0 || !measured.is_finite() {
        return if measured > threshold { 1.0 } else { 0.0 };
    }
    ((measured - threshold) / max_excess).clamp(0.0, 1.0)
}
