//! Persisted Trip Records

use behaviour_engine::BehaviourType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Outcome of trip classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLabel {
    AlcoholInfluenced,
    NotInfluenced,
    /// Classification did not run or failed
    Unclassified,
}

/// Final record of one trip; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub trip_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub distance_m: f64,
    pub duration_s: f64,
    pub event_counts: BTreeMap<BehaviourType, u32>,
    pub classification_label: ClassificationLabel,
    pub alcohol_probability: Option<f64>,
    pub sample_count: u64,
}

impl TripSummary {
    pub fn total_events(&self) -> u32 {
        self.event_counts.values().sum()
    }

    pub fn count(&self, behaviour: BehaviourType) -> u32 {
        self.event_counts.get(&behaviour).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes_event_counts() {
        let summary = TripSummary {
            trip_id: Uuid::new_v4(),
            driver_id: None,
            start_time_ms: 0,
            end_time_ms: 60_000,
            distance_m: 0.0,
            duration_s: 60.0,
            event_counts: BTreeMap::from([(BehaviourType::Speeding, 2), (BehaviourType::Swerving, 1)]),
            classification_label: ClassificationLabel::Unclassified,
            alcohol_probability: None,
            sample_count: 0,
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["event_counts"]["Speeding"], 2);
        assert_eq!(json["classification_label"], "unclassified");
        assert_eq!(summary.total_events(), 3);
        assert_eq!(summary.count(BehaviourType::HarshBraking), 0);
    }
}
