//! Repository Implementation

use crate::{StorageError, TripSummary};
use behaviour_engine::UnsafeBehaviourEvent;
use feature_engine::TripFeatureSnapshot;
use ring_buffer::RawSample;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Storage collaborator.
///
/// Treated as an at-least-once sink: every record carries a UUID and writes
/// are keyed on it, so retried writes never duplicate a record.
pub trait Storage: Send + Sync {
    /// Batch-insert raw samples
    fn insert_samples(&self, samples: &[RawSample]) -> Result<(), StorageError>;

    /// Append one behaviour event
    fn append_event(&self, event: &UnsafeBehaviourEvent) -> Result<(), StorageError>;

    /// Insert or replace a trip summary
    fn upsert_summary(&self, summary: &TripSummary) -> Result<(), StorageError>;

    /// Insert or replace the checkpoint of an open trip
    fn upsert_feature_state(&self, snapshot: &TripFeatureSnapshot) -> Result<(), StorageError>;

    /// Drop the checkpoint of a finished trip
    fn remove_feature_state(&self, trip_id: Uuid) -> Result<(), StorageError>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Lock(e.to_string()))
}

/// In-memory repository
#[derive(Default)]
pub struct InMemoryRepository {
    samples: Mutex<HashMap<Uuid, RawSample>>,
    events: Mutex<HashMap<Uuid, UnsafeBehaviourEvent>>,
    summaries: Mutex<HashMap<Uuid, TripSummary>>,
    feature_states: Mutex<HashMap<Uuid, TripFeatureSnapshot>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self::default()
    }

    pub fn sample_count(&self) -> Result<usize, StorageError> {
        Ok(lock(&self.samples)?.len())
    }

    /// Stored samples ordered by timestamp
    pub fn samples(&self) -> Result<Vec<RawSample>, StorageError> {
        let mut samples: Vec<_> = lock(&self.samples)?.values().cloned().collect();
        samples.sort_by_key(|s| s.timestamp_ms);
        Ok(samples)
    }

    /// Events of one trip ordered by timestamp
    pub fn events_for_trip(&self, trip_id: Uuid) -> Result<Vec<UnsafeBehaviourEvent>, StorageError> {
        let mut events: Vec<_> = lock(&self.events)?
            .values()
            .filter(|e| e.trip_id == trip_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp_ms);
        Ok(events)
    }

    pub fn event_count(&self) -> Result<usize, StorageError> {
        Ok(lock(&self.events)?.len())
    }

    pub fn summary(&self, trip_id: Uuid) -> Result<Option<TripSummary>, StorageError> {
        Ok(lock(&self.summaries)?.get(&trip_id).cloned())
    }

    /// All summaries ordered by start time
    pub fn summaries(&self) -> Result<Vec<TripSummary>, StorageError> {
        let mut summaries: Vec<_> = lock(&self.summaries)?.values().cloned().collect();
        summaries.sort_by_key(|s| s.start_time_ms);
        Ok(summaries)
    }

    pub fn feature_state(&self, trip_id: Uuid) -> Result<Option<TripFeatureSnapshot>, StorageError> {
        Ok(lock(&self.feature_states)?.get(&trip_id).cloned())
    }

}

impl Storage for InMemoryRepository {
    fn insert_samples(&self, samples: &[RawSample]) -> Result<(), StorageError> {
        let mut stored = lock(&self.samples)?;
        for sample in samples {
            stored.insert(sample.id, sample.clone());
        }
        debug!("Inserted {} samples ({} stored)", samples.len(), stored.len());
        Ok(())
    }

    fn append_event(&self, event: &UnsafeBehaviourEvent) -> Result<(), StorageError> {
        lock(&self.events)?.insert(event.id, event.clone());
        Ok(())
    }

    fn upsert_summary(&self, summary: &TripSummary) -> Result<(), StorageError> {
        lock(&self.summaries)?.insert(summary.trip_id, summary.clone());
        debug!("Stored summary for trip {}", summary.trip_id);
        Ok(())
    }

    fn upsert_feature_state(&self, snapshot: &TripFeatureSnapshot) -> Result<(), StorageError> {
        lock(&self.feature_states)?.insert(snapshot.trip_id, snapshot.clone());
        Ok(())
    }

    fn remove_feature_state(&self, trip_id: Uuid) -> Result<(), StorageError> {
        lock(&self.feature_states)?.remove(&trip_id);
        Ok(())
    }
}
