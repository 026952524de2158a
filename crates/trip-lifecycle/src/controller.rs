//! Trip State Machine

use crate::{ControllerError, TripConfig, TripEvent};
use behaviour_engine::{BehaviourConfig, BehaviourEngine, BehaviourType, UnsafeBehaviourEvent};
use feature_engine::{training_offset, TripFeatureState};
use inference_engine::ClassificationAdapter;
use motion_detector::{MotionConfig, MotionDetector, MotionState};
use ring_buffer::{LocationSample, RawSample};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use storage::{BufferManager, ClassificationLabel, Storage, StorageError, TripSummary};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The open trip and what has been accumulated for it
struct ActiveTrip {
    features: TripFeatureState,
    event_counts: BTreeMap<BehaviourType, u32>,
    since_checkpoint: u64,
}

/// Trip lifecycle state machine (Idle / TripActive).
///
/// Not shared: it is owned by the actor task started with
/// [`TripController::spawn`], which serializes every call.
pub struct TripController {
    config: TripConfig,
    motion: MotionDetector,
    rules: BehaviourEngine,
    storage: Arc<dyn Storage>,
    buffer: Arc<BufferManager>,
    classifier: ClassificationAdapter,
    pub(crate) events_tx: broadcast::Sender<TripEvent>,
    active: Option<ActiveTrip>,
    driver_id: Option<Uuid>,
    latest_location: Option<LocationSample>,
    pending_events: Vec<UnsafeBehaviourEvent>,
    pending_summaries: Vec<TripSummary>,
}

impl TripController {
    pub fn new(
        config: TripConfig,
        motion: MotionConfig,
        behaviour: BehaviourConfig,
        storage: Arc<dyn Storage>,
        buffer: Arc<BufferManager>,
        classifier: ClassificationAdapter,
    ) -> Self {
        info!(
            "Creating trip controller (auto detection {})",
            if config.auto_trip_detection { "on" } else { "off" }
        );
        let (events_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            config,
            motion: MotionDetector::new(motion),
            rules: BehaviourEngine::new(behaviour),
            storage,
            buffer,
            classifier,
            events_tx,
            active: None,
            driver_id: None,
            latest_location: None,
            pending_events: Vec::new(),
            pending_summaries: Vec::new(),
        }
    }

    /// Driver attached to trips started automatically
    pub fn with_driver(mut self, driver_id: Uuid) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn config(&self) -> &TripConfig {
        &self.config
    }

    pub fn active_trip(&self) -> Option<Uuid> {
        self.active.as_ref().map(|trip| trip.features.trip_id())
    }

    pub fn motion_state(&self) -> MotionState {
        self.motion.current_state()
    }

    pub fn is_vehicle_moving(&self) -> bool {
        self.motion.is_vehicle_moving()
    }

    pub fn pending_events(&self) -> usize {
        self.pending_events.len()
    }

    pub fn pending_summaries(&self) -> usize {
        self.pending_summaries.len()
    }

    /// Ingest one sensor sample
    pub async fn handle_sample(&mut self, mut sample: RawSample) {
        metrics::counter!("samples_ingested_total").increment(1);

        if let Some(transition) = self.motion.observe(&sample) {
            if self.config.auto_trip_detection {
                if transition.entered_vehicle() && self.active.is_none() {
                    if let Err(e) = self.start_trip(transition.timestamp_ms, self.driver_id) {
                        warn!("Automatic trip start rejected: {}", e);
                    }
                } else if transition.left_vehicle() && self.active.is_some() {
                    if let Err(e) = self.finish_trip(transition.timestamp_ms).await {
                        warn!("Automatic trip stop failed: {}", e);
                    }
                }
            }
        }

        if let Some(trip) = &self.active {
            sample.trip_id.get_or_insert(trip.features.trip_id());
        }
        if sample.location_id.is_none() {
            sample.location_id = self.latest_location.as_ref().map(|l| l.id);
        }

        if let Err(e) = self.buffer.add_to_buffer(sample.clone()) {
            warn!("Failed to buffer sample {}: {}", sample.id, e);
        }

        if self.active.is_none() {
            return;
        }

        let event = self.rules.analyze(&sample);
        if let Some(trip) = self.active.as_mut() {
            trip.features.observe_sample(&sample);
            trip.since_checkpoint += 1;
            if let Some(event) = &event {
                *trip.event_counts.entry(event.behaviour_type).or_insert(0) += 1;
            }
        }
        if let Some(event) = event {
            self.record_event(event);
        }
        self.maybe_checkpoint();
    }

    /// Ingest one location fix
    pub fn handle_location(&mut self, location: LocationSample) {
        if let Some(trip) = self.active.as_mut() {
            trip.features.observe_location(&location);
        }
        if location.has_finite_coordinates() {
            self.latest_location = Some(location);
        }
    }

    /// Open a trip; rejected when one is already open
    pub fn start_trip(
        &mut self,
        timestamp_ms: i64,
        driver_id: Option<Uuid>,
    ) -> Result<Uuid, ControllerError> {
        if let Some(active) = self.active_trip() {
            warn!("Trip start rejected: trip {} is already active", active);
            return Err(ControllerError::TripAlreadyActive(active));
        }

        let trip_id = Uuid::new_v4();
        let offset = training_offset(self.config.training_utc_offset_seconds);
        self.rules.reset();
        self.active = Some(ActiveTrip {
            features: TripFeatureState::new(trip_id, driver_id, timestamp_ms, offset),
            event_counts: BTreeMap::new(),
            since_checkpoint: 0,
        });

        info!("Trip {} started at {}", trip_id, timestamp_ms);
        metrics::counter!("trips_started_total").increment(1);
        let _ = self.events_tx.send(TripEvent::Started {
            trip_id,
            timestamp_ms,
        });
        Ok(trip_id)
    }

    /// Close the open trip: classify, persist the summary, flush samples.
    ///
    /// Returns once the summary has been handed to storage (or parked for
    /// retry after repeated failures).
    pub async fn finish_trip(&mut self, timestamp_ms: i64) -> Result<TripSummary, ControllerError> {
        let Some(trip) = self.active.take() else {
            warn!("Trip stop rejected: no active trip");
            return Err(ControllerError::NoActiveTrip);
        };
        let features = &trip.features;

        let (label, probability) = if features.has_observations() {
            match self
                .classifier
                .classify_off_thread(features.feature_vector())
                .await
            {
                Ok(inference) => {
                    let label = if inference.is_influenced {
                        ClassificationLabel::AlcoholInfluenced
                    } else {
                        ClassificationLabel::NotInfluenced
                    };
                    (label, inference.probability)
                }
                Err(e) => {
                    warn!("Classification of trip {} failed: {}", features.trip_id(), e);
                    metrics::counter!("classification_failures_total").increment(1);
                    (ClassificationLabel::Unclassified, None)
                }
            }
        } else {
            debug!("Trip {} has no samples, skipping classification", features.trip_id());
            (ClassificationLabel::Unclassified, None)
        };

        let start = features.started_at_ms();
        let end = timestamp_ms.max(start);
        let summary = TripSummary {
            trip_id: features.trip_id(),
            driver_id: features.driver_id(),
            start_time_ms: start,
            end_time_ms: end,
            distance_m: features.distance_m(),
            duration_s: end.saturating_sub(start) as f64 / 1000.0,
            event_counts: trip.event_counts.clone(),
            classification_label: label,
            alcohol_probability: probability,
            sample_count: features.sample_count(),
        };

        self.retry_pending_events();
        self.retry_pending_summaries();
        if let Err(e) = self.persist_summary(&summary).await {
            warn!(
                "Summary for trip {} parked after {} attempts: {}",
                summary.trip_id, self.config.persist_retries, e
            );
            self.pending_summaries.push(summary.clone());
        }

        if let Err(e) = self.storage.remove_feature_state(summary.trip_id) {
            warn!("Failed to remove checkpoint of trip {}: {}", summary.trip_id, e);
        }
        if let Err(e) = self.buffer.flush() {
            warn!("Flush at end of trip {} failed: {}", summary.trip_id, e);
        }
        self.rules.reset();

        info!(
            "Trip {} ended: {:.0} m, {:.1} s, {} events, {:?}",
            summary.trip_id,
            summary.distance_m,
            summary.duration_s,
            summary.total_events(),
            summary.classification_label
        );
        metrics::counter!("trips_finished_total").increment(1);
        let _ = self.events_tx.send(TripEvent::Ended(summary.clone()));
        Ok(summary)
    }

    /// Finish any open trip and flush what is still buffered
    pub async fn shutdown(&mut self) {
        if let Some(trip) = &self.active {
            let ts = trip
                .features
                .last_sensor_timestamp_ms()
                .unwrap_or_else(|| trip.features.started_at_ms());
            if let Err(e) = self.finish_trip(ts).await {
                warn!("Failed to finish trip on shutdown: {}", e);
            }
        }
        self.retry_pending_events();
        self.retry_pending_summaries();
        if let Err(e) = self.buffer.flush() {
            warn!("Final flush failed: {}", e);
        }
        info!("Trip controller stopped");
    }

    fn record_event(&mut self, event: UnsafeBehaviourEvent) {
        self.retry_pending_events();
        if let Err(e) = self.storage.append_event(&event) {
            warn!("Failed to persist event {}, keeping for retry: {}", event.id, e);
            self.pending_events.push(event.clone());
        }
        let _ = self.events_tx.send(TripEvent::Behaviour(event));
    }

    fn retry_pending_events(&mut self) {
        if self.pending_events.is_empty() {
            return;
        }
        let storage = &self.storage;
        self.pending_events
            .retain(|event| storage.append_event(event).is_err());
        if !self.pending_events.is_empty() {
            debug!("{} events still pending", self.pending_events.len());
        }
    }

    fn retry_pending_summaries(&mut self) {
        if self.pending_summaries.is_empty() {
            return;
        }
        let storage = &self.storage;
        self.pending_summaries
            .retain(|summary| storage.upsert_summary(summary).is_err());
    }

    async fn persist_summary(&self, summary: &TripSummary) -> Result<(), StorageError> {
        let attempts = self.config.persist_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.storage.upsert_summary(summary) {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    debug!("Summary persist attempt {} failed: {}", attempt, e);
                    let backoff = self.config.retry_backoff_ms * attempt as u64;
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn maybe_checkpoint(&mut self) {
        let every = self.config.checkpoint_every;
        let Some(trip) = self.active.as_mut() else {
            return;
        };
        if every == 0 || trip.since_checkpoint < every {
            return;
        }
        trip.since_checkpoint = 0;
        let snapshot = trip.features.snapshot();
        if let Err(e) = self.storage.upsert_feature_state(&snapshot) {
            warn!("Checkpoint of trip {} failed: {}", snapshot.trip_id, e);
        }
    }
}
