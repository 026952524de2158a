//! Streaming Motion Detector

use crate::classifier::{MotionClassifier, MotionConfig};
use crate::debounce::StateDebouncer;
use crate::{MotionState, MotionStateTransition};
use ring_buffer::{RawSample, RingBuffer, SensorKind};
use tracing::{debug, info};

/// Owns the magnitude window, the classifier and the debouncer.
///
/// Single-writer: callers serialize `observe` (the trip controller actor
/// is the only caller in the pipeline).
pub struct MotionDetector {
    classifier: MotionClassifier,
    debouncer: StateDebouncer,
    window: RingBuffer<f64>,
    hop_size: usize,
    since_last_eval: usize,
    last_raw: Option<MotionState>,
    vehicle_moving: bool,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        let window = RingBuffer::new(config.window_capacity);
        let hop_size = config.hop_size.max(1);
        let debouncer = StateDebouncer::new(config.dwell_ms);
        Self {
            classifier: MotionClassifier::new(config),
            debouncer,
            window,
            hop_size,
            since_last_eval: 0,
            last_raw: None,
            vehicle_moving: false,
        }
    }

    /// Feed one sample; returns a debounced transition into or out of Vehicle.
    ///
    /// Non-accelerometer samples are ignored.
    pub fn observe(&mut self, sample: &RawSample) -> Option<MotionStateTransition> {
        if sample.kind != SensorKind::Accelerometer || !sample.is_finite() {
            return None;
        }

        self.window.push(sample.magnitude());
        self.since_last_eval += 1;

        if !self.window.is_full() || self.since_last_eval < self.hop_size {
            return None;
        }
        self.since_last_eval = 0;

        let analysis = self.classifier.analyze(&self.window.to_vec());
        let raw = analysis.state;
        if self.last_raw != Some(raw) {
            debug!(
                "Raw motion classification: {} (variance {:.3}, dominant {:.2} Hz, entropy {:.3})",
                raw, analysis.variance, analysis.dominant_hz, analysis.entropy
            );
            self.last_raw = Some(raw);
        }

        let transition = self.debouncer.feed(raw, sample.timestamp_ms)?;
        self.apply(&transition);

        if transition.involves_vehicle() {
            info!(
                "Motion state {} -> {} at {}",
                transition.from, transition.to, transition.timestamp_ms
            );
            Some(transition)
        } else {
            debug!("Motion state {} -> {}", transition.from, transition.to);
            None
        }
    }

    fn apply(&mut self, transition: &MotionStateTransition) {
        // Any committed exit from Vehicle clears the flag, including to Unknown
        if transition.from == MotionState::Vehicle {
            self.vehicle_moving = false;
        }
        if transition.to == MotionState::Vehicle {
            self.vehicle_moving = true;
        }
    }

    /// Committed motion state
    pub fn current_state(&self) -> MotionState {
        self.debouncer.current()
    }

    pub fn is_vehicle_moving(&self) -> bool {
        self.vehicle_moving
    }
}
