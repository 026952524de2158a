//! Threshold Rules

use crate::gate::EventGate;
use crate::{severity, BehaviourType, UnsafeBehaviourEvent};
use ring_buffer::{RawSample, RingBuffer, SensorKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

/// Gravity removed from raw accelerometer magnitude (m/s^2)
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Rule engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviourConfig {
    /// Harsh acceleration threshold (m/s^2, signed RMS)
    pub acceleration_threshold: f64,
    /// Harsh braking threshold (m/s^2, negative)
    pub braking_threshold: f64,
    /// Swerving threshold (rad/s, RMS of rotation magnitude)
    pub swerve_threshold: f64,
    /// Speed limit (m/s)
    pub speed_limit: f64,
    pub max_acceleration_excess: f64,
    pub max_braking_excess: f64,
    pub max_swerve_excess: f64,
    pub max_speed_excess: f64,
    /// Samples per signal window
    pub window_capacity: usize,
    /// Samples required before a window is evaluated
    pub min_window_samples: usize,
    pub acceleration_cooldown_ms: i64,
    pub braking_cooldown_ms: i64,
    pub swerve_cooldown_ms: i64,
    pub speeding_cooldown_ms: i64,
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            acceleration_threshold: 3.5,
            braking_threshold: -3.5,
            swerve_threshold: 0.1,
            speed_limit: 16.67, // 60 km/h
            max_acceleration_excess: 5.5,
            max_braking_excess: 5.5,
            max_swerve_excess: 0.5,
            max_speed_excess: 2.778,
            window_capacity: 100,
            min_window_samples: 5,
            acceleration_cooldown_ms: 1_500,
            braking_cooldown_ms: 1_500,
            swerve_cooldown_ms: 2_000,
            speeding_cooldown_ms: 10_000,
        }
    }
}

impl BehaviourConfig {
    fn cooldowns(&self) -> HashMap<BehaviourType, i64> {
        HashMap::from([
            (BehaviourType::HarshAcceleration, self.acceleration_cooldown_ms),
            (BehaviourType::HarshBraking, self.braking_cooldown_ms),
            (BehaviourType::Swerving, self.swerve_cooldown_ms),
            (BehaviourType::Speeding, self.speeding_cooldown_ms),
        ])
    }
}

/// Signal a sample feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Acceleration,
    Rotation,
    Speed,
}

/// Per-sensor windows plus firing gate.
///
/// Every sensor kind keeps its own window; kinds are never averaged
/// together. When two kinds measure the same signal, only the preferred
/// one is evaluated once it has been seen: linear acceleration over raw
/// accelerometer, gyroscope over rotation vector.
pub struct BehaviourEngine {
    config: BehaviourConfig,
    windows: BTreeMap<SensorKind, RingBuffer<f64>>,
    gate: EventGate,
}

impl BehaviourEngine {
    pub fn new(config: BehaviourConfig) -> Self {
        let gate = EventGate::new(config.cooldowns());
        Self {
            config,
            windows: BTreeMap::new(),
            gate,
        }
    }

    pub fn config(&self) -> &BehaviourConfig {
        &self.config
    }

    /// Clear windows and firing history (trip boundaries)
    pub fn reset(&mut self) {
        self.windows.clear();
        self.gate.clear();
    }

    /// Append the sample to its kind's window and evaluate that window.
    ///
    /// Samples that are not attached to a trip are ignored.
    pub fn analyze(&mut self, sample: &RawSample) -> Option<UnsafeBehaviourEvent> {
        let trip_id = sample.trip_id?;
        let (signal, value) = Self::extract(sample)?;

        let capacity = self.config.window_capacity;
        let window = self
            .windows
            .entry(sample.kind)
            .or_insert_with(|| RingBuffer::new(capacity));
        window.push(value);
        if window.len() < self.config.min_window_samples.max(1) {
            return None;
        }
        if !self.is_preferred(signal, sample.kind) {
            return None;
        }

        let (behaviour, sev) = match signal {
            Signal::Acceleration => self.evaluate_acceleration(sample.kind, sample.timestamp_ms)?,
            Signal::Rotation => self.evaluate_rotation(sample.kind, sample.timestamp_ms)?,
            Signal::Speed => self.evaluate_speed(sample.kind, sample.timestamp_ms)?,
        };

        let event = UnsafeBehaviourEvent {
            id: Uuid::new_v4(),
            trip_id,
            behaviour_type: behaviour,
            severity: sev,
            timestamp_ms: sample.timestamp_ms,
            location_id: sample.location_id,
        };
        info!(
            "{} detected on trip {} from {} (severity {:.3})",
            behaviour,
            trip_id,
            sample.kind.as_str(),
            event.severity
        );
        metrics::counter!("behaviour_events_total", "type" => behaviour.as_str()).increment(1);
        Some(event)
    }

    /// Whether `kind` is the source evaluated for `signal`
    fn is_preferred(&self, signal: Signal, kind: SensorKind) -> bool {
        let preferred = match signal {
            Signal::Acceleration => SensorKind::LinearAcceleration,
            Signal::Rotation => SensorKind::Gyroscope,
            Signal::Speed => return true,
        };
        kind == preferred || !self.windows.contains_key(&preferred)
    }

    /// Map a sample onto the scalar its window tracks
    fn extract(sample: &RawSample) -> Option<(Signal, f64)> {
        if !sample.is_finite() {
            debug!("Dropping non-finite {} sample", sample.kind.as_str());
            return None;
        }
        match sample.kind {
            // Gravity is removed from the raw magnitude
            SensorKind::Accelerometer => {
                Some((Signal::Acceleration, sample.magnitude() - STANDARD_GRAVITY))
            }
            // Longitudinal axis decides the sign
            SensorKind::LinearAcceleration => {
                let magnitude = sample.magnitude();
                let signed = if sample.axis(1).unwrap_or(0.0) < 0.0 {
                    -magnitude
                } else {
                    magnitude
                };
                Some((Signal::Acceleration, signed))
            }
            SensorKind::RotationVector | SensorKind::Gyroscope => {
                Some((Signal::Rotation, sample.magnitude()))
            }
            SensorKind::Speed => sample.axis(0).map(|speed| (Signal::Speed, speed)),
            SensorKind::Magnetometer | SensorKind::Gravity => None,
        }
    }

    /// RMS carrying the sign of the window mean
    fn signed_rms(window: &RingBuffer<f64>) -> f64 {
        let rms = window.rms();
        if window.mean() < 0.0 {
            -rms
        } else {
            rms
        }
    }

    fn evaluate_acceleration(&mut self, kind: SensorKind, timestamp_ms: i64) -> Option<(BehaviourType, f64)> {
        let value = Self::signed_rms(self.windows.get(&kind)?);
        let cfg = &self.config;

        let accelerating = value > cfg.acceleration_threshold;
        let braking = value < cfg.braking_threshold;

        let fire_accel = self
            .gate
            .evaluate(BehaviourType::HarshAcceleration, accelerating, timestamp_ms);
        let fire_brake = self
            .gate
            .evaluate(BehaviourType::HarshBraking, braking, timestamp_ms);

        if fire_accel {
            Some((
                BehaviourType::HarshAcceleration,
                severity(value, cfg.acceleration_threshold, cfg.max_acceleration_excess),
            ))
        } else if fire_brake {
            Some((
                BehaviourType::HarshBraking,
                severity(value.abs(), cfg.braking_threshold.abs(), cfg.max_braking_excess),
            ))
        } else {
            None
        }
    }

    fn evaluate_rotation(&mut self, kind: SensorKind, timestamp_ms: i64) -> Option<(BehaviourType, f64)> {
        let rms = self.windows.get(&kind)?.rms();
        let cfg = &self.config;
        let swerving = rms > cfg.swerve_threshold;
        self.gate
            .evaluate(BehaviourType::Swerving, swerving, timestamp_ms)
            .then(|| {
                (
                    BehaviourType::Swerving,
                    severity(rms, cfg.swerve_threshold, cfg.max_swerve_excess),
                )
            })
    }

    fn evaluate_speed(&mut self, kind: SensorKind, timestamp_ms: i64) -> Option<(BehaviourType, f64)> {
        let mean = self.windows.get(&kind)?.mean();
        let cfg = &self.config;
        let speeding = mean > cfg.speed_limit;
        self.gate
            .evaluate(BehaviourType::Speeding, speeding, timestamp_ms)
            .then(|| {
                (
                    BehaviourType::Speeding,
                    severity(mean, cfg.speed_limit, cfg.max_speed_excess),
                )
            })
    }
}

impl Default for BehaviourEngine {
    fn default() -> Self {
        Self::new(BehaviourConfig::default())
    }
}
