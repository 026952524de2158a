//! Window Classification Heuristics

use crate::MotionState;
use feature_engine::{FftAnalyzer, Spectrum, WindowStatistics};
use serde::{Deserialize, Serialize};

/// Motion classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Magnitude window length (samples)
    pub window_capacity: usize,
    /// Accelerometer sampling rate (Hz)
    pub sample_rate_hz: f64,
    /// New samples between two classifications of a full window
    pub hop_size: usize,
    /// Minimum time a raw state must persist before it is committed (ms)
    pub dwell_ms: i64,
    /// Stationary: variance and spectral energy both below these
    pub stationary_max_variance: f64,
    pub stationary_max_energy: f64,
    /// Step cadence band covering walking and running (Hz)
    pub gait_band_hz: (f64, f64),
    pub walking_band_hz: (f64, f64),
    pub running_band_hz: (f64, f64),
    /// Share of spectral energy that must fall in the gait band
    pub gait_min_ratio: f64,
    pub walking_min_variance: f64,
    /// Variance above which gait is treated as running regardless of cadence
    pub running_min_variance: f64,
    /// Vehicle: smooth ride on top of a gravity baseline
    pub vehicle_max_variance: f64,
    pub vehicle_min_baseline: f64,
    /// Engine and road vibration band (Hz)
    pub engine_band_hz: (f64, f64),
    /// Low-frequency body sway band (Hz)
    pub sway_band_hz: (f64, f64),
    /// Share of energy that must fall in the engine or sway band
    pub vehicle_min_band_ratio: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            window_capacity: 128,
            sample_rate_hz: 50.0,
            hop_size: 32,
            dwell_ms: 2_000,
            stationary_max_variance: 0.02,
            stationary_max_energy: 1.0,
            gait_band_hz: (0.8, 4.5),
            walking_band_hz: (0.8, 2.5),
            running_band_hz: (2.5, 4.5),
            gait_min_ratio: 0.5,
            walking_min_variance: 0.5,
            running_min_variance: 8.0,
            vehicle_max_variance: 1.5,
            vehicle_min_baseline: 7.0,
            engine_band_hz: (6.0, 25.0),
            sway_band_hz: (0.05, 0.8),
            vehicle_min_band_ratio: 0.5,
        }
    }
}

/// Result of classifying one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAnalysis {
    pub state: MotionState,
    pub variance: f64,
    pub dominant_hz: f64,
    /// Normalised spectral entropy in [0, 1]
    pub entropy: f64,
}

/// Stateless (apart from FFT plans) window classifier
pub struct MotionClassifier {
    config: MotionConfig,
    fft: FftAnalyzer,
}

impl MotionClassifier {
    pub fn new(config: MotionConfig) -> Self {
        let fft = FftAnalyzer::new(config.sample_rate_hz);
        Self { config, fft }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Classify one window of accelerometer magnitudes (m/s^2)
    pub fn classify(&mut self, window: &[f64]) -> MotionState {
        self.analyze(window).state
    }

    /// Classify and report the spectral descriptors used
    pub fn analyze(&mut self, window: &[f64]) -> WindowAnalysis {
        if window.len() < 2 {
            return WindowAnalysis {
                state: MotionState::Unknown,
                variance: 0.0,
                dominant_hz: 0.0,
                entropy: 0.0,
            };
        }

        let stats = WindowStatistics::compute(window);
        let spectrum = self.fft.analyze(window);
        WindowAnalysis {
            state: self.decide(&stats, &spectrum),
            variance: stats.variance,
            dominant_hz: spectrum.dominant_frequency(),
            entropy: spectrum.entropy(),
        }
    }

    /// Heuristics in order: stationary, gait, vehicle
    fn decide(&self, stats: &WindowStatistics, spectrum: &Spectrum) -> MotionState {
        let cfg = &self.config;

        if stats.variance < cfg.stationary_max_variance
            && spectrum.total_power() < cfg.stationary_max_energy
        {
            return MotionState::Stationary;
        }

        if let Some(gait) = self.classify_gait(stats, spectrum) {
            return gait;
        }

        let (engine_lo, engine_hi) = cfg.engine_band_hz;
        let (sway_lo, sway_hi) = cfg.sway_band_hz;
        let vehicle_ratio =
            spectrum.band_ratio(engine_lo, engine_hi) + spectrum.band_ratio(sway_lo, sway_hi);

        if stats.variance < cfg.vehicle_max_variance
            && stats.mean >= cfg.vehicle_min_baseline
            && vehicle_ratio >= cfg.vehicle_min_band_ratio
        {
            return MotionState::Vehicle;
        }

        MotionState::Unknown
    }

    fn classify_gait(&self, stats: &WindowStatistics, spectrum: &Spectrum) -> Option<MotionState> {
        let cfg = &self.config;
        let (gait_lo, gait_hi) = cfg.gait_band_hz;

        if stats.variance < cfg.walking_min_variance
            || spectrum.band_ratio(gait_lo, gait_hi) < cfg.gait_min_ratio
        {
            return None;
        }

        let cadence = spectrum.dominant_frequency();
        let (run_lo, run_hi) = cfg.running_band_hz;
        let (walk_lo, walk_hi) = cfg.walking_band_hz;
        if (cadence >= run_lo && cadence < run_hi) || stats.variance >= cfg.running_min_variance {
            Some(MotionState::Running)
        } else if cadence >= walk_lo && cadence < walk_hi {
            Some(MotionState::Walking)
        } else {
            None
        }
    }
}
