//! FFT-based Frequency Analysis

use rustfft::{num_complex::Complex, FftPlanner};

/// One-sided power spectrum of a real signal
#[derive(Debug, Clone, Default)]
pub struct Spectrum {
    /// Power per bin (magnitude squared, normalized by window length)
    pub power: Vec<f64>,
    /// Width of one bin (Hz)
    pub resolution_hz: f64,
}

impl Spectrum {
    /// Total spectral power
    pub fn total_power(&self) -> f64 {
        self.power.iter().sum()
    }

    /// Power in `[low_hz, high_hz)`
    pub fn band_power(&self, low_hz: f64, high_hz: f64) -> f64 {
        self.power
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let freq = *i as f64 * self.resolution_hz;
                freq >= low_hz && freq < high_hz
            })
            .map(|(_, p)| p)
            .sum()
    }

    /// Share of total power in `[low_hz, high_hz)`; zero for a silent signal
    pub fn band_ratio(&self, low_hz: f64, high_hz: f64) -> f64 {
        let total = self.total_power();
        if total <= f64::EPSILON {
            return 0.0;
        }
        self.band_power(low_hz, high_hz) / total
    }

    /// Frequency of the strongest bin
    pub fn dominant_frequency(&self) -> f64 {
        let mut max_power = 0.0;
        let mut dominant_idx = 0;
        for (i, &power) in self.power.iter().enumerate() {
            if power > max_power {
                max_power = power;
                dominant_idx = i;
            }
        }
        dominant_idx as f64 * self.resolution_hz
    }

    /// Shannon entropy of the normalized spectrum, scaled to [0, 1]
    pub fn entropy(&self) -> f64 {
        let total = self.total_power();
        if total <= f64::EPSILON || self.power.len() < 2 {
            return 0.0;
        }
        let raw: f64 = self
            .power
            .iter()
            .map(|p| p / total)
            .filter(|p| *p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        raw / (self.power.len() as f64).ln()
    }
}

/// FFT Analyzer for frequency domain features
pub struct FftAnalyzer {
    /// FFT planner for efficient computation
    planner: FftPlanner<f64>,
    /// Sampling frequency (Hz)
    sample_rate: f64,
}

impl FftAnalyzer {
    /// Create a new FFT analyzer
    pub fn new(sample_rate: f64) -> Self {
        Self {
            planner: FftPlanner::new(),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Apply Hamming window to reduce spectral leakage
    fn apply_hamming_window(signal: &mut [f64]) {
        let n = signal.len();
        if n < 2 {
            return;
        }
        for (i, value) in signal.iter_mut().enumerate() {
            let window =
                0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos();
            *value *= window;
        }
    }

    /// Compute the one-sided power spectrum of a signal.
    ///
    /// The mean is removed first so a constant offset (gravity) does not
    /// dominate the DC bin.
    pub fn analyze(&mut self, signal: &[f64]) -> Spectrum {
        if signal.is_empty() {
            return Spectrum::default();
        }

        let n = signal.len();
        let mean = signal.iter().sum::<f64>() / n as f64;

        let mut windowed: Vec<f64> = signal.iter().map(|v| v - mean).collect();
        Self::apply_hamming_window(&mut windowed);

        let mut buffer: Vec<Complex<f64>> = windowed
            .iter()
            .map(|&v| Complex::new(v, 0.0))
            .collect();

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        // Only positive frequencies
        let power = buffer
            .iter()
            .take(n / 2)
            .map(|c| c.norm_sqr() / n as f64)
            .collect();

        Spectrum {
            power,
            resolution_hz: self.sample_rate / n as f64,
        }
    }
}
