//! Window Statistics
//!
//! Batch statistics over a full sliding window. Used by the motion
//! classifier, where the window is small and a two-pass computation is fine.

/// Summary statistics of one window of values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStatistics {
    pub len: usize,
    pub mean: f64,
    /// Population variance
    pub variance: f64,
}

impl WindowStatistics {
    /// Compute statistics from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            len: values.len(),
            mean,
            variance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_computation() {
        let stats = WindowStatistics::compute(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((stats.mean - 3.0).abs() < 0.001);
        assert_eq!(stats.len, 5);
    }

    #[test]
    fn test_population_variance() {
        let stats = WindowStatistics::compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((stats.variance - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_window_has_zero_variance() {
        let stats = WindowStatistics::compute(&[9.81; 16]);
        assert!((stats.mean - 9.81).abs() < 1e-12);
        assert_eq!(stats.variance, 0.0);
    }

    #[test]
    fn test_empty_window() {
        let stats = WindowStatistics::compute(&[]);
        assert_eq!(stats, WindowStatistics::default());
    }
}
