//! Application Configuration
//!
//! Every section is optional; missing keys keep their defaults.
//! Environment overrides use the `DRIVE_SENSE` prefix with `__` between
//! levels, e.g. `DRIVE_SENSE__BEHAVIOUR__SPEED_LIMIT=22.2`.

use behaviour_engine::BehaviourConfig;
use motion_detector::MotionConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use storage::FlushConfig;
use trip_lifecycle::TripConfig;
use uuid::Uuid;

pub const ENV_PREFIX: &str = "DRIVE_SENSE";

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// One JSON object per line instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Exporter is installed only when set
    pub listen_addr: Option<SocketAddr>,
}

/// Classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX model; the built-in mock model is used when unset
    pub path: Option<PathBuf>,
    /// Min-max ranges `{feature_names, data_min, data_max}`
    pub scaler_path: Option<PathBuf>,
    pub positive_class: usize,
    pub threshold: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            scaler_path: None,
            positive_class: 1,
            threshold: 0.5,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub model: ModelConfig,
    pub motion: MotionConfig,
    pub behaviour: BehaviourConfig,
    pub flush: FlushConfig,
    pub trip: TripConfig,
    /// Driver attached to automatically started trips
    pub driver_id: Option<Uuid>,
}

impl AppConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_sources() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.metrics.listen_addr.is_none());
        assert_eq!(config.motion.window_capacity, 128);
        assert_eq!(config.behaviour.speed_limit, 16.67);
        assert_eq!(config.flush.max_buffered, 500);
        assert!(config.trip.auto_trip_detection);
        assert_eq!(config.trip.training_utc_offset_seconds, 3600);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("drive-sense-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("drive-sense.toml");
        std::fs::write(
            &path,
            r#"
[logging]
json = true

[behaviour]
speed_limit = 22.2

[trip]
auto_trip_detection = false

[metrics]
listen_addr = "127.0.0.1:9100"
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.behaviour.speed_limit, 22.2);
        assert_eq!(config.behaviour.braking_threshold, -3.5);
        assert!(!config.trip.auto_trip_detection);
        assert_eq!(config.trip.persist_retries, 3);
        assert_eq!(
            config.metrics.listen_addr,
            Some("127.0.0.1:9100".parse().unwrap())
        );

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("missing-{}.toml", Uuid::new_v4()));
        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
