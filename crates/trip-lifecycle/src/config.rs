//! Controller Configuration

use serde::{Deserialize, Serialize};

/// Trip controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripConfig {
    /// Start and stop trips from motion transitions
    pub auto_trip_detection: bool,
    /// Routed samples between feature-state checkpoints (0 disables)
    pub checkpoint_every: u64,
    /// Attempts at persisting a summary before it is parked for later
    pub persist_retries: u32,
    /// Base delay between persistence attempts (ms, grows linearly)
    pub retry_backoff_ms: u64,
    /// Command queue depth
    pub channel_capacity: usize,
    /// Trip event broadcast depth
    pub event_channel_capacity: usize,
    /// UTC offset of the time zone the classifier was trained in (seconds)
    pub training_utc_offset_seconds: i32,
}

impl Default for TripConfig {
    fn default() -> Self {
        Self {
            auto_trip_detection: true,
            checkpoint_every: 500,
            persist_retries: 3,
            retry_backoff_ms: 100,
            channel_capacity: 1024,
            event_channel_capacity: 256,
            training_utc_offset_seconds: 3600, // UTC+1
        }
    }
}
