//! NDJSON Replay
//!
//! One record per line, tagged by `type`:
//!
//! ```text
//! {"type":"sample","kind":"accelerometer","values":[0.1,0.2,9.8],"timestamp_ms":1000}
//! {"type":"location","latitude":52.52,"longitude":13.40,"timestamp_ms":1000}
//! {"type":"start","timestamp_ms":1000}
//! {"type":"stop","timestamp_ms":9000}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use ring_buffer::{LocationSample, RawSample, SensorKind};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};
use trip_lifecycle::{ControllerError, TripControllerHandle};
use uuid::Uuid;

/// One replayed input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayRecord {
    Sample {
        kind: SensorKind,
        values: Vec<f64>,
        timestamp_ms: i64,
        #[serde(default)]
        accuracy: i32,
    },
    Location {
        latitude: f64,
        longitude: f64,
        timestamp_ms: i64,
    },
    Start {
        timestamp_ms: i64,
        #[serde(default)]
        driver_id: Option<Uuid>,
    },
    Stop {
        timestamp_ms: i64,
    },
}

/// Counters for one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub samples: u64,
    pub locations: u64,
    pub commands: u64,
    pub rejected: u64,
    pub malformed: u64,
}

/// Parse one line; `None` for blank lines and comments
pub fn parse_line(line: &str) -> Result<Option<ReplayRecord>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Drive the controller with every record of `reader`.
///
/// Malformed lines and rejected start/stop commands are logged and counted;
/// only a closed controller ends the replay early.
pub async fn replay<R>(reader: R, handle: &TripControllerHandle) -> anyhow::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let record = match parse_line(&line) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping malformed line {}: {}", line_no, e);
                stats.malformed += 1;
                continue;
            }
        };

        match record {
            ReplayRecord::Sample {
                kind,
                values,
                timestamp_ms,
                accuracy,
            } => {
                let sample = RawSample::new(kind, values, timestamp_ms).with_accuracy(accuracy);
                handle.submit_sample(sample).await?;
                stats.samples += 1;
            }
            ReplayRecord::Location {
                latitude,
                longitude,
                timestamp_ms,
            } => {
                handle
                    .submit_location(LocationSample::new(latitude, longitude, timestamp_ms))
                    .await?;
                stats.locations += 1;
            }
            ReplayRecord::Start {
                timestamp_ms,
                driver_id,
            } => {
                stats.commands += 1;
                match handle.start_trip(timestamp_ms, driver_id).await {
                    Ok(trip_id) => debug!("Line {}: started trip {}", line_no, trip_id),
                    Err(e @ ControllerError::TripAlreadyActive(_)) => {
                        warn!("Line {}: {}", line_no, e);
                        stats.rejected += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            ReplayRecord::Stop { timestamp_ms } => {
                stats.commands += 1;
                match handle.stop_trip(timestamp_ms).await {
                    Ok(summary) => debug!("Line {}: stopped trip {}", line_no, summary.trip_id),
                    Err(e @ ControllerError::NoActiveTrip) => {
                        warn!("Line {}: {}", line_no, e);
                        stats.rejected += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records() {
        let sample = parse_line(
            r#"{"type":"sample","kind":"speed","values":[12.5],"timestamp_ms":5}"#,
        )
        .unwrap();
        assert_eq!(
            sample,
            Some(ReplayRecord::Sample {
                kind: SensorKind::Speed,
                values: vec![12.5],
                timestamp_ms: 5,
                accuracy: 0,
            })
        );

        let stop = parse_line(r#"{"type":"stop","timestamp_ms":9000}"#).unwrap();
        assert_eq!(stop, Some(ReplayRecord::Stop { timestamp_ms: 9000 }));
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# recorded on the A9").unwrap(), None);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(parse_line(r#"{"type":"teleport","timestamp_ms":1}"#).is_err());
        assert!(parse_line("not json").is_err());
    }
}
