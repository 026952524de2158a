//! Trip Lifecycle Controller
//!
//! Turns debounced vehicle entry/exit into trips. All state transitions go
//! through one actor task, so two trips can never be open at once and a
//! stop request is never lost.

mod actor;
mod config;
mod controller;

pub use actor::{ControllerStatus, TripControllerHandle};
pub use config::TripConfig;
pub use controller::TripController;

use behaviour_engine::UnsafeBehaviourEvent;
use serde::{Deserialize, Serialize};
use storage::{StorageError, TripSummary};
use thiserror::Error;
use uuid::Uuid;

/// Controller errors
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Trip {0} is already active")]
    TripAlreadyActive(Uuid),
    #[error("No active trip")]
    NoActiveTrip,
    #[error("Controller queue is full")]
    QueueFull,
    #[error("Controller has shut down")]
    Closed,
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Lifecycle notifications for observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TripEvent {
    Started { trip_id: Uuid, timestamp_ms: i64 },
    Behaviour(UnsafeBehaviourEvent),
    Ended(TripSummary),
}
