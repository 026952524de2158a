//! Controller Task and Handle

use crate::{ControllerError, TripController, TripEvent};
use motion_detector::MotionState;
use ring_buffer::{LocationSample, RawSample};
use serde::Serialize;
use storage::TripSummary;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

enum Command {
    Sample(RawSample),
    Location(LocationSample),
    StartTrip {
        timestamp_ms: i64,
        driver_id: Option<Uuid>,
        reply: oneshot::Sender<Result<Uuid, ControllerError>>,
    },
    StopTrip {
        timestamp_ms: i64,
        reply: oneshot::Sender<Result<TripSummary, ControllerError>>,
    },
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub active_trip: Option<Uuid>,
    pub motion_state: MotionState,
    pub vehicle_moving: bool,
    pub pending_events: usize,
    pub pending_summaries: usize,
}

/// Cloneable handle to a running controller.
///
/// Commands are processed strictly in submission order, so a `status`
/// reply reflects every sample submitted before it.
#[derive(Clone)]
pub struct TripControllerHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<TripEvent>,
}

impl TripController {
    /// Move the controller onto its own task
    pub fn spawn(self) -> (TripControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config().channel_capacity.max(1));
        let handle = TripControllerHandle {
            tx,
            events: self.events_tx.clone(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("Trip controller started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Sample(sample) => self.handle_sample(sample).await,
                Command::Location(location) => self.handle_location(location),
                Command::StartTrip {
                    timestamp_ms,
                    driver_id,
                    reply,
                } => {
                    let _ = reply.send(self.start_trip(timestamp_ms, driver_id));
                }
                Command::StopTrip { timestamp_ms, reply } => {
                    let _ = reply.send(self.finish_trip(timestamp_ms).await);
                }
                Command::Status { reply } => {
                    let _ = reply.send(ControllerStatus {
                        active_trip: self.active_trip(),
                        motion_state: self.motion_state(),
                        vehicle_moving: self.is_vehicle_moving(),
                        pending_events: self.pending_events(),
                        pending_summaries: self.pending_summaries(),
                    });
                }
                Command::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    return;
                }
            }
        }

        debug!("All controller handles dropped");
        self.shutdown().await;
    }
}

impl TripControllerHandle {
    /// Submit a sample, waiting for queue space
    pub async fn submit_sample(&self, sample: RawSample) -> Result<(), ControllerError> {
        self.send(Command::Sample(sample)).await
    }

    /// Submit a sample without waiting; fails when the queue is full
    pub fn try_submit_sample(&self, sample: RawSample) -> Result<(), ControllerError> {
        self.tx.try_send(Command::Sample(sample)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                metrics::counter!("samples_rejected_total").increment(1);
                ControllerError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => ControllerError::Closed,
        })
    }

    pub async fn submit_location(&self, location: LocationSample) -> Result<(), ControllerError> {
        self.send(Command::Location(location)).await
    }

    /// Open a trip manually
    pub async fn start_trip(
        &self,
        timestamp_ms: i64,
        driver_id: Option<Uuid>,
    ) -> Result<Uuid, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartTrip {
            timestamp_ms,
            driver_id,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ControllerError::Closed)?
    }

    /// Close the open trip; resolves after its summary is persisted
    pub async fn stop_trip(&self, timestamp_ms: i64) -> Result<TripSummary, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StopTrip { timestamp_ms, reply }).await?;
        rx.await.map_err(|_| ControllerError::Closed)?
    }

    pub async fn status(&self) -> Result<ControllerStatus, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    /// Trip lifecycle notifications from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TripEvent> {
        self.events.subscribe()
    }

    /// Finish any open trip, flush, and stop the controller task
    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| ControllerError::Closed)
    }

    async fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.tx.send(command).await.map_err(|_| ControllerError::Closed)
    }
}
