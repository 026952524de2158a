//! Drive Sense Pipeline
//!
//! Wires the trip controller to its collaborators from an [`AppConfig`] and
//! replays recorded sensor streams through it.

pub mod config;
pub mod replay;

pub use config::{AppConfig, LoggingConfig, MetricsConfig, ModelConfig};
pub use replay::{parse_line, replay, ReplayRecord, ReplayStats};

use anyhow::Context;
use feature_engine::FeatureScaler;
use inference_engine::{ClassificationAdapter, MockModelRunner, ModelRunner, OutputInterpreter};
use std::path::PathBuf;
use std::sync::Arc;
use storage::{BufferManager, InMemoryRepository, Storage};
use tokio::io::BufReader;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn, Level};
use trip_lifecycle::{TripController, TripEvent};

/// Initialize logging to stderr; stdout carries the trip summaries
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level: Level = config
        .level
        .parse()
        .with_context(|| format!("invalid log level '{}'", config.level))?;

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Install the Prometheus exporter when a listen address is configured
pub fn install_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    let Some(addr) = config.listen_addr else {
        debug!("Metrics exporter disabled");
        return Ok(());
    };
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to install metrics exporter on {}", addr))?;
    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

/// Model runner for the configured model, or the mock model
pub fn build_runner(config: &ModelConfig) -> anyhow::Result<Arc<dyn ModelRunner>> {
    match &config.path {
        #[cfg(feature = "onnx")]
        Some(path) => {
            let runner = inference_engine::TractModelRunner::load(path, feature_engine::FEATURE_DIMENSION)?;
            Ok(Arc::new(runner))
        }
        #[cfg(not(feature = "onnx"))]
        Some(path) => anyhow::bail!(
            "model {} configured but this build has no ONNX support",
            path.display()
        ),
        None => {
            info!("No model configured, using the mock model");
            Ok(Arc::new(MockModelRunner::default()))
        }
    }
}

/// Build a controller over `storage` from the configuration
pub fn build_controller(
    config: &AppConfig,
    storage: Arc<dyn Storage>,
    buffer: Arc<BufferManager>,
) -> anyhow::Result<TripController> {
    let scaler = match &config.model.scaler_path {
        Some(path) => FeatureScaler::from_path(path)?,
        None => FeatureScaler::default(),
    };
    let interpreter = OutputInterpreter {
        positive_class: config.model.positive_class,
        threshold: config.model.threshold,
    };
    let classifier =
        ClassificationAdapter::new(build_runner(&config.model)?, scaler).with_interpreter(interpreter);

    let controller = TripController::new(
        config.trip.clone(),
        config.motion.clone(),
        config.behaviour.clone(),
        storage,
        buffer,
        classifier,
    );
    Ok(match config.driver_id {
        Some(driver_id) => controller.with_driver(driver_id),
        None => controller,
    })
}

/// Print each finished trip as one JSON line until the controller stops
async fn print_summaries(mut events: broadcast::Receiver<TripEvent>) {
    loop {
        match events.recv().await {
            Ok(TripEvent::Ended(summary)) => match serde_json::to_string(&summary) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize summary of trip {}: {}", summary.trip_id, e),
            },
            Ok(TripEvent::Behaviour(event)) => debug!(
                "{} (severity {:.2}) in trip {}",
                event.behaviour_type.as_str(),
                event.severity,
                event.trip_id
            ),
            Ok(TripEvent::Started { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Summary printer lagged, {} trip events missed", missed)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Replay `input` (stdin when `None`) through a fresh controller
pub async fn run(config: AppConfig, input: Option<PathBuf>) -> anyhow::Result<ReplayStats> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryRepository::new());
    let buffer = Arc::new(BufferManager::new(storage.clone(), config.flush.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher = tokio::spawn(buffer.clone().run(shutdown_rx));

    let controller = build_controller(&config, storage, buffer)?;
    let (handle, controller_task) = controller.spawn();
    let printer = tokio::spawn(print_summaries(handle.subscribe()));

    let stats = match &input {
        Some(path) => {
            info!("Replaying {}", path.display());
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            replay(BufReader::new(file), &handle).await
        }
        None => {
            info!("Replaying standard input");
            replay(BufReader::new(tokio::io::stdin()), &handle).await
        }
    };

    handle.shutdown().await?;
    drop(handle);
    controller_task.await?;
    printer.await?;
    let _ = shutdown_tx.send(true);
    flusher.await?;

    let stats = stats?;
    info!(
        "Replay finished: {} samples, {} locations, {} commands ({} rejected), {} malformed lines",
        stats.samples, stats.locations, stats.commands, stats.rejected, stats.malformed
    );
    Ok(stats)
}
