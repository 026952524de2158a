//! Sample Staging Buffer

use crate::{Storage, StorageError};
use ring_buffer::RawSample;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Flush policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Periodic flush interval (ms)
    pub flush_interval_ms: u64,
    /// Pending samples that trigger an early flush
    pub max_buffered: usize,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 5_000,
            max_buffered: 500,
        }
    }
}

/// Collects samples from concurrent producers and hands them to storage
/// in batches.
///
/// `flush` swaps the pending list out under its lock, so a sample is either
/// in the flushed batch or still pending, never both. A failed batch is put
/// back ahead of anything enqueued in the meantime.
pub struct BufferManager {
    storage: Arc<dyn Storage>,
    config: FlushConfig,
    pending: Mutex<Vec<RawSample>>,
    /// Serializes flushes
    flush_lock: Mutex<()>,
    size_reached: Notify,
}

impl BufferManager {
    pub fn new(storage: Arc<dyn Storage>, config: FlushConfig) -> Self {
        info!(
            "Creating buffer manager: interval={}ms, max_buffered={}",
            config.flush_interval_ms, config.max_buffered
        );
        let capacity = config.max_buffered;
        Self {
            storage,
            config,
            pending: Mutex::new(Vec::with_capacity(capacity)),
            flush_lock: Mutex::new(()),
            size_reached: Notify::new(),
        }
    }

    /// Enqueue one sample; never waits on storage
    pub fn add_to_buffer(&self, sample: RawSample) -> Result<(), StorageError> {
        let len = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|e| StorageError::Lock(e.to_string()))?;
            pending.push(sample);
            pending.len()
        };

        metrics::counter!("samples_buffered_total").increment(1);
        metrics::gauge!("buffer_pending_samples").set(len as f64);

        if len >= self.config.max_buffered {
            self.size_reached.notify_one();
        }
        Ok(())
    }

    /// Number of samples waiting for the next flush
    pub fn pending_len(&self) -> Result<usize, StorageError> {
        self.pending
            .lock()
            .map(|p| p.len())
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Drain pending samples into storage; returns the number written
    pub fn flush(&self) -> Result<usize, StorageError> {
        let _flushing = self
            .flush_lock
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let batch = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|e| StorageError::Lock(e.to_string()))?;
            std::mem::take(&mut *pending)
        };
        if batch.is_empty() {
            return Ok(0);
        }

        match self.storage.insert_samples(&batch) {
            Ok(()) => {
                debug!("Flushed {} samples", batch.len());
                metrics::counter!("samples_flushed_total").increment(batch.len() as u64);
                Ok(batch.len())
            }
            Err(e) => {
                warn!("Flush of {} samples failed, requeueing: {}", batch.len(), e);
                metrics::counter!("flush_failures_total").increment(1);

                let mut pending = self
                    .pending
                    .lock()
                    .map_err(|e| StorageError::Lock(e.to_string()))?;
                let newer = std::mem::replace(&mut *pending, batch);
                pending.extend(newer);
                Err(e)
            }
        }
    }

    /// Flush on the configured interval or when the size threshold is hit,
    /// until `shutdown` turns true; then flush once more.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.flush_interval_ms.max(1)));
        info!("Buffer flush loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.size_reached.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.flush() {
                warn!("Periodic flush failed: {}", e);
            }
        }

        match self.flush() {
            Ok(n) => info!("Buffer flush loop stopped ({} samples in final flush)", n),
            Err(e) => match self.pending_len() {
                Ok(n) => warn!("Final flush failed, {} samples still pending: {}", n, e),
                Err(lock) => warn!("Final flush failed: {} ({})", e, lock),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryRepository;
    use behaviour_engine::UnsafeBehaviourEvent;
    use feature_engine::TripFeatureSnapshot;
    use ring_buffer::SensorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Fails every `fail_every`-th sample insert before writing anything
    struct FlakyStorage {
        inner: InMemoryRepository,
        calls: AtomicUsize,
        rows_written: AtomicUsize,
        fail_every: usize,
    }

    impl FlakyStorage {
        fn new(fail_every: usize) -> Self {
            Self {
                inner: InMemoryRepository::new(),
                calls: AtomicUsize::new(0),
                rows_written: AtomicUsize::new(0),
                fail_every,
            }
        }
    }

    impl Storage for FlakyStorage {
        fn insert_samples(&self, samples: &[RawSample]) -> Result<(), StorageError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call % self.fail_every == 0 {
                return Err(StorageError::Backend("injected failure".to_string()));
            }
            self.rows_written.fetch_add(samples.len(), Ordering::SeqCst);
            self.inner.insert_samples(samples)
        }

        fn append_event(&self, event: &UnsafeBehaviourEvent) -> Result<(), StorageError> {
            self.inner.append_event(event)
        }

        fn upsert_summary(&self, summary: &crate::TripSummary) -> Result<(), StorageError> {
            self.inner.upsert_summary(summary)
        }

        fn upsert_feature_state(&self, snapshot: &TripFeatureSnapshot) -> Result<(), StorageError> {
            self.inner.upsert_feature_state(snapshot)
        }

        fn remove_feature_state(&self, trip_id: Uuid) -> Result<(), StorageError> {
            self.inner.remove_feature_state(trip_id)
        }
    }

    fn sample(ts: i64) -> RawSample {
        RawSample::new(SensorKind::Accelerometer, vec![0.0, 0.0, 9.81], ts)
    }

    #[test]
    fn test_flush_drains_buffer() {
        let repo = Arc::new(InMemoryRepository::new());
        let buffer = BufferManager::new(repo.clone(), FlushConfig::default());

        for i in 0..10 {
            buffer.add_to_buffer(sample(i)).unwrap();
        }
        assert_eq!(buffer.pending_len().unwrap(), 10);
        assert_eq!(buffer.flush().unwrap(), 10);
        assert_eq!(buffer.pending_len().unwrap(), 0);
        assert_eq!(repo.sample_count().unwrap(), 10);
        assert_eq!(buffer.flush().unwrap(), 0);
    }

    #[test]
    fn test_failed_flush_requeues_in_order() {
        let storage = Arc::new(FlakyStorage::new(1));
        let buffer = BufferManager::new(storage.clone(), FlushConfig::default());

        buffer.add_to_buffer(sample(1)).unwrap();
        buffer.add_to_buffer(sample(2)).unwrap();
        assert!(buffer.flush().is_err());

        buffer.add_to_buffer(sample(3)).unwrap();
        let pending: Vec<i64> = buffer
            .pending
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.timestamp_ms)
            .collect();
        assert_eq!(pending, vec![1, 2, 3]);
        assert_eq!(storage.rows_written.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_poisoned_buffer_reports_lock_error() {
        let repo = Arc::new(InMemoryRepository::new());
        let buffer = Arc::new(BufferManager::new(repo, FlushConfig::default()));
        buffer.add_to_buffer(sample(1)).unwrap();

        let poisoner = buffer.clone();
        let result = std::thread::spawn(move || {
            let _pending = poisoner.pending.lock().unwrap();
            panic!("producer crashed while holding the buffer");
        })
        .join();
        assert!(result.is_err());

        assert!(matches!(buffer.pending_len(), Err(StorageError::Lock(_))));
        assert!(matches!(buffer.add_to_buffer(sample(2)), Err(StorageError::Lock(_))));
        assert!(matches!(buffer.flush(), Err(StorageError::Lock(_))));
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let storage = Arc::new(FlakyStorage::new(3));
        let buffer = Arc::new(BufferManager::new(
            storage.clone(),
            FlushConfig {
                flush_interval_ms: 1_000,
                max_buffered: 64,
            },
        ));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        buffer.add_to_buffer(sample(p * 1_000 + i)).unwrap();
                    }
                })
            })
            .collect();

        let flusher = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let _ = buffer.flush();
                    std::thread::yield_now();
                }
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        flusher.join().unwrap();

        // Drain whatever is left, riding out injected failures
        for _ in 0..10 {
            if buffer.pending_len().unwrap() == 0 {
                break;
            }
            let _ = buffer.flush();
        }

        assert_eq!(buffer.pending_len().unwrap(), 0);
        assert_eq!(storage.inner.sample_count().unwrap(), 1_000);
        assert_eq!(storage.rows_written.load(Ordering::SeqCst), 1_000);
    }

    #[tokio::test]
    async fn test_run_flushes_on_size_and_shutdown() {
        let repo = Arc::new(InMemoryRepository::new());
        let buffer = Arc::new(BufferManager::new(
            repo.clone(),
            FlushConfig {
                flush_interval_ms: 60_000,
                max_buffered: 5,
            },
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(buffer.clone().run(shutdown_rx));

        for i in 0..5 {
            buffer.add_to_buffer(sample(i)).unwrap();
        }
        for _ in 0..50 {
            if repo.sample_count().unwrap() == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(repo.sample_count().unwrap(), 5);

        buffer.add_to_buffer(sample(99)).unwrap();
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(repo.sample_count().unwrap(), 6);
    }
}
