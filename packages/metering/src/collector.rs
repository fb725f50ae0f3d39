// ABOUTME: In-process transaction batcher
// ABOUTME: Flushes on a timer, on a full buffer, and once more on shutdown

use crate::types::Transaction;
use async_trait::async_trait;
use octroi_storage::StorageError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::error;

/// Flush deadline for a single batch write. Uses a fresh timeout rather
/// than any request context so the final flush still runs during shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Persistence target for flushed batches, implemented by the meter store
/// and by in-memory fakes in tests.
#[async_trait]
pub trait BatchInsert: Send + Sync {
    async fn batch_insert(&self, txns: Vec<Transaction>) -> Result<(), StorageError>;
}

struct Inner {
    store: Arc<dyn BatchInsert>,
    buffer: Mutex<Vec<Transaction>>,
    batch_size: usize,
    flush_interval: Duration,
    flush_signal: Notify,
    shutdown: Notify,
}

impl Inner {
    /// Swap the buffer under the lock, write the detached batch outside it.
    /// A failed write is logged and the batch is dropped: the buffer has
    /// already moved on, and retrying would double-count.
    async fn flush(&self) {
        let batch = {
            let mut buffer = self.buffer.lock().expect("collector mutex poisoned");
            if buffer.is_empty() {
                return;
            }
            std::mem::replace(&mut *buffer, Vec::with_capacity(self.batch_size))
        };

        let count = batch.len();
        match tokio::time::timeout(FLUSH_TIMEOUT, self.store.batch_insert(batch)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(count, error = %err, "failed to flush metering transactions");
            }
            Err(_) => {
                error!(count, "metering flush timed out");
            }
        }
    }
}

/// Buffers transactions in memory and flushes them to the store in batches.
/// Safe for concurrent use; `record` never blocks on the database.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<Inner>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Collector {
    pub fn new(store: Arc<dyn BatchInsert>, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                buffer: Mutex::new(Vec::with_capacity(batch_size)),
                batch_size,
                flush_interval,
                flush_signal: Notify::new(),
                shutdown: Notify::new(),
            }),
            worker: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the background flush loop. Call once at boot.
    pub fn start(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the loop
            // waits a full interval before its first timed flush.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => inner.flush().await,
                    _ = inner.flush_signal.notified() => inner.flush().await,
                    _ = inner.shutdown.notified() => {
                        inner.flush().await;
                        return;
                    }
                }
            }
        });
        *self.worker.lock().expect("collector mutex poisoned") = Some(handle);
    }

    /// Append a transaction to the buffer. When the buffer reaches the
    /// batch size the background worker is woken for an immediate flush.
    pub fn record(&self, tx: Transaction) {
        let should_flush = {
            let mut buffer = self.inner.buffer.lock().expect("collector mutex poisoned");
            buffer.push(tx);
            buffer.len() >= self.inner.batch_size
        };
        if should_flush {
            self.inner.flush_signal.notify_one();
        }
    }

    /// Signal the worker to exit and wait for its final flush.
    pub async fn stop(&self) {
        let handle = self.worker.lock().expect("collector mutex poisoned").take();
        match handle {
            Some(handle) => {
                self.inner.shutdown.notify_one();
                let _ = handle.await;
            }
            // Never started: drain whatever was recorded directly.
            None => self.inner.flush().await,
        }
    }
}
