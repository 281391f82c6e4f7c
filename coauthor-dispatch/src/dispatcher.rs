//! Bounded queue, worker pool, and bounded retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coauthor_collab::{DocOpEvent, EnqueueError, OpEventSink};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::sink::EventSink;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Local queue capacity
    pub queue_size: usize,
    /// Number of worker tasks
    pub workers: usize,
    /// Maximum concurrent publish attempts across all workers
    pub max_in_flight: usize,
    /// Retry attempts per event, in `0..=max_retry`
    pub max_retry: u32,
    /// First backoff; doubles per attempt
    pub base_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_size: 10_000,
            workers: 4,
            max_in_flight: 64,
            max_retry: 5,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Asynchronous event dispatcher.
///
/// `enqueue` blocks until queue space is available or the caller's deadline
/// elapses. Workers drain the queue and publish each event through the
/// sink with exponential backoff; an event that exhausts its retries is
/// logged and dropped. Dropping or shutting down the dispatcher closes the
/// queue, and workers drain the remaining events before exiting.
pub struct EventDispatcher {
    tx: Option<mpsc::Sender<DocOpEvent>>,
    workers: Vec<JoinHandle<()>>,
}

impl EventDispatcher {
    /// Start a dispatcher publishing through `sink`.
    pub fn start(sink: Arc<dyn EventSink>, config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let publish_gate = Arc::new(Semaphore::new(config.max_in_flight.max(1)));

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let rx = Arc::clone(&rx);
            let sink = Arc::clone(&sink);
            let gate = Arc::clone(&publish_gate);
            let config = config.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    // hold the receiver lock only for the dequeue itself
                    let event = { rx.lock().await.recv().await };
                    match event {
                        Some(event) => {
                            send_with_retry(worker_id, &*sink, &gate, &config, event).await
                        }
                        None => break,
                    }
                }
                debug!(worker_id, "dispatch worker drained and stopped");
            }));
        }

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Close the queue and wait for the workers to drain it.
    pub async fn shutdown(mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl OpEventSink for EventDispatcher {
    async fn enqueue(&self, event: DocOpEvent, deadline: Duration) -> Result<(), EnqueueError> {
        let tx = self.tx.as_ref().ok_or(EnqueueError::Closed)?;
        tx.send_timeout(event, deadline)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => EnqueueError::Cancelled,
                SendTimeoutError::Closed(_) => EnqueueError::Closed,
            })
    }
}

async fn send_with_retry(
    worker_id: usize,
    sink: &dyn EventSink,
    gate: &Semaphore,
    config: &DispatcherConfig,
    event: DocOpEvent,
) {
    for attempt in 0..=config.max_retry {
        let outcome = {
            // workers may wait for a publish slot indefinitely; only the
            // submit path carries a deadline
            let _permit = gate.acquire().await.ok();
            sink.publish(&event).await
        };

        match outcome {
            Ok(()) => return,
            Err(err) if attempt == config.max_retry => {
                error!(
                    doc_id = %event.doc_id,
                    operation_id = %event.operation_id,
                    revision = event.revision,
                    worker_id,
                    error = %err,
                    "event publish failed, dropping event"
                );
                return;
            }
            Err(err) => {
                let backoff = config
                    .base_backoff
                    .saturating_mul(1u32 << attempt.min(20))
                    .min(config.max_backoff);
                debug!(
                    doc_id = %event.doc_id,
                    operation_id = %event.operation_id,
                    worker_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "event publish failed, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
