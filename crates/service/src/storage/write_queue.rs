use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::storage::kv::DurableKv;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteQueueError {
    #[error("write queue is closed")]
    Closed,
}

/// Outcome of the writes concluded since the previous flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub written: usize,
    pub failed: Vec<StorageError>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Command {
    Write { key: String, value: Value },
    Flush(oneshot::Sender<FlushReport>),
}

/// Deferred writes with an explicit flush point.
///
/// Writes are applied in enqueue order by a single task. Callers that do not
/// want to await the store enqueue here, then `flush` (or `shutdown`) before
/// they go away so nothing is lost and failures still reach someone.
pub struct WriteQueue {
    tx: mpsc::Sender<Command>,
    worker: JoinHandle<()>,
}

impl WriteQueue {
    /// Start the drain task. `capacity` bounds the number of pending commands.
    pub fn spawn(kv: DurableKv, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(Self::drain(kv, rx));
        Self { tx, worker }
    }

    async fn drain(kv: DurableKv, mut rx: mpsc::Receiver<Command>) {
        let mut pending = FlushReport::default();
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Write { key, value } => match kv.set(&key, value).await {
                    Ok(()) => pending.written += 1,
                    Err(e) => {
                        warn!(key = %key, error = %e, "queued write failed");
                        pending.failed.push(e);
                    }
                },
                Command::Flush(reply) => {
                    let report = std::mem::take(&mut pending);
                    debug!(written = report.written, failed = report.failed.len(), "write queue flushed");
                    // the flusher may have stopped waiting
                    let _ = reply.send(report);
                }
            }
        }
        if pending.written > 0 || !pending.failed.is_empty() {
            warn!(
                written = pending.written,
                failed = pending.failed.len(),
                "write queue stopped with unreported writes"
            );
        }
    }

    /// Queue `value` for `key`. Waits for room when the queue is full.
    pub async fn enqueue(&self, key: impl Into<String>, value: Value) -> Result<(), WriteQueueError> {
        self.tx
            .send(Command::Write { key: key.into(), value })
            .await
            .map_err(|_| WriteQueueError::Closed)
    }

    /// Wait until every write enqueued before this call has concluded.
    pub async fn flush(&self) -> Result<FlushReport, WriteQueueError> {
        let (reply, done) = oneshot::channel();
        self.tx.send(Command::Flush(reply)).await.map_err(|_| WriteQueueError::Closed)?;
        done.await.map_err(|_| WriteQueueError::Closed)
    }

    /// Flush, close the queue and join the drain task.
    pub async fn shutdown(self) -> Result<FlushReport, WriteQueueError> {
        let report = self.flush().await?;
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "write queue task ended abnormally");
        }
        Ok(report)
    }
}
