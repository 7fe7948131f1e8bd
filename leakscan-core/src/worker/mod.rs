//! The scan worker: consumes work items, fetches content, runs detection,
//! persists findings, and advances the ledger.
//!
//! Workers share no in-memory state; any number of them can run against the
//! same queue. Acknowledgment is the final step of processing, so a crash at
//! any earlier point results in redelivery, and every effect along the way
//! is an idempotent keyed write, so redelivery is side-effect-equivalent to
//! processing once.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::detect::DetectionEngine;
use crate::persistence::{FindingStore, ObjectLedger};
use crate::queue::{QueueMessage, WorkQueue};
use crate::store::ObjectStore;
use crate::types::{ObjectStatus, WorkItem};

#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    /// Messages requested per receive call.
    pub batch_size: usize,
    /// Pause between empty receive cycles. This is the loop's only
    /// suspension point besides queue/store I/O.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Clone)]
pub struct ScanWorker {
    worker_id: String,
    ledger: Arc<dyn ObjectLedger>,
    findings: Arc<dyn FindingStore>,
    object_store: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue>,
    engine: Arc<DetectionEngine>,
    config: WorkerConfig,
}

impl std::fmt::Debug for ScanWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanWorker")
            .field("worker_id", &self.worker_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScanWorker {
    pub fn new(
        worker_id: impl Into<String>,
        ledger: Arc<dyn ObjectLedger>,
        findings: Arc<dyn FindingStore>,
        object_store: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
        engine: Arc<DetectionEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            ledger,
            findings,
            object_store,
            queue,
            engine,
            config,
        }
    }

    /// Consume until cancelled. Per-item failures are logged and isolated;
    /// nothing a single message does can terminate the loop.
    pub async fn run(self, cancel: CancellationToken) {
        info!(worker_id = %self.worker_id, "scan worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.poll_once().await {
                Ok(0) => self.idle(&cancel).await,
                Ok(_) => {}
                Err(e) => {
                    warn!(worker_id = %self.worker_id, error = %e, "receive failed");
                    self.idle(&cancel).await;
                }
            }
        }
        info!(worker_id = %self.worker_id, "scan worker stopped");
    }

    /// Receive one batch and process every message in it. Returns the batch
    /// size; errors are receive-side only.
    pub async fn poll_once(&self) -> Result<usize> {
        let batch = self.queue.receive(self.config.batch_size).await?;
        let received = batch.len();
        for message in &batch {
            if let Err(e) = self.process_message(message).await {
                // Left unacknowledged: the item becomes visible again after
                // the visibility window and eventually dead-letters.
                warn!(
                    worker_id = %self.worker_id,
                    receipt = %message.receipt,
                    receive_count = message.receive_count,
                    error = %e,
                    "failed to process work item"
                );
            }
        }
        Ok(received)
    }

    async fn idle(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.poll_interval) => {}
        }
    }

    async fn process_message(&self, message: &QueueMessage) -> Result<()> {
        let item = message.decode()?;
        debug!(
            worker_id = %self.worker_id,
            job_id = %item.job_id,
            bucket = %item.bucket,
            key = %item.key,
            "processing work item"
        );

        match self.process_item(&item).await {
            Ok(inserted) => {
                // Persistence is complete; only now may the message go away.
                self.queue.acknowledge(&message.receipt).await?;
                info!(
                    worker_id = %self.worker_id,
                    job_id = %item.job_id,
                    key = %item.key,
                    findings = inserted,
                    "object scanned"
                );
                Ok(())
            }
            Err(e) => {
                let detail = e.to_string();
                if let Err(mark_err) = self
                    .ledger
                    .mark(
                        item.job_id,
                        &item.bucket,
                        &item.key,
                        &item.etag,
                        ObjectStatus::Failed,
                        Some(&detail),
                    )
                    .await
                {
                    error!(
                        worker_id = %self.worker_id,
                        job_id = %item.job_id,
                        key = %item.key,
                        error = %mark_err,
                        "could not record failure in ledger"
                    );
                }
                Err(e)
            }
        }
    }

    /// Steps 2-5 of processing: mark, fetch, detect, persist, mark. Returns
    /// the number of newly inserted findings.
    async fn process_item(&self, item: &WorkItem) -> Result<u64> {
        self.ledger
            .mark(
                item.job_id,
                &item.bucket,
                &item.key,
                &item.etag,
                ObjectStatus::Processing,
                None,
            )
            .await?;

        let bytes = self
            .object_store
            .fetch(&item.bucket, &item.key, Some(&item.etag))
            .await?;

        let detections = self.engine.scan_bytes(&bytes);
        let inserted = self
            .findings
            .insert_findings(
                item.job_id,
                &item.bucket,
                &item.key,
                &item.etag,
                &detections,
            )
            .await?;

        self.ledger
            .mark(
                item.job_id,
                &item.bucket,
                &item.key,
                &item.etag,
                ObjectStatus::Succeeded,
                None,
            )
            .await?;
        Ok(inserted)
    }
}
