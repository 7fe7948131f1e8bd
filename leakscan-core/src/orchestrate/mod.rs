//! Job orchestration: create a job, enumerate its objects, seed ledger rows,
//! and publish one work item per object-version.
//!
//! Every step is idempotent per `(job, bucket, key, etag)`, so a partially
//! failed enumeration leaves valid state behind and re-running it is safe.
//! A job's true completeness equals its enumeration count and cannot be
//! asserted mid-enumeration; progress is observed through the ledger.

use std::sync::Arc;

use tracing::{debug, info};

use crate::Result;
use crate::persistence::{JobRepository, ObjectLedger};
use crate::queue::WorkQueue;
use crate::store::ObjectStore;
use crate::types::{ScanJob, WorkItem};

/// Outcome of one enumeration pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SeedSummary {
    /// Objects returned by the listing.
    pub enumerated: usize,
    /// Ledger rows newly created (re-enumerated rows are skipped).
    pub seeded: usize,
    /// Work items published. One per enumerated object: redelivering an
    /// already-tracked object is absorbed downstream.
    pub published: usize,
}

pub struct JobOrchestrator {
    jobs: Arc<dyn JobRepository>,
    ledger: Arc<dyn ObjectLedger>,
    object_store: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue>,
    page_size: usize,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        ledger: Arc<dyn ObjectLedger>,
        object_store: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
        page_size: usize,
    ) -> Self {
        Self {
            jobs,
            ledger,
            object_store,
            queue,
            page_size: page_size.max(1),
        }
    }

    /// Persist a new job. Enumeration happens separately via [`Self::seed_job`]
    /// so callers can return the job id immediately.
    pub async fn create_job(
        &self,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Result<ScanJob> {
        let job = ScanJob::new(bucket, prefix);
        self.jobs.insert_job(&job).await?;
        info!(job_id = %job.job_id, bucket = %job.bucket, prefix = %job.prefix, "created scan job");
        Ok(job)
    }

    /// Enumerate the job's bucket/prefix page by page, seed a `queued`
    /// ledger row per object-version, and publish one work item each.
    pub async fn seed_job(&self, job: &ScanJob) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .object_store
                .list_page(
                    &job.bucket,
                    &job.prefix,
                    continuation.as_deref(),
                    self.page_size,
                )
                .await?;

            for entry in &page.entries {
                summary.enumerated += 1;
                let created = self
                    .ledger
                    .seed(job.job_id, &job.bucket, &entry.key, &entry.etag)
                    .await?;
                if created {
                    summary.seeded += 1;
                } else {
                    debug!(
                        job_id = %job.job_id,
                        key = %entry.key,
                        "object already seeded"
                    );
                }
                self.queue.send(&WorkItem::new(job, entry)).await?;
                summary.published += 1;
            }

            continuation = page.continuation;
            if continuation.is_none() {
                break;
            }
        }

        info!(
            job_id = %job.job_id,
            enumerated = summary.enumerated,
            seeded = summary.seeded,
            published = summary.published,
            "seeded scan job"
        );
        Ok(summary)
    }
}
