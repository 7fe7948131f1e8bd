//! Persistence contracts for scan jobs, the per-object ledger, and findings.
//!
//! Every mutation is an idempotent keyed upsert or update: uniqueness
//! constraints absorb duplicate seeding and duplicate findings, and keyed
//! status updates absorb redelivered work. These constraints are the only
//! coordination surface between concurrent workers.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::Result;
use crate::detect::Detection;
use crate::types::{FindingRecord, JobId, ObjectRecord, ObjectStatus, ScanJob};

/// Filter for paginated finding retrieval.
#[derive(Clone, Debug, Default)]
pub struct FindingFilter {
    pub bucket: Option<String>,
    pub key_prefix: Option<String>,
    /// Return findings with ids strictly greater than this.
    pub cursor: Option<i64>,
    pub limit: i64,
}

/// One page of findings. `next_cursor` is the last returned id when the page
/// was full, `None` otherwise.
///
/// A short page is a weak end-of-stream signal, not a snapshot guarantee:
/// ids only ever increase, so a chained cursor never repeats or skips
/// committed rows, but inserts concurrent with a read can make the final
/// page look final before it is.
#[derive(Clone, Debug)]
pub struct FindingPage {
    pub items: Vec<FindingRecord>,
    pub next_cursor: Option<i64>,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert_job(&self, job: &ScanJob) -> Result<()>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<ScanJob>>;
}

/// Tracks per-object scan progress keyed by `(job, bucket, key, etag)`.
#[async_trait]
pub trait ObjectLedger: Send + Sync {
    /// Insert a `queued` row for an enumerated object-version. Re-seeding an
    /// existing row is a no-op; returns whether a row was created.
    async fn seed(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
    ) -> Result<bool>;

    /// Idempotent keyed status update. A missing row is a silent no-op: a
    /// row's absence must never crash the worker.
    async fn mark(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
        status: ObjectStatus,
        last_error: Option<&str>,
    ) -> Result<()>;

    async fn get(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
    ) -> Result<Option<ObjectRecord>>;

    /// Per-status row counts for one job.
    async fn status_counts(
        &self,
        job_id: JobId,
    ) -> Result<BTreeMap<ObjectStatus, i64>>;
}

/// Deduplicated finding persistence plus cursor-paginated retrieval.
#[async_trait]
pub trait FindingStore: Send + Sync {
    /// Batch-insert detections for one object-version, silently skipping any
    /// finding whose `(bucket, key, etag, detector, byte_offset)` key
    /// already exists. Returns the number of newly inserted rows.
    async fn insert_findings(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
        detections: &[Detection],
    ) -> Result<u64>;

    /// Findings in ascending id order, starting strictly after the cursor.
    async fn list_findings(&self, filter: &FindingFilter) -> Result<FindingPage>;
}
