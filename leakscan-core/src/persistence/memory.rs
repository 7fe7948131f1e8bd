//! In-memory store implementing every persistence port, with the same
//! idempotency semantics as the Postgres backend. Used by tests and
//! single-process development.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{FindingFilter, FindingPage, FindingStore, JobRepository, ObjectLedger};
use crate::Result;
use crate::detect::Detection;
use crate::error::ScanError;
use crate::types::{FindingRecord, JobId, ObjectRecord, ObjectStatus, ScanJob};

type ObjectKey = (JobId, String, String, String);
type FindingKey = (String, String, String, String, i64);

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, ScanJob>,
    objects: HashMap<ObjectKey, ObjectRecord>,
    findings: BTreeMap<i64, FindingRecord>,
    finding_keys: HashMap<FindingKey, i64>,
    next_finding_id: i64,
}

/// One store exposing all three persistence ports.
#[derive(Debug, Default)]
pub struct InMemoryScanStore {
    inner: Mutex<Inner>,
}

impl InMemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of one ledger row, for assertions.
    pub fn object_status(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
    ) -> Option<ObjectStatus> {
        let inner = self.inner.lock().expect("scan store lock poisoned");
        inner
            .objects
            .get(&(
                job_id,
                bucket.to_string(),
                key.to_string(),
                etag.to_string(),
            ))
            .map(|record| record.status)
    }

    pub fn finding_count(&self) -> usize {
        self.inner
            .lock()
            .expect("scan store lock poisoned")
            .findings
            .len()
    }
}

#[async_trait]
impl JobRepository for InMemoryScanStore {
    async fn insert_job(&self, job: &ScanJob) -> Result<()> {
        let mut inner = self.inner.lock().expect("scan store lock poisoned");
        if inner.jobs.contains_key(&job.job_id) {
            return Err(ScanError::Internal(format!(
                "job {} already exists",
                job.job_id
            )));
        }
        inner.jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<ScanJob>> {
        let inner = self.inner.lock().expect("scan store lock poisoned");
        Ok(inner.jobs.get(&job_id).cloned())
    }
}

#[async_trait]
impl ObjectLedger for InMemoryScanStore {
    async fn seed(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().expect("scan store lock poisoned");
        let object_key = (
            job_id,
            bucket.to_string(),
            key.to_string(),
            etag.to_string(),
        );
        if inner.objects.contains_key(&object_key) {
            return Ok(false);
        }
        inner.objects.insert(
            object_key,
            ObjectRecord {
                job_id,
                bucket: bucket.to_string(),
                key: key.to_string(),
                etag: etag.to_string(),
                status: ObjectStatus::Queued,
                last_error: None,
                updated_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn mark(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
        status: ObjectStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("scan store lock poisoned");
        let object_key = (
            job_id,
            bucket.to_string(),
            key.to_string(),
            etag.to_string(),
        );
        if let Some(record) = inner.objects.get_mut(&object_key) {
            record.status = status;
            record.last_error = last_error.map(str::to_string);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
    ) -> Result<Option<ObjectRecord>> {
        let inner = self.inner.lock().expect("scan store lock poisoned");
        Ok(inner
            .objects
            .get(&(
                job_id,
                bucket.to_string(),
                key.to_string(),
                etag.to_string(),
            ))
            .cloned())
    }

    async fn status_counts(
        &self,
        job_id: JobId,
    ) -> Result<BTreeMap<ObjectStatus, i64>> {
        let inner = self.inner.lock().expect("scan store lock poisoned");
        let mut counts = BTreeMap::new();
        for record in inner.objects.values() {
            if record.job_id == job_id {
                *counts.entry(record.status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl FindingStore for InMemoryScanStore {
    async fn insert_findings(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
        detections: &[Detection],
    ) -> Result<u64> {
        let mut inner = self.inner.lock().expect("scan store lock poisoned");
        let mut inserted = 0;
        for detection in detections {
            let finding_key = (
                bucket.to_string(),
                key.to_string(),
                etag.to_string(),
                detection.detector.clone(),
                detection.byte_offset as i64,
            );
            if inner.finding_keys.contains_key(&finding_key) {
                continue;
            }
            inner.next_finding_id += 1;
            let id = inner.next_finding_id;
            inner.finding_keys.insert(finding_key, id);
            inner.findings.insert(
                id,
                FindingRecord {
                    id,
                    job_id,
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    etag: etag.to_string(),
                    detector: detection.detector.clone(),
                    masked_match: detection.masked_match.clone(),
                    context: detection.context.clone(),
                    byte_offset: detection.byte_offset as i64,
                    created_at: Utc::now(),
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_findings(&self, filter: &FindingFilter) -> Result<FindingPage> {
        let inner = self.inner.lock().expect("scan store lock poisoned");
        let after = filter.cursor.unwrap_or(i64::MIN);
        let items: Vec<FindingRecord> = inner
            .findings
            .range((after.saturating_add(1))..)
            .map(|(_, record)| record)
            .filter(|record| {
                filter
                    .bucket
                    .as_deref()
                    .is_none_or(|bucket| record.bucket == bucket)
            })
            .filter(|record| {
                filter
                    .key_prefix
                    .as_deref()
                    .is_none_or(|prefix| record.key.starts_with(prefix))
            })
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();

        let next_cursor = if (items.len() as i64) == filter.limit {
            items.last().map(|f| f.id)
        } else {
            None
        };
        Ok(FindingPage { items, next_cursor })
    }
}
