use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for scan jobs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One scan request over a bucket/prefix. Immutable after creation apart
/// from `updated_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanJob {
    pub job_id: JobId,
    pub bucket: String,
    pub prefix: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanJob {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(),
            bucket: bucket.into(),
            prefix: prefix.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-object scan progress. Transitions only flow forward; every mutation
/// is an idempotent keyed update, so re-marking a state is harmless.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl ObjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::Queued => "queued",
            ObjectStatus::Processing => "processing",
            ObjectStatus::Succeeded => "succeeded",
            ObjectStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ObjectStatus::Queued),
            "processing" => Some(ObjectStatus::Processing),
            "succeeded" => Some(ObjectStatus::Succeeded),
            "failed" => Some(ObjectStatus::Failed),
            _ => None,
        }
    }

    /// True once the object will never be picked up again by a healthy
    /// redelivery cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ObjectStatus::Succeeded | ObjectStatus::Failed)
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger row tracking one object-version within a job. Natural key:
/// `(job_id, bucket, key, etag)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub job_id: JobId,
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub status: ObjectStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One enumerated object-version as returned by the object store listing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub etag: String,
}

/// Queue message instructing a worker to scan one object-version. Carries no
/// identity of its own; the transport may deliver it more than once.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_id: JobId,
    pub bucket: String,
    pub key: String,
    pub etag: String,
}

impl WorkItem {
    pub fn new(job: &ScanJob, entry: &ObjectEntry) -> Self {
        Self {
            job_id: job.job_id,
            bucket: job.bucket.clone(),
            key: entry.key.clone(),
            etag: entry.etag.clone(),
        }
    }
}

/// A persisted finding. The raw matched value is never stored; only the
/// masked form plus bounded surrounding context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FindingRecord {
    /// Monotonically increasing identifier, doubles as the pagination cursor.
    pub id: i64,
    pub job_id: JobId,
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub detector: String,
    pub masked_match: String,
    pub context: String,
    pub byte_offset: i64,
    pub created_at: DateTime<Utc>,
}
