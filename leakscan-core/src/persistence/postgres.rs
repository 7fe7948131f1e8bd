//! Postgres-backed repositories over sqlx.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{FindingFilter, FindingPage, FindingStore, JobRepository, ObjectLedger};
use crate::Result;
use crate::detect::Detection;
use crate::error::ScanError;
use crate::types::{FindingRecord, JobId, ObjectRecord, ObjectStatus, ScanJob};

#[derive(Clone, Debug)]
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    bucket: String,
    prefix: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for ScanJob {
    fn from(row: JobRow) -> Self {
        Self {
            job_id: JobId(row.job_id),
            bucket: row.bucket,
            prefix: row.prefix,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn insert_job(&self, job: &ScanJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, bucket, prefix, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.job_id.0)
        .bind(&job.bucket)
        .bind(&job.prefix)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<ScanJob>> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            SELECT job_id, bucket, prefix, created_at, updated_at
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ScanJob::from))
    }
}

#[derive(Clone, Debug)]
pub struct PostgresObjectLedger {
    pool: PgPool,
}

impl PostgresObjectLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ObjectRow {
    job_id: Uuid,
    bucket: String,
    key: String,
    etag: String,
    status: String,
    last_error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ObjectRow> for ObjectRecord {
    type Error = ScanError;

    fn try_from(row: ObjectRow) -> Result<Self> {
        let status = ObjectStatus::parse(&row.status).ok_or_else(|| {
            ScanError::Internal(format!(
                "ledger row carries unknown status `{}`",
                row.status
            ))
        })?;
        Ok(Self {
            job_id: JobId(row.job_id),
            bucket: row.bucket,
            key: row.key,
            etag: row.etag,
            status,
            last_error: row.last_error,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ObjectLedger for PostgresObjectLedger {
    async fn seed(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_objects (job_id, bucket, key, etag, status)
            VALUES ($1, $2, $3, $4, 'queued')
            ON CONFLICT (job_id, bucket, key, etag) DO NOTHING
            "#,
        )
        .bind(job_id.0)
        .bind(bucket)
        .bind(key)
        .bind(etag)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
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
        let result = sqlx::query(
            r#"
            UPDATE job_objects
            SET status = $5, last_error = $6, updated_at = NOW()
            WHERE job_id = $1 AND bucket = $2 AND key = $3 AND etag = $4
            "#,
        )
        .bind(job_id.0)
        .bind(bucket)
        .bind(key)
        .bind(etag)
        .bind(status.as_str())
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                %job_id, bucket, key, etag, %status,
                "status update matched no ledger row"
            );
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
        let row: Option<ObjectRow> = sqlx::query_as(
            r#"
            SELECT job_id, bucket, key, etag, status, last_error, updated_at
            FROM job_objects
            WHERE job_id = $1 AND bucket = $2 AND key = $3 AND etag = $4
            "#,
        )
        .bind(job_id.0)
        .bind(bucket)
        .bind(key)
        .bind(etag)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ObjectRecord::try_from).transpose()
    }

    async fn status_counts(
        &self,
        job_id: JobId,
    ) -> Result<BTreeMap<ObjectStatus, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM job_objects
            WHERE job_id = $1
            GROUP BY status
            "#,
        )
        .bind(job_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = BTreeMap::new();
        for (status, count) in rows {
            if let Some(status) = ObjectStatus::parse(&status) {
                counts.insert(status, count);
            }
        }
        Ok(counts)
    }
}

#[derive(Clone, Debug)]
pub struct PostgresFindingStore {
    pool: PgPool,
}

impl PostgresFindingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FindingRow {
    id: i64,
    job_id: Uuid,
    bucket: String,
    key: String,
    etag: String,
    detector: String,
    masked_match: String,
    context: String,
    byte_offset: i64,
    created_at: DateTime<Utc>,
}

impl From<FindingRow> for FindingRecord {
    fn from(row: FindingRow) -> Self {
        Self {
            id: row.id,
            job_id: JobId(row.job_id),
            bucket: row.bucket,
            key: row.key,
            etag: row.etag,
            detector: row.detector,
            masked_match: row.masked_match,
            context: row.context,
            byte_offset: row.byte_offset,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl FindingStore for PostgresFindingStore {
    async fn insert_findings(
        &self,
        job_id: JobId,
        bucket: &str,
        key: &str,
        etag: &str,
        detections: &[Detection],
    ) -> Result<u64> {
        if detections.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        for detection in detections {
            let result = sqlx::query(
                r#"
                INSERT INTO findings
                    (job_id, bucket, key, etag, detector, masked_match,
                     context, byte_offset)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (bucket, key, etag, detector, byte_offset)
                    DO NOTHING
                "#,
            )
            .bind(job_id.0)
            .bind(bucket)
            .bind(key)
            .bind(etag)
            .bind(&detection.detector)
            .bind(&detection.masked_match)
            .bind(&detection.context)
            .bind(detection.byte_offset as i64)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn list_findings(&self, filter: &FindingFilter) -> Result<FindingPage> {
        let rows: Vec<FindingRow> = sqlx::query_as(
            r#"
            SELECT id, job_id, bucket, key, etag, detector, masked_match,
                   context, byte_offset, created_at
            FROM findings
            WHERE ($1::text IS NULL OR bucket = $1)
              AND ($2::text IS NULL OR key LIKE $2 || '%')
              AND ($3::bigint IS NULL OR id > $3)
            ORDER BY id ASC
            LIMIT $4
            "#,
        )
        .bind(filter.bucket.as_deref())
        .bind(filter.key_prefix.as_deref())
        .bind(filter.cursor)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        let items: Vec<FindingRecord> =
            rows.into_iter().map(FindingRecord::from).collect();
        let next_cursor = if (items.len() as i64) == filter.limit {
            items.last().map(|f| f.id)
        } else {
            None
        };
        Ok(FindingPage { items, next_cursor })
    }
}
