//! Postgres-backed work queue.
//!
//! A single `scan_queue` table provides at-least-once delivery: receiving a
//! batch claims rows with `FOR UPDATE SKIP LOCKED`, bumps their receive
//! count, and pushes `available_at` past the visibility window. Rows that
//! exceed the receive limit flip to the `dead_letter` state and stay in the
//! table for manual triage. Acknowledgment deletes the row.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{QueueMessage, ReceiptHandle, WorkQueue};
use crate::Result;
use crate::types::WorkItem;

#[derive(Clone, Debug)]
pub struct PostgresWorkQueue {
    pool: PgPool,
    visibility_secs: i64,
    max_receives: i64,
}

#[derive(sqlx::FromRow)]
struct ClaimedRow {
    id: Uuid,
    body: String,
    receive_count: i32,
}

impl PostgresWorkQueue {
    pub fn new(pool: PgPool, visibility_secs: i64, max_receives: i64) -> Self {
        Self {
            pool,
            visibility_secs,
            max_receives,
        }
    }

    /// Number of messages parked on the dead-letter path.
    pub async fn dead_letter_depth(&self) -> Result<i64> {
        let depth: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scan_queue WHERE state = 'dead_letter'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(depth)
    }
}

#[async_trait]
impl WorkQueue for PostgresWorkQueue {
    async fn send(&self, item: &WorkItem) -> Result<()> {
        let body = serde_json::to_string(item)?;
        sqlx::query(
            r#"
            INSERT INTO scan_queue (id, body)
            VALUES ($1, $2::jsonb)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>> {
        let claimed: Vec<ClaimedRow> = sqlx::query_as(
            r#"
            WITH candidates AS (
                SELECT id
                FROM scan_queue
                WHERE state = 'ready' AND available_at <= NOW()
                ORDER BY enqueued_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE scan_queue q
            SET receive_count = q.receive_count + 1,
                available_at = NOW() + ($2::bigint) * INTERVAL '1 second'
            FROM candidates c
            WHERE q.id = c.id
            RETURNING q.id, q.body::text AS body, q.receive_count
            "#,
        )
        .bind(max_messages as i64)
        .bind(self.visibility_secs)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(claimed.len());
        for row in claimed {
            if i64::from(row.receive_count) > self.max_receives {
                warn!(
                    message_id = %row.id,
                    receive_count = row.receive_count,
                    "message exceeded receive limit, moving to dead-letter"
                );
                sqlx::query(
                    r#"
                    UPDATE scan_queue
                    SET state = 'dead_letter'
                    WHERE id = $1
                    "#,
                )
                .bind(row.id)
                .execute(&self.pool)
                .await?;
                continue;
            }
            messages.push(QueueMessage {
                receipt: ReceiptHandle(row.id),
                body: row.body,
                receive_count: row.receive_count.max(0) as u32,
            });
        }

        debug!(count = messages.len(), "received queue batch");
        Ok(messages)
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<()> {
        let result = sqlx::query("DELETE FROM scan_queue WHERE id = $1")
            .bind(receipt.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            // A concurrent delivery already acknowledged it; effects are
            // idempotent, so treat the duplicate ack as a no-op.
            debug!(%receipt, "acknowledged receipt no longer exists");
        }
        Ok(())
    }
}
