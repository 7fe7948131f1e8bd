//! Work queue boundary.
//!
//! The queue is an at-least-once delivery channel: a received message stays
//! invisible to other consumers for a visibility window, becomes deliverable
//! again if it is not acknowledged in time, and moves to a dead-letter state
//! once it has been received more times than the configured limit. That
//! redelivery cycle is the system's sole retry mechanism.
//!
//! Message bodies travel as JSON text, so a malformed body is a consumer-side
//! data fault rather than a transport error.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::Result;
use crate::types::WorkItem;

/// Identifies one delivery of one message for acknowledgment.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(pub Uuid);

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One received message. `body` is the raw JSON payload; decoding it is the
/// consumer's concern.
#[derive(Clone, Debug)]
pub struct QueueMessage {
    pub receipt: ReceiptHandle,
    pub body: String,
    pub receive_count: u32,
}

impl QueueMessage {
    pub fn decode(&self) -> Result<WorkItem> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Publish one work item.
    async fn send(&self, item: &WorkItem) -> Result<()>;

    /// Receive up to `max_messages` deliverable messages, making each
    /// invisible for the backend's visibility window. Returns an empty batch
    /// immediately when nothing is deliverable; consumers pace their own
    /// polling between empty batches.
    async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>>;

    /// Delete a message after all persistence for it succeeded. Must be the
    /// final step of processing: a crash before this point results in
    /// redelivery, not loss.
    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<()>;
}
