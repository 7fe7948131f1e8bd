//! In-memory work queue with the same at-least-once semantics as the
//! Postgres backend: visibility windows, receive counting, and a dead-letter
//! state. Used by tests and single-process development.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use super::{QueueMessage, ReceiptHandle, WorkQueue};
use crate::Result;
use crate::types::WorkItem;

#[derive(Clone, Debug, Eq, PartialEq)]
enum EntryState {
    Ready,
    DeadLetter,
}

#[derive(Debug)]
struct Entry {
    id: Uuid,
    body: String,
    receive_count: u32,
    visible_at: Instant,
    state: EntryState,
}

#[derive(Debug)]
pub struct InMemoryWorkQueue {
    entries: Mutex<Vec<Entry>>,
    visibility: Duration,
    max_receives: u32,
}

impl InMemoryWorkQueue {
    pub fn new(visibility: Duration, max_receives: u32) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            visibility,
            max_receives,
        }
    }

    /// Push a raw body without going through [`WorkQueue::send`]; lets tests
    /// exercise malformed-message handling.
    pub fn send_raw(&self, body: impl Into<String>) {
        self.entries.lock().expect("queue lock poisoned").push(Entry {
            id: Uuid::now_v7(),
            body: body.into(),
            receive_count: 0,
            visible_at: Instant::now(),
            state: EntryState::Ready,
        });
    }

    /// Collapse every pending visibility window, as if the timeout elapsed.
    pub fn expire_visibility(&self) {
        let now = Instant::now();
        for entry in self.entries.lock().expect("queue lock poisoned").iter_mut()
        {
            entry.visible_at = now;
        }
    }

    /// Messages still in the queue (delivered or not), excluding dead-letter.
    pub fn pending_len(&self) -> usize {
        self.entries
            .lock()
            .expect("queue lock poisoned")
            .iter()
            .filter(|e| e.state == EntryState::Ready)
            .count()
    }

    pub fn dead_letter_len(&self) -> usize {
        self.entries
            .lock()
            .expect("queue lock poisoned")
            .iter()
            .filter(|e| e.state == EntryState::DeadLetter)
            .count()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn send(&self, item: &WorkItem) -> Result<()> {
        self.send_raw(serde_json::to_string(item)?);
        Ok(())
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<QueueMessage>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("queue lock poisoned");
        let mut messages = Vec::new();
        for entry in entries.iter_mut() {
            if messages.len() == max_messages {
                break;
            }
            if entry.state != EntryState::Ready || entry.visible_at > now {
                continue;
            }
            entry.receive_count += 1;
            if entry.receive_count > self.max_receives {
                entry.state = EntryState::DeadLetter;
                continue;
            }
            entry.visible_at = now + self.visibility;
            messages.push(QueueMessage {
                receipt: ReceiptHandle(entry.id),
                body: entry.body.clone(),
                receive_count: entry.receive_count,
            });
        }
        Ok(messages)
    }

    async fn acknowledge(&self, receipt: &ReceiptHandle) -> Result<()> {
        self.entries
            .lock()
            .expect("queue lock poisoned")
            .retain(|e| e.id != receipt.0);
        Ok(())
    }
}
