use crate::message::QueueMessage;
use crate::queue::{Queue, QueueError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

struct Stored {
    receipt: Uuid,
    body: String,
    inserted: chrono::DateTime<Utc>,
    /// When the message next becomes deliverable. Uses the tokio clock so
    /// paused-time tests advance it together with timers.
    visible_at: Instant,
    dequeue_count: u32,
}

/// In-memory queue with real visibility-timeout semantics.
///
/// Faithful to the durable-queue contract the engine assumes: popped
/// messages are leased, not removed, and reappear when the lease lapses.
/// Intended for tests and single-process embeddings; production deployments
/// bind a durable cloud queue to the same trait.
pub struct InMemoryQueue {
    name: String,
    messages: Mutex<Vec<Stored>>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn push(&self, body: String, visible_at: Instant) {
        self.messages.lock().push(Stored {
            receipt: Uuid::new_v4(),
            body,
            inserted: Utc::now(),
            visible_at,
            dequeue_count: 0,
        });
    }

    fn with_message<T>(
        &self,
        receipt: Uuid,
        f: impl FnOnce(&mut Stored) -> T,
    ) -> Result<T, QueueError> {
        let mut guard = self.messages.lock();
        guard
            .iter_mut()
            .find(|m| m.receipt == receipt)
            .map(f)
            .ok_or(QueueError::UnknownMessage(receipt))
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn try_get_batch(
        &self,
        n: usize,
        visibility: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let now = Instant::now();
        let mut guard = self.messages.lock();
        let mut batch = Vec::new();
        for stored in guard.iter_mut() {
            if batch.len() == n {
                break;
            }
            if stored.visible_at <= now {
                stored.visible_at = now + visibility;
                stored.dequeue_count += 1;
                batch.push(QueueMessage {
                    receipt: stored.receipt,
                    body: stored.body.clone(),
                    inserted: stored.inserted,
                    dequeue_count: stored.dequeue_count,
                });
            }
        }
        Ok(batch)
    }

    async fn post(&self, body: String) -> Result<(), QueueError> {
        self.push(body, Instant::now());
        Ok(())
    }

    async fn post_delayed(&self, body: String, delay: Duration) -> Result<(), QueueError> {
        self.push(body, Instant::now() + delay);
        Ok(())
    }

    async fn update(
        &self,
        msg: &QueueMessage,
        body: String,
        visibility: Duration,
    ) -> Result<(), QueueError> {
        let visible_at = Instant::now() + visibility;
        self.with_message(msg.receipt, |stored| {
            stored.body = body;
            stored.visible_at = visible_at;
        })
    }

    async fn extend_visibility(
        &self,
        msg: &QueueMessage,
        extension: Duration,
    ) -> Result<(), QueueError> {
        let visible_at = Instant::now() + extension;
        self.with_message(msg.receipt, |stored| {
            stored.visible_at = visible_at;
        })
    }

    async fn delete(&self, msg: &QueueMessage) -> Result<(), QueueError> {
        let mut guard = self.messages.lock();
        let before = guard.len();
        guard.retain(|m| m.receipt != msg.receipt);
        if guard.len() == before {
            return Err(QueueError::UnknownMessage(msg.receipt));
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize, QueueError> {
        Ok(self.messages.lock().len())
    }

    async fn purge(&self) -> Result<(), QueueError> {
        self.messages.lock().clear();
        Ok(())
    }
}
