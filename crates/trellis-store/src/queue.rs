use crate::message::QueueMessage;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Errors from a backing queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The receipt does not name a live message; the lease may have expired
    /// and another consumer may already have acted on it.
    #[error("message {0} not found or lease expired")]
    UnknownMessage(Uuid),
    /// Payload could not be encoded for posting.
    #[error("payload encoding failed: {0}")]
    Codec(String),
    /// Transient backend failure (I/O, throttling, service error).
    #[error("queue backend failure: {0}")]
    Backend(String),
}

/// Uniform contract over any backing queue.
///
/// Delivery is at-least-once: a popped message not deleted or extended
/// within its visibility window will be redelivered. `update` and
/// `extend_visibility` are only defined while the caller holds the
/// message's visibility lease.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Pop up to `n` messages, hiding each from other consumers for
    /// `visibility`. May return any number in `[0, n]`.
    async fn try_get_batch(
        &self,
        n: usize,
        visibility: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Enqueue a raw body for immediate delivery.
    async fn post(&self, body: String) -> Result<(), QueueError>;

    /// Enqueue a raw body that becomes visible only after `delay`.
    async fn post_delayed(&self, body: String, delay: Duration) -> Result<(), QueueError>;

    /// Atomically replace the payload and reset visibility.
    async fn update(
        &self,
        msg: &QueueMessage,
        body: String,
        visibility: Duration,
    ) -> Result<(), QueueError>;

    /// Push the visibility deadline out to now + `extension`.
    async fn extend_visibility(
        &self,
        msg: &QueueMessage,
        extension: Duration,
    ) -> Result<(), QueueError>;

    /// Remove the message permanently.
    async fn delete(&self, msg: &QueueMessage) -> Result<(), QueueError>;

    /// Number of messages held by the queue, visible or leased.
    async fn pending_count(&self) -> Result<usize, QueueError>;

    /// Remove every message. Test isolation and operator tooling.
    async fn purge(&self) -> Result<(), QueueError>;
}

/// Typed posting layer over any [`Queue`], including trait objects.
///
/// Bodies are JSON; a durable cloud queue sees the same encoding the
/// in-memory queue does, so payloads survive a backend swap.
#[async_trait]
pub trait QueueExt: Queue {
    async fn post_message<M>(&self, message: &M) -> Result<(), QueueError>
    where
        M: Serialize + Sync,
    {
        self.post(encode(message)?).await
    }

    async fn post_message_delayed<M>(&self, message: &M, delay: Duration) -> Result<(), QueueError>
    where
        M: Serialize + Sync,
    {
        self.post_delayed(encode(message)?, delay).await
    }

    async fn update_message<M>(
        &self,
        msg: &QueueMessage,
        message: &M,
        visibility: Duration,
    ) -> Result<(), QueueError>
    where
        M: Serialize + Sync,
    {
        self.update(msg, encode(message)?, visibility).await
    }
}

#[async_trait]
impl<Q: Queue + ?Sized> QueueExt for Q {}

fn encode<M: Serialize>(message: &M) -> Result<String, QueueError> {
    serde_json::to_string(message).map_err(|e| QueueError::Codec(e.to_string()))
}
