use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// How much of a message body the diagnostic rendering shows.
const PRETTY_BODY_LIMIT: usize = 120;

/// Opaque handle to a popped queue message.
///
/// The receipt identifies the message to the backing queue for
/// update/extend/delete while the caller holds the visibility lease.
/// `dequeue_count` counts deliveries, so a value above 1 means this is a
/// redelivery under the at-least-once model.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueMessage {
    pub receipt: Uuid,
    pub body: String,
    pub inserted: DateTime<Utc>,
    pub dequeue_count: u32,
}

/// Failure to decode a message body into its typed payload.
///
/// Malformed messages are surfaced, logged, and deleted by the worker loop
/// rather than left to poison the queue.
#[derive(Debug, thiserror::Error)]
#[error("malformed payload in message {receipt}: {source}")]
pub struct ContentError {
    pub receipt: Uuid,
    #[source]
    pub source: serde_json::Error,
}

impl QueueMessage {
    /// Decode the body into the application's message type.
    pub fn content<M: DeserializeOwned>(&self) -> Result<M, ContentError> {
        serde_json::from_str(&self.body).map_err(|source| ContentError {
            receipt: self.receipt,
            source,
        })
    }

    /// Original enqueue time, stable across redeliveries.
    pub fn insertion_time(&self) -> DateTime<Utc> {
        self.inserted
    }

    /// Diagnostic one-liner: receipt prefix, enqueue time, delivery count,
    /// truncated body.
    pub fn pretty_print(&self) -> String {
        let hex = self.receipt.simple().to_string();
        let body = if self.body.chars().count() > PRETTY_BODY_LIMIT {
            let head: String = self.body.chars().take(PRETTY_BODY_LIMIT).collect();
            format!("{head}…")
        } else {
            self.body.clone()
        };
        format!(
            "[{} inserted={} deliveries={}] {}",
            &hex[..8],
            self.inserted.to_rfc3339(),
            self.dequeue_count,
            body
        )
    }
}
