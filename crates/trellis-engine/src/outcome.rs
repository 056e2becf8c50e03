use chrono::{DateTime, Utc};
use std::time::Duration;

/// What happened to one popped message, with enough context to triage it
/// without scraping application logs.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOutcome {
    pub queue_id: String,
    /// Diagnostic rendering of the message at pop time.
    pub message: String,
    /// Handler wall time.
    pub elapsed: Duration,
    /// Original enqueue time, so sinks can derive queue-to-completion
    /// latency.
    pub inserted: DateTime<Utc>,
    pub kind: OutcomeKind,
}

/// Outcome taxonomy for processed messages.
#[derive(Clone, Debug, PartialEq)]
pub enum OutcomeKind {
    /// Normal outcome, tagged with the queue effect that was applied.
    Processed { effect: &'static str },
    /// Payload could not be decoded; the message was deleted.
    ParseError(String),
    /// Handler declined the message; deleted.
    Rejected(String),
    /// Handler raised an uncaught error; deleted.
    HandlerFailure(String),
}

/// Injected observer for request outcomes.
///
/// The loop owns exactly one sink; there is no process-wide logger state.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: RequestOutcome);
}

/// Default sink forwarding outcomes to `tracing`.
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn record(&self, outcome: RequestOutcome) {
        let elapsed_ms = outcome.elapsed.as_millis() as u64;
        match &outcome.kind {
            OutcomeKind::Processed { effect } => tracing::info!(
                queue = %outcome.queue_id,
                effect,
                elapsed_ms,
                inserted = %outcome.inserted,
                "request processed"
            ),
            OutcomeKind::ParseError(err) => tracing::error!(
                queue = %outcome.queue_id,
                error = %err,
                message = %outcome.message,
                "request payload unreadable, deleting"
            ),
            OutcomeKind::Rejected(reason) => tracing::warn!(
                queue = %outcome.queue_id,
                reason = %reason,
                message = %outcome.message,
                "request rejected, deleting"
            ),
            OutcomeKind::HandlerFailure(err) => tracing::error!(
                queue = %outcome.queue_id,
                error = %err,
                elapsed_ms,
                message = %outcome.message,
                "request handler failed, deleting"
            ),
        }
    }
}
