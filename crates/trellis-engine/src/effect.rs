use std::time::Duration;

/// Queue manipulation the worker loop performs after a handler finishes.
///
/// This is the whole continuation protocol between handlers and the loop,
/// collapsed to one concrete sum type so the loop never depends on a
/// handler's state or result types. Only the loop writes queue effects;
/// handlers merely describe them.
#[derive(Debug, PartialEq)]
pub enum QueueEffect<M> {
    /// Remove the message. Used for completed and suspended agents alike.
    Delete,
    /// Post the tail-call message, then remove the current one.
    PostAndDelete(M),
    /// Keep the payload, push the visibility deadline out.
    ExtendVisibility(Duration),
    /// Replace the payload and hide the message for the duration.
    Update(M, Duration),
}

impl<M> QueueEffect<M> {
    /// Stable label for outcome records and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::PostAndDelete(_) => "post_and_delete",
            Self::ExtendVisibility(_) => "extend_visibility",
            Self::Update(..) => "update",
        }
    }
}
