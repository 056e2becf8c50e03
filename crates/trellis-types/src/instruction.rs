use std::time::Duration;

/// The engine's verdict on one request invocation, telling the worker loop
/// how to manipulate the queue message it popped.
///
/// `Suspended` carries no payload on purpose: durability lives in the join
/// store and in the child messages already spawned, so the current message
/// is simply deleted.
#[derive(Debug, PartialEq)]
pub enum ExecutionInstruction<S, R, M> {
    /// The agent returned; delete the message.
    Completed(Option<R>),
    /// The agent parked itself on a join; delete the message.
    Suspended,
    /// Post the tail-call message, then delete the current one.
    Coreturn(M),
    /// Extend the message's visibility lease; same payload redelivers later.
    SleepAndResume(Duration),
    /// Replace the payload with the given state and hide the message for
    /// the duration (durable sleep).
    SleepAndResumeAt(Duration, S),
}

impl<S, R, M> ExecutionInstruction<S, R, M> {
    /// Variant name for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Completed(_) => "Completed",
            Self::Suspended => "Suspended",
            Self::Coreturn(_) => "Coreturn",
            Self::SleepAndResume(_) => "SleepAndResume",
            Self::SleepAndResumeAt(..) => "SleepAndResumeAt",
        }
    }
}
