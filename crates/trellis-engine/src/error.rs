use trellis_store::{QueueError, StoreError};

/// Errors raised while driving an agent through its transitions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A fork was asked to spawn zero children. The fork would complete
    /// immediately with nothing to join on, which is almost always a bug in
    /// the transition function, so it is rejected outright.
    #[error("fork requires at least one child state")]
    EmptyFork,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The user transition function failed; surfaced to the worker loop as
    /// a handler failure.
    #[error("transition failed: {0}")]
    Transition(#[source] anyhow::Error),
}
