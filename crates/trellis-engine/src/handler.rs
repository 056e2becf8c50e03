use crate::effect::QueueEffect;
use crate::error::EngineError;
use async_trait::async_trait;

/// A handler's way of declining or failing a message.
///
/// `Rejected` is a deliberate signal (wrong queue, unsupported variant);
/// the loop logs it and deletes the message. `Failed` is any uncaught
/// error; the loop logs it with the envelope and deletes the message
/// (fail-forward: retries are modeled explicitly in transition functions,
/// never by leaving a message to redeliver).
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("message rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<EngineError> for HandlerError {
    fn from(err: EngineError) -> Self {
        Self::Failed(anyhow::Error::new(err))
    }
}

/// Contract by which stateful handlers plug into the worker loop.
///
/// A typical implementation is a dispatcher: it matches the envelope's
/// request variant, builds an [`crate::Agent`] with the right embed
/// plumbing for that variant, runs it, and returns the resulting queue
/// effect. Handlers never touch the queue message itself.
#[async_trait]
pub trait Handler<C, M>: Send + Sync {
    async fn handle(&self, context: &C, envelope: M) -> Result<QueueEffect<M>, HandlerError>;
}
