use crate::effect::QueueEffect;
use crate::handler::{Handler, HandlerError};
use crate::outcome::{OutcomeKind, OutcomeSink, RequestOutcome, TracingSink};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use trellis_store::{Queue, QueueError, QueueExt, QueueMessage};

/// The complete option set of the worker loop. No hidden knobs.
#[derive(Clone, Debug)]
pub struct PumpConfig {
    /// Idle poll interval when every queue returns empty.
    pub sleep_when_all_empty: Duration,
    /// Minimum interval between heartbeat callbacks.
    pub heartbeat_interval: Duration,
    /// Upper bound on in-flight handlers.
    pub concurrent_workers: usize,
    /// How long to wait for a worker slot before assuming its holder is
    /// dead and minting a replacement.
    pub worker_replacement_timeout: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            sleep_when_all_empty: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(30),
            concurrent_workers: 8,
            worker_replacement_timeout: Duration::from_secs(600),
        }
    }
}

/// One queue the pump drains, bound to its handler.
///
/// Bindings are polled in list order with strictly descending priority: a
/// continuously populated queue starves every binding after it. That is by
/// design; fairness, if wanted, is layered above by the application.
pub struct QueueBinding<C, M> {
    pub queue_id: String,
    pub queue: Arc<dyn Queue>,
    pub handler: Arc<dyn Handler<C, M>>,
    /// Visibility granted to popped messages; must exceed the expected
    /// handler duration, or the message redelivers mid-flight.
    pub max_process_time: Duration,
    pub batch_size: usize,
}

/// Why the processing loop stopped.
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    #[error("processing loop cancelled")]
    Cancelled,
    /// A main-loop queue operation failed. Fatal: this is infrastructure
    /// trouble, not a bad message.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Multi-queue polling loop: one fiber polls in priority order, worker
/// tasks execute handlers concurrently under a semaphore.
///
/// Individual message failures never take down the batch: each worker is
/// fault-isolated and reports through the outcome sink. In-flight handlers
/// are not forcibly cancelled on shutdown; at-least-once delivery makes
/// letting them finish safe.
pub struct QueuePump<C, M> {
    config: PumpConfig,
    bindings: Vec<QueueBinding<C, M>>,
    context_factory: Arc<dyn Fn(&str, &QueueMessage) -> C + Send + Sync>,
    heartbeat: Arc<dyn Fn() + Send + Sync>,
    sink: Arc<dyn OutcomeSink>,
}

impl<C, M> QueuePump<C, M>
where
    C: Send + Sync + 'static,
    M: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    pub fn new(
        config: PumpConfig,
        bindings: Vec<QueueBinding<C, M>>,
        context_factory: impl Fn(&str, &QueueMessage) -> C + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            bindings,
            context_factory: Arc::new(context_factory),
            heartbeat: Arc::new(|| {}),
            sink: Arc::new(TracingSink),
        }
    }

    /// Invoke a callback at least every `heartbeat_interval` while the loop
    /// is alive.
    pub fn with_heartbeat(mut self, heartbeat: impl Fn() + Send + Sync + 'static) -> Self {
        self.heartbeat = Arc::new(heartbeat);
        self
    }

    pub fn with_outcome_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run until cancelled or a main-loop queue operation fails.
    ///
    /// Cancellation is observed at three points: before dispatching each
    /// queue, upon worker slot acquisition, and before starting each
    /// worker. Returns [`PumpError::Cancelled`] once the token is seen.
    pub async fn run(&self, token: CancellationToken) -> Result<(), PumpError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrent_workers));
        // `None` means the heartbeat has never fired, so the first
        // iteration always beats.
        let mut last_heartbeat: Option<Instant> = None;

        loop {
            let beat_due = last_heartbeat
                .is_none_or(|at| at.elapsed() >= self.config.heartbeat_interval);
            if beat_due {
                (self.heartbeat)();
                last_heartbeat = Some(Instant::now());
            }
            if token.is_cancelled() {
                return Err(PumpError::Cancelled);
            }

            let mut batch = None;
            for binding in &self.bindings {
                if token.is_cancelled() {
                    return Err(PumpError::Cancelled);
                }
                let messages = binding
                    .queue
                    .try_get_batch(binding.batch_size, binding.max_process_time)
                    .await?;
                if !messages.is_empty() {
                    batch = Some((binding, messages));
                    break;
                }
            }

            let Some((binding, messages)) = batch else {
                tokio::time::sleep(self.config.sleep_when_all_empty).await;
                continue;
            };

            tracing::trace!(
                queue = %binding.queue_id,
                count = messages.len(),
                "dispatching batch"
            );
            for message in messages {
                self.spawn_worker(binding, message, &semaphore, &token);
            }
        }
    }

    fn spawn_worker(
        &self,
        binding: &QueueBinding<C, M>,
        message: QueueMessage,
        semaphore: &Arc<Semaphore>,
        token: &CancellationToken,
    ) {
        let semaphore = semaphore.clone();
        let token = token.clone();
        let queue = binding.queue.clone();
        let handler = binding.handler.clone();
        let queue_id = binding.queue_id.clone();
        let context_factory = self.context_factory.clone();
        let sink = self.sink.clone();
        let replacement_timeout = self.config.worker_replacement_timeout;

        tokio::spawn(async move {
            let _permit = match tokio::time::timeout(
                replacement_timeout,
                semaphore.clone().acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return,
                Err(_) => {
                    // Slot holder presumed dead: mint a replacement so the
                    // pool does not shrink permanently.
                    tracing::warn!(
                        queue = %queue_id,
                        timeout_ms = replacement_timeout.as_millis() as u64,
                        "worker slot acquisition timed out, minting a fresh slot"
                    );
                    semaphore.add_permits(1);
                    match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    }
                }
            };
            if token.is_cancelled() {
                return;
            }
            let context = context_factory(&queue_id, &message);
            process_request(queue, handler, context, queue_id, message, sink).await;
        });
    }
}

/// Handle one popped message end to end: decode, invoke the handler, apply
/// the resulting queue effect, and report the outcome.
///
/// Every failure path deletes the message (fail-forward): retries are
/// modeled explicitly by transition functions, never by letting a message
/// redeliver after an error.
async fn process_request<C, M>(
    queue: Arc<dyn Queue>,
    handler: Arc<dyn Handler<C, M>>,
    context: C,
    queue_id: String,
    message: QueueMessage,
    sink: Arc<dyn OutcomeSink>,
) where
    C: Send + Sync,
    M: DeserializeOwned + Serialize + Send + Sync,
{
    let started = std::time::Instant::now();
    let pretty = message.pretty_print();
    let inserted = message.insertion_time();

    let envelope = match message.content::<M>() {
        Ok(envelope) => envelope,
        Err(err) => {
            delete_quietly(&*queue, &message, &queue_id).await;
            sink.record(RequestOutcome {
                queue_id,
                message: pretty,
                elapsed: started.elapsed(),
                inserted,
                kind: OutcomeKind::ParseError(err.to_string()),
            });
            return;
        }
    };

    let kind = match handler.handle(&context, envelope).await {
        Ok(effect) => {
            let label = effect.label();
            if let Err(err) = apply_effect(&*queue, &message, effect).await {
                tracing::warn!(
                    queue = %queue_id,
                    error = %err,
                    "failed to apply queue effect; message will redeliver"
                );
            }
            OutcomeKind::Processed { effect: label }
        }
        Err(HandlerError::Rejected(reason)) => {
            delete_quietly(&*queue, &message, &queue_id).await;
            OutcomeKind::Rejected(reason)
        }
        Err(HandlerError::Failed(err)) => {
            delete_quietly(&*queue, &message, &queue_id).await;
            OutcomeKind::HandlerFailure(format!("{err:#}"))
        }
    };

    sink.record(RequestOutcome {
        queue_id,
        message: pretty,
        elapsed: started.elapsed(),
        inserted,
        kind,
    });
}

async fn apply_effect<M: Serialize + Sync>(
    queue: &dyn Queue,
    message: &QueueMessage,
    effect: QueueEffect<M>,
) -> Result<(), QueueError> {
    match effect {
        QueueEffect::Delete => queue.delete(message).await,
        QueueEffect::PostAndDelete(next) => {
            queue.post_message(&next).await?;
            queue.delete(message).await
        }
        QueueEffect::ExtendVisibility(extension) => {
            queue.extend_visibility(message, extension).await
        }
        QueueEffect::Update(next, visibility) => {
            queue.update_message(message, &next, visibility).await
        }
    }
}

async fn delete_quietly(queue: &dyn Queue, message: &QueueMessage, queue_id: &str) {
    if let Err(err) = queue.delete(message).await {
        tracing::warn!(queue = %queue_id, error = %err, "failed to delete message");
    }
}
