use crate::error::EngineError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use trellis_store::{JoinStore, Queue, QueueError, QueueExt};
use trellis_types::{JoinEntry, JoinId};

type EmbedFn<S, M> = dyn Fn(Option<JoinId>, S) -> M + Send + Sync;

/// Per-invocation binding of an agent to a concrete queue, join store, and
/// embedding function.
///
/// `embed` rebuilds a spawnable message carrying the given metadata and
/// state into the same request variant the current agent was dispatched
/// from; it is the only place variant-specific knowledge enters the engine.
/// The telemetry hooks default to no-ops.
pub struct Scheduler<S, M> {
    queue: Arc<dyn Queue>,
    join_store: Arc<dyn JoinStore<M>>,
    embed: Arc<EmbedFn<S, M>>,
    on_in_process_sleep: Arc<dyn Fn(Duration) + Send + Sync>,
    on_goto: Arc<dyn Fn(&S) + Send + Sync>,
}

impl<S, M> Clone for Scheduler<S, M> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            join_store: self.join_store.clone(),
            embed: self.embed.clone(),
            on_in_process_sleep: self.on_in_process_sleep.clone(),
            on_goto: self.on_goto.clone(),
        }
    }
}

impl<S, M> Scheduler<S, M> {
    pub fn new(
        queue: Arc<dyn Queue>,
        join_store: Arc<dyn JoinStore<M>>,
        embed: impl Fn(Option<JoinId>, S) -> M + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue,
            join_store,
            embed: Arc::new(embed),
            on_in_process_sleep: Arc::new(|_| {}),
            on_goto: Arc::new(|_| {}),
        }
    }

    /// Observe in-process sleeps, for telemetry.
    pub fn with_sleep_hook(mut self, hook: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.on_in_process_sleep = Arc::new(hook);
        self
    }

    /// Observe state changes taken without leaving the process.
    pub fn with_goto_hook(mut self, hook: impl Fn(&S) + Send + Sync + 'static) -> Self {
        self.on_goto = Arc::new(hook);
        self
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    pub fn join_store(&self) -> &Arc<dyn JoinStore<M>> {
        &self.join_store
    }

    /// Build a spawnable message from metadata and state.
    pub fn embed(&self, metadata: Option<JoinId>, state: S) -> M {
        (self.embed)(metadata, state)
    }

    pub(crate) fn notify_in_process_sleep(&self, duration: Duration) {
        (self.on_in_process_sleep)(duration);
    }

    pub(crate) fn notify_goto(&self, state: &S) {
        (self.on_goto)(state);
    }
}

impl<S, M: Serialize + Sync> Scheduler<S, M> {
    /// Enqueue a spawnable message for immediate delivery.
    pub async fn spawn(&self, message: &M) -> Result<(), QueueError> {
        self.queue.post_message(message).await
    }

    /// Enqueue a spawnable message that becomes visible after `delay`.
    /// Applications use this for out-of-band retry patterns.
    pub async fn spawn_in(&self, message: &M, delay: Duration) -> Result<(), QueueError> {
        self.queue.post_message_delayed(message, delay).await
    }
}

/// Create a new request: allocate its [`JoinId`], durably record a
/// `Requested` entry for it, and return the spawnable message.
///
/// The entry must exist before the message is posted, so that a worker
/// picking the request up immediately can still complete it against the
/// store. Callers post the returned message themselves (typically via
/// [`Scheduler::spawn`]).
pub async fn create_request<S, M>(
    scheduler: &Scheduler<S, M>,
    state: S,
) -> Result<M, EngineError> {
    let request_id = JoinId::fresh();
    scheduler
        .join_store()
        .add(request_id, JoinEntry::requested(None))
        .await?;
    Ok(scheduler.embed(Some(request_id), state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio::time::advance;
    use trellis_store::{InMemoryJoinStore, InMemoryQueue};
    use trellis_types::JoinStatus;

    const VISIBILITY: Duration = Duration::from_secs(30);

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        metadata: Option<JoinId>,
        state: u32,
    }

    fn scheduler(
        queue: Arc<InMemoryQueue>,
        store: Arc<InMemoryJoinStore<Note>>,
    ) -> Scheduler<u32, Note> {
        Scheduler::new(queue, store, |metadata, state| Note { metadata, state })
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn spawn_posts_for_immediate_delivery() {
        let queue = Arc::new(InMemoryQueue::new("sched"));
        let store = Arc::new(InMemoryJoinStore::new());
        let scheduler = scheduler(queue.clone(), store);

        scheduler
            .spawn(&Note {
                metadata: None,
                state: 1,
            })
            .await
            .unwrap();

        let msg = queue.try_get_batch(1, VISIBILITY).await.unwrap().remove(0);
        assert_eq!(msg.content::<Note>().unwrap().state, 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn spawn_in_hides_the_message_until_the_delay_elapses() {
        let queue = Arc::new(InMemoryQueue::new("sched"));
        let store = Arc::new(InMemoryJoinStore::new());
        let scheduler = scheduler(queue.clone(), store);

        scheduler
            .spawn_in(
                &Note {
                    metadata: None,
                    state: 7,
                },
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        assert!(
            queue.try_get_batch(1, VISIBILITY).await.unwrap().is_empty(),
            "a delayed spawn must stay invisible until its delay elapses"
        );
        advance(Duration::from_secs(10)).await;
        let msg = queue.try_get_batch(1, VISIBILITY).await.unwrap().remove(0);
        assert_eq!(msg.content::<Note>().unwrap().state, 7);
    }

    #[test_log::test(tokio::test)]
    async fn create_request_records_a_requested_entry() {
        let queue = Arc::new(InMemoryQueue::new("sched"));
        let store = Arc::new(InMemoryJoinStore::new());
        let scheduler = scheduler(queue, store.clone());

        let message = create_request(&scheduler, 3).await.unwrap();

        let id = message.metadata.expect("request carries its join id");
        let entry = store.get(&id).await.unwrap();
        assert_eq!(entry.status, JoinStatus::Requested);
        assert_eq!(entry.parent, None);
        assert_eq!(message.state, 3);
    }
}
