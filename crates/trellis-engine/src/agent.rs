use crate::effect::QueueEffect;
use crate::error::EngineError;
use crate::scheduler::Scheduler;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use trellis_store::JoinStore;
use trellis_types::{ExecutionInstruction, JoinEntry, JoinId, JoinStatus, Transition};

/// A state machine pluggable into the engine.
///
/// The implementing value holds the request's context and input; only the
/// machine state `S` flows through the engine. The transition function
/// must be pure apart from reading `self`; durable side effects are
/// expressed as [`Transition`] variants, not performed inline.
#[async_trait]
pub trait Behavior: Send + Sync {
    type State: Clone + Send + Sync + 'static;
    type Outcome: Send + 'static;
    type Message: Clone + Serialize + Send + Sync + 'static;

    async fn transition(
        &self,
        state: Self::State,
    ) -> anyhow::Result<Transition<Self::State, Self::Outcome, Self::Message>>;
}

/// Which condition a suspension waits for.
#[derive(Copy, Clone)]
enum JoinCondition {
    All,
    Any,
}

/// Values drained out of a parent entry inside one atomic update.
struct FiredCapture<M> {
    was_completed: bool,
    fired: Vec<M>,
}

impl<M> Default for FiredCapture<M> {
    fn default() -> Self {
        Self {
            was_completed: false,
            fired: Vec::new(),
        }
    }
}

/// Drives a single request from its current state until the machine emits
/// an [`ExecutionInstruction`], issuing durability and fork/join side
/// effects along the way.
pub struct Agent<B: Behavior> {
    behavior: B,
    /// Sleeps shorter than this run on the in-process timer; longer sleeps
    /// release the worker slot and the queue lease instead.
    maximum_inprocess_sleep: Duration,
    scheduler: Scheduler<B::State, B::Message>,
}

impl<B: Behavior> Agent<B> {
    pub fn new(
        behavior: B,
        maximum_inprocess_sleep: Duration,
        scheduler: Scheduler<B::State, B::Message>,
    ) -> Self {
        Self {
            behavior,
            maximum_inprocess_sleep,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Scheduler<B::State, B::Message> {
        &self.scheduler
    }

    /// Advance the machine from `initial` until it yields an instruction.
    ///
    /// `metadata` is the request's own join id; its entry must already
    /// exist in the join store (see [`crate::create_request`]).
    pub async fn execute(
        &self,
        initial: B::State,
        metadata: JoinId,
    ) -> Result<ExecutionInstruction<B::State, B::Outcome, B::Message>, EngineError> {
        let mut state = initial;
        loop {
            let transition = self
                .behavior
                .transition(state.clone())
                .await
                .map_err(EngineError::Transition)?;
            tracing::trace!(request = %metadata, transition = transition.name(), "agent step");

            match transition {
                Transition::Sleep(duration) => {
                    if duration < self.maximum_inprocess_sleep {
                        self.scheduler.notify_in_process_sleep(duration);
                        tokio::time::sleep(duration).await;
                    } else {
                        return Ok(ExecutionInstruction::SleepAndResumeAt(duration, state));
                    }
                }
                Transition::SleepAndGoto(duration, next) => {
                    if duration < self.maximum_inprocess_sleep {
                        self.scheduler.notify_in_process_sleep(duration);
                        tokio::time::sleep(duration).await;
                        state = next;
                    } else {
                        return Ok(ExecutionInstruction::SleepAndResumeAt(duration, next));
                    }
                }
                Transition::Goto(next) => {
                    self.scheduler.notify_goto(&next);
                    state = next;
                }
                Transition::Return(result) => {
                    self.complete(metadata).await?;
                    return Ok(ExecutionInstruction::Completed(Some(result)));
                }
                Transition::Coreturn(message) => {
                    // The worker loop posts the message and deletes the
                    // current one; the request entry is intentionally left
                    // untouched.
                    return Ok(ExecutionInstruction::Coreturn(message));
                }
                Transition::ForkAndGoto(children, continuation) => {
                    if children.is_empty() {
                        return Err(EngineError::EmptyFork);
                    }
                    let fork_id = self.fork(children).await?;
                    state = continuation(fork_id);
                }
                Transition::WhenAll(join_id, next) => {
                    if self
                        .subscribe(join_id, metadata, next.clone(), JoinCondition::All)
                        .await?
                    {
                        state = next;
                    } else {
                        return Ok(ExecutionInstruction::Suspended);
                    }
                }
                Transition::WhenAny(join_id, next) => {
                    if self
                        .subscribe(join_id, metadata, next.clone(), JoinCondition::Any)
                        .await?
                    {
                        state = next;
                    } else {
                        return Ok(ExecutionInstruction::Suspended);
                    }
                }
                Transition::Call(build_callee, next) => {
                    self.call(metadata, build_callee, next).await?;
                    return Ok(ExecutionInstruction::Suspended);
                }
            }
        }
    }

    /// Translate an instruction into the queue effect the worker loop
    /// applies to the current message.
    pub fn effect_of(
        &self,
        metadata: JoinId,
        instruction: ExecutionInstruction<B::State, B::Outcome, B::Message>,
    ) -> QueueEffect<B::Message> {
        match instruction {
            ExecutionInstruction::Completed(_) | ExecutionInstruction::Suspended => {
                QueueEffect::Delete
            }
            ExecutionInstruction::Coreturn(message) => QueueEffect::PostAndDelete(message),
            ExecutionInstruction::SleepAndResume(duration) => {
                QueueEffect::ExtendVisibility(duration)
            }
            ExecutionInstruction::SleepAndResumeAt(duration, state) => {
                QueueEffect::Update(self.scheduler.embed(Some(metadata), state), duration)
            }
        }
    }

    /// [`Self::execute`] followed by [`Self::effect_of`]: the whole handler
    /// body for a dispatcher that does not inspect results.
    pub async fn run(
        &self,
        state: B::State,
        metadata: JoinId,
    ) -> Result<QueueEffect<B::Message>, EngineError> {
        let instruction = self.execute(state, metadata).await?;
        Ok(self.effect_of(metadata, instruction))
    }

    /// Spawn one child per state under a fresh fork entry.
    ///
    /// Persistence order is load-bearing: child entries first, then the
    /// parent entry, and only then the spawn messages. A fast child picked
    /// up the instant it is posted must find both its own entry and the
    /// parent it will propagate into.
    async fn fork(&self, children: Vec<B::State>) -> Result<JoinId, EngineError> {
        let store = self.scheduler.join_store();
        let fork_id = JoinId::fresh();

        let mut child_ids = Vec::with_capacity(children.len());
        let mut spawns = Vec::with_capacity(children.len());
        for child_state in children {
            let child_id = JoinId::fresh();
            store
                .add(child_id, JoinEntry::requested(Some(fork_id)))
                .await?;
            child_ids.push(child_id);
            spawns.push(self.scheduler.embed(Some(child_id), child_state));
        }

        store.add(fork_id, JoinEntry::waiting_on(child_ids)).await?;

        for message in &spawns {
            self.scheduler.spawn(message).await?;
        }
        tracing::debug!(fork = %fork_id, children = spawns.len(), "forked");
        Ok(fork_id)
    }

    /// Register interest in a join, or learn it is already satisfied.
    ///
    /// Returns `true` when the condition already holds and the agent should
    /// continue in-process. Otherwise the resume message is appended to the
    /// matching subscriber list inside the same atomic update that observed
    /// the unsatisfied condition, so a concurrent completion either sees
    /// the subscriber or happened before we looked, never neither.
    async fn subscribe(
        &self,
        join_id: JoinId,
        metadata: JoinId,
        next: B::State,
        condition: JoinCondition,
    ) -> Result<bool, EngineError> {
        let resume = self.scheduler.embed(Some(metadata), next);
        let satisfied = Mutex::new(false);
        self.scheduler
            .join_store()
            .update(&join_id, &|mut entry| {
                let met = match condition {
                    JoinCondition::All => entry.all_children_completed(),
                    JoinCondition::Any => entry.any_child_completed(),
                };
                *satisfied.lock() = met;
                if !met {
                    match condition {
                        JoinCondition::All => entry.when_all_subscribers.push(resume.clone()),
                        JoinCondition::Any => entry.when_any_subscribers.push(resume.clone()),
                    }
                }
                entry
            })
            .await?;
        let met = *satisfied.lock();
        Ok(met)
    }

    /// Allocate the caller-side join for a call, persist the callee's
    /// entry, queue the resume message as a subscriber, and spawn the
    /// callee. Same persistence-before-spawn rule as a fork.
    async fn call(
        &self,
        metadata: JoinId,
        build_callee: Box<dyn FnOnce(JoinId) -> B::Message + Send>,
        resume_at: B::State,
    ) -> Result<(), EngineError> {
        let store = self.scheduler.join_store();
        let caller_join = JoinId::fresh();
        let callee_id = JoinId::fresh();

        store
            .add(callee_id, JoinEntry::requested(Some(caller_join)))
            .await?;

        let mut entry = JoinEntry::waiting_on(vec![callee_id]);
        entry
            .when_all_subscribers
            .push(self.scheduler.embed(Some(metadata), resume_at));
        store.add(caller_join, entry).await?;

        let callee = build_callee(callee_id);
        self.scheduler.spawn(&callee).await?;
        tracing::debug!(caller_join = %caller_join, callee = %callee_id, "call issued");
        Ok(())
    }

    /// Mark the request completed and propagate up the parent chain.
    ///
    /// Each hop is one atomic update of the parent: advance the child,
    /// drain `when_any_subscribers` (first completion fires them), and if
    /// every child is now complete, mark the parent completed and drain
    /// `when_all_subscribers` too. Draining inside the update is what makes
    /// subscriber firing at-most-once under CAS drift. The climb continues
    /// only when the parent itself just transitioned to completed.
    async fn complete(&self, metadata: JoinId) -> Result<(), EngineError> {
        let store = self.scheduler.join_store();
        let completed = store
            .update(&metadata, &|mut entry| {
                entry.status = JoinStatus::Completed;
                entry
            })
            .await?;

        let mut child = metadata;
        let mut next_parent = completed.parent;
        while let Some(parent_id) = next_parent {
            let capture: Mutex<FiredCapture<B::Message>> = Mutex::new(FiredCapture::default());
            let post = store
                .update(&parent_id, &|mut entry| {
                    let was_completed = entry.status.is_completed();
                    entry.advance_child(&child, JoinStatus::Completed);
                    let mut fired = std::mem::take(&mut entry.when_any_subscribers);
                    if entry.all_children_completed() {
                        entry.status = JoinStatus::Completed;
                        fired.append(&mut entry.when_all_subscribers);
                    }
                    *capture.lock() = FiredCapture {
                        was_completed,
                        fired: fired.clone(),
                    };
                    entry
                })
                .await?;

            let FiredCapture {
                was_completed,
                fired,
            } = std::mem::take(&mut *capture.lock());
            for message in &fired {
                self.scheduler.spawn(message).await?;
            }
            if !fired.is_empty() {
                tracing::debug!(join = %parent_id, fired = fired.len(), "subscribers fired");
            }

            if !was_completed && post.status.is_completed() {
                child = parent_id;
                next_parent = post.parent;
            } else {
                break;
            }
        }
        Ok(())
    }
}
