use crate::join_id::JoinId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a coordination point.
///
/// Advancement is one-way: `Requested` → `Waiting` → `Completed`. A child
/// never moves backwards, which is what makes concurrent completion
/// propagation safe to retry under compare-and-swap drift.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinStatus {
    /// Created but not yet running.
    Requested,
    /// Has outstanding dependents.
    Waiting,
    /// Terminal.
    Completed,
}

impl JoinStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Position in the one-way lifecycle, used to reject regressions.
    fn rank(self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::Waiting => 1,
            Self::Completed => 2,
        }
    }
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "Requested"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// One child's observed status inside a parent entry.
///
/// Children are kept as an ordered list rather than a map: spawn order is
/// the fork's input list order, and subscriber notification follows
/// insertion order, so order is part of the contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildStatus {
    pub id: JoinId,
    pub status: JoinStatus,
}

/// Persisted record for one coordination point, keyed by its [`JoinId`].
///
/// `M` is the application's spawnable message type; subscriber lists hold
/// fully built messages ready to be posted the moment the join condition
/// holds. Entries live at least until their parent, if any, is `Completed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinEntry<M> {
    pub status: JoinStatus,
    pub children: Vec<ChildStatus>,
    pub parent: Option<JoinId>,
    /// Messages to post once every child is `Completed`. Fired at most once.
    pub when_all_subscribers: Vec<M>,
    /// Messages to post on the first child completion. Fired at most once;
    /// the whole list is cleared on the first trigger.
    pub when_any_subscribers: Vec<M>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl<M> JoinEntry<M> {
    /// Fresh entry for a request that has been created but not yet run.
    pub fn requested(parent: Option<JoinId>) -> Self {
        let now = Utc::now();
        Self {
            status: JoinStatus::Requested,
            children: Vec::new(),
            parent,
            when_all_subscribers: Vec::new(),
            when_any_subscribers: Vec::new(),
            created: now,
            modified: now,
        }
    }

    /// Fresh parent entry for a fork or call, waiting on the given children.
    ///
    /// Children start as `Requested` in the order given; that order is
    /// preserved for the lifetime of the entry.
    pub fn waiting_on(children: Vec<JoinId>) -> Self {
        let now = Utc::now();
        Self {
            status: JoinStatus::Waiting,
            children: children
                .into_iter()
                .map(|id| ChildStatus {
                    id,
                    status: JoinStatus::Requested,
                })
                .collect(),
            parent: None,
            when_all_subscribers: Vec::new(),
            when_any_subscribers: Vec::new(),
            created: now,
            modified: now,
        }
    }

    /// Status of a specific child, if it belongs to this entry.
    pub fn child_status(&self, id: &JoinId) -> Option<JoinStatus> {
        self.children
            .iter()
            .find(|c| c.id == *id)
            .map(|c| c.status)
    }

    /// Advance a child's status. Regressions are ignored: a `Completed`
    /// child stays `Completed` no matter what a drifted retry asks for.
    pub fn advance_child(&mut self, id: &JoinId, status: JoinStatus) {
        if let Some(child) = self.children.iter_mut().find(|c| c.id == *id) {
            if status.rank() > child.status.rank() {
                child.status = status;
            }
        }
    }

    /// WhenAll condition: every child has completed.
    pub fn all_children_completed(&self) -> bool {
        self.children.iter().all(|c| c.status.is_completed())
    }

    /// WhenAny condition: at least one child has completed.
    pub fn any_child_completed(&self) -> bool {
        self.children.iter().any(|c| c.status.is_completed())
    }
}
