use async_trait::async_trait;
use trellis_types::{JoinEntry, JoinId};

/// Upper bound on compare-and-swap attempts before an update is abandoned.
pub const MAX_CAS_ATTEMPTS: u32 = 64;

/// Errors from a join store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("join entry {0} already exists")]
    AlreadyExists(JoinId),
    #[error("join entry {0} not found")]
    NotFound(JoinId),
    #[error("update of join entry {0} abandoned after {MAX_CAS_ATTEMPTS} attempts")]
    Contention(JoinId),
    /// Transient backend failure (I/O, throttling, service error).
    #[error("join store backend failure: {0}")]
    Backend(String),
}

/// Atomic persistent storage for coordination entries.
///
/// `update` is the load-bearing operation: implementations read the entry,
/// apply the pure function `f`, and write back under optimistic concurrency
/// (an etag or equivalent). On a conflicting write the read-apply-write is
/// retried with a fresh snapshot, so `f` may run multiple times over a
/// drifted entry and must not carry side effects whose duplication matters.
/// Updates to the same id serialize; updates to distinct ids are
/// unconstrained.
#[async_trait]
pub trait JoinStore<M>: Send + Sync {
    /// Insert a new entry. Fails if the id already exists.
    async fn add(&self, id: JoinId, entry: JoinEntry<M>) -> Result<(), StoreError>;

    /// Fetch the current entry.
    async fn get(&self, id: &JoinId) -> Result<JoinEntry<M>, StoreError>;

    /// Atomic read-modify-write. Returns the post-image; implementations
    /// bump `modified` on every successful write.
    async fn update(
        &self,
        id: &JoinId,
        f: &(dyn Fn(JoinEntry<M>) -> JoinEntry<M> + Sync),
    ) -> Result<JoinEntry<M>, StoreError>;
}
