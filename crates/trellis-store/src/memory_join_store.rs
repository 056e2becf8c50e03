use crate::join_store::{JoinStore, StoreError, MAX_CAS_ATTEMPTS};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use trellis_types::{JoinEntry, JoinId};

struct Versioned<M> {
    etag: u64,
    entry: JoinEntry<M>,
}

/// In-memory join store with the same optimistic-concurrency shape a
/// cloud-table implementation has.
///
/// Updates snapshot the entry, apply `f` outside the lock, and commit only
/// if the etag is unchanged; a lost race retries with a fresh snapshot.
/// Exercising the CAS loop here keeps engine code honest about `f` being
/// re-runnable.
pub struct InMemoryJoinStore<M> {
    entries: Mutex<HashMap<JoinId, Versioned<M>>>,
}

impl<M: Clone> InMemoryJoinStore<M> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of every entry, for diagnostics and scenario assertions.
    pub fn dump(&self) -> Vec<(JoinId, JoinEntry<M>)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, v)| (*id, v.entry.clone()))
            .collect()
    }
}

impl<M: Clone> Default for InMemoryJoinStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Clone + Send + Sync> JoinStore<M> for InMemoryJoinStore<M> {
    async fn add(&self, id: JoinId, entry: JoinEntry<M>) -> Result<(), StoreError> {
        let mut guard = self.entries.lock();
        if guard.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        guard.insert(id, Versioned { etag: 0, entry });
        Ok(())
    }

    async fn get(&self, id: &JoinId) -> Result<JoinEntry<M>, StoreError> {
        self.entries
            .lock()
            .get(id)
            .map(|v| v.entry.clone())
            .ok_or(StoreError::NotFound(*id))
    }

    async fn update(
        &self,
        id: &JoinId,
        f: &(dyn Fn(JoinEntry<M>) -> JoinEntry<M> + Sync),
    ) -> Result<JoinEntry<M>, StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let (etag, snapshot) = {
                let guard = self.entries.lock();
                let versioned = guard.get(id).ok_or(StoreError::NotFound(*id))?;
                (versioned.etag, versioned.entry.clone())
            };

            let mut next = f(snapshot);
            next.modified = Utc::now();

            let mut guard = self.entries.lock();
            match guard.get_mut(id) {
                Some(versioned) if versioned.etag == etag => {
                    versioned.etag += 1;
                    versioned.entry = next.clone();
                    return Ok(next);
                }
                // Lost the race; retry against the fresh entry.
                Some(_) => continue,
                None => return Err(StoreError::NotFound(*id)),
            }
        }
        Err(StoreError::Contention(*id))
    }
}
