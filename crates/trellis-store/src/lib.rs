pub mod join_store;
pub mod memory_join_store;
pub mod memory_queue;
pub mod message;
pub mod queue;

pub use join_store::{JoinStore, StoreError, MAX_CAS_ATTEMPTS};
pub use memory_join_store::InMemoryJoinStore;
pub use memory_queue::InMemoryQueue;
pub use message::{ContentError, QueueMessage};
pub use queue::{Queue, QueueError, QueueExt};
