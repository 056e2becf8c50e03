pub mod envelope;
pub mod instruction;
pub mod join_entry;
pub mod join_id;
pub mod transition;

pub use envelope::{Envelope, Stateful};
pub use instruction::ExecutionInstruction;
pub use join_entry::{ChildStatus, JoinEntry, JoinStatus};
pub use join_id::JoinId;
pub use transition::Transition;
