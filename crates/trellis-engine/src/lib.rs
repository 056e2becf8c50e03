pub mod agent;
pub mod effect;
pub mod error;
pub mod handler;
pub mod outcome;
pub mod pump;
pub mod scheduler;

pub use agent::{Agent, Behavior};
pub use effect::QueueEffect;
pub use error::EngineError;
pub use handler::{Handler, HandlerError};
pub use outcome::{OutcomeKind, OutcomeSink, RequestOutcome, TracingSink};
pub use pump::{PumpConfig, PumpError, QueueBinding, QueuePump};
pub use scheduler::{create_request, Scheduler};
