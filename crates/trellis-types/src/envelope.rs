use crate::join_id::JoinId;
use serde::{Deserialize, Serialize};

/// Queue payload wrapping a tagged request with scheduling metadata.
///
/// `metadata` is the owning join id when the request participates in the
/// durable state machinery; plain fire-and-forget messages carry `None`.
/// `header` is one application-defined type shared by every request variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<H, T> {
    pub metadata: Option<JoinId>,
    pub header: H,
    pub request: T,
}

impl<H, T> Envelope<H, T> {
    pub fn new(metadata: Option<JoinId>, header: H, request: T) -> Self {
        Self {
            metadata,
            header,
            request,
        }
    }
}

/// The common embedded record held by every stateful request variant.
///
/// Stateful variants pair the immutable request input with the machine's
/// current state; the engine rebuilds the variant with a new `state` on
/// every durable step. Stateless variants are terminal leaves and do not
/// use this record. Applications expose one match arm per variant to
/// extract and rebuild, with no runtime type introspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stateful<I, S> {
    pub input: I,
    pub state: S,
}

impl<I, S> Stateful<I, S> {
    pub fn new(input: I, state: S) -> Self {
        Self { input, state }
    }

    /// Rebuild with a different state, keeping the input.
    pub fn with_state(self, state: S) -> Self {
        Self {
            input: self.input,
            state,
        }
    }
}
