use crate::join_id::JoinId;
use std::fmt;
use std::time::Duration;

/// One step of an agent: a declarative instruction to the engine.
///
/// Type parameters: `S` is the machine state, `R` the terminal result, `M`
/// the spawnable message type. Transition functions must be pure with
/// respect to everything except the current state; any side effect that
/// should be durably recorded is expressed as a variant here, never as an
/// ambient write.
///
/// `ForkAndGoto` and `Call` carry continuations because the join id they
/// need does not exist until the engine allocates it.
pub enum Transition<S, R, M> {
    /// Stay in the current state, pause for the duration.
    Sleep(Duration),
    /// Pause, then continue at the given state.
    SleepAndGoto(Duration, S),
    /// Move to the given state immediately.
    Goto(S),
    /// Terminal success.
    Return(R),
    /// Complete the current request and schedule `M` on the same queueing
    /// system (tail-call into another agent).
    Coreturn(M),
    /// Spawn one child per state, then continue at the state built from the
    /// freshly allocated fork id. The spawn list must be non-empty.
    ForkAndGoto(Vec<S>, Box<dyn FnOnce(JoinId) -> S + Send>),
    /// Suspend; resume at the given state once every child of the join has
    /// completed.
    WhenAll(JoinId, S),
    /// Suspend; resume at the given state on the join's first child
    /// completion.
    WhenAny(JoinId, S),
    /// Allocate a caller-side join, spawn the callee built from it, and
    /// suspend; resume at the given state when the callee returns.
    Call(Box<dyn FnOnce(JoinId) -> M + Send>, S),
}

impl<S, R, M> Transition<S, R, M> {
    /// Variant name for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sleep(_) => "Sleep",
            Self::SleepAndGoto(..) => "SleepAndGoto",
            Self::Goto(_) => "Goto",
            Self::Return(_) => "Return",
            Self::Coreturn(_) => "Coreturn",
            Self::ForkAndGoto(..) => "ForkAndGoto",
            Self::WhenAll(..) => "WhenAll",
            Self::WhenAny(..) => "WhenAny",
            Self::Call(..) => "Call",
        }
    }
}

impl<S, R, M> fmt::Debug for Transition<S, R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sleep(d) => write!(f, "Sleep({d:?})"),
            Self::SleepAndGoto(d, _) => write!(f, "SleepAndGoto({d:?}, _)"),
            Self::Goto(_) => write!(f, "Goto(_)"),
            Self::Return(_) => write!(f, "Return(_)"),
            Self::Coreturn(_) => write!(f, "Coreturn(_)"),
            Self::ForkAndGoto(states, _) => {
                write!(f, "ForkAndGoto({} children, _)", states.len())
            }
            Self::WhenAll(id, _) => write!(f, "WhenAll({id}, _)"),
            Self::WhenAny(id, _) => write!(f, "WhenAny({id}, _)"),
            Self::Call(..) => write!(f, "Call(_, _)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type T = Transition<u8, (), String>;

    #[test]
    fn names_match_variants() {
        let fork: T = Transition::ForkAndGoto(vec![1, 2], Box::new(|_| 0));
        assert_eq!(fork.name(), "ForkAndGoto");
        let sleep: T = Transition::Sleep(Duration::from_millis(5));
        assert_eq!(sleep.name(), "Sleep");
        let call: T = Transition::Call(Box::new(|_| String::new()), 3);
        assert_eq!(call.name(), "Call");
    }

    #[test]
    fn debug_reports_fork_width_without_rendering_states() {
        let fork: T = Transition::ForkAndGoto(vec![1, 2, 3], Box::new(|_| 0));
        assert_eq!(format!("{fork:?}"), "ForkAndGoto(3 children, _)");
    }
}
