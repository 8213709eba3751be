use std::fmt;

/// Lifecycle state of an [`Operation`](crate::operation::Operation).
///
/// Transitions are monotonic: `Ready -> Executing -> Finished`, or
/// `Ready/Executing -> Cancelled`. A cancelled operation is resolved to
/// `Finished` when the scheduler invokes its start contract, so `Finished` is
/// the only state chained consumers ever observe as "done".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Ready,
    Executing,
    Finished,
    Cancelled,
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::Ready => write!(f, "ready"),
            OperationState::Executing => write!(f, "executing"),
            OperationState::Finished => write!(f, "finished"),
            OperationState::Cancelled => write!(f, "cancelled"),
        }
    }
}
