use std::fmt::{self, Display, Formatter};

/// Lifecycle of a [`ScriptUnit`](crate::ScriptUnit).
///
/// `Running`, `Breaking` and `Aborting` form the busy family: while a unit is
/// in one of them it refuses `run`, `execute` and `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Ready,
    Running,
    Breaking,
    Aborting,
    Done,
    Aborted,
    Error,
}

impl ExecutionState {
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            ExecutionState::Running | ExecutionState::Breaking | ExecutionState::Aborting
        )
    }

    /// A run has concluded and the unit can be reset.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Done | ExecutionState::Aborted | ExecutionState::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Ready => "ready",
            ExecutionState::Running => "running",
            ExecutionState::Breaking => "breaking",
            ExecutionState::Aborting => "aborting",
            ExecutionState::Done => "done",
            ExecutionState::Aborted => "aborted",
            ExecutionState::Error => "error",
        }
    }
}

impl Display for ExecutionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
