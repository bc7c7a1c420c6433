//! The session state machine
//!
//! `constructed → initializing → running → shutting-down → terminated`.
//! All caller-visible operations are valid only in `running`; the guard
//! here is the single source of truth every other module consults before
//! doing wire work.

use lsp_support::Error;
use parking_lot::RwLock;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Initializing,
    Running,
    ShuttingDown,
    Terminated,
}

pub struct Lifecycle {
    state: RwLock<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Constructed),
        }
    }

    pub fn get(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Move to `Initializing`. Only legal from `Constructed`.
    pub fn begin_initializing(&self) -> Result<(), Error> {
        self.transition(LifecycleState::Constructed, LifecycleState::Initializing)
    }

    /// Move to `Running` once every binding is ready and every
    /// capability validator has passed.
    pub fn mark_running(&self) -> Result<(), Error> {
        self.transition(LifecycleState::Initializing, LifecycleState::Running)
    }

    /// Move to `ShuttingDown`, from either `Initializing` (a binding or
    /// capability failure during startup) or `Running` (scope exit / a
    /// fatal error).
    pub fn begin_shutdown(&self) -> Result<(), Error> {
        let mut state = self.state.write();
        match *state {
            LifecycleState::Initializing | LifecycleState::Running => {
                *state = LifecycleState::ShuttingDown;
                Ok(())
            }
            other => Err(Error::Internal(format!(
                "cannot begin shutdown from {other:?}"
            ))),
        }
    }

    pub fn mark_terminated(&self) -> Result<(), Error> {
        self.transition(LifecycleState::ShuttingDown, LifecycleState::Terminated)
    }

    /// Guard every caller-visible operation: only valid while `Running`.
    pub fn ensure_running(&self) -> Result<(), Error> {
        if self.get() == LifecycleState::Running {
            Ok(())
        } else {
            Err(Error::Terminated)
        }
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), Error> {
        let mut state = self.state.write();
        if *state != from {
            return Err(Error::Internal(format!(
                "illegal lifecycle transition: {:?} -> {:?} (currently {:?})",
                from, to, *state
            )));
        }
        *state = to;
        Ok(())
    }
}

impl std::fmt::Debug for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}
