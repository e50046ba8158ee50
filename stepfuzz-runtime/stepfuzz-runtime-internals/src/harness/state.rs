use std::fmt;

/// Where the driver is in handling an input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Waiting for an input, or the last input was skipped.
    Init,
    /// An input is executing. Outside `run_one` this is only seen after a harness defect
    /// panicked out of it.
    Running,
    /// The last input ran to its end, fatal errors included.
    Completed,
    /// The last input was aborted by the harness.
    Aborted,
}

impl State {
    pub fn is_init(&self) -> bool {
        matches!(self, State::Init)
    }

    /// True after `run_one` panicked on a harness defect; the harness should not be reused.
    pub fn is_running(&self) -> bool {
        matches!(self, State::Running)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, State::Completed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, State::Aborted)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Init => write!(f, "init"),
            State::Running => write!(f, "running"),
            State::Completed => write!(f, "completed"),
            State::Aborted => write!(f, "aborted"),
        }
    }
}
