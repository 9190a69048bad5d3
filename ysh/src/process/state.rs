use nix::sys::signal::Signal;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProcessState {
    Running,
    Stopped(Signal),
    /// Exit code (128 + signal number when killed) and the terminating signal.
    Completed(u8, Option<Signal>),
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessState::Stopped(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ProcessState::Completed(_, _))
    }

    /// Whether a process in `self` may move to `next`. Completed is terminal.
    pub fn can_become(&self, next: &ProcessState) -> bool {
        !self.is_completed() && self != next
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ProcessState::Running => formatter.write_str("running"),
            ProcessState::Completed(_, signal) => match signal {
                Some(Signal::SIGKILL) => formatter.write_str("killed"),
                Some(Signal::SIGTERM) => formatter.write_str("terminated"),
                _ => formatter.write_str("done"),
            },
            ProcessState::Stopped(_) => formatter.write_str("stopped"),
        }
    }
}

/// Aggregate state of a whole job, as shown by `jobs` and notifications.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            JobStatus::Running => formatter.write_str("Running"),
            JobStatus::Stopped => formatter.write_str("Stopped"),
            JobStatus::Done => formatter.write_str("Done"),
        }
    }
}
