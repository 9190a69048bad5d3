use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, error};
use ysh_types::{YshError, YshResult};

use super::state::ProcessState;

/// Outcome of one status query.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Reaped {
    Changed(Pid, ProcessState),
    /// A child reported something that carries no state (ptrace events).
    Ignored,
    /// Non-blocking query with nothing pending.
    StillAlive,
    /// ECHILD: nothing left to wait for.
    NoChildren,
}

pub(crate) fn state_from_wait_status(status: WaitStatus) -> Option<(Pid, ProcessState)> {
    match status {
        WaitStatus::Exited(pid, code) => {
            debug!("WAIT_PID_EXITED: Process {} exited with status: {}", pid, code);
            Some((pid, ProcessState::Completed(code as u8, None)))
        }
        WaitStatus::Signaled(pid, signal, core_dumped) => {
            debug!(
                "WAIT_PID_SIGNALED: Process {} killed by signal: {:?}, core_dumped: {}",
                pid, signal, core_dumped
            );
            let code = 128u8.wrapping_add(signal as i32 as u8);
            Some((pid, ProcessState::Completed(code, Some(signal))))
        }
        WaitStatus::Stopped(pid, signal) => {
            debug!("WAIT_PID_STOPPED: Process {} stopped by signal: {:?}", pid, signal);
            Some((pid, ProcessState::Stopped(signal)))
        }
        WaitStatus::Continued(pid) => {
            debug!("WAIT_PID_CONTINUED: Process {} continued", pid);
            Some((pid, ProcessState::Running))
        }
        status => {
            debug!("WAIT_PID_OTHER: {:?}", status);
            None
        }
    }
}

/// One `waitpid(-1, ...)` call, stop and continue reports included.
pub(crate) fn wait_any(block: bool) -> YshResult<Reaped> {
    let mut options = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    if !block {
        options |= WaitPidFlag::WNOHANG;
    }

    loop {
        return match waitpid(None, Some(options)) {
            Ok(WaitStatus::StillAlive) => Ok(Reaped::StillAlive),
            Ok(status) => Ok(match state_from_wait_status(status) {
                Some((pid, state)) => Reaped::Changed(pid, state),
                None => Reaped::Ignored,
            }),
            Err(Errno::ECHILD) => Ok(Reaped::NoChildren),
            Err(Errno::EINTR) => {
                debug!("WAIT: waitpid interrupted by signal (EINTR), continuing");
                continue;
            }
            Err(err) => {
                error!("WAIT: unexpected waitpid error: {}", err);
                Err(YshError::Wait(err))
            }
        };
    }
}
