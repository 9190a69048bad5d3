use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, kill, killpg, sigaction};
use nix::unistd::Pid;
use tracing::{debug, error};
use ysh_types::{YshError, YshResult};

use super::process::JOB_CONTROL_SIGNALS;

/// Ignore the job-control signals in the shell itself. SIGCHLD is left at its
/// default disposition: ignoring it would make the kernel reap children
/// before the shell can see their status.
pub(crate) fn ignore_job_control_signals() -> YshResult<()> {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    for signal in JOB_CONTROL_SIGNALS {
        if signal == Signal::SIGCHLD {
            continue;
        }
        unsafe { sigaction(signal, &action) }.map_err(|source| YshError::Signal {
            signal,
            pgid: Pid::from_raw(0),
            source,
        })?;
    }
    debug!("SIGNAL: job-control signals ignored in the shell");
    Ok(())
}

pub(crate) fn send_signal(pid: Pid, signal: Signal) -> nix::Result<()> {
    debug!("SIGNAL: Sending signal {:?} to pid {}", signal, pid);
    match kill(pid, signal) {
        Ok(_) => Ok(()),
        // already reaped
        Err(Errno::ESRCH) => {
            debug!("SIGNAL: pid {} is gone", pid);
            Ok(())
        }
        Err(e) => {
            error!(
                "SIGNAL: Failed to send signal {:?} to pid {}: {}",
                signal, pid, e
            );
            Err(e)
        }
    }
}

pub(crate) fn send_signal_to_group(pgid: Pid, signal: Signal) -> YshResult<()> {
    debug!("SIGNAL: Sending signal {:?} to process group {}", signal, pgid);
    killpg(pgid, signal).map_err(|source| {
        error!(
            "SIGNAL: Failed to send signal {:?} to process group {}: {}",
            signal, pgid, source
        );
        YshError::Signal {
            signal,
            pgid,
            source,
        }
    })
}
