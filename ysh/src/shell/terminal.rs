use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::sys::termios::{SetArg, Termios, tcsetattr};
use nix::unistd::{Pid, getpgrp, getpid, setpgid, tcgetpgrp, tcsetpgrp};
use std::os::unix::io::RawFd;
use tracing::{debug, warn};
use ysh_types::{Context, YshError, YshResult};

/// Hands the terminal to a job's process group for as long as it lives and
/// gives it back to the shell, with the shell's terminal modes, on drop.
#[derive(Debug)]
pub(crate) struct ForegroundGuard {
    terminal: Option<RawFd>,
    shell_pgid: Pid,
    shell_tmodes: Option<Termios>,
}

impl ForegroundGuard {
    /// A guard that does nothing when job control is off.
    pub(crate) fn new(ctx: &Context, pgid: Option<Pid>) -> YshResult<Self> {
        let guard = ForegroundGuard {
            terminal: ctx.supports_job_control().then_some(ctx.terminal),
            shell_pgid: ctx.shell_pgid,
            shell_tmodes: ctx.terminal_state.tmodes.clone(),
        };
        if let (Some(fd), Some(pgid)) = (guard.terminal, pgid) {
            debug!("TERMINAL: handing fd {} to pgid {}", fd, pgid);
            tcsetpgrp(fd, pgid).map_err(|source| YshError::Terminal { pgid, source })?;
        }
        Ok(guard)
    }
}

impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        let Some(fd) = self.terminal else {
            return;
        };
        if let Err(err) = tcsetpgrp(fd, self.shell_pgid) {
            warn!("TERMINAL: failed to reclaim terminal for {}: {}", self.shell_pgid, err);
        }
        if let Some(tmodes) = self.shell_tmodes.as_ref()
            && let Err(err) = tcsetattr(fd, SetArg::TCSADRAIN, tmodes)
        {
            warn!("TERMINAL: failed to restore terminal modes: {}", err);
        }
        debug!("TERMINAL: reclaimed fd {} for pgid {}", fd, self.shell_pgid);
    }
}

/// Block until the shell's process group is in the foreground of `fd`.
pub(crate) fn wait_for_foreground(fd: RawFd) {
    loop {
        let pgrp = getpgrp();
        match tcgetpgrp(fd) {
            Ok(owner) if owner == pgrp => return,
            Ok(owner) => {
                debug!("TERMINAL: pgid {} is in the background of {}", pgrp, owner);
                // stops us until someone puts us in the foreground
                if let Err(err) = killpg(pgrp, Signal::SIGTTIN) {
                    warn!("TERMINAL: SIGTTIN to own group failed: {}", err);
                    return;
                }
            }
            Err(err) => {
                warn!("TERMINAL: tcgetpgrp({}) failed: {}", fd, err);
                return;
            }
        }
    }
}

/// Put the shell in its own process group and give that group the terminal.
/// SIGTTOU has to be ignored by now.
pub(crate) fn take_terminal(fd: RawFd) -> YshResult<Pid> {
    let pid = getpid();
    match setpgid(pid, pid) {
        // a session leader is already its own group
        Ok(()) | Err(Errno::EPERM) => {}
        Err(source) => return Err(YshError::Terminal { pgid: pid, source }),
    }
    let pgid = getpgrp();
    tcsetpgrp(fd, pgid).map_err(|source| YshError::Terminal { pgid, source })?;
    debug!("TERMINAL: shell pgid {} owns fd {}", pgid, fd);
    Ok(pgid)
}
