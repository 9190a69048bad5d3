use libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::unistd::{Pid, execvp, getpid, setpgid, tcsetpgrp};
use std::ffi::CString;
use std::os::unix::io::RawFd;
use tracing::{debug, error};
use ysh_types::{YshError, YshResult};

use super::io::{Endpoint, copy_fd};
use super::state::ProcessState;

/// Signals the shell ignores for itself and every child must get back.
pub(crate) const JOB_CONTROL_SIGNALS: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGCHLD,
];

#[derive(Debug)]
pub struct Process {
    pub(crate) argv: Vec<String>,
    exec_argv: Vec<CString>,
    pub(crate) pid: Option<Pid>,
    pub(crate) state: ProcessState,
    pub stdin: Endpoint,
    pub stdout: Endpoint,
    pub stderr: Endpoint,
}

impl Process {
    pub fn new(argv: Vec<String>) -> YshResult<Self> {
        if argv.is_empty() {
            return Err(YshError::InvalidArgument("empty command".to_string()));
        }
        let exec_argv = argv
            .iter()
            .map(|a| CString::new(a.as_str()).map_err(|e| YshError::InvalidArgument(e.to_string())))
            .collect::<YshResult<Vec<CString>>>()?;

        Ok(Process {
            argv,
            exec_argv,
            pid: None,
            state: ProcessState::Running,
            stdin: Endpoint::Inherit,
            stdout: Endpoint::Inherit,
            stderr: Endpoint::Inherit,
        })
    }

    pub fn with_io(mut self, stdin: Endpoint, stdout: Endpoint, stderr: Endpoint) -> Self {
        self.stdin = stdin;
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Apply a reported transition. Returns false when the transition is not
    /// allowed (a late report for a completed process, or no change).
    pub(crate) fn set_state(&mut self, state: ProcessState) -> bool {
        if !self.state.can_become(&state) {
            debug!(
                "STATE_IGNORED: {} pid {:?} {:?} -> {:?}",
                self.program(),
                self.pid,
                self.state,
                state
            );
            return false;
        }
        debug!(
            "STATE_CHANGE: {} pid {:?} {:?} -> {:?}",
            self.program(),
            self.pid,
            self.state,
            state
        );
        self.state = state;
        true
    }

    /// Drop the parent's copies of the stage's descriptors.
    pub(crate) fn close_endpoints(&mut self) {
        self.stdin.close();
        self.stdout.close();
        self.stderr.close();
    }

    fn set_signals(&self) -> nix::Result<()> {
        // Accept job-control-related signals (refer https://www.gnu.org/software/libc/manual/html_node/Launching-Jobs.html)
        let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for signal in JOB_CONTROL_SIGNALS {
            unsafe { sigaction(signal, &action)? };
        }
        Ok(())
    }

    /// Runs in the forked child. With job control it joins the job's process
    /// group and takes the terminal when running in the foreground. Then it
    /// wires the standard streams and replaces the process image. Never
    /// returns.
    pub(crate) fn launch(
        &mut self,
        pgid: Option<Pid>,
        job_control: bool,
        foreground: bool,
        terminal: RawFd,
    ) -> ! {
        if job_control {
            let pid = getpid();
            let pgid = pgid.unwrap_or(pid);
            if let Err(err) = setpgid(pid, pgid) {
                debug!("child setpgid {} {} failed: {}", pid, pgid, err);
            }
            if foreground && let Err(err) = tcsetpgrp(terminal, pgid) {
                debug!("child tcsetpgrp {} failed: {}", pgid, err);
            }
        }
        if let Err(err) = self.set_signals() {
            error!("failed to restore signal dispositions: {}", err);
        }

        let wired = copy_fd(std::mem::take(&mut self.stdin), STDIN_FILENO)
            .and_then(|_| copy_fd(std::mem::take(&mut self.stdout), STDOUT_FILENO))
            .and_then(|_| copy_fd(std::mem::take(&mut self.stderr), STDERR_FILENO));
        if let Err(err) = wired {
            eprintln!("ysh: {}: dup2: {}", self.program(), err);
            unsafe { libc::_exit(1) };
        }

        let err = match execvp(&self.exec_argv[0], &self.exec_argv) {
            Ok(never) => match never {},
            Err(err) => err,
        };
        let code = match err {
            Errno::ENOENT => {
                eprintln!("ysh: {}: command not found", self.program());
                127
            }
            err => {
                eprintln!(
                    "ysh: {}",
                    YshError::Exec {
                        program: self.program().to_string(),
                        source: err,
                    }
                );
                126
            }
        };
        // _exit: the parent's buffered output must not be flushed twice
        unsafe { libc::_exit(code) }
    }
}
