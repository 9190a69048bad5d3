use libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::{Pid, getpgrp, getpid};
use std::os::unix::io::RawFd;
use thiserror::Error;
use tracing::debug;

pub mod terminal;
pub use terminal::TerminalState;

/// The controlling terminal is always looked up through stdin.
pub const SHELL_TERMINAL: RawFd = STDIN_FILENO;

/// Shell specific error types
#[derive(Error, Debug)]
pub enum YshError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipe: {0}")]
    Pipe(#[source] Errno),

    #[error("fork: {0}")]
    Fork(#[source] Errno),

    #[error("kill ({signal:?}) process group {pgid}: {source}")]
    Signal {
        signal: Signal,
        pgid: Pid,
        source: Errno,
    },

    #[error("tcsetpgrp {pgid}: {source}")]
    Terminal { pgid: Pid, source: Errno },

    #[error("waitpid: {0}")]
    Wait(#[source] Errno),

    #[error("{program}: {source}")]
    Exec { program: String, source: Errno },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Parse(String),

    #[error("file {path} does not exist.")]
    MissingInput { path: String },

    #[error("{path}: {source}")]
    Redirect {
        path: String,
        source: std::io::Error,
    },

    #[error("{builtin}: {spec}: no such job")]
    NoSuchJob { builtin: String, spec: String },
}

pub type YshResult<T> = std::result::Result<T, YshError>;

/// Process-wide facts about the running shell, captured once at startup.
#[derive(Debug, Clone)]
pub struct Context {
    pub shell_pid: Pid,
    pub shell_pgid: Pid,
    pub terminal: RawFd,
    pub terminal_state: TerminalState,
    job_control: bool,
}

impl Context {
    /// Job control is on only when it is allowed and stdin is a terminal
    /// whose modes were saved.
    pub fn new(shell_pid: Pid, shell_pgid: Pid, allow_job_control: bool) -> Self {
        let terminal_state = TerminalState::capture(SHELL_TERMINAL, STDOUT_FILENO);
        let job_control = allow_job_control && terminal_state.owns_input();
        Context {
            shell_pid,
            shell_pgid,
            terminal: SHELL_TERMINAL,
            terminal_state,
            job_control,
        }
    }

    pub fn detect(allow_job_control: bool) -> Self {
        let ctx = Context::new(getpid(), getpgrp(), allow_job_control);
        debug!(
            "CONTEXT_DETECT: pid={} pgid={} job_control={} prompt={}",
            ctx.shell_pid,
            ctx.shell_pgid,
            ctx.job_control,
            ctx.is_interactive_mode()
        );
        ctx
    }

    /// Whether jobs get their own process group and the terminal.
    pub fn supports_job_control(&self) -> bool {
        self.job_control
    }

    pub fn is_interactive_mode(&self) -> bool {
        self.terminal_state.wants_prompt()
    }
}
