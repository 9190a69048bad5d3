use nix::sys::termios::{Termios, tcgetattr};
use nix::unistd::isatty;
use std::os::unix::io::RawFd;
use tracing::{debug, warn};

/// What the shell saw on its standard streams at startup.
#[derive(Debug, Clone, Default)]
pub struct TerminalState {
    /// Modes of the terminal on stdin, put back whenever a job returns the
    /// terminal. `None` unless stdin is a terminal whose modes could be read.
    pub tmodes: Option<Termios>,
    /// stdout is a terminal as well.
    pub tty_output: bool,
}

impl TerminalState {
    pub fn capture(input: RawFd, output: RawFd) -> Self {
        let tmodes = match isatty(input) {
            Ok(true) => tcgetattr(input)
                .map_err(|err| warn!("TERMINAL: tcgetattr({}) failed: {}", input, err))
                .ok(),
            _ => None,
        };
        let tty_output = isatty(output).unwrap_or(false);
        debug!(
            "TERMINAL: fd {} modes saved: {}, fd {} tty: {}",
            input,
            tmodes.is_some(),
            output,
            tty_output
        );
        TerminalState { tmodes, tty_output }
    }

    /// A terminal the shell can hand to jobs and restore afterwards.
    pub fn owns_input(&self) -> bool {
        self.tmodes.is_some()
    }

    /// Show a prompt only when a person is on both ends.
    pub fn wants_prompt(&self) -> bool {
        self.owns_input() && self.tty_output
    }
}
