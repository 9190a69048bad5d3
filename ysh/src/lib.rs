use crate::errors::display_user_error;
use crate::shell::Shell;
use anyhow::Result;
use clap::Parser;
use nix::unistd::{getpgrp, isatty, tcsetpgrp};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use ysh_types::{Context, SHELL_TERMINAL};

pub mod builtin;
pub mod errors;
pub mod parser;
pub mod process;
pub mod shell;

const PROMPT: &str = "# ";
const LOG_ENV: &str = "YSH_LOG";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run one command line, report finished jobs and exit
    #[arg(short, long)]
    pub command: Option<String>,

    /// Write debug logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Never take the terminal, even when stdin is one
    #[arg(long)]
    pub no_job_control: bool,
}

pub fn lib_main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("Failed to initialize tracing: {err}");
        return ExitCode::FAILURE;
    }

    setup_panic_handler(cli.log_file.clone());
    run_shell(cli)
}

pub fn run_shell(cli: Cli) -> ExitCode {
    // `-c` never takes the terminal from whoever started us
    let ctx = Context::detect(!cli.no_job_control && cli.command.is_none());
    let mut shell = Shell::new(ctx, Box::new(io::stdout()));
    if let Err(err) = shell.set_signals() {
        display_user_error(&err, true);
        return ExitCode::FAILURE;
    }
    debug!("start shell {:?}", shell);

    let code = if let Some(command) = cli.command.as_deref() {
        execute_command(&mut shell, command)
    } else {
        run_interactive(&mut shell)
    };
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// Log to `log_file` when given, otherwise to stderr filtered by `YSH_LOG`.
pub fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    match log_file {
        Some(path) => {
            let log_file = std::sync::Arc::new(std::fs::File::create(path)?);
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .with_file(true)
                .with_line_number(true)
                .with_writer(log_file)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        None => {
            let filter =
                EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("off"));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }
    Ok(())
}

pub fn setup_panic_handler(log_file: Option<PathBuf>) {
    std::panic::set_hook(Box::new(move |panic_info| {
        // a job may still own the terminal
        if isatty(SHELL_TERMINAL).unwrap_or(false) {
            let _ = tcsetpgrp(SHELL_TERMINAL, getpgrp());
        }

        let payload = panic_info.payload().downcast_ref::<&str>().map_or_else(
            || {
                if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic payload".to_string()
                }
            },
            |s| (*s).to_string(),
        );

        let location = panic_info.location().map_or_else(
            || "Unknown location".to_string(),
            |location| {
                format!(
                    "{}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                )
            },
        );

        let backtrace = std::backtrace::Backtrace::capture();
        let backtrace_str = match backtrace.status() {
            std::backtrace::BacktraceStatus::Captured => format!("\nBacktrace:\n{backtrace}"),
            _ => String::new(),
        };

        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC");
        let panic_log = format!(
            "\n=== PANIC OCCURRED ===\n\
            Timestamp: {timestamp}\n\
            Location: {location}\n\
            Message: {payload}{backtrace_str}\n\
            ======================\n"
        );

        if let Some(path) = log_file.as_ref()
            && let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
        {
            let _ = writeln!(file, "{panic_log}");
            let _ = file.flush();
        }

        tracing::error!("PANIC OCCURRED: {payload} at {location}");
        eprintln!("{panic_log}");
    }));
}

/// `-c`: one line, then a final notification pass.
pub fn execute_command(shell: &mut Shell, command: &str) -> i32 {
    debug!("run command mode {:?}", command);
    if let Err(err) = shell.run_line(command) {
        display_user_error(&err, true);
        return 1;
    }
    let code = shell.exited.unwrap_or(shell.last_status);
    shell.exit(code);
    code
}

/// Read-eval loop over stdin. The prompt is only shown on a terminal.
pub fn run_interactive(shell: &mut Shell) -> i32 {
    let interactive = shell.context().is_interactive_mode();
    debug!("Running in {} mode", if interactive { "interactive" } else { "pipe" });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    loop {
        if interactive {
            print!("{PROMPT}");
            let _ = io::stdout().flush();
        }

        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => {
                debug!("EOF on stdin");
                shell.exit(0);
                return 0;
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                eprintln!("Error reading input: {err}");
                shell.exit(1);
                return 1;
            }
        }

        // fg and bg must not pick a job that already finished
        if let Err(err) = shell.poll() {
            display_user_error(&err, true);
        }
        if let Err(err) = shell.run_line(&line) {
            display_user_error(&err, true);
        }
        if let Some(code) = shell.exited {
            debug!("exit {}", code);
            return code;
        }
    }
}
