//! Job control command handlers (jobs, fg, bg).

use crate::shell::Shell;
use crate::shell::job::JobTable;
use anyhow::Result;
use tracing::debug;

/// Parse a job specification (`%1`, `1`, `%+`, `%%`).
///
/// An empty spec and the `+`/`%` forms select the most recent job.
pub fn parse_job_spec(spec: &str, jobs: &JobTable) -> Option<usize> {
    let spec = spec.trim();
    let job_id = match spec {
        "" | "+" | "%" | "%+" | "%%" => jobs.recent()?,
        _ => {
            let job_num = spec.strip_prefix('%').unwrap_or(spec);
            job_num.parse::<usize>().ok()?
        }
    };
    jobs.get(job_id).map(|_| job_id)
}

fn job_spec(argv: &[String]) -> &str {
    argv.get(1).map(String::as_str).unwrap_or("")
}

/// Execute the `jobs` builtin command.
pub fn command(shell: &mut Shell, argv: &[String]) -> Result<()> {
    debug!("JOBS_CMD_START: {} tracked, args: {:?}", shell.jobs().len(), argv);
    shell.list()
}

/// Execute the `fg` builtin command.
///
/// Brings the selected job to the foreground and waits for it.
pub fn execute_fg(shell: &mut Shell, argv: &[String]) -> Result<()> {
    debug!("FG_CMD_START: {} tracked, args: {:?}", shell.jobs().len(), argv);
    shell.fg(job_spec(argv))
}

/// Execute the `bg` builtin command.
///
/// Resumes the selected job in the background.
pub fn execute_bg(shell: &mut Shell, argv: &[String]) -> Result<()> {
    debug!("BG_CMD_START: {} tracked, args: {:?}", shell.jobs().len(), argv);
    shell.bg(job_spec(argv))
}
