pub mod job;
pub mod terminal;

use crate::builtin;
use crate::errors::display_user_error;
use crate::parser;
use crate::process::signal::ignore_job_control_signals;
use crate::process::wait::wait_any;
use crate::process::{Job, Launch, PipelineSpec, ProcessState, Reaped};
use anyhow::{Context as _, Result};
use job::JobTable;
use nix::unistd::Pid;
use std::io::Write;
use terminal::{ForegroundGuard, take_terminal, wait_for_foreground};
use tracing::{debug, warn};
use ysh_types::{Context, YshError};

pub const APP_NAME: &str = "ysh";

/// The job currently owning the terminal.
#[derive(Debug)]
enum Foreground {
    /// Launched from the command line, not numbered yet.
    Launched(Job),
    /// Brought back from the job table by `fg`.
    Tracked(usize),
}

pub struct Shell {
    pub(crate) ctx: Context,
    pub(crate) jobs: JobTable,
    foreground: Option<Foreground>,
    out: Box<dyn Write>,
    pub exited: Option<i32>,
    pub last_status: i32,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("pid", &self.ctx.shell_pid)
            .field("pgid", &self.ctx.shell_pgid)
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

impl Shell {
    pub fn new(ctx: Context, out: Box<dyn Write>) -> Self {
        Shell {
            ctx,
            jobs: JobTable::new(),
            foreground: None,
            out,
            exited: None,
            last_status: 0,
        }
    }

    /// Ignore the job-control signals and, with job control, move the shell
    /// into its own process group in the foreground of its terminal.
    pub fn set_signals(&mut self) -> Result<()> {
        let job_control = self.ctx.supports_job_control();
        // SIGTTIN must still stop us here
        if job_control {
            wait_for_foreground(self.ctx.terminal);
        }
        ignore_job_control_signals().context("failed to set signal dispositions")?;
        if job_control {
            let pgid = take_terminal(self.ctx.terminal).context("failed to take the terminal")?;
            self.ctx.shell_pgid = pgid;
        }
        debug!(
            "Signal handlers setup completed, job_control: {}",
            self.ctx.supports_job_control()
        );
        Ok(())
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn print_error(&self, err: &anyhow::Error) {
        display_user_error(err, false);
    }

    /// Parse and run one command line, then report finished and stopped
    /// jobs. Errors are reported here and never end the shell.
    pub fn run_line(&mut self, line: &str) -> Result<()> {
        match parser::parse_line(line) {
            Ok(Some(spec)) => {
                if self.execute(spec) {
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(err @ YshError::MissingInput { .. }) => {
                writeln!(self.out, "{}", err)?;
                self.last_status = 1;
            }
            Err(err) => {
                self.print_error(&err.into());
                self.last_status = 1;
            }
        }
        self.notify(false)
    }

    /// Run a builtin or submit a pipeline. Returns true when the notification
    /// pass must be skipped: `jobs` already ran it, and an exiting shell
    /// reports nothing.
    fn execute(&mut self, spec: PipelineSpec) -> bool {
        let Some((name, command)) = builtin::find(&spec) else {
            if let Err(err) = self.submit(spec) {
                self.print_error(&err);
                self.last_status = 1;
            }
            return false;
        };

        let argv = spec.stages[0].argv.clone();
        debug!("BUILTIN: {} {:?}", name, argv);
        let result = builtin::check_plain(name, &spec).and_then(|()| command(self, &argv));
        self.last_status = match result {
            Ok(()) => 0,
            Err(err) => {
                self.print_error(&err);
                1
            }
        };
        self.exited.is_some() || (name == "jobs" && self.last_status == 0)
    }

    /// Launch a parsed pipeline, then wait for it or track it in the
    /// background.
    pub fn submit(&mut self, spec: PipelineSpec) -> Result<()> {
        let mut job = Job::from_spec(spec)?;
        let launch = job.launch(&self.ctx)?;
        if let Launch::Partial(err) = launch {
            self.print_error(&anyhow::Error::new(err));
        }

        if job.foreground {
            self.foreground(Foreground::Launched(job), false)
        } else {
            let pgid = job.pgid.map_or(0, Pid::as_raw);
            let job_id = self.jobs.insert(job);
            self.jobs.set_recent(job_id);
            writeln!(self.out, "[{}]   {}", job_id, pgid)?;
            self.out.flush()?;
            Ok(())
        }
    }

    /// Apply every pending status report without blocking.
    pub fn poll(&mut self) -> Result<()> {
        loop {
            match wait_any(false)? {
                Reaped::Changed(pid, state) => self.apply(pid, state),
                Reaped::Ignored => continue,
                Reaped::StillAlive | Reaped::NoChildren => return Ok(()),
            }
        }
    }

    /// Reports for pids no tracked job owns belong to the job launched in
    /// the foreground.
    fn apply(&mut self, pid: Pid, state: ProcessState) {
        if self.jobs.apply(pid, state) {
            return;
        }
        if let Some(Foreground::Launched(job)) = self.foreground.as_mut()
            && job.apply(pid, state).is_some()
        {
            return;
        }
        debug!("WAIT: status {:?} for unknown pid {}", state, pid);
    }

    fn foreground_job_mut(&mut self) -> Option<&mut Job> {
        match self.foreground.as_mut()? {
            Foreground::Launched(job) => Some(job),
            Foreground::Tracked(job_id) => self.jobs.get_mut(*job_id),
        }
    }

    fn foreground_running(&mut self) -> bool {
        self.foreground_job_mut().is_some_and(|job| job.has_running())
    }

    /// Give `fg` the terminal, optionally continue it, and block until it has
    /// completed or stopped.
    fn foreground(&mut self, fg: Foreground, cont: bool) -> Result<()> {
        self.foreground = Some(fg);
        let result = self.wait_for(cont);
        if let Some(fg) = self.foreground.take() {
            self.settle(fg);
        }
        result
    }

    fn wait_for(&mut self, cont: bool) -> Result<()> {
        let pgid = self.foreground_job_mut().and_then(|job| job.pgid);
        let _guard = match ForegroundGuard::new(&self.ctx, pgid) {
            Ok(guard) => Some(guard),
            Err(err) => {
                warn!("WAIT: job stays in the background of the terminal: {}", err);
                None
            }
        };

        if cont && let Some(job) = self.foreground_job_mut() {
            continue_job(job);
        }

        while self.foreground_running() {
            match wait_any(true)? {
                Reaped::Changed(pid, state) => self.apply(pid, state),
                Reaped::Ignored | Reaped::StillAlive => {}
                Reaped::NoChildren => {
                    if let Some(job) = self.foreground_job_mut() {
                        job.mark_lost();
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    /// Decide what happens to the job that just left the foreground.
    fn settle(&mut self, fg: Foreground) {
        match fg {
            Foreground::Launched(mut job) => {
                if job.is_stopped() {
                    self.last_status = stop_status(&job).unwrap_or(self.last_status);
                    job.foreground = false;
                    let job_id = self.jobs.insert(job);
                    self.jobs.set_recent(job_id);
                } else if let Some(code) = job.last_exit_code() {
                    self.last_status = code as i32;
                }
            }
            Foreground::Tracked(job_id) => {
                let Some(job) = self.jobs.get_mut(job_id) else {
                    return;
                };
                job.foreground = false;
                if job.is_completed() {
                    if let Some(code) = job.last_exit_code() {
                        self.last_status = code as i32;
                    }
                    self.jobs.remove(job_id);
                } else if job.is_stopped() {
                    self.last_status = stop_status(job).unwrap_or(self.last_status);
                    self.jobs.set_recent(job_id);
                }
            }
        }
    }

    /// Poll, then report finished and newly stopped jobs.
    pub fn notify(&mut self, suppress: bool) -> Result<()> {
        self.poll()?;
        let foreground = match self.foreground {
            Some(Foreground::Tracked(job_id)) => Some(job_id),
            _ => None,
        };
        self.jobs.notify(&mut *self.out, suppress, foreground)?;
        Ok(())
    }

    /// `jobs`: every tracked job, then a silent notification pass so that
    /// finished jobs are not reported twice.
    pub fn list(&mut self) -> Result<()> {
        self.poll()?;
        self.jobs.list(&mut *self.out)?;
        self.notify(true)
    }

    fn lookup(&mut self, builtin: &str, spec: &str) -> Result<Option<usize>> {
        if let Some(job_id) = builtin::jobs::parse_job_spec(spec, &self.jobs) {
            return Ok(Some(job_id));
        }
        let spec = if spec.is_empty() { "current" } else { spec };
        let err = YshError::NoSuchJob {
            builtin: builtin.to_string(),
            spec: spec.to_string(),
        };
        writeln!(self.out, "-{}: {}", APP_NAME, err)?;
        self.out.flush()?;
        Ok(None)
    }

    /// Resume a tracked job in the foreground.
    pub fn fg(&mut self, spec: &str) -> Result<()> {
        let Some(job_id) = self.lookup("fg", spec)? else {
            return Ok(());
        };
        let Some(job) = self.jobs.get_mut(job_id) else {
            return Ok(());
        };
        if job.is_completed() {
            debug!("FG_CMD: job {} already done", job_id);
            return Ok(());
        }
        job.mark_running();
        job.foreground = true;
        let cmd = job.cmd.clone();
        writeln!(self.out, "{}", cmd)?;
        self.out.flush()?;
        debug!("FG_CMD_START: job {} '{}'", job_id, cmd);
        self.foreground(Foreground::Tracked(job_id), true)
    }

    /// Resume a tracked job in the background.
    pub fn bg(&mut self, spec: &str) -> Result<()> {
        let Some(job_id) = self.lookup("bg", spec)? else {
            return Ok(());
        };
        let Some(job) = self.jobs.get_mut(job_id) else {
            return Ok(());
        };
        if job.is_completed() {
            debug!("BG_CMD: job {} already done", job_id);
            return Ok(());
        }
        job.mark_running();
        let cmd = job.cmd.clone();
        writeln!(self.out, "{}", cmd)?;
        self.out.flush()?;
        debug!("BG_CMD_START: job {} '{}'", job_id, cmd);
        if let Some(job) = self.jobs.get(job_id) {
            continue_job(job);
        }
        self.jobs.set_recent(job_id);
        Ok(())
    }

    /// SIGKILL everything still tracked. Nothing is waited for.
    pub fn terminate_all(&mut self) {
        self.jobs.kill_all();
        if let Some(job) = self.foreground_job_mut() {
            job.kill();
        }
    }

    pub fn exit(&mut self, code: i32) {
        self.terminate_all();
        self.exited = Some(code);
    }
}

/// A job stopped in the foreground leaves 128 + the stop signal as the
/// line's status.
fn stop_status(job: &Job) -> Option<i32> {
    job.stop_signal().map(|signal| 128 + signal as i32)
}

/// A vanished job is reported and otherwise ignored.
fn continue_job(job: &Job) {
    if let Err(err) = job.resume() {
        display_user_error(&anyhow::Error::new(err), false);
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        if self.exited.is_none() {
            self.terminate_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{JobStatus, Process};
    use nix::sys::signal::Signal;
    use nix::unistd::{getpgrp, getpid};
    use std::sync::{Arc, Mutex};

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn take(&self) -> String {
            String::from_utf8(std::mem::take(&mut *self.0.lock().unwrap())).unwrap()
        }
    }

    fn new_shell() -> (Shell, Buffer) {
        let buffer = Buffer::default();
        let ctx = Context::new(getpid(), getpgrp(), false);
        (Shell::new(ctx, Box::new(buffer.clone())), buffer)
    }

    // above any pid_max, so the SIGKILL sent when the shell drops hits nothing
    const UNUSED_PID: i32 = 0x3fff_0000;

    fn job(cmd: &str, pid: i32) -> Job {
        let mut job = Job::new(cmd.to_string(), true);
        let mut process = Process::new(vec![cmd.to_string()]).unwrap();
        process.pid = Some(Pid::from_raw(pid));
        job.set_process(process).unwrap();
        job.pgid = Some(Pid::from_raw(pid));
        job
    }

    #[test]
    fn fg_and_bg_without_jobs() {
        init();
        let (mut shell, out) = new_shell();
        shell.fg("").unwrap();
        shell.bg("").unwrap();
        shell.bg("%2").unwrap();
        assert_eq!(
            out.take(),
            "-ysh: fg: current: no such job\n-ysh: bg: current: no such job\n-ysh: bg: %2: no such job\n"
        );
    }

    #[test]
    fn stopped_foreground_job_becomes_tracked() {
        init();
        let (mut shell, out) = new_shell();
        shell.foreground = Some(Foreground::Launched(job("vi", UNUSED_PID)));
        shell.apply(Pid::from_raw(UNUSED_PID), ProcessState::Stopped(Signal::SIGTSTP));
        let fg = shell.foreground.take().unwrap();
        shell.settle(fg);

        assert_eq!(shell.jobs.len(), 1);
        assert_eq!(shell.jobs.recent(), Some(1));
        let tracked = shell.jobs.get(1).unwrap();
        assert_eq!(tracked.status(), JobStatus::Stopped);
        assert!(!tracked.foreground);
        assert!(tracked.notified);
        assert_eq!(shell.last_status, 128 + Signal::SIGTSTP as i32);
        assert_eq!(out.take(), "");
    }

    #[test]
    fn finished_foreground_job_is_not_tracked() {
        init();
        let (mut shell, _out) = new_shell();
        shell.foreground = Some(Foreground::Launched(job("false", UNUSED_PID + 1)));
        shell.apply(Pid::from_raw(UNUSED_PID + 1), ProcessState::Completed(1, None));
        let fg = shell.foreground.take().unwrap();
        shell.settle(fg);
        assert!(shell.jobs.is_empty());
        assert_eq!(shell.last_status, 1);
    }

    #[test]
    fn tracked_job_finishing_in_foreground_is_removed_silently() {
        init();
        let (mut shell, out) = new_shell();
        let job_id = shell.jobs.insert(job("sleep 1 &", UNUSED_PID + 2));
        shell.jobs.set_recent(job_id);
        shell
            .jobs
            .apply(Pid::from_raw(UNUSED_PID + 2), ProcessState::Completed(0, None));
        shell.settle(Foreground::Tracked(job_id));
        assert!(shell.jobs.is_empty());
        assert_eq!(shell.jobs.recent(), None);
        assert_eq!(out.take(), "");
    }

    #[test]
    fn resuming_a_done_job_does_nothing() {
        init();
        let (mut shell, out) = new_shell();
        let job_id = shell.jobs.insert(job("true &", UNUSED_PID + 3));
        shell.jobs.set_recent(job_id);
        shell
            .jobs
            .apply(Pid::from_raw(UNUSED_PID + 3), ProcessState::Completed(0, None));
        shell.bg("").unwrap();
        shell.fg("").unwrap();
        assert_eq!(out.take(), "");
        assert_eq!(shell.jobs.len(), 1);
    }

    #[test]
    fn blank_and_invalid_lines_launch_nothing() {
        init();
        let (mut shell, out) = new_shell();
        shell.run_line("   \n").unwrap();
        assert_eq!(shell.last_status, 0);
        shell.run_line("ls |\n").unwrap();
        assert_eq!(shell.last_status, 1);
        assert!(shell.jobs.is_empty());
        assert_eq!(out.take(), "");
    }

    #[test]
    fn blank_and_invalid_lines_report_finished_jobs() {
        init();
        let (mut shell, out) = new_shell();
        for (line, pid) in [("\n", UNUSED_PID + 4), ("ls |\n", UNUSED_PID + 5)] {
            let job_id = shell.jobs.insert(job("sleep 1 &", pid));
            shell.jobs.set_recent(job_id);
            shell
                .jobs
                .apply(Pid::from_raw(pid), ProcessState::Completed(0, None));
            shell.run_line(line).unwrap();
            assert_eq!(out.take(), "[1]+   Done  sleep 1 &\n", "after {line:?}");
            assert!(shell.jobs.is_empty());
        }
    }

    #[test]
    fn builtin_with_redirection_is_rejected() {
        init();
        let (mut shell, out) = new_shell();
        let job_id = shell.jobs.insert(job("sleep 1 &", UNUSED_PID + 6));
        shell.jobs.set_recent(job_id);
        shell
            .jobs
            .apply(Pid::from_raw(UNUSED_PID + 6), ProcessState::Completed(0, None));

        shell.run_line("jobs > /dev/null").unwrap();
        assert_eq!(shell.last_status, 1);
        // the notification pass still runs, on the shell's own output
        assert_eq!(out.take(), "[1]+   Done  sleep 1 &\n");

        shell.run_line("fg &").unwrap();
        assert_eq!(shell.last_status, 1);
        assert_eq!(out.take(), "");
    }

    #[test]
    fn missing_input_is_reported_on_output() {
        init();
        let (mut shell, out) = new_shell();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        shell
            .run_line(&format!("cat < {}", missing.display()))
            .unwrap();
        assert_eq!(shell.last_status, 1);
        assert_eq!(
            out.take(),
            format!("file {} does not exist.\n", missing.display())
        );
    }

    #[test]
    fn exit_builtin_sets_code() {
        init();
        let (mut shell, _out) = new_shell();
        shell.run_line("exit 7").unwrap();
        assert_eq!(shell.exited, Some(7));

        let (mut shell, _out) = new_shell();
        shell.run_line("exit nope").unwrap();
        assert_eq!(shell.exited, None);
        assert_eq!(shell.last_status, 1);
    }
}
