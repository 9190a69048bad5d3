use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{debug, error};
use ysh_types::{Context, YshError, YshResult};

use super::fork::fork_process;
use super::io::{Endpoint, create_pipe};
use super::process::Process;
use super::signal::{send_signal, send_signal_to_group};
use super::state::{JobStatus, ProcessState};

/// One stage as delivered by the parser: the argument vector and its three
/// standard streams, already opened.
#[derive(Debug)]
pub struct StageSpec {
    pub argv: Vec<String>,
    pub stdin: Endpoint,
    pub stdout: Endpoint,
    pub stderr: Endpoint,
}

impl StageSpec {
    pub fn new(argv: Vec<String>) -> Self {
        StageSpec {
            argv,
            stdin: Endpoint::Inherit,
            stdout: Endpoint::Inherit,
            stderr: Endpoint::Inherit,
        }
    }
}

/// A parsed command line: at least one stage, plus the `&` flag.
#[derive(Debug)]
pub struct PipelineSpec {
    pub text: String,
    pub stages: Vec<StageSpec>,
    pub background: bool,
}

/// How far a pipeline got.
#[derive(Debug)]
pub enum Launch {
    Complete,
    /// The stages before the failing one are running and stay in the job.
    Partial(YshError),
}

#[derive(Debug)]
pub struct Job {
    pub cmd: String,
    /// Pid of the first stage. It names the job's process group only when
    /// the job was launched with job control.
    pub pgid: Option<Pid>,
    own_group: bool,
    pub(crate) processes: Vec<Process>,
    pub foreground: bool,
    /// Assigned by the job table; 0 until then.
    pub job_id: usize,
    /// Set once the user has been shown the current stop.
    pub notified: bool,
}

impl Job {
    pub fn new(cmd: String, foreground: bool) -> Self {
        Job {
            cmd,
            pgid: None,
            own_group: false,
            processes: Vec::new(),
            foreground,
            job_id: 0,
            notified: false,
        }
    }

    pub fn from_spec(spec: PipelineSpec) -> YshResult<Self> {
        if spec.stages.is_empty() {
            return Err(YshError::InvalidArgument("empty pipeline".to_string()));
        }
        let mut job = Job::new(spec.text, !spec.background);
        for stage in spec.stages {
            let process = Process::new(stage.argv)?.with_io(stage.stdin, stage.stdout, stage.stderr);
            job.set_process(process)?;
        }
        Ok(job)
    }

    /// Append a stage. Only allowed before launch.
    pub fn set_process(&mut self, process: Process) -> YshResult<()> {
        if self.pgid.is_some() {
            return Err(YshError::InvalidArgument(format!(
                "job '{}' already launched",
                self.cmd
            )));
        }
        self.processes.push(process);
        Ok(())
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Nothing running and at least one stage stopped.
    pub fn is_stopped(&self) -> bool {
        !self.has_running() && self.processes.iter().any(|p| p.state.is_stopped())
    }

    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(|p| p.state.is_completed())
    }

    pub fn has_running(&self) -> bool {
        self.processes.iter().any(|p| p.state.is_running())
    }

    pub fn status(&self) -> JobStatus {
        if self.is_completed() {
            JobStatus::Done
        } else if self.is_stopped() {
            JobStatus::Stopped
        } else {
            JobStatus::Running
        }
    }

    /// Exit code of the last stage, once it has completed.
    pub fn last_exit_code(&self) -> Option<u8> {
        match self.processes.last().map(|p| p.state) {
            Some(ProcessState::Completed(code, _)) => Some(code),
            _ => None,
        }
    }

    /// Signal that stopped the job, taken from its first stopped stage.
    pub fn stop_signal(&self) -> Option<Signal> {
        self.processes.iter().find_map(|p| match p.state {
            ProcessState::Stopped(signal) => Some(signal),
            _ => None,
        })
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.iter().any(|p| p.pid == Some(pid))
    }

    /// Record a status report for `pid`. Returns `None` when the pid is not
    /// part of this job, otherwise whether the state changed.
    pub(crate) fn apply(&mut self, pid: Pid, state: ProcessState) -> Option<bool> {
        let process = self.processes.iter_mut().find(|p| p.pid == Some(pid))?;
        if !process.set_state(state) {
            return Some(false);
        }
        match state {
            // the interactive stop was just seen by the user at the terminal
            ProcessState::Stopped(Signal::SIGTSTP) => self.notified = true,
            ProcessState::Running => self.notified = false,
            _ => {}
        }
        Some(true)
    }

    /// Stopped stages become Running again ahead of a SIGCONT.
    pub(crate) fn mark_running(&mut self) {
        for process in self.processes.iter_mut().filter(|p| p.state.is_stopped()) {
            process.set_state(ProcessState::Running);
        }
        self.notified = false;
    }

    /// Stages that can no longer be waited for are treated as failed.
    pub(crate) fn mark_lost(&mut self) {
        for process in self.processes.iter_mut().filter(|p| p.state.is_running()) {
            debug!(
                "JOB_PROCESS_LOST: job {} pid {:?} has no status left",
                self.job_id, process.pid
            );
            process.set_state(ProcessState::Completed(1, None));
        }
    }

    /// `[N]+   Status  command` line used by notifications and `jobs`.
    pub fn status_line(&self, current: bool, status: JobStatus) -> String {
        let marker = if current { '+' } else { '-' };
        format!("[{}]{}   {}  {}", self.job_id, marker, status, self.cmd)
    }

    /// Fork every stage left to right, wiring a pipe between neighbours.
    ///
    /// Failing on the first stage aborts the launch with every descriptor
    /// closed. Failing later keeps the stages already running.
    pub(crate) fn launch(&mut self, ctx: &Context) -> YshResult<Launch> {
        debug!(
            "JOB_LAUNCH_START: '{}' stages: {}, foreground: {}",
            self.cmd,
            self.processes.len(),
            self.foreground
        );

        self.own_group = ctx.supports_job_control();
        for index in 0..self.processes.len() {
            if let Err(err) = self.launch_stage(ctx, index) {
                for process in &mut self.processes[index..] {
                    process.close_endpoints();
                }
                if index == 0 {
                    error!("JOB_LAUNCH_ERROR: '{}': {}", self.cmd, err);
                    return Err(err);
                }
                error!(
                    "JOB_LAUNCH_PARTIAL: '{}' stopped at stage {}: {}",
                    self.cmd, index, err
                );
                self.processes.truncate(index);
                return Ok(Launch::Partial(err));
            }
        }

        debug!("JOB_LAUNCH_DONE: '{}' pgid {:?}", self.cmd, self.pgid);
        Ok(Launch::Complete)
    }

    fn launch_stage(&mut self, ctx: &Context, index: usize) -> YshResult<()> {
        if index + 1 < self.processes.len() {
            let pipe = create_pipe()?;
            self.processes[index].stdout.fill_inherited(pipe.write);
            self.processes[index + 1].stdin.fill_inherited(pipe.read);
        }

        let pgid = self.pgid;
        let foreground = self.foreground;
        let process = &mut self.processes[index];
        let pid = fork_process(ctx, pgid, process, foreground)?;
        process.close_endpoints();

        if self.pgid.is_none() {
            self.pgid = Some(pid);
        }
        Ok(())
    }

    /// SIGCONT the job. Without its own process group the stages share the
    /// shell's, so each one is signalled by pid.
    pub(crate) fn resume(&self) -> YshResult<()> {
        if self.own_group
            && let Some(pgid) = self.pgid
        {
            return send_signal_to_group(pgid, Signal::SIGCONT);
        }
        for process in self.processes.iter().filter(|p| !p.state.is_completed()) {
            if let Some(pid) = process.pid {
                send_signal(pid, Signal::SIGCONT).map_err(|source| YshError::Signal {
                    signal: Signal::SIGCONT,
                    pgid: pid,
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// SIGKILL every stage that has not completed.
    pub fn kill(&self) {
        for process in self.processes.iter().filter(|p| !p.state.is_completed()) {
            if let Some(pid) = process.pid
                && let Err(err) = send_signal(pid, Signal::SIGKILL)
            {
                error!("failed to kill {} ({}): {}", process.program(), pid, err);
            }
        }
    }
}
