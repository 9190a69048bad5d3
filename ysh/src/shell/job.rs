use crate::process::{Job, JobStatus, ProcessState};
use indexmap::IndexMap;
use nix::unistd::Pid;
use std::io::{self, Write};
use tracing::debug;

/// Jobs the user can still see: background jobs and stopped foreground jobs,
/// in the order they were numbered.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: IndexMap<usize, Job>,
    /// Highest job number held by a tracked job; the next job gets `current + 1`.
    current: usize,
    /// Target of a bare `fg`/`bg`.
    recent: Option<usize>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn recent(&self) -> Option<usize> {
        self.recent
    }

    pub(crate) fn set_recent(&mut self, job_id: usize) {
        if self.jobs.contains_key(&job_id) {
            self.recent = Some(job_id);
        }
    }

    pub fn get(&self, job_id: usize) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn get_mut(&mut self, job_id: usize) -> Option<&mut Job> {
        self.jobs.get_mut(&job_id)
    }

    /// Number `job` above every tracked job and start tracking it. Any
    /// number the job already carries is replaced.
    pub fn insert(&mut self, mut job: Job) -> usize {
        self.current += 1;
        job.job_id = self.current;
        let job_id = job.job_id;
        debug!("JOB_TABLE_INSERT: [{}] '{}'", job_id, job.cmd);
        self.jobs.insert(job_id, job);
        job_id
    }

    /// Stop tracking a job, moving the counter and the most recent job back
    /// to the newest remaining one when they pointed at it.
    pub fn remove(&mut self, job_id: usize) -> Option<Job> {
        let job = self.jobs.shift_remove(&job_id)?;
        if self.current == job_id {
            self.current = self.jobs.keys().copied().max().unwrap_or(0);
        }
        if self.recent == Some(job_id) {
            self.recent = (self.current != 0).then_some(self.current);
        }
        debug!(
            "JOB_TABLE_REMOVE: [{}] current={} recent={:?}",
            job_id, self.current, self.recent
        );
        Some(job)
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<usize> {
        self.jobs
            .iter()
            .find(|(_, job)| job.contains(pid))
            .map(|(job_id, _)| *job_id)
    }

    /// Record a status report. Returns false when no tracked job owns `pid`.
    pub(crate) fn apply(&mut self, pid: Pid, state: ProcessState) -> bool {
        let Some(job_id) = self.find_by_pid(pid) else {
            return false;
        };
        if let Some(job) = self.jobs.get_mut(&job_id)
            && job.apply(pid, state) == Some(true)
            && state.is_stopped()
        {
            self.recent = Some(job_id);
        }
        true
    }

    fn write_line(&self, out: &mut dyn Write, job: &Job, status: JobStatus) -> io::Result<()> {
        writeln!(
            out,
            "{}",
            job.status_line(self.recent == Some(job.job_id), status)
        )
    }

    /// Report and drop finished jobs, announce new stops.
    ///
    /// `foreground` is the job currently owning the terminal; its completion
    /// is reported by the foreground wait, never here.
    pub fn notify(
        &mut self,
        out: &mut dyn Write,
        suppress: bool,
        foreground: Option<usize>,
    ) -> io::Result<()> {
        let job_ids: Vec<usize> = self.jobs.keys().copied().collect();
        for job_id in job_ids {
            let Some(job) = self.jobs.get(&job_id) else {
                continue;
            };
            match job.status() {
                JobStatus::Done => {
                    if !suppress && foreground != Some(job_id) {
                        self.write_line(out, job, JobStatus::Done)?;
                    }
                    self.remove(job_id);
                }
                JobStatus::Stopped if !job.notified => {
                    if !suppress {
                        self.write_line(out, job, JobStatus::Stopped)?;
                    }
                    if let Some(job) = self.jobs.get_mut(&job_id) {
                        job.notified = true;
                    }
                }
                _ => {}
            }
        }
        out.flush()
    }

    /// One line per tracked job, whatever its state.
    pub fn list(&self, out: &mut dyn Write) -> io::Result<()> {
        for job in self.jobs.values() {
            self.write_line(out, job, job.status())?;
        }
        out.flush()
    }

    /// SIGKILL every tracked process.
    pub fn kill_all(&self) {
        for job in self.jobs.values() {
            debug!("JOB_TABLE_KILL: [{}] '{}'", job.job_id, job.cmd);
            job.kill();
        }
    }
}
