use nix::errno::Errno;
use nix::unistd::{ForkResult, Pid, fork, setpgid};
use std::io::Write;
use tracing::debug;
use ysh_types::{Context, YshError, YshResult};

use super::process::Process;

/// Fork one pipeline stage. The child never returns from here; the parent
/// records the pid. With job control the parent also joins the child to the
/// job's process group, as the child does itself, so neither can observe it
/// outside its group. Without job control every stage stays in the shell's
/// group and reads the terminal like the shell does.
pub(crate) fn fork_process(
    ctx: &Context,
    job_pgid: Option<Pid>,
    process: &mut Process,
    foreground: bool,
) -> YshResult<Pid> {
    debug!(
        "FORK: {} pgid: {:?}, foreground: {}",
        process.program(),
        job_pgid,
        foreground
    );

    // buffered output would otherwise be inherited and flushed by the child too
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    let pid = unsafe { fork() }.map_err(YshError::Fork)?;

    match pid {
        ForkResult::Parent { child } => {
            if ctx.supports_job_control() {
                let pgid = job_pgid.unwrap_or(child);
                match setpgid(child, pgid) {
                    // EACCES: the child already exec'd after joining, ESRCH: already reaped
                    Ok(()) | Err(Errno::EACCES) | Err(Errno::ESRCH) => {}
                    Err(err) => debug!("FORK: parent setpgid {} {} failed: {}", child, pgid, err),
                }
            }
            process.pid = Some(child);
            debug!("FORK: Parent process - child pid: {} pgid: {:?}", child, job_pgid);
            Ok(child)
        }
        ForkResult::Child => process.launch(
            job_pgid,
            ctx.supports_job_control(),
            foreground,
            ctx.terminal,
        ),
    }
}
