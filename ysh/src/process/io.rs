use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::unistd::{dup2, pipe};
use std::fs::File;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use tracing::debug;
use ysh_types::{YshError, YshResult};

/// One side of a stage's standard streams.
///
/// `Owned` descriptors are closed when the endpoint is dropped, so every
/// descriptor the shell opens is released exactly once whichever way a launch
/// ends.
#[derive(Debug, Default)]
pub enum Endpoint {
    #[default]
    Inherit,
    Owned(OwnedFd),
}

impl Endpoint {
    pub fn is_inherited(&self) -> bool {
        matches!(self, Endpoint::Inherit)
    }

    /// Descriptor the child should see on `default`'s slot.
    pub fn raw_fd_or(&self, default: RawFd) -> RawFd {
        match self {
            Endpoint::Inherit => default,
            Endpoint::Owned(fd) => fd.as_raw_fd(),
        }
    }

    /// Replace an inherited endpoint with `fd`. An explicit redirection wins,
    /// in which case `fd` is dropped (closed) right away.
    pub(crate) fn fill_inherited(&mut self, fd: OwnedFd) {
        if self.is_inherited() {
            *self = Endpoint::Owned(fd);
        } else {
            debug!("PIPE_OVERRIDDEN: redirection replaces pipe fd {}", fd.as_raw_fd());
        }
    }

    /// Release the parent's copy.
    pub(crate) fn close(&mut self) {
        if let Endpoint::Owned(fd) = std::mem::take(self) {
            debug!("CLOSE_FD: parent closes {}", fd.as_raw_fd());
            drop(fd);
        }
    }
}

impl From<File> for Endpoint {
    fn from(file: File) -> Self {
        Endpoint::Owned(file.into())
    }
}

impl From<OwnedFd> for Endpoint {
    fn from(fd: OwnedFd) -> Self {
        Endpoint::Owned(fd)
    }
}

#[derive(Debug)]
pub struct Pipe {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

/// Anonymous pipe whose ends are close-on-exec, so a child only ever keeps
/// the ends that were duplicated onto its standard streams.
pub(crate) fn create_pipe() -> YshResult<Pipe> {
    let (read, write) = pipe().map_err(YshError::Pipe)?;
    // SAFETY: pipe() just returned these descriptors and nothing else owns them.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) };
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(YshError::Pipe)?;
    }
    debug!(
        "PIPE_CREATED: read={} write={}",
        read.as_raw_fd(),
        write.as_raw_fd()
    );
    Ok(Pipe { read, write })
}

/// Child side: put `src` on `dst` and close the original.
pub(crate) fn copy_fd(src: Endpoint, dst: RawFd) -> nix::Result<()> {
    if let Endpoint::Owned(fd) = src {
        if fd.as_raw_fd() == dst {
            // already in place; keep it open
            let _ = fd.into_raw_fd();
        } else {
            dup2(fd.as_raw_fd(), dst)?;
        }
    }
    Ok(())
}
