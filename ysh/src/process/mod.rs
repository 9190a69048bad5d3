#![allow(clippy::module_inception)]

pub mod fork;
pub mod io;
pub mod job;
pub mod process;
pub mod redirect;
pub mod signal;
pub mod state;
pub mod wait;

pub use io::Endpoint;
pub use job::{Job, Launch, PipelineSpec, StageSpec};
pub use process::Process;
pub use redirect::Redirect;
pub use state::{JobStatus, ProcessState};
pub use wait::Reaped;
