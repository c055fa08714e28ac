pub mod pipeline;

pub use pipeline::execute_pipeline;

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::BorrowedFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

/// Where stage 0 reads from when it has no input redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Inherit,
    /// Remote sessions use this so children never read the server's terminal.
    Null,
}

impl Source {
    fn to_stdio(self) -> Stdio {
        match self {
            Source::Inherit => Stdio::inherit(),
            Source::Null => Stdio::null(),
        }
    }
}

/// Destination of the final stage's stdout, or of stderr.
#[derive(Debug, Clone, Copy)]
pub enum Sink<'a> {
    Inherit,
    /// Duplicated into every child that writes here, e.g. a client socket.
    Fd(BorrowedFd<'a>),
}

impl Sink<'_> {
    fn to_stdio(self) -> io::Result<Stdio> {
        match self {
            Sink::Inherit => Ok(Stdio::inherit()),
            Sink::Fd(fd) => Ok(Stdio::from(fd.try_clone_to_owned()?)),
        }
    }

    /// Writer for messages the executor produces itself.
    fn writer(self) -> io::Result<Box<dyn Write>> {
        match self {
            Sink::Inherit => Ok(Box::new(io::stderr())),
            Sink::Fd(fd) => Ok(Box::new(File::from(fd.try_clone_to_owned()?))),
        }
    }
}

/// Which stages write stderr to the stderr sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrScope {
    /// Interior stages inherit the parent's stderr.
    LastStage,
    AllStages,
}

/// How a pipeline is attached to the outside world.
#[derive(Debug, Clone, Copy)]
pub struct Sinks<'a> {
    pub stdin: Source,
    pub stdout: Sink<'a>,
    pub stderr: Sink<'a>,
    pub stderr_scope: StderrScope,
}

impl<'a> Sinks<'a> {
    /// Local shell: everything on the controlling terminal.
    pub fn terminal() -> Self {
        Self {
            stdin: Source::Inherit,
            stdout: Sink::Inherit,
            stderr: Sink::Inherit,
            stderr_scope: StderrScope::LastStage,
        }
    }

    /// Remote session: output and every stage's diagnostics go to the client.
    pub fn remote(socket: BorrowedFd<'a>) -> Self {
        Self {
            stdin: Source::Null,
            stdout: Sink::Fd(socket),
            stderr: Sink::Fd(socket),
            stderr_scope: StderrScope::AllStages,
        }
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Exited(i32),
    Signaled(i32),
    /// The program could not be located.
    NotFound,
    /// The program exists but could not be executed.
    NotExecutable,
    /// A redirection target could not be opened; the stage never started.
    RedirectFailed,
}

impl StageStatus {
    pub fn code(&self) -> i32 {
        match *self {
            StageStatus::Exited(code) => code,
            StageStatus::Signaled(signal) => 128 + signal,
            StageStatus::NotFound => 127,
            StageStatus::NotExecutable => 126,
            StageStatus::RedirectFailed => 1,
        }
    }
}

impl From<ExitStatus> for StageStatus {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => StageStatus::Exited(code),
            (None, Some(signal)) => StageStatus::Signaled(signal),
            (None, None) => StageStatus::Exited(1),
        }
    }
}

/// Per-stage statuses of a finished pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    stages: Vec<StageStatus>,
}

impl PipelineStatus {
    pub fn stages(&self) -> &[StageStatus] {
        &self.stages
    }

    /// Exit code of the pipeline: that of its last stage.
    pub fn code(&self) -> i32 {
        self.stages.last().map_or(0, StageStatus::code)
    }

    pub fn success(&self) -> bool {
        self.code() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_codes() {
        assert_eq!(StageStatus::Exited(3).code(), 3);
        assert_eq!(StageStatus::Signaled(9).code(), 137);
        assert_eq!(StageStatus::NotFound.code(), 127);
        assert_eq!(StageStatus::NotExecutable.code(), 126);
        assert_eq!(StageStatus::RedirectFailed.code(), 1);
    }

    #[test]
    fn test_pipeline_code_is_last_stage() {
        let status = PipelineStatus {
            stages: vec![StageStatus::NotFound, StageStatus::Exited(0)],
        };
        assert!(status.success());

        let status = PipelineStatus {
            stages: vec![StageStatus::Exited(0), StageStatus::Exited(2)],
        };
        assert_eq!(status.code(), 2);
        assert!(!status.success());
    }

    #[test]
    fn test_from_exit_status() {
        assert_eq!(StageStatus::from(ExitStatus::from_raw(0)), StageStatus::Exited(0));
        assert_eq!(StageStatus::from(ExitStatus::from_raw(1 << 8)), StageStatus::Exited(1));
        assert_eq!(StageStatus::from(ExitStatus::from_raw(libc::SIGKILL)), StageStatus::Signaled(9));
    }
}
