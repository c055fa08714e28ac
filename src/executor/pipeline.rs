use super::{PipelineStatus, Sinks, StageStatus, StderrScope};
use crate::error::{Diagnostic, ExecError};
use crate::parser::ast::*;
use crate::runtime::Runtime;
use os_pipe::{PipeReader, PipeWriter};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, warn};

/// Mode bits for files created by `>` and `>>`, before the umask.
const REDIRECT_FILE_MODE: u32 = 0o644;

enum Spawned {
    Child(Child),
    /// The stage never started; its status is already known.
    Failed(StageStatus),
}

/// Run every stage of `pipeline` concurrently, connected by pipes.
///
/// All stages are started before any is waited on, so data streams between
/// them. A program that cannot be found or executed is reported on the stderr
/// sink and gets a 127/126 status while its siblings run normally. Only a
/// failure to create pipes or processes aborts the pipeline, and even then
/// every child already started is reaped before returning.
pub fn execute_pipeline(
    pipeline: &Pipeline,
    runtime: &Runtime,
    sinks: &Sinks<'_>,
) -> Result<PipelineStatus, ExecError> {
    let stages = pipeline.stages();
    let count = stages.len();

    let mut readers: Vec<Option<PipeReader>> = Vec::with_capacity(count.saturating_sub(1));
    let mut writers: Vec<Option<PipeWriter>> = Vec::with_capacity(count.saturating_sub(1));
    for _ in 1..count {
        let (reader, writer) = os_pipe::pipe().map_err(ExecError::Pipe)?;
        readers.push(Some(reader));
        writers.push(Some(writer));
    }

    let mut children: Vec<(usize, Child)> = Vec::with_capacity(count);
    let mut statuses: Vec<Option<StageStatus>> = vec![None; count];
    let mut failure: Option<ExecError> = None;

    for (i, stage) in stages.iter().enumerate() {
        let piped_stdin = if i > 0 { readers[i - 1].take() } else { None };
        let piped_stdout = if i + 1 < count { writers[i].take() } else { None };

        match spawn_stage(stage, i + 1 == count, piped_stdin, piped_stdout, runtime, sinks) {
            Ok(Spawned::Child(child)) => children.push((i, child)),
            Ok(Spawned::Failed(status)) => statuses[i] = Some(status),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // Ends still held here belong to stages that never started. Closing them
    // lets the running neighbours see EOF or EPIPE instead of blocking.
    drop(readers);
    drop(writers);

    for (i, mut child) in children {
        match child.wait() {
            Ok(status) => statuses[i] = Some(StageStatus::from(status)),
            Err(source) => {
                warn!(program = stages[i].program(), error = %source, "wait failed");
                failure.get_or_insert(ExecError::Wait {
                    program: stages[i].program().to_string(),
                    source,
                });
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }

    let status = PipelineStatus {
        stages: statuses.into_iter().flatten().collect(),
    };
    debug!(stages = count, code = status.code(), "pipeline finished");
    Ok(status)
}

fn spawn_stage(
    stage: &Stage,
    is_last: bool,
    piped_stdin: Option<PipeReader>,
    piped_stdout: Option<PipeWriter>,
    runtime: &Runtime,
    sinks: &Sinks<'_>,
) -> Result<Spawned, ExecError> {
    let stdin = match (piped_stdin, &stage.input) {
        (Some(reader), _) => Stdio::from(reader),
        (None, Some(path)) => match File::open(runtime.resolve(path)) {
            Ok(file) => Stdio::from(file),
            Err(e) => return Ok(redirect_failed(path, &e, sinks)),
        },
        (None, None) => sinks.stdin.to_stdio(),
    };

    let stdout = match (piped_stdout, &stage.output) {
        (Some(writer), _) => Stdio::from(writer),
        (None, Some(redirect)) => match open_output(&runtime.resolve(&redirect.path), redirect.mode) {
            Ok(file) => Stdio::from(file),
            Err(e) => return Ok(redirect_failed(&redirect.path, &e, sinks)),
        },
        (None, None) => sinks.stdout.to_stdio().map_err(ExecError::Sink)?,
    };

    let stderr = if is_last || sinks.stderr_scope == StderrScope::AllStages {
        sinks.stderr.to_stdio().map_err(ExecError::Sink)?
    } else {
        Stdio::inherit()
    };

    let mut command = Command::new(stage.program());
    command.args(stage.args()).stdin(stdin).stdout(stdout).stderr(stderr);
    if let Some(cwd) = runtime.child_cwd() {
        command.current_dir(cwd);
    }

    match command.spawn() {
        Ok(child) => {
            debug!(program = stage.program(), pid = child.id(), "spawned");
            Ok(Spawned::Child(child))
        }
        Err(e) if is_not_found(&e) => {
            report(sinks, &Diagnostic::command_not_found(stage.program()));
            Ok(Spawned::Failed(StageStatus::NotFound))
        }
        Err(e) if is_not_executable(&e) => {
            report(sinks, &Diagnostic::not_executable(stage.program(), &e));
            Ok(Spawned::Failed(StageStatus::NotExecutable))
        }
        Err(source) => Err(ExecError::Fork {
            program: stage.program().to_string(),
            source,
        }),
    }
}

fn open_output(path: &Path, mode: OutputMode) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).mode(REDIRECT_FILE_MODE);
    match mode {
        OutputMode::Truncate => options.write(true).truncate(true),
        OutputMode::Append => options.append(true),
    };
    options.open(path)
}

fn redirect_failed(path: &str, err: &io::Error, sinks: &Sinks<'_>) -> Spawned {
    report(sinks, &Diagnostic::redirect_failed(path, err));
    Spawned::Failed(StageStatus::RedirectFailed)
}

fn report(sinks: &Sinks<'_>, diagnostic: &Diagnostic) {
    let written = sinks
        .stderr
        .writer()
        .and_then(|mut w| w.write_all(diagnostic.render().as_bytes()));
    if let Err(e) = written {
        warn!(error = %e, message = %diagnostic.message, "could not deliver diagnostic");
    }
}

fn is_not_found(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOENT) | Some(libc::ENOTDIR))
}

/// Errors from exec itself, as opposed to running out of processes or memory.
fn is_not_executable(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EACCES)
            | Some(libc::EPERM)
            | Some(libc::ENOEXEC)
            | Some(libc::EISDIR)
            | Some(libc::ELOOP)
            | Some(libc::ENAMETOOLONG)
            | Some(libc::E2BIG)
            | Some(libc::ETXTBSY)
    )
}
