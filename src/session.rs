//! One shell session: parse a request, run a built-in or a pipeline, and
//! report what the caller should do next.
//!
//! The same session type drives the local shell loop and each remote
//! connection; only the sinks differ.

use crate::builtins::{BuiltinOutcome, Builtins};
use crate::error::Diagnostic;
use crate::executor::{execute_pipeline, Sinks};
use crate::parser::parse;
use crate::runtime::Runtime;
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

/// Local prompt, shown only when stdin is a terminal.
pub const PROMPT: &str = "rsh> ";

/// What the caller must do once a request has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Close this session.
    Exit,
    /// Close this session and stop the server.
    Stop,
}

pub struct Session {
    runtime: Runtime,
    builtins: Builtins,
}

impl Session {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            builtins: Builtins::new(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Run one request line.
    ///
    /// Diagnostics and built-in output go to `out`. External programs write
    /// straight to `sinks`. An error means `out` itself failed, which the
    /// caller treats as a lost client.
    pub fn run_line(&mut self, line: &str, out: &mut dyn Write, sinks: &Sinks<'_>) -> io::Result<Outcome> {
        let pipeline = match parse(line) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                out.write_all(Diagnostic::no_commands().render().as_bytes())?;
                return Ok(Outcome::Continue);
            }
            Err(e) => {
                debug!(error = %e, "rejected request");
                let diagnostic = Diagnostic::from(&e);
                out.write_all(diagnostic.render().as_bytes())?;
                self.runtime.set_last_exit_code(diagnostic.exit_code);
                return Ok(Outcome::Continue);
            }
        };

        let first = pipeline.first();
        let outcome = match self.builtins.try_builtin(first, &mut self.runtime, out)? {
            BuiltinOutcome::NotBuiltin => None,
            BuiltinOutcome::Executed => Some(Outcome::Continue),
            BuiltinOutcome::ExitRequested => Some(Outcome::Exit),
            BuiltinOutcome::StopRequested => Some(Outcome::Stop),
        };
        if let Some(outcome) = outcome {
            if pipeline.len() > 1 {
                let diagnostic = Diagnostic::new(
                    "BUILTIN_IN_PIPELINE",
                    format!("rsh: {}: built-in cannot be piped, remaining commands ignored", first.program()),
                    self.runtime.get_last_exit_code(),
                );
                out.write_all(diagnostic.render().as_bytes())?;
            }
            return Ok(outcome);
        }

        out.flush()?;
        match execute_pipeline(&pipeline, &self.runtime, sinks) {
            Ok(status) => {
                debug!(stages = pipeline.len(), status = status.code(), "request complete");
                self.runtime.set_last_exit_code(status.code());
            }
            Err(e) => {
                warn!(error = %e, "pipeline aborted");
                let diagnostic = Diagnostic::new("EXEC_FAILED", format!("rsh: {}", e), 1);
                out.write_all(diagnostic.render().as_bytes())?;
                self.runtime.set_last_exit_code(diagnostic.exit_code);
            }
        }
        Ok(Outcome::Continue)
    }
}

/// The non-networked shell: read a line, run it against the terminal, repeat
/// until EOF or `exit`. Returns the status of the last pipeline.
pub fn run_local_loop<R: BufRead, W: Write>(
    session: &mut Session,
    mut input: R,
    mut out: W,
    interactive: bool,
) -> io::Result<i32> {
    let sinks = Sinks::terminal();
    let mut line = String::new();

    loop {
        if interactive {
            out.write_all(PROMPT.as_bytes())?;
            out.flush()?;
        }

        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => {
                if interactive {
                    writeln!(out)?;
                }
                break;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }

        let outcome = session.run_line(&line, &mut out, &sinks)?;
        out.flush()?;
        if outcome != Outcome::Continue {
            break;
        }
    }

    Ok(session.runtime().get_last_exit_code())
}
