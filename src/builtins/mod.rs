use crate::parser::ast::Stage;
use crate::runtime::{Role, Runtime};
use std::collections::HashMap;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::debug;

mod dragon;

pub const EXIT_CMD: &str = "exit";
pub const CD_CMD: &str = "cd";
pub const STOP_SERVER_CMD: &str = "stop-server";
pub const DRAGON_CMD: &str = "dragon";
pub const RC_CMD: &str = "rc";

/// Confirmation sent before a session closes.
pub const EXIT_MSG: &str = "exiting...\n";
/// Confirmation sent before the server stops accepting.
pub const STOP_MSG: &str = "stopping server...\n";

/// What the caller must do after offering a stage to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOutcome {
    /// Not ours; run it as an external program.
    NotBuiltin,
    Executed,
    /// End this session once the confirmation is delivered.
    ExitRequested,
    /// End this session and shut the server down.
    StopRequested,
}

type BuiltinFn = fn(&Stage, &mut Runtime, &mut dyn Write) -> io::Result<BuiltinOutcome>;

#[derive(Clone)]
pub struct Builtins {
    commands: HashMap<&'static str, BuiltinFn>,
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

impl Builtins {
    pub fn new() -> Self {
        let mut commands: HashMap<&'static str, BuiltinFn> = HashMap::new();

        commands.insert(EXIT_CMD, builtin_exit);
        commands.insert(CD_CMD, builtin_cd);
        commands.insert(STOP_SERVER_CMD, builtin_stop_server);
        commands.insert(DRAGON_CMD, dragon::builtin_dragon);
        commands.insert(RC_CMD, builtin_rc);

        Self { commands }
    }

    /// Exact, case-sensitive match. `stop-server` only exists on a server.
    pub fn is_builtin(&self, name: &str, role: Role) -> bool {
        if name == STOP_SERVER_CMD && role != Role::Server {
            return false;
        }
        self.commands.contains_key(name)
    }

    /// Run `stage` in-process if it names a built-in. Output and diagnostics
    /// go to `out`; an error from `out` is a transport failure.
    pub fn try_builtin(
        &self,
        stage: &Stage,
        runtime: &mut Runtime,
        out: &mut dyn Write,
    ) -> io::Result<BuiltinOutcome> {
        if !self.is_builtin(stage.program(), runtime.role()) {
            return Ok(BuiltinOutcome::NotBuiltin);
        }
        let Some(func) = self.commands.get(stage.program()) else {
            return Ok(BuiltinOutcome::NotBuiltin);
        };
        debug!(builtin = stage.program(), "running built-in");
        func(stage, runtime, out)
    }
}

fn builtin_exit(_stage: &Stage, runtime: &mut Runtime, out: &mut dyn Write) -> io::Result<BuiltinOutcome> {
    out.write_all(EXIT_MSG.as_bytes())?;
    runtime.set_last_exit_code(0);
    Ok(BuiltinOutcome::ExitRequested)
}

fn builtin_stop_server(_stage: &Stage, runtime: &mut Runtime, out: &mut dyn Write) -> io::Result<BuiltinOutcome> {
    out.write_all(STOP_MSG.as_bytes())?;
    runtime.set_last_exit_code(0);
    Ok(BuiltinOutcome::StopRequested)
}

fn builtin_rc(_stage: &Stage, runtime: &mut Runtime, out: &mut dyn Write) -> io::Result<BuiltinOutcome> {
    writeln!(out, "{}", runtime.get_last_exit_code())?;
    Ok(BuiltinOutcome::Executed)
}

/// `cd` with no argument goes to `$HOME`. Failures are reported on `out` and
/// leave the session usable.
fn builtin_cd(stage: &Stage, runtime: &mut Runtime, out: &mut dyn Write) -> io::Result<BuiltinOutcome> {
    let target = match stage.args() {
        [] => match env::var_os("HOME").map(PathBuf::from).or_else(dirs::home_dir) {
            Some(home) => home,
            None => {
                writeln!(out, "cd: HOME not set")?;
                runtime.set_last_exit_code(1);
                return Ok(BuiltinOutcome::Executed);
            }
        },
        [path] => PathBuf::from(path),
        _ => {
            writeln!(out, "cd: too many arguments")?;
            runtime.set_last_exit_code(1);
            return Ok(BuiltinOutcome::Executed);
        }
    };

    match runtime.change_dir(&target) {
        Ok(()) => {
            debug!(cwd = %runtime.get_cwd().display(), "changed directory");
            runtime.set_last_exit_code(0);
        }
        Err(e) => {
            writeln!(out, "cd: {}: {}", target.display(), e)?;
            runtime.set_last_exit_code(1);
        }
    }
    Ok(BuiltinOutcome::Executed)
}
