//! Error types for the rsh shell and server
//!
//! Parse and execution failures are typed with `thiserror`. Anything that is
//! shown to a user (terminal or remote client) goes through [`Diagnostic`],
//! which can be rendered as plain text or as a JSON object.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Process exit codes of the `rsh` binary.
pub mod exit_code {
    pub const OK: i32 = 0;
    /// Same code clap uses for usage errors.
    pub const BAD_ARGS: i32 = 2;
    pub const MEMORY: i32 = 3;
    pub const COMMUNICATION: i32 = 4;
}

/// Rejection of a request line. The connection always survives these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("error: piping limited to {limit} commands")]
    TooManyCommands { limit: usize },

    #[error("error: redirection syntax error")]
    RedirectionSyntax,

    #[error("error: command or arguments too big")]
    ArgsTooBig { limit: usize },

    #[error("error: command or arguments too big")]
    TokenTooBig { limit: usize },

    #[error("error: syntax error near '{text}'")]
    Syntax { text: String },
}

impl ParseError {
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::TooManyCommands { .. } => "TOO_MANY_COMMANDS",
            ParseError::RedirectionSyntax => "REDIRECTION_SYNTAX",
            ParseError::ArgsTooBig { .. } | ParseError::TokenTooBig { .. } => "CMD_OR_ARGS_TOO_BIG",
            ParseError::Syntax { .. } => "SYNTAX_ERROR",
        }
    }
}

/// Failure to set up a pipeline. Exec failures of individual programs are
/// not errors; they show up as a non-zero stage status instead.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("failed to fork '{program}': {source}")]
    Fork {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to attach output sink: {0}")]
    Sink(#[source] io::Error),
}

/// Top-level failures of the host program, each mapped to an exit code.
#[derive(Debug, Error)]
pub enum RshError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("memory allocation failed: {0}")]
    Memory(#[from] std::collections::TryReserveError),

    #[error("communication failure: {context}: {source}")]
    Communication {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl RshError {
    pub fn communication(context: impl Into<String>, source: io::Error) -> Self {
        RshError::Communication {
            context: context.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RshError::Config(_) => exit_code::BAD_ARGS,
            RshError::Memory(_) => exit_code::MEMORY,
            RshError::Communication { .. } => exit_code::COMMUNICATION,
        }
    }
}

/// Command context for execution diagnostics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandContext {
    /// Name of the program or built-in that failed
    pub command_name: String,
}

impl CommandContext {
    pub fn new(command_name: impl Into<String>) -> Self {
        Self {
            command_name: command_name.into(),
        }
    }
}

/// User-facing error, delivered on the same channel as command output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error code category
    pub error_code: String,
    /// Human-readable message, without trailing newline
    pub message: String,
    /// Status recorded for the request (what `rc` reports afterwards)
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_context: Option<CommandContext>,
}

impl Diagnostic {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            exit_code,
            command_context: None,
        }
    }

    pub fn with_command_context(mut self, command_context: CommandContext) -> Self {
        self.command_context = Some(command_context);
        self
    }

    /// The informational outcome of an empty request.
    pub fn no_commands() -> Self {
        Self::new("NO_COMMANDS", "warning: no commands provided", 0)
    }

    pub fn command_not_found(program: &str) -> Self {
        Self::new("COMMAND_NOT_FOUND", format!("rsh: {}: command not found", program), 127)
            .with_command_context(CommandContext::new(program))
    }

    pub fn not_executable(program: &str, err: &io::Error) -> Self {
        Self::new("NOT_EXECUTABLE", format!("rsh: {}: {}", program, err), 126)
            .with_command_context(CommandContext::new(program))
    }

    pub fn redirect_failed(path: &str, err: &io::Error) -> Self {
        Self::new("REDIRECT_FAILED", format!("rsh: {}: {}", path, err), 1)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error_code":"{}","message":"{}","exit_code":{}}}"#,
                self.error_code, self.message, self.exit_code
            )
        })
    }

    pub fn to_text(&self) -> String {
        self.message.clone()
    }

    /// One line in the format selected by `RSH_ERROR_FORMAT`.
    pub fn render(&self) -> String {
        let mut line = if should_output_json_errors() {
            self.to_json()
        } else {
            self.to_text()
        };
        line.push('\n');
        line
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(err: &ParseError) -> Self {
        Diagnostic::new(err.code(), err.to_string(), 1)
    }
}

/// Check if diagnostics should be emitted as JSON
///
/// Reads `RSH_ERROR_FORMAT`; any casing of "json" enables it.
pub fn should_output_json_errors() -> bool {
    std::env::var("RSH_ERROR_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false)
}
