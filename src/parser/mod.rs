pub mod ast;

use crate::error::ParseError;
use crate::lexer::{Lexer, LexerError, Token};
use ast::*;
use tracing::debug;

/// Maximum number of pipe-separated stages in one request.
pub const MAX_STAGES: usize = 8;

/// A stage with this many tokens (program included) or more is rejected.
pub const MAX_ARGS: usize = 32;

/// Longest accepted program name, in bytes.
pub const MAX_EXE_LEN: usize = 64;

/// Longest accepted argument, in bytes.
pub const MAX_ARG_LEN: usize = 256;

/// Parse one request line into a pipeline.
///
/// `Ok(None)` is the "no commands" outcome: the line held no words at all,
/// only whitespace and pipe characters. It is informational, not an error.
pub fn parse(line: &str) -> Result<Option<Pipeline>, ParseError> {
    let tokens = Lexer::tokenize(line.trim()).map_err(|e| match e {
        LexerError::InvalidToken { text, .. } => ParseError::Syntax { text },
    })?;

    if !tokens.iter().any(Token::is_word) {
        return Ok(None);
    }

    let segments: Vec<&[Token]> = tokens.split(|t| *t == Token::Pipe).collect();
    if segments.len() > MAX_STAGES {
        return Err(ParseError::TooManyCommands { limit: MAX_STAGES });
    }

    let mut stages = Vec::with_capacity(segments.len());
    for segment in segments {
        match parse_stage(segment)? {
            Some(stage) => stages.push(stage),
            None => debug!("skipping stage with no command"),
        }
    }

    let last = stages.len().saturating_sub(1);
    for (i, stage) in stages.iter_mut().enumerate() {
        if i > 0 {
            if let Some(path) = stage.input.take() {
                debug!(stage = i, path = %path, "pipe overrides input redirection");
            }
        }
        if i < last {
            if let Some(redirect) = stage.output.take() {
                debug!(stage = i, path = %redirect.path, "pipe overrides output redirection");
            }
        }
    }

    Ok(Pipeline::from_stages(stages))
}

/// Parse the tokens between two pipes. Redirection markers and their
/// filenames never reach the argument vector.
fn parse_stage(tokens: &[Token]) -> Result<Option<Stage>, ParseError> {
    let mut argv: Vec<String> = Vec::new();
    let mut input: Option<String> = None;
    let mut truncate: Option<String> = None;
    let mut append: Option<String> = None;

    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        let slot = match token {
            Token::Word(word) => {
                let limit = if argv.is_empty() { MAX_EXE_LEN } else { MAX_ARG_LEN };
                if word.len() > limit {
                    return Err(ParseError::TokenTooBig { limit });
                }
                argv.push(word.clone());
                continue;
            }
            Token::RedirectIn => &mut input,
            Token::RedirectOut => &mut truncate,
            Token::Append => &mut append,
            // segments are already split on pipes
            Token::Pipe => continue,
        };

        let target = match iter.next() {
            Some(Token::Word(target)) => target.clone(),
            _ => return Err(ParseError::RedirectionSyntax),
        };
        if slot.is_none() {
            *slot = Some(target);
        } else {
            debug!(path = %target, "ignoring repeated redirection");
        }
    }

    if argv.len() >= MAX_ARGS {
        return Err(ParseError::ArgsTooBig { limit: MAX_ARGS });
    }

    let Some(mut stage) = Stage::new(argv) else {
        return Ok(None);
    };

    if let Some(path) = input {
        stage = stage.with_input(path);
    }
    match (append, truncate) {
        (Some(path), truncated) => {
            if let Some(ignored) = truncated {
                debug!(path = %ignored, "append redirection takes precedence");
            }
            stage = stage.with_output(path, OutputMode::Append);
        }
        (None, Some(path)) => stage = stage.with_output(path, OutputMode::Truncate),
        (None, None) => {}
    }

    Ok(Some(stage))
}
