//! rsh remote client
//!
//! Reads command lines, ships each one to the server and copies the framed
//! response to the output until the sentinel arrives.

use crate::builtins::{EXIT_CMD, STOP_SERVER_CMD};
use crate::daemon::protocol::{
    read_response, write_request, ResponseEnd, MAX_REQUEST_LEN, RESPONSE_BUF_SIZE,
};
use crate::daemon::server::resolve;
use crate::error::{Diagnostic, RshError};
use crate::session::PROMPT;
use std::io::{self, BufRead, Write};
use std::net::TcpStream;
use tracing::{debug, info, warn};

/// Printed when the server goes away in the middle of a session.
pub const SERVER_EXITED_MSG: &str = "rsh: server closed the connection\n";

pub struct RemoteClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl RemoteClient {
    pub fn connect(address: &str, port: u16) -> Result<Self, RshError> {
        let addr = resolve(address, port)?;
        let stream =
            TcpStream::connect(addr).map_err(|e| RshError::communication(format!("connect {}", addr), e))?;
        info!(%addr, "connected");
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self, RshError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(RESPONSE_BUF_SIZE)?;
        buf.resize(RESPONSE_BUF_SIZE, 0u8);
        Ok(Self { stream, buf })
    }

    /// Send one command and copy its response to `out`.
    ///
    /// A command longer than [`MAX_REQUEST_LEN`] would be split across
    /// server receives, so it is refused locally with a diagnostic on `out`.
    pub fn execute<W: Write>(&mut self, command: &str, out: &mut W) -> Result<ResponseEnd, RshError> {
        if command.len() > MAX_REQUEST_LEN {
            let diagnostic = Diagnostic::new(
                "REQUEST_TOO_LONG",
                format!("rsh: command too long (at most {} bytes)", MAX_REQUEST_LEN),
                1,
            );
            out.write_all(diagnostic.render().as_bytes())
                .and_then(|_| out.flush())
                .map_err(|e| RshError::communication("write output", e))?;
            debug!(len = command.len(), "refused oversized request");
            return Ok(ResponseEnd::Rejected);
        }

        write_request(&mut self.stream, command).map_err(|e| RshError::communication("send", e))?;
        match read_response(&mut self.stream, &mut self.buf, out) {
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(ResponseEnd::ServerClosed),
            other => other.map_err(|e| RshError::communication("recv", e)),
        }
    }

    /// Interactive loop. Ends cleanly on EOF, `exit` or `stop-server`; a
    /// server that disappears mid-session is a communication error.
    pub fn run_loop<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W, interactive: bool) -> Result<(), RshError> {
        let mut line = String::new();
        loop {
            if interactive {
                write_prompt(&mut out).map_err(|e| RshError::communication("write prompt", e))?;
            }

            line.clear();
            match input.read_line(&mut line) {
                Ok(0) => {
                    if interactive {
                        if let Err(e) = writeln!(out) {
                            debug!(error = %e, "could not finish prompt line");
                        }
                    }
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RshError::communication("read input", e)),
            }

            let command = line.trim_end_matches(['\r', '\n']);
            if command.trim().is_empty() {
                continue;
            }

            match self.execute(command, &mut out)? {
                ResponseEnd::Complete => {}
                ResponseEnd::Rejected => continue,
                ResponseEnd::ServerClosed => {
                    if let Err(e) = out.write_all(SERVER_EXITED_MSG.as_bytes()) {
                        warn!(error = %e, "could not report closed connection");
                    }
                    return Err(RshError::communication(
                        "recv",
                        io::Error::from(io::ErrorKind::ConnectionReset),
                    ));
                }
            }

            let program = command.split_whitespace().next().unwrap_or_default();
            if program == EXIT_CMD || program == STOP_SERVER_CMD {
                debug!(command = program, "session over");
                return Ok(());
            }
        }
    }
}

fn write_prompt<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(PROMPT.as_bytes())?;
    out.flush()
}
