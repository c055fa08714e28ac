use crate::daemon::protocol::{read_request, send_sentinel, REQUEST_BUF_SIZE};
use crate::error::RshError;
use crate::executor::Sinks;
use crate::runtime::Runtime;
use crate::session::{Outcome, Session};
use std::net::TcpStream;
use std::os::fd::AsFd;
use tracing::debug;

/// Why a connection handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The client closed the socket or a receive failed.
    Disconnected,
    /// The client sent `exit`.
    Exited,
    /// The client sent `stop-server`; the caller must raise the stop flag.
    StopRequested,
}

/// Serve one client until it leaves.
///
/// Every request is answered with zero or more bytes of output followed by
/// exactly one sentinel. A failed send ends this connection only and is
/// returned as a communication error for the caller to log.
pub fn handle_client(stream: &TcpStream, runtime: Runtime) -> Result<ConnectionEnd, RshError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(REQUEST_BUF_SIZE)?;
    buf.resize(REQUEST_BUF_SIZE, 0u8);

    let mut session = Session::new(runtime);
    let sinks = Sinks::remote(stream.as_fd());
    let mut reader = stream;
    let mut writer = stream;

    loop {
        let line = match read_request(&mut reader, &mut buf) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(ConnectionEnd::Disconnected),
            Err(e) => {
                debug!(error = %e, "receive failed, dropping client");
                return Ok(ConnectionEnd::Disconnected);
            }
        };
        debug!(request = %line, "request received");

        let outcome = session
            .run_line(&line, &mut writer, &sinks)
            .map_err(|e| RshError::communication("send response", e))?;
        send_sentinel(&mut writer).map_err(|e| RshError::communication("send sentinel", e))?;

        match outcome {
            Outcome::Continue => {}
            Outcome::Exit => return Ok(ConnectionEnd::Exited),
            Outcome::Stop => return Ok(ConnectionEnd::StopRequested),
        }
    }
}
