//! rsh wire protocol
//!
//! One request per receive, one sentinel per response:
//!
//! ```text
//! client -> server   command bytes, 0x00
//! server -> client   response bytes ... 0x04
//! ```
//!
//! A response is complete when a received chunk ends in [`SENTINEL`]. The
//! byte is not escaped, so output that itself ends a chunk with 0x04 is
//! indistinguishable from the end of a response. A closed connection is
//! reported separately and is never taken for a complete response.

use std::io::{self, Read, Write};

/// End-of-response marker (ASCII EOT).
pub const SENTINEL: u8 = 0x04;

/// Largest request the server reads in one receive.
pub const REQUEST_BUF_SIZE: usize = 4096;

/// Longest command a client may send: the request plus its NUL must fit in
/// one server receive.
pub const MAX_REQUEST_LEN: usize = REQUEST_BUF_SIZE - 1;

/// Client-side receive buffer.
pub const RESPONSE_BUF_SIZE: usize = 64 * 1024;

/// How a response read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEnd {
    /// The sentinel arrived.
    Complete,
    /// The server closed the connection before sending the sentinel.
    ServerClosed,
    /// The request was too long to send; the server never saw it.
    Rejected,
}

/// Receive one request. `Ok(None)` means the peer closed the connection.
///
/// Whatever a single read returns is the whole request. It ends at the first
/// NUL byte, trailing line terminators are removed, and invalid UTF-8 is
/// replaced.
pub fn read_request<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<Option<String>> {
    let n = loop {
        match reader.read(buf) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    };
    if n == 0 {
        return Ok(None);
    }

    let received = &buf[..n];
    let mut request = match received.iter().position(|&b| b == 0) {
        Some(end) => &received[..end],
        None => received,
    };
    while let [rest @ .., b'\r' | b'\n'] = request {
        request = rest;
    }
    Ok(Some(String::from_utf8_lossy(request).into_owned()))
}

/// Send one request the way every rsh client does: the command, then a NUL.
pub fn write_request<W: Write>(writer: &mut W, command: &str) -> io::Result<()> {
    let mut request = Vec::with_capacity(command.len() + 1);
    request.extend_from_slice(command.as_bytes());
    request.push(0);
    writer.write_all(&request)?;
    writer.flush()
}

pub fn send_response<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes)
}

/// Close the current response unit.
pub fn send_sentinel<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&[SENTINEL])?;
    writer.flush()
}

/// Copy one response from `reader` to `out`, without the sentinel.
pub fn read_response<R: Read, W: Write>(
    reader: &mut R,
    buf: &mut [u8],
    out: &mut W,
) -> io::Result<ResponseEnd> {
    loop {
        let n = match reader.read(buf) {
            Ok(0) => return Ok(ResponseEnd::ServerClosed),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        let chunk = &buf[..n];
        if let [body @ .., SENTINEL] = chunk {
            out.write_all(body)?;
            out.flush()?;
            return Ok(ResponseEnd::Complete);
        }
        out.write_all(chunk)?;
    }
}
