//! The accept loop outlives descriptor exhaustion.
//!
//! Lowers the process descriptor limit and fills it, so it lives in its own
//! test binary.

use nix::sys::resource::{getrlimit, setrlimit, Resource};
use rsh::daemon::{RemoteClient, ResponseEnd, ServeMode, Server, ServerOptions};
use rsh::runtime::CwdPolicy;
use std::fs::File;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

#[test]
fn test_server_keeps_accepting_after_emfile() {
    let options = ServerOptions {
        mode: ServeMode::Concurrent,
        max_clients: None,
        cwd_policy: CwdPolicy::PerSession,
    };
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), options).unwrap();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || server.run());

    let (soft, hard) = getrlimit(Resource::RLIMIT_NOFILE).unwrap();
    setrlimit(Resource::RLIMIT_NOFILE, soft.min(256), hard).unwrap();

    let mut hoard = Vec::new();
    loop {
        match File::open("/dev/null") {
            Ok(file) => hoard.push(file),
            Err(e) => {
                assert_eq!(e.raw_os_error(), Some(libc::EMFILE));
                break;
            }
        }
    }

    // One free slot for our end; the server's accept has none left.
    hoard.pop();
    let stream = TcpStream::connect(addr).unwrap();
    thread::sleep(Duration::from_millis(400));
    assert!(!handle.is_finished(), "accept loop gave up on EMFILE");

    drop(hoard);
    setrlimit(Resource::RLIMIT_NOFILE, soft, hard).unwrap();

    let mut client = RemoteClient::from_stream(stream).unwrap();
    let mut out = Vec::new();
    assert_eq!(client.execute("echo ok", &mut out).unwrap(), ResponseEnd::Complete);
    assert_eq!(out, b"ok\n");

    out.clear();
    client.execute("stop-server", &mut out).unwrap();
    handle.join().unwrap().unwrap();
}
