//! Sessions sharing the server's working directory see each other's `cd`.
//!
//! This changes the process-wide working directory, so it lives in its own
//! test binary.

use rsh::daemon::{RemoteClient, ResponseEnd, ServeMode, Server, ServerOptions};
use rsh::runtime::CwdPolicy;
use std::fs;
use std::thread;
use tempfile::TempDir;

fn exec(client: &mut RemoteClient, command: &str) -> String {
    let mut out = Vec::new();
    assert_eq!(client.execute(command, &mut out).unwrap(), ResponseEnd::Complete);
    String::from_utf8(out).unwrap()
}

#[test]
fn test_cd_on_one_connection_moves_every_session() {
    let dir = TempDir::new().unwrap();
    let options = ServerOptions {
        mode: ServeMode::Concurrent,
        max_clients: None,
        cwd_policy: CwdPolicy::Shared,
    };
    let server = Server::bind("127.0.0.1:0".parse().unwrap(), options).unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = thread::spawn(move || server.run());

    let mut a = RemoteClient::connect("127.0.0.1", port).unwrap();
    let mut b = RemoteClient::connect("127.0.0.1", port).unwrap();

    assert_eq!(exec(&mut a, &format!("cd {}", dir.path().display())), "");
    let seen_by_b = exec(&mut b, "pwd");
    assert_eq!(
        seen_by_b.trim(),
        fs::canonicalize(dir.path()).unwrap().to_str().unwrap()
    );

    exec(&mut b, "exit");
    exec(&mut a, "stop-server");
    handle.join().unwrap().unwrap();
}
