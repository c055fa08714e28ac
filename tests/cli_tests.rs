use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// `rsh` with a scratch HOME so no real `~/.rshrc` is picked up.
fn rsh(home: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rsh"));
    cmd.args(args)
        .env("HOME", home)
        .env_remove("RSH_PORT")
        .env_remove("RSH_INTERFACE")
        .env_remove("RSH_THREADED")
        .env_remove("RSH_MAX_CLIENTS")
        .env_remove("RSH_ISOLATE_CWD")
        .env_remove("RSH_ERROR_FORMAT")
        .env("RUST_LOG", "off");
    cmd
}

fn run_with_input(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn rsh");
    child.stdin.take().unwrap().write_all(input.as_bytes()).unwrap();
    child.wait_with_output().unwrap()
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// Retry the client until the freshly spawned server is listening.
fn client_session(home: &Path, port: u16, input: &str) -> Output {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let output = run_with_input(rsh(home, &["-c", "-p", &port.to_string()]), input);
        if output.status.code() != Some(4) || Instant::now() > deadline {
            return output;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

fn wait_for_exit(mut server: Child) -> Option<i32> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(status) = server.try_wait().unwrap() {
            return status.code();
        }
        thread::sleep(Duration::from_millis(50));
    }
    let _ = server.kill();
    None
}

#[test]
fn test_local_pipeline() {
    let home = TempDir::new().unwrap();
    let output = run_with_input(rsh(home.path(), &[]), "echo A | tr A B\n");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "B\n");
    assert!(output.status.success());
}

#[test]
fn test_local_shell_has_no_prompt_when_piped() {
    let home = TempDir::new().unwrap();
    let output = run_with_input(rsh(home.path(), &[]), "echo one\nexit\necho two\n");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "one\nexiting...\n");
}

#[test]
fn test_local_json_diagnostics() {
    let home = TempDir::new().unwrap();
    let mut cmd = rsh(home.path(), &[]);
    cmd.env("RSH_ERROR_FORMAT", "json");
    let output = run_with_input(cmd, &format!("{}\n", vec!["cat"; 9].join(" | ")));
    let line = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(value["error_code"], "TOO_MANY_COMMANDS");
    assert_eq!(value["exit_code"], 1);
}

#[test]
fn test_bad_flags_exit_with_usage_code() {
    let home = TempDir::new().unwrap();
    let output = rsh(home.path(), &["--no-such-flag"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));

    let output = rsh(home.path(), &["-c", "-s"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_bad_rc_file_is_a_config_error() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join(".rshrc"), "RSH_PORT=not-a-port\n").unwrap();
    let output = rsh(home.path(), &["-c"]).stdin(Stdio::null()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains(".rshrc"));
}

#[test]
fn test_bad_port_in_environment() {
    let home = TempDir::new().unwrap();
    let output = rsh(home.path(), &["-c"])
        .env("RSH_PORT", "70000")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_client_without_server() {
    let home = TempDir::new().unwrap();
    let port = free_port();
    let output = rsh(home.path(), &["-c", "-p", &port.to_string()])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_server_and_client_end_to_end() {
    let home = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    std::fs::write(work.path().join("notes.txt"), "alpha\nbeta\n").unwrap();

    let port = free_port();
    let server = rsh(home.path(), &["-s", "-i", "127.0.0.1", "-p", &port.to_string(), "-x"])
        .current_dir(work.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let output = client_session(home.path(), port, "cat notes.txt | grep beta\n\nrc\nexit\n");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "beta\n0\nexiting...\n");

    let output = client_session(home.path(), port, "stop-server\n");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "stopping server...\n");
    assert_eq!(wait_for_exit(server), Some(0));
}

#[test]
fn test_server_stops_on_sigterm() {
    let home = TempDir::new().unwrap();
    let port = free_port();
    let server = rsh(home.path(), &["-s", "-i", "127.0.0.1", "-p", &port.to_string()])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let output = client_session(home.path(), port, "echo up\nexit\n");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "up\nexiting...\n");

    let pid = nix::unistd::Pid::from_raw(server.id() as i32);
    nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM).unwrap();
    assert_eq!(wait_for_exit(server), Some(0));
}
