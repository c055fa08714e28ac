#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use clap::Parser;
use rsh::daemon::{start_server, RemoteClient, RemoteConfig};
use rsh::error::{exit_code, RshError};
use rsh::runtime::{CwdPolicy, Role, Runtime};
use rsh::session::{run_local_loop, Session};
use rsh::signal::StopFlag;
use std::io;
use std::num::NonZeroUsize;
use std::process;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Without `--client` or `--server`, rsh runs as a local shell.
#[derive(Parser, Debug)]
#[command(name = "rsh", version)]
#[command(about = "A small shell that can also serve command pipelines over TCP")]
struct Cli {
    /// Connect to an rsh server
    #[arg(short = 'c', long, conflicts_with = "server")]
    client: bool,

    /// Serve remote clients
    #[arg(short = 's', long)]
    server: bool,

    /// Address to bind (server) or connect to (client)
    #[arg(short = 'i', long, value_name = "ADDR")]
    interface: Option<String>,

    /// TCP port
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Serve each client on its own thread
    #[arg(short = 'x', long)]
    threaded: bool,

    /// Turn clients away once this many are being served
    #[arg(long, value_name = "N")]
    max_clients: Option<NonZeroUsize>,

    /// Give every client its own working directory
    #[arg(long)]
    isolate_cwd: bool,
}

impl Cli {
    /// Flags win over `~/.rshrc` and the environment.
    fn apply(&self, config: &mut RemoteConfig) {
        if let Some(interface) = &self.interface {
            config.interface = Some(interface.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(limit) = self.max_clients {
            config.max_clients = Some(limit.get());
        }
        config.threaded |= self.threaded;
        config.isolate_cwd |= self.isolate_cwd;
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let code = match run(&cli) {
        Ok(()) => exit_code::OK,
        Err(e) => {
            eprintln!("rsh: {:#}", e);
            exit_code_for(&e)
        }
    };
    process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rsh=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = RemoteConfig::load()?;
    cli.apply(&mut config);
    debug!(?config, "configuration loaded");

    let interactive = atty::is(atty::Stream::Stdin);

    if cli.server {
        let stop = StopFlag::new();
        stop.register_signals()
            .map_err(|e| RshError::communication("install signal handlers", e))?;
        start_server(&config, stop)?;
        info!("server stopped");
    } else if cli.client {
        let mut client = RemoteClient::connect(config.client_address(), config.port)?;
        client.run_loop(io::stdin().lock(), io::stdout(), interactive)?;
    } else {
        let cwd_policy = if config.isolate_cwd {
            CwdPolicy::PerSession
        } else {
            CwdPolicy::Shared
        };
        let mut session = Session::new(Runtime::new(Role::Local).with_cwd_policy(cwd_policy));
        let last = run_local_loop(&mut session, io::stdin().lock(), io::stdout(), interactive)?;
        debug!(status = last, "local shell finished");
    }
    Ok(())
}

/// Typed failures carry their own code; anything else is a plain failure.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<RshError>())
        .map_or(1, RshError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["rsh", "-s", "-i", "127.0.0.1", "-p", "9999", "-x", "--max-clients", "3"]);
        let mut config = RemoteConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.server_interface(), "127.0.0.1");
        assert_eq!(config.port, 9999);
        assert!(config.threaded);
        assert_eq!(config.max_clients, Some(3));
        assert!(!config.isolate_cwd);
    }

    #[test]
    fn test_client_and_server_conflict() {
        assert!(Cli::try_parse_from(["rsh", "-c", "-s"]).is_err());
        assert!(Cli::try_parse_from(["rsh", "--max-clients", "0"]).is_err());
    }

    #[test]
    fn test_exit_code_for() {
        let err = anyhow::Error::from(RshError::Config("bad".into())).context("loading ~/.rshrc");
        assert_eq!(exit_code_for(&err), exit_code::BAD_ARGS);
        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), 1);
    }
}
