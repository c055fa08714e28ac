/// rsh remote shell: a TCP server that runs command pipelines for clients
///
/// - `protocol`: request reading and sentinel-framed responses
/// - `connection`: the per-client request loop
/// - `server`: socket setup and the iterative or threaded accept loop
/// - `client`: the interactive remote client
/// - `config`: defaults, `~/.rshrc` and environment overrides

pub mod client;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

pub use client::RemoteClient;
pub use config::RemoteConfig;
pub use connection::{handle_client, ConnectionEnd};
pub use protocol::{
    read_request, read_response, send_response, send_sentinel, write_request, ResponseEnd,
    SENTINEL,
};
pub use server::{start_server, ServeMode, Server, ServerOptions};
