use crate::daemon::config::RemoteConfig;
use crate::daemon::connection::{handle_client, ConnectionEnd};
use crate::daemon::protocol::{send_response, send_sentinel};
use crate::error::RshError;
use crate::runtime::{CwdPolicy, Role, Runtime};
use crate::signal::StopFlag;
use nix::sys::socket::{
    bind, listen, setsockopt, socket, sockopt, AddressFamily, Backlog, SockFlag, SockType,
    SockaddrStorage,
};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pending connections the kernel queues for us.
pub const LISTEN_BACKLOG: i32 = 20;

/// How often an idle accept loop checks the stop flag.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sent, with a sentinel, to a client turned away by the client limit.
pub const BUSY_MSG: &str = "rsh: server busy, try again later\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    /// Serve one client to completion before accepting the next.
    Iterative,
    /// One thread per client; the accept loop never waits for handlers.
    Concurrent,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub mode: ServeMode,
    pub max_clients: Option<usize>,
    pub cwd_policy: CwdPolicy,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            mode: ServeMode::Iterative,
            max_clients: None,
            cwd_policy: CwdPolicy::Shared,
        }
    }
}

impl From<&RemoteConfig> for ServerOptions {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            mode: if config.threaded {
                ServeMode::Concurrent
            } else {
                ServeMode::Iterative
            },
            max_clients: config.max_clients,
            cwd_policy: if config.isolate_cwd {
                CwdPolicy::PerSession
            } else {
                CwdPolicy::Shared
            },
        }
    }
}

pub struct Server {
    listener: TcpListener,
    options: ServerOptions,
    stop: StopFlag,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind and listen. Port 0 picks a free port; see [`Server::local_addr`].
    pub fn bind(addr: SocketAddr, options: ServerOptions) -> Result<Self, RshError> {
        let listener =
            boot_server(addr).map_err(|e| RshError::communication(format!("bind {}", addr), e))?;
        Ok(Self {
            listener,
            options,
            stop: StopFlag::new(),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Share an existing flag, e.g. one already wired to signals.
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Handle to the flag that ends [`Server::run`].
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Clients currently being served.
    pub fn active_clients(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept clients until the stop flag is raised.
    ///
    /// In concurrent mode, handlers still running when the loop ends are
    /// left to finish on their own.
    pub fn run(&self) -> Result<(), RshError> {
        self.listener
            .set_nonblocking(true)
            .map_err(|e| RshError::communication("configure listener", e))?;
        info!(
            addr = %self.listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            mode = ?self.options.mode,
            "listening"
        );

        while !self.stop.is_raised() {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    debug!(error = %e, "accept interrupted");
                }
                Err(e) if listener_is_broken(&e) => return Err(RshError::communication("accept", e)),
                Err(e) => {
                    // Descriptor or memory pressure; the pending client stays queued.
                    warn!(error = %e, "accept failed, retrying");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        info!(active = self.active_clients(), "shutting down");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(false) {
            warn!(%peer, error = %e, "could not configure client socket");
            return;
        }

        let Some(guard) = ActiveGuard::try_acquire(&self.active, self.options.max_clients) else {
            reject(stream, peer);
            return;
        };

        info!(%peer, "client connected");
        let runtime = Runtime::new(Role::Server).with_cwd_policy(self.options.cwd_policy);
        let stop = self.stop.clone();

        match self.options.mode {
            ServeMode::Iterative => serve(stream, peer, runtime, &stop, guard),
            ServeMode::Concurrent => {
                let spawned = thread::Builder::new()
                    .name(format!("rsh-client-{}", peer))
                    .spawn(move || serve(stream, peer, runtime, &stop, guard));
                if let Err(e) = spawned {
                    warn!(%peer, error = %e, "could not start client thread");
                }
            }
        }
    }
}

/// Resolve the configured interface and serve until `stop` is raised.
pub fn start_server(config: &RemoteConfig, stop: StopFlag) -> Result<(), RshError> {
    let addr = resolve(config.server_interface(), config.port)?;
    Server::bind(addr, ServerOptions::from(config))?
        .with_stop_flag(stop)
        .run()
}

pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, RshError> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| RshError::Config(format!("cannot resolve address '{}'", host)))
}

/// Accept errors that no retry can fix. Anything else (EMFILE, ENFILE,
/// ENOBUFS, ENOMEM, a reset before accept) only costs that one attempt.
fn listener_is_broken(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EBADF) | Some(libc::ENOTSOCK) | Some(libc::EINVAL) | Some(libc::EOPNOTSUPP) | Some(libc::EFAULT)
    )
}

/// Socket, SO_REUSEADDR, bind, listen.
fn boot_server(addr: SocketAddr) -> io::Result<TcpListener> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    let fd = socket(family, SockType::Stream, SockFlag::SOCK_CLOEXEC, None)?;
    setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    bind(fd.as_raw_fd(), &SockaddrStorage::from(addr))?;
    listen(&fd, Backlog::new(LISTEN_BACKLOG)?)?;
    Ok(TcpListener::from(fd))
}

fn serve(stream: TcpStream, peer: SocketAddr, runtime: Runtime, stop: &StopFlag, _guard: ActiveGuard) {
    match handle_client(&stream, runtime) {
        Ok(ConnectionEnd::Disconnected) => info!(%peer, "client disconnected"),
        Ok(ConnectionEnd::Exited) => info!(%peer, "client exited"),
        Ok(ConnectionEnd::StopRequested) => {
            info!(%peer, "stop requested");
            stop.raise();
        }
        Err(e) => warn!(%peer, error = %e, "connection dropped"),
    }
}

fn reject(mut stream: TcpStream, peer: SocketAddr) {
    warn!(%peer, "client limit reached, rejecting");
    if let Err(e) = send_response(&mut stream, BUSY_MSG.as_bytes()).and_then(|_| send_sentinel(&mut stream)) {
        debug!(%peer, error = %e, "could not deliver busy notice");
    }
}

/// Counts a client as active for as long as it is held.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn try_acquire(active: &Arc<AtomicUsize>, limit: Option<usize>) -> Option<Self> {
        active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match limit {
                Some(max) if n >= max => None,
                _ => Some(n + 1),
            })
            .ok()
            .map(|_| Self(Arc::clone(active)))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
