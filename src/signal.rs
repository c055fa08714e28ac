use signal_hook::consts::{SIGINT, SIGTERM};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Server-wide stop request, shared by the accept loop, every connection
/// handler and the signal handlers.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise this flag on SIGINT and SIGTERM, so an idle server shuts down
    /// the same way `stop-server` makes it.
    pub fn register_signals(&self) -> io::Result<()> {
        signal_hook::flag::register(SIGTERM, Arc::clone(&self.0))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&self.0))?;
        Ok(())
    }
}
