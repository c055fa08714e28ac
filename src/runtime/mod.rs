use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where a `cd` takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CwdPolicy {
    /// `cd` changes the working directory of the whole process, so every
    /// connection observes it. This is the classic behaviour of the server.
    #[default]
    Shared,
    /// Each session tracks its own directory and hands it to the children it
    /// spawns; the process directory is never touched.
    PerSession,
}

/// Which side a runtime serves. Only a server honours `stop-server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Local,
    Server,
}

/// Per-session state: a working directory policy and the last exit status.
#[derive(Debug, Clone)]
pub struct Runtime {
    role: Role,
    cwd_policy: CwdPolicy,
    // only authoritative under CwdPolicy::PerSession
    cwd: PathBuf,
    last_exit_code: i32,
}

impl Runtime {
    pub fn new(role: Role) -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self {
            role,
            cwd_policy: CwdPolicy::default(),
            cwd,
            last_exit_code: 0,
        }
    }

    pub fn with_cwd_policy(mut self, policy: CwdPolicy) -> Self {
        self.cwd_policy = policy;
        self
    }

    /// Starting directory of a `PerSession` runtime.
    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn cwd_policy(&self) -> CwdPolicy {
        self.cwd_policy
    }

    pub fn get_cwd(&self) -> PathBuf {
        match self.cwd_policy {
            CwdPolicy::Shared => env::current_dir().unwrap_or_else(|_| self.cwd.clone()),
            CwdPolicy::PerSession => self.cwd.clone(),
        }
    }

    /// Directory to start children in; `None` inherits the process directory.
    pub fn child_cwd(&self) -> Option<&Path> {
        match self.cwd_policy {
            CwdPolicy::Shared => None,
            CwdPolicy::PerSession => Some(&self.cwd),
        }
    }

    pub fn change_dir(&mut self, target: &Path) -> io::Result<()> {
        match self.cwd_policy {
            CwdPolicy::Shared => env::set_current_dir(target),
            CwdPolicy::PerSession => {
                let resolved = fs::canonicalize(self.resolve(target))?;
                if !fs::metadata(&resolved)?.is_dir() {
                    return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
                }
                self.cwd = resolved;
                Ok(())
            }
        }
    }

    /// Resolve a path the way a child of this session would see it.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match self.child_cwd() {
            Some(cwd) if path.is_relative() => cwd.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn set_last_exit_code(&mut self, code: i32) {
        self.last_exit_code = code;
    }

    pub fn get_last_exit_code(&self) -> i32 {
        self.last_exit_code
    }
}
