//! Remote configuration from defaults, `~/.rshrc` and the environment
//!
//! Recognised keys (rc file lines or environment variables):
//! - RSH_INTERFACE (address to bind or connect to)
//! - RSH_PORT
//! - RSH_THREADED (serve each client on its own thread)
//! - RSH_MAX_CLIENTS (bound on concurrently served clients)
//! - RSH_ISOLATE_CWD (per-session working directory)
//!
//! Later sources win: defaults, then the rc file, then the environment. The
//! command line is applied on top by the binary.

use crate::error::RshError;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_SERVER_INTERFACE: &str = "0.0.0.0";
pub const DEFAULT_CLIENT_ADDRESS: &str = "127.0.0.1";

const KEYS: [&str; 5] = [
    "RSH_INTERFACE",
    "RSH_PORT",
    "RSH_THREADED",
    "RSH_MAX_CLIENTS",
    "RSH_ISOLATE_CWD",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// `None` picks the role default: all interfaces for a server, loopback
    /// for a client.
    pub interface: Option<String>,
    pub port: u16,
    pub threaded: bool,
    /// `None` serves any number of clients at once.
    pub max_clients: Option<usize>,
    pub isolate_cwd: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            interface: None,
            port: DEFAULT_PORT,
            threaded: false,
            max_clients: None,
            isolate_cwd: false,
        }
    }
}

impl RemoteConfig {
    /// Defaults overlaid with `~/.rshrc` (if present) and the environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let rc_path = Self::rshrc_path();
        if rc_path.exists() {
            config
                .apply_rc_file(&rc_path)
                .with_context(|| format!("loading {}", rc_path.display()))?;
        }
        config
            .apply_env(|key| std::env::var(key).ok())
            .context("reading environment")?;

        Ok(config)
    }

    pub fn rshrc_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rshrc")
    }

    pub fn apply_rc_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)?;
        self.apply_rc(&content)?;
        Ok(())
    }

    /// Apply `KEY=value` lines. `export ` prefixes, quotes and `#` comments
    /// are allowed; unknown keys are ignored.
    pub fn apply_rc(&mut self, content: &str) -> Result<(), RshError> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            if let Some((key, value)) = parse_assignment(line) {
                self.set(&key, &unquote(&value))?;
            }
        }
        Ok(())
    }

    /// Apply every recognised key that `lookup` knows about.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), RshError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in KEYS {
            if let Some(value) = lookup(key) {
                self.set(key, value.trim())?;
            }
        }
        Ok(())
    }

    pub fn server_interface(&self) -> &str {
        self.interface.as_deref().unwrap_or(DEFAULT_SERVER_INTERFACE)
    }

    pub fn client_address(&self) -> &str {
        self.interface.as_deref().unwrap_or(DEFAULT_CLIENT_ADDRESS)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), RshError> {
        match key {
            "RSH_INTERFACE" => {
                self.interface = (!value.is_empty()).then(|| value.to_string());
            }
            "RSH_PORT" => {
                self.port = value
                    .parse()
                    .map_err(|_| RshError::Config(format!("{}: invalid port '{}'", key, value)))?;
            }
            "RSH_THREADED" => self.threaded = parse_flag(key, value)?,
            "RSH_ISOLATE_CWD" => self.isolate_cwd = parse_flag(key, value)?,
            "RSH_MAX_CLIENTS" => {
                let limit: usize = value.parse().map_err(|_| {
                    RshError::Config(format!("{}: invalid client limit '{}'", key, value))
                })?;
                if limit == 0 {
                    return Err(RshError::Config(format!("{}: must be at least 1", key)));
                }
                self.max_clients = Some(limit);
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, RshError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(RshError::Config(format!("{}: expected a boolean, got '{}'", key, value))),
    }
}

/// Parse a shell variable assignment (KEY=value or KEY="value")
fn parse_assignment(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

/// Remove surrounding quotes from a value
fn unquote(s: &str) -> String {
    let s = s.trim();
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RemoteConfig::default();
        assert_eq!(config.port, 1234);
        assert_eq!(config.server_interface(), "0.0.0.0");
        assert_eq!(config.client_address(), "127.0.0.1");
        assert!(!config.threaded);
        assert_eq!(config.max_clients, None);
    }

    #[test]
    fn test_rc_file_content() {
        let content = r#"
# rsh settings
export RSH_PORT=7777
RSH_INTERFACE="10.0.0.5"
RSH_THREADED=yes
RSH_MAX_CLIENTS='16'
UNRELATED=whatever
not an assignment
"#;
        let mut config = RemoteConfig::default();
        config.apply_rc(content).unwrap();

        assert_eq!(config.port, 7777);
        assert_eq!(config.server_interface(), "10.0.0.5");
        assert_eq!(config.client_address(), "10.0.0.5");
        assert!(config.threaded);
        assert_eq!(config.max_clients, Some(16));
    }

    #[test]
    fn test_env_overrides_rc() {
        let mut config = RemoteConfig::default();
        config.apply_rc("RSH_PORT=7777\nRSH_ISOLATE_CWD=1").unwrap();

        let env: HashMap<&str, &str> = [("RSH_PORT", "9000"), ("RSH_ISOLATE_CWD", "off")].into();
        config.apply_env(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.port, 9000);
        assert!(!config.isolate_cwd);
    }

    #[test]
    fn test_bad_values_are_config_errors() {
        for content in ["RSH_PORT=70000", "RSH_PORT=http", "RSH_THREADED=maybe", "RSH_MAX_CLIENTS=0"] {
            let mut config = RemoteConfig::default();
            let err = config.apply_rc(content).unwrap_err();
            assert!(matches!(err, RshError::Config(_)), "content {:?}", content);
            assert_eq!(err.exit_code(), crate::error::exit_code::BAD_ARGS);
        }
    }

    #[test]
    fn test_rc_file_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".rshrc");
        fs::write(&path, "RSH_PORT=4321\n").unwrap();

        let mut config = RemoteConfig::default();
        config.apply_rc_file(&path).unwrap();
        assert_eq!(config.port, 4321);

        assert!(config.apply_rc_file(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"hello\""), "hello");
        assert_eq!(unquote("'hello'"), "hello");
        assert_eq!(unquote("hello"), "hello");
        assert_eq!(unquote("\""), "\"");
    }
}
