//! Environment-driven configuration.
//!
//! Every process in a checkpoint chain resolves the same variables, so the
//! relay and the command loop agree on endpoints without passing arguments.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `RLUNDO_SAVE_ADDR` | save endpoint socket address | `127.0.0.1:4242` |
//! | `RLUNDO_RESTORE_ADDR` | restore endpoint socket address | `127.0.0.1:4243` |
//! | `RLUNDO_SAVE_PORT` | save port on 127.0.0.1 (ignored if the address is set) | |
//! | `RLUNDO_RESTORE_PORT` | restore port on 127.0.0.1 (ignored if the address is set) | |
//! | `RLUNDO_CURSOR_TIMEOUT_MS` | cursor report wait, `0` waits forever | `500` |
//! | `RLUNDO_UNWIND` | `step` or `root` | `step` |
//! | `RLUNDO_UNDO_COMMAND` | input line that requests an undo | `undo` |
//! | `RLUNDO_LOG_FILE` | append log events to this file | unset (no logging) |
//! | `RLUNDO_LOG` | `tracing` filter directives | `debug` |

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::checkpoint::UnwindPolicy;

pub const ENV_SAVE_ADDR: &str = "RLUNDO_SAVE_ADDR";
pub const ENV_RESTORE_ADDR: &str = "RLUNDO_RESTORE_ADDR";
pub const ENV_SAVE_PORT: &str = "RLUNDO_SAVE_PORT";
pub const ENV_RESTORE_PORT: &str = "RLUNDO_RESTORE_PORT";
pub const ENV_CURSOR_TIMEOUT_MS: &str = "RLUNDO_CURSOR_TIMEOUT_MS";
pub const ENV_UNWIND: &str = "RLUNDO_UNWIND";
pub const ENV_UNDO_COMMAND: &str = "RLUNDO_UNDO_COMMAND";
pub const ENV_LOG_FILE: &str = "RLUNDO_LOG_FILE";
pub const ENV_LOG: &str = "RLUNDO_LOG";

pub const DEFAULT_SAVE_PORT: u16 = 4242;
pub const DEFAULT_RESTORE_PORT: u16 = 4243;
pub const DEFAULT_CURSOR_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_UNDO_COMMAND: &str = "undo";

/// A variable was set to something unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub variable: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {}={:?}: expected {}",
            self.variable, self.value, self.expected
        )
    }
}

impl std::error::Error for ConfigError {}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoConfig {
    pub save_addr: SocketAddr,
    pub restore_addr: SocketAddr,
    /// `None` waits for a cursor report indefinitely.
    pub cursor_timeout: Option<Duration>,
    pub unwind: UnwindPolicy,
    pub undo_command: String,
    pub log_file: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            save_addr: loopback(DEFAULT_SAVE_PORT),
            restore_addr: loopback(DEFAULT_RESTORE_PORT),
            cursor_timeout: Some(DEFAULT_CURSOR_TIMEOUT),
            unwind: UnwindPolicy::default(),
            undo_command: DEFAULT_UNDO_COMMAND.to_string(),
            log_file: None,
            log_filter: None,
        }
    }
}

impl UndoConfig {
    /// Resolve from the process environment.
    ///
    /// # Errors
    ///
    /// Returns the first variable that fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Resolve using a custom lookup (for tests).
    ///
    /// # Errors
    ///
    /// Returns the first variable that fails to parse.
    pub fn from_env_with<F>(get_env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| get_env(key).filter(|value| !value.trim().is_empty());

        let save_addr = endpoint(&get, ENV_SAVE_ADDR, ENV_SAVE_PORT)?.unwrap_or(defaults.save_addr);
        let restore_addr =
            endpoint(&get, ENV_RESTORE_ADDR, ENV_RESTORE_PORT)?.unwrap_or(defaults.restore_addr);

        let cursor_timeout = match get(ENV_CURSOR_TIMEOUT_MS) {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(_) => return Err(invalid(ENV_CURSOR_TIMEOUT_MS, value, "milliseconds")),
            },
            None => defaults.cursor_timeout,
        };

        let unwind = match get(ENV_UNWIND) {
            Some(value) => UnwindPolicy::parse(&value)
                .ok_or_else(|| invalid(ENV_UNWIND, value, "`step` or `root`"))?,
            None => defaults.unwind,
        };

        let undo_command = match get(ENV_UNDO_COMMAND) {
            Some(value) => value.trim().to_string(),
            None => defaults.undo_command,
        };

        Ok(Self {
            save_addr,
            restore_addr,
            cursor_timeout,
            unwind,
            undo_command,
            log_file: get(ENV_LOG_FILE).map(PathBuf::from),
            log_filter: get(ENV_LOG),
        })
    }

    /// Variables a relay exports so the wrapped command uses its endpoints.
    #[must_use]
    pub fn child_env(&self) -> [(&'static str, String); 2] {
        [
            (ENV_SAVE_ADDR, self.save_addr.to_string()),
            (ENV_RESTORE_ADDR, self.restore_addr.to_string()),
        ]
    }
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

fn endpoint<F>(get: &F, addr_key: &'static str, port_key: &'static str) -> Result<Option<SocketAddr>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = get(addr_key) {
        return value
            .trim()
            .parse::<SocketAddr>()
            .map(Some)
            .map_err(|_| invalid(addr_key, value, "a socket address such as 127.0.0.1:4242"));
    }
    match get(port_key) {
        Some(value) => value
            .trim()
            .parse::<u16>()
            .map(|port| Some(loopback(port)))
            .map_err(|_| invalid(port_key, value, "a port number")),
        None => Ok(None),
    }
}

fn invalid(variable: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError {
        variable,
        value,
        expected,
    }
}
