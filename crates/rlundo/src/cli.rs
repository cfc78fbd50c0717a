//! Command-line argument parsing.
//!
//! Parses args manually; configuration comes from `RLUNDO_*` environment
//! variables (see `rlundo_core::config`).

use std::fmt;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const HELP_TEXT: &str = "\
rlundo: undo for interactive command loops

USAGE:
    rlundo [--] <command> [args...]   Run <command> under the undo relay
    rlundo                            Run the built-in calculator under the relay
    rlundo repl                       Run the built-in calculator directly

    In a session, type `undo` (or press Ctrl-C at the prompt) to rewind the
    screen and the session state to before the previous input line.

OPTIONS:
    --help, -h        Show this help message
    --version, -V     Show version

ENVIRONMENT VARIABLES:
    RLUNDO_SAVE_ADDR          Save endpoint (default 127.0.0.1:4242)
    RLUNDO_RESTORE_ADDR       Restore endpoint (default 127.0.0.1:4243)
    RLUNDO_SAVE_PORT          Save port on 127.0.0.1
    RLUNDO_RESTORE_PORT       Restore port on 127.0.0.1
    RLUNDO_CURSOR_TIMEOUT_MS  Cursor report wait, 0 = forever (default 500)
    RLUNDO_UNWIND             step | root (default step)
    RLUNDO_UNDO_COMMAND       Input line that requests undo (default `undo`)
    RLUNDO_LOG_FILE           Append diagnostics to this file
    RLUNDO_LOG                Log filter directives (default debug)";

/// What the invocation asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Help,
    Version,
    /// Run the built-in command loop in this process.
    Repl,
    /// Run this binary's own command loop under the relay.
    WrapSelf,
    /// Run an arbitrary command under the relay.
    Wrap(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    UnknownOption(String),
    MissingCommand,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOption(opt) => write!(f, "unknown option: {opt}"),
            Self::MissingCommand => write!(f, "expected a command after `--`"),
        }
    }
}

impl std::error::Error for CliError {}

/// Parse arguments (without the program name).
///
/// # Errors
///
/// Returns a [`CliError`] for unknown options or a dangling `--`.
pub fn parse<I>(args: I) -> Result<Mode, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(Mode::WrapSelf);
    };
    match first.as_str() {
        "--help" | "-h" => Ok(Mode::Help),
        "--version" | "-V" => Ok(Mode::Version),
        "repl" => Ok(Mode::Repl),
        "--" => {
            let command: Vec<String> = args.collect();
            if command.is_empty() {
                Err(CliError::MissingCommand)
            } else {
                Ok(Mode::Wrap(command))
            }
        }
        other if other.starts_with('-') => Err(CliError::UnknownOption(other.to_string())),
        _ => Ok(Mode::Wrap(std::iter::once(first).chain(args).collect())),
    }
}
