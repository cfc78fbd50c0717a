//! The built-in undoable command loop.

use std::io::{self, Write};

use rlundo_core::checkpoint::{CheckpointCoordinator, Prompted};
use rlundo_core::config::UndoConfig;
use rlundo_core::line_source::LineSource;
use rlundo_core::process::ProcessOps;

use crate::calc::{Calculator, Reply};

pub const PROMPT: &str = ">>> ";

pub const BANNER: &str = "rlundo calculator. Type `help` for syntax, `undo` to take back a line.";

/// Run the prompt loop until input ends, the user quits, or the chain says
/// to exit. Returns the process exit status.
///
/// # Errors
///
/// Returns an error if input cannot be read, duplication fails, or `out`
/// cannot be written.
pub fn drive<L, P, W>(
    coordinator: &mut CheckpointCoordinator<L, P>,
    calc: &mut Calculator,
    out: &mut W,
) -> io::Result<i32>
where
    L: LineSource,
    P: ProcessOps,
    W: Write,
{
    loop {
        match coordinator.next_line(PROMPT)? {
            Prompted::Line(line) => match calc.eval_line(&line) {
                Ok(Reply::Output(text)) => writeln!(out, "{text}")?,
                Ok(Reply::Nothing) => {}
                Ok(Reply::Quit) => return Ok(0),
                Err(err) => writeln!(out, "error: {err}")?,
            },
            Prompted::EndOfInput => {
                writeln!(out)?;
                return Ok(0);
            }
            Prompted::Exit(code) => return Ok(code),
        }
        out.flush()?;
    }
}

/// Entry point for `rlundo repl`.
#[cfg(unix)]
pub fn run(config: &UndoConfig) -> i32 {
    match try_run(config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("rlundo: {err}");
            1
        }
    }
}

#[cfg(unix)]
fn try_run(config: &UndoConfig) -> io::Result<i32> {
    use rlundo_core::line_source::stdin_lines;
    use rlundo_core::process::{ForkOps, install_interrupt_handler};

    install_interrupt_handler()?;
    let mut out = io::stdout();
    writeln!(out, "{BANNER}")?;
    out.flush()?;
    let mut coordinator = CheckpointCoordinator::new(stdin_lines()?, ForkOps, config);
    tracing::info!(pid = std::process::id(), policy = config.unwind.as_str(), "repl started");
    drive(&mut coordinator, &mut Calculator::new(), &mut out)
}

#[cfg(not(unix))]
pub fn run(_config: &UndoConfig) -> i32 {
    eprintln!("rlundo: the built-in loop needs fork(2) and only runs on Unix");
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlundo_core::line_source::PromptedLines;
    use rlundo_core::process::{ChildExit, ChildId, Duplicate};
    use std::net::{SocketAddr, TcpListener};

    /// Every duplication lands in the child, as if the chain only grew.
    struct AlwaysChild;

    impl ProcessOps for AlwaysChild {
        fn duplicate(&mut self) -> io::Result<Duplicate> {
            Ok(Duplicate::Child)
        }

        fn wait_for(&mut self, _child: ChildId) -> io::Result<ChildExit> {
            Ok(ChildExit::Exited(0))
        }
    }

    fn unreachable_config() -> UndoConfig {
        let addr = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .unwrap()
            .local_addr()
            .unwrap();
        UndoConfig {
            save_addr: addr,
            restore_addr: addr,
            ..UndoConfig::default()
        }
    }

    fn run_script(script: &[u8]) -> (i32, String) {
        let config = unreachable_config();
        let mut echo = Vec::new();
        let lines = PromptedLines::new(script, &mut echo);
        let mut coordinator = CheckpointCoordinator::new(lines, AlwaysChild, &config);
        let mut out = Vec::new();
        let code = drive(&mut coordinator, &mut Calculator::new(), &mut out).unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn evaluates_until_quit() {
        let (code, out) = run_script(b"x = 20\nx * 2 + 2\nquit\n1\n");
        assert_eq!(code, 0);
        assert_eq!(out, "42\n");
    }

    #[test]
    fn errors_are_reported_and_the_loop_continues() {
        let (code, out) = run_script(b"1 / 0\n2\n");
        assert_eq!(code, 0);
        assert_eq!(out, "error: division by zero\n2\n\n");
    }

    #[test]
    fn undo_in_a_duplicate_exits_with_the_undo_status() {
        let (code, out) = run_script(b"1\nundo\n");
        assert_eq!(code, rlundo_core::UNDO_EXIT_CODE);
        assert_eq!(out, "1\n");
    }
}
