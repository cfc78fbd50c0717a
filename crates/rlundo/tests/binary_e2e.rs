#![forbid(unsafe_code)]

//! End-to-end tests for the `rlundo` binary under a real PTY.
//!
//! 1. `--version` and bad options from a plain pipe.
//! 2. Wrapping a command forwards its output and exit status.
//! 3. The built-in loop rolls back interpreter state on `undo`.
//! 4. The full relay: undo rolls back state and redraws the screen.
//! 5. How far an undo unwinds under each policy, from a plain pipe.
//!
//! Run: `cargo test -p rlundo --test binary_e2e`

use std::process::{Command, Stdio};

const BIN: &str = env!("CARGO_BIN_EXE_rlundo");

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn version_and_unknown_option() {
    let out = Command::new(BIN).arg("--version").output().unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("rlundo "));

    let out = Command::new(BIN).arg("--frobnicate").output().unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(contains(&out.stderr, b"unknown option: --frobnicate"));
}

#[test]
fn invalid_environment_is_rejected() {
    let out = Command::new(BIN)
        .arg("repl")
        .env("RLUNDO_UNWIND", "sideways")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert!(contains(&out.stderr, b"RLUNDO_UNWIND"));
}

/// An address nothing listens on.
#[cfg(unix)]
fn closed_addr() -> String {
    use std::net::{SocketAddr, TcpListener};

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Feed `script` to the built-in loop through a pipe and collect stdout.
#[cfg(unix)]
fn repl_with_policy(policy: &str, script: &[u8]) -> String {
    use std::io::Write;

    let addr = closed_addr();
    let mut child = Command::new(BIN)
        .arg("repl")
        .env("RLUNDO_UNWIND", policy)
        .env("RLUNDO_SAVE_ADDR", &addr)
        .env("RLUNDO_RESTORE_ADDR", &addr)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(script).unwrap();
    drop(stdin);
    let out = child.wait_with_output().unwrap();
    let text = String::from_utf8_lossy(&out.stdout).into_owned();
    assert_eq!(out.status.code(), Some(0), "policy {policy}: {text}");
    text
}

#[cfg(unix)]
#[test]
fn root_policy_undo_returns_to_the_first_prompt() {
    let text = repl_with_policy("root", b"a = 1\nb = 2\nundo\na\nquit\n");
    assert!(text.contains("error: unknown variable `a`"), "a survived: {text}");
}

#[cfg(unix)]
#[test]
fn step_policy_undo_takes_back_one_line() {
    let text = repl_with_policy("step", b"a = 1\nb = 2\nundo\na\nb\nquit\n");
    assert!(text.contains(">>> 1\n"), "a was lost: {text}");
    assert!(text.contains("unknown variable `b`"), "b survived: {text}");
    assert!(!text.contains("unknown variable `a`"), "{text}");
}

#[cfg(unix)]
mod pty {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use portable_pty::CommandBuilder;
    use rlundo_core::rewind::CONTIGUITY_MARKER;
    use rlundo_pty::{PtyConfig, RelaySession, spawn_relay};

    const WAIT: Duration = Duration::from_secs(10);

    fn spawn(cmd: CommandBuilder) -> (RelaySession, Arc<Mutex<Vec<u8>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        let sink_output = Arc::clone(&output);
        let session = spawn_relay(PtyConfig::default(), cmd, move |bytes: &[u8]| -> io::Result<()> {
            sink_output.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        })
        .unwrap();
        (session, output)
    }

    fn wait_for(output: &Mutex<Vec<u8>>, needle: &str) {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if contains(&output.lock().unwrap(), needle.as_bytes()) {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!(
            "timed out waiting for {needle:?}; output so far:\n{}",
            String::from_utf8_lossy(&output.lock().unwrap())
        );
    }

    #[test]
    fn wrapped_command_output_and_status_pass_through() {
        let out = Command::new(BIN)
            .args(["--", "sh", "-c", "printf wrapped-output; exit 3"])
            .env("RLUNDO_SAVE_ADDR", "127.0.0.1:0")
            .env("RLUNDO_RESTORE_ADDR", "127.0.0.1:0")
            .stdin(Stdio::null())
            .output()
            .unwrap();
        assert_eq!(out.status.code(), Some(3));
        assert!(contains(&out.stdout, b"wrapped-output"));
    }

    #[test]
    fn wrapped_command_sees_relay_endpoints() {
        let out = Command::new(BIN)
            .args(["--", "sh", "-c", "printf 'save=%s' \"$RLUNDO_SAVE_ADDR\""])
            .env("RLUNDO_SAVE_ADDR", "127.0.0.1:0")
            .env("RLUNDO_RESTORE_ADDR", "127.0.0.1:0")
            .stdin(Stdio::null())
            .output()
            .unwrap();
        assert!(out.status.success());
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(stdout.contains("save=127.0.0.1:"), "got {stdout:?}");
        assert!(!stdout.contains("save=127.0.0.1:0"), "port was not resolved: {stdout:?}");
    }

    #[test]
    fn builtin_loop_undo_rolls_back_state() {
        let mut cmd = CommandBuilder::new(BIN);
        cmd.arg("repl");
        let addr = closed_addr();
        cmd.env("RLUNDO_SAVE_ADDR", &addr);
        cmd.env("RLUNDO_RESTORE_ADDR", &addr);

        let (mut session, output) = spawn(cmd);
        // Reads are unbuffered, so typeahead is consumed line by line by
        // whichever process in the chain is prompting.
        session.send_input(b"x = 5\nx\nundo\nundo\nx\nquit\n").unwrap();
        assert_eq!(session.wait().unwrap(), 0);

        let text = String::from_utf8_lossy(&output.lock().unwrap()).into_owned();
        // The echo of the typeahead never follows a prompt directly.
        assert!(text.contains(">>> 5\r\n"), "missing value of x: {text}");
        assert!(text.contains("unknown variable `x`"), "x survived undo: {text}");
    }

    #[test]
    fn relay_undo_rewinds_screen_and_state() {
        let mut cmd = CommandBuilder::new(BIN);
        cmd.env("RLUNDO_SAVE_ADDR", "127.0.0.1:0");
        cmd.env("RLUNDO_RESTORE_ADDR", "127.0.0.1:0");
        cmd.env("RLUNDO_CURSOR_TIMEOUT_MS", "200");

        let (mut session, output) = spawn(cmd);
        wait_for(&output, ">>> ");
        session.send_input(b"y = 7\r").unwrap();
        session.send_input(b"undo\r").unwrap();
        // Nobody answers the cursor query, so the rewind degrades to the
        // marker redraw once the query times out.
        wait_for(&output, CONTIGUITY_MARKER);

        session.send_input(b"y\r").unwrap();
        wait_for(&output, "unknown variable `y`");
        session.send_input(b"quit\r").unwrap();
        assert_eq!(session.wait().unwrap(), 0);
    }
}
