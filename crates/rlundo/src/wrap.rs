//! Relay mode: run a command under a PTY and serve save/restore requests.

use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use portable_pty::CommandBuilder;
use rlundo_core::config::UndoConfig;
use rlundo_core::recorder::RecordingTerminal;
use rlundo_core::rewind::RewindOutcome;
use rlundo_core::signal_channel::{SignalEvent, SignalListener};
use rlundo_core::terminal::TerminalExtent;
use rlundo_pty::{InputRouter, OutputActivity, PtyConfig, RawModeGuard, spawn_relay};

type SharedTerminal = Arc<Mutex<RecordingTerminal<Stdout>>>;

/// Output silence that counts as the echo of the undo line having arrived.
const ECHO_SETTLE: Duration = Duration::from_millis(20);
/// Longest a restore waits on output that keeps flowing.
const ECHO_SETTLE_LIMIT: Duration = Duration::from_millis(150);

/// Entry point for wrapping `argv`. Returns the child's exit status.
pub fn run(config: &UndoConfig, argv: &[String]) -> i32 {
    match try_run(config, argv) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("rlundo: {err}");
            1
        }
    }
}

fn try_run(config: &UndoConfig, argv: &[String]) -> io::Result<i32> {
    let Some((program, args)) = argv.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "no command to run"));
    };

    let terminal: SharedTerminal = Arc::new(Mutex::new(RecordingTerminal::new(io::stdout())));
    // Set once the child exists; restores before that have no input to divert.
    let router: Arc<OnceLock<Arc<InputRouter>>> = Arc::new(OnceLock::new());
    let activity = Arc::new(OutputActivity::new());

    let (save, restore) = bind_listeners(config, &terminal, &router, &activity)?;
    let resolved = UndoConfig {
        save_addr: save.local_addr(),
        restore_addr: restore.local_addr(),
        ..config.clone()
    };

    let mut pty_config = PtyConfig::from_terminal();
    for (key, value) in resolved.child_env() {
        pty_config = pty_config.with_env(key, value);
    }
    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    cmd.cwd(std::env::current_dir()?);

    let _raw = match RawModeGuard::enable() {
        Ok(guard) => Some(guard),
        Err(err) => {
            tracing::warn!(error = %err, "not a terminal, relaying without raw mode");
            None
        }
    };

    let sink_terminal = Arc::clone(&terminal);
    let sink_activity = Arc::clone(&activity);
    let mut session = spawn_relay(pty_config, cmd, move |bytes: &[u8]| {
        sink_activity.record();
        lock(&sink_terminal).relay(bytes)
    })?;
    let _ = router.set(session.router());

    #[cfg(unix)]
    if let Err(err) = session.forward_resizes() {
        tracing::warn!(error = %err, "window size changes will not reach the child");
    }
    session.pump_input(io::stdin())?;

    let code = session.wait()?;
    drop(save);
    drop(restore);
    tracing::info!(
        depth = lock(&terminal).recorder().depth(),
        code,
        "session finished"
    );
    Ok(code)
}

fn bind_listeners(
    config: &UndoConfig,
    terminal: &SharedTerminal,
    router: &Arc<OnceLock<Arc<InputRouter>>>,
    activity: &Arc<OutputActivity>,
) -> io::Result<(SignalListener, SignalListener)> {
    let save_terminal = Arc::clone(terminal);
    let save = SignalListener::bind(SignalEvent::Save, config.save_addr, move || {
        lock(&save_terminal).save();
    })?;

    let restore_terminal = Arc::clone(terminal);
    let restore_router = Arc::clone(router);
    let restore_activity = Arc::clone(activity);
    let timeout = config.cursor_timeout;
    let restore = SignalListener::bind(SignalEvent::Restore, config.restore_addr, move || {
        let result = restore_screen(
            &restore_terminal,
            &restore_activity,
            restore_router.get(),
            timeout,
            ECHO_SETTLE,
        );
        match result {
            Ok(outcome) => tracing::debug!(?outcome, "restore handled"),
            Err(err) => tracing::warn!(error = %err, "restore failed"),
        }
    })?;

    Ok((save, restore))
}

/// Rewind the screen once the echo of the undo line has been relayed.
///
/// The terminal lock is taken only after output settles, so the output
/// thread can still record the echo into the buffer about to be popped.
fn restore_screen<W: Write>(
    terminal: &Mutex<RecordingTerminal<W>>,
    activity: &OutputActivity,
    router: Option<&Arc<InputRouter>>,
    timeout: Option<Duration>,
    settle: Duration,
) -> io::Result<RewindOutcome> {
    if !activity.wait_quiet(settle, ECHO_SETTLE_LIMIT.max(settle)) {
        tracing::debug!("output still flowing, rewinding anyway");
    }
    let mut terminal = lock(terminal);
    let extent = TerminalExtent::current_or_fallback();
    match router {
        Some(router) => terminal.restore(&mut router.divert(timeout), extent),
        None => terminal.restore(&mut io::empty(), extent),
    }
}

fn lock<W>(terminal: &Mutex<RecordingTerminal<W>>) -> MutexGuard<'_, RecordingTerminal<W>> {
    terminal.lock().unwrap_or_else(|e| e.into_inner())
}
