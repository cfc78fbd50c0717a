#![forbid(unsafe_code)]

//! PTY relay for undoable sessions.
//!
//! Runs a command under a pseudo-terminal and sits between it and the real
//! terminal: child output goes through an [`OutputSink`] (the recorder) on its
//! way to the screen, terminal input goes to the child through an
//! [`InputRouter`], and window-size changes are forwarded to the PTY.
//!
//! # Threads
//!
//! | Thread | Work |
//! |--------|------|
//! | `rlundo-output` | PTY master → sink, until EOF |
//! | `rlundo-input` | terminal input → router (detached; blocks on read) |
//! | `rlundo-winch` | SIGWINCH → PTY resize (Unix) |
//!
//! The caller's thread waits for the child.

/// Terminal input routing between the child and cursor queries.
pub mod input_router;
/// Output timing, so restores can wait for in-flight echo.
pub mod output_activity;

use std::fmt;
use std::io::{self, Read};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use portable_pty::{CommandBuilder, MasterPty, PtySize};
use rlundo_core::terminal::TerminalExtent;

pub use input_router::{DivertedInput, InputRouter};
pub use output_activity::OutputActivity;

/// How long [`RelaySession::wait`] keeps draining output after the child exited.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration for the child's PTY.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// PTY width in columns.
    pub cols: u16,
    /// PTY height in rows.
    pub rows: u16,
    /// TERM to set in the child (inherited when `None`).
    pub term: Option<String>,
    /// Extra environment variables to set in the child.
    pub env: Vec<(String, String)>,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            term: None,
            env: Vec::new(),
        }
    }
}

impl PtyConfig {
    /// Size the PTY like the controlling terminal.
    #[must_use]
    pub fn from_terminal() -> Self {
        let extent = TerminalExtent::current_or_fallback();
        Self::default().with_size(extent.width, extent.height)
    }

    /// Override PTY dimensions.
    #[must_use]
    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    /// Override TERM in the child.
    #[must_use]
    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = Some(term.into());
        self
    }

    /// Add an environment variable in the child.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn size(&self) -> PtySize {
        pty_size(self.rows, self.cols)
    }
}

/// Receives every chunk of child output, in order.
pub trait OutputSink: Send + 'static {
    /// # Errors
    ///
    /// An error is logged; the relay keeps draining the child.
    fn output(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<F> OutputSink for F
where
    F: FnMut(&[u8]) -> io::Result<()> + Send + 'static,
{
    fn output(&mut self, bytes: &[u8]) -> io::Result<()> {
        self(bytes)
    }
}

/// A running child under the relay.
pub struct RelaySession {
    child: Box<dyn portable_pty::Child + Send + Sync>,
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    router: Arc<InputRouter>,
    done_rx: mpsc::Receiver<()>,
    output_thread: Option<JoinHandle<()>>,
    #[cfg(unix)]
    resize_guard: Option<ResizeSignalGuard>,
}

impl fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySession")
            .field("child_pid", &self.child.process_id())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Spawn `cmd` under a new PTY and start relaying its output into `sink`.
///
/// `config.term` and `config.env` are applied to the `CommandBuilder` before spawn.
///
/// # Errors
///
/// Returns an error if the PTY cannot be opened or the command cannot be
/// spawned.
pub fn spawn_relay<S: OutputSink>(
    config: PtyConfig,
    mut cmd: CommandBuilder,
    mut sink: S,
) -> io::Result<RelaySession> {
    if let Some(term) = config.term.as_ref() {
        cmd.env("TERM", term);
    }
    for (k, v) in &config.env {
        cmd.env(k, v);
    }

    let pty_system = portable_pty::native_pty_system();
    let pair = pty_system
        .openpty(config.size())
        .map_err(portable_pty_error)?;

    let child = pair.slave.spawn_command(cmd).map_err(portable_pty_error)?;
    // The child holds its own copy; ours would keep the master from seeing EOF.
    drop(pair.slave);
    let mut reader = pair.master.try_clone_reader().map_err(portable_pty_error)?;
    let writer = pair.master.take_writer().map_err(portable_pty_error)?;
    tracing::info!(pid = ?child.process_id(), cols = config.cols, rows = config.rows, "child spawned");

    let (done_tx, done_rx) = mpsc::channel::<()>();
    let output_thread = thread::Builder::new()
        .name("rlundo-output".into())
        .spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Err(err) = sink.output(&buf[..n]) {
                            tracing::warn!(error = %err, "output sink failed");
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    // EIO once the child side is closed on Linux.
                    Err(err) => {
                        tracing::debug!(error = %err, "pty read ended");
                        break;
                    }
                }
            }
            let _ = done_tx.send(());
        })?;

    Ok(RelaySession {
        child,
        master: Arc::new(Mutex::new(pair.master)),
        router: Arc::new(InputRouter::new(writer)),
        done_rx,
        output_thread: Some(output_thread),
        #[cfg(unix)]
        resize_guard: None,
    })
}

impl RelaySession {
    /// Shared handle to the input router (for cursor-query diversion).
    #[must_use]
    pub fn router(&self) -> Arc<InputRouter> {
        Arc::clone(&self.router)
    }

    /// Send input bytes to the child (or to a pending diversion).
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the PTY fails.
    pub fn send_input(&self, bytes: &[u8]) -> io::Result<()> {
        self.router.route(bytes)
    }

    /// Forward everything read from `source` through the router.
    ///
    /// The thread is detached: a blocking terminal read cannot be cancelled,
    /// and it ends with the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn pump_input<R: Read + Send + 'static>(&self, mut source: R) -> io::Result<()> {
        let router = Arc::clone(&self.router);
        thread::Builder::new()
            .name("rlundo-input".into())
            .spawn(move || {
                let mut buf = [0u8; 1024];
                loop {
                    match source.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if let Err(err) = router.route(&buf[..n]) {
                                tracing::debug!(error = %err, "child input closed");
                                break;
                            }
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                        Err(err) => {
                            tracing::warn!(error = %err, "terminal input read failed");
                            break;
                        }
                    }
                }
            })?;
        Ok(())
    }

    /// Resize the child's PTY.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTY rejects the size.
    pub fn resize(&self, cols: u16, rows: u16) -> io::Result<()> {
        resize_master(&self.master, cols, rows)
    }

    /// Keep the PTY sized like the controlling terminal (SIGWINCH).
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler cannot be registered.
    #[cfg(unix)]
    pub fn forward_resizes(&mut self) -> io::Result<()> {
        if self.resize_guard.is_none() {
            self.resize_guard = Some(ResizeSignalGuard::new(Arc::clone(&self.master))?);
        }
        Ok(())
    }

    /// Child process id (if available on this platform).
    #[must_use]
    pub fn child_pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Wait for the child to exit, then for its remaining output to be
    /// relayed (bounded by [`DRAIN_TIMEOUT`]). Returns the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the child cannot be waited for.
    pub fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait()?;
        let code = i32::try_from(status.exit_code()).unwrap_or(1);
        match self.done_rx.recv_timeout(DRAIN_TIMEOUT) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.output_thread.take() {
                    let _ = handle.join();
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!("child output still open after exit, not draining further");
            }
        }
        tracing::info!(code, "child exited");
        Ok(code)
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        #[cfg(unix)]
        drop(self.resize_guard.take());
        if self.output_thread.is_some() {
            // Never waited: make sure the child does not outlive us.
            let _ = self.child.kill();
        }
    }
}

/// Puts the controlling terminal in raw mode until dropped.
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// # Errors
    ///
    /// Returns an error if stdin is not a terminal.
    pub fn enable() -> io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = crossterm::terminal::disable_raw_mode() {
            tracing::warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn resize_master(master: &Mutex<Box<dyn MasterPty + Send>>, cols: u16, rows: u16) -> io::Result<()> {
    master
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .resize(pty_size(rows, cols))
        .map_err(portable_pty_error)
}

fn portable_pty_error<E: fmt::Display>(err: E) -> io::Error {
    io::Error::other(err.to_string())
}

// Resize notifications arrive as SIGWINCH; a dedicated thread re-reads the
// terminal size and applies it to the PTY.
#[cfg(unix)]
struct ResizeSignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl ResizeSignalGuard {
    fn new(master: Arc<Mutex<Box<dyn MasterPty + Send>>>) -> io::Result<Self> {
        use signal_hook::consts::signal::SIGWINCH;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGWINCH])?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("rlundo-winch".into())
            .spawn(move || {
                for _ in signals.forever() {
                    let extent = TerminalExtent::current_or_fallback();
                    if let Err(err) = resize_master(&master, extent.width, extent.height) {
                        tracing::warn!(error = %err, "pty resize failed");
                    } else {
                        tracing::debug!(?extent, "pty resized");
                    }
                }
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for ResizeSignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
