//! Save/restore rendezvous between the input-reading process and the relay.
//!
//! Each event has its own loopback TCP endpoint. Triggering an event opens a
//! connection and blocks until the peer closes it; the listener closes only
//! after its handler returned, so a trigger is a synchronous call into the
//! relay process. No bytes are exchanged.
//!
//! When nothing listens on an endpoint (the command loop runs outside a
//! relay), triggering is a no-op.

use std::fmt;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::config::UndoConfig;

/// The two rendezvous events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalEvent {
    /// A prompt is about to be shown; open a new output interval.
    Save,
    /// An undo was requested; rewind the display.
    Restore,
}

impl SignalEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of triggering an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The listener ran its handler and closed the connection.
    Delivered,
    /// Nobody was listening.
    NoListener,
}

/// Accept loop for one event. Stops and joins its thread on drop.
pub struct SignalListener {
    event: SignalEvent,
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for SignalListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalListener")
            .field("event", &self.event)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl SignalListener {
    /// Bind `addr` and start accepting. `handler` runs once per connection,
    /// on the accept thread, before the connection is closed.
    ///
    /// Port 0 binds an ephemeral port; see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the thread cannot
    /// be spawned.
    pub fn bind<F>(event: SignalEvent, addr: SocketAddr, mut handler: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(format!("rlundo-{event}"))
            .spawn(move || {
                for stream in listener.incoming() {
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    match stream {
                        Ok(stream) => {
                            tracing::trace!(%event, "signal received");
                            handler();
                            drop(stream);
                        }
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                        Err(err) => tracing::warn!(%event, error = %err, "signal accept failed"),
                    }
                }
            })?;

        tracing::debug!(%event, %local_addr, "signal listener bound");
        Ok(Self {
            event,
            local_addr,
            stop,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub const fn event(&self) -> SignalEvent {
        self.event
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Wake the blocking accept so the loop sees the flag.
        let _ = TcpStream::connect(self.local_addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Triggering side, used by the process that reads input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalClient {
    save_addr: SocketAddr,
    restore_addr: SocketAddr,
}

impl SignalClient {
    #[must_use]
    pub const fn new(save_addr: SocketAddr, restore_addr: SocketAddr) -> Self {
        Self {
            save_addr,
            restore_addr,
        }
    }

    #[must_use]
    pub fn from_config(config: &UndoConfig) -> Self {
        Self::new(config.save_addr, config.restore_addr)
    }

    #[must_use]
    pub const fn addr(&self, event: SignalEvent) -> SocketAddr {
        match event {
            SignalEvent::Save => self.save_addr,
            SignalEvent::Restore => self.restore_addr,
        }
    }

    /// Trigger `event` and block until the listener's handler finished.
    ///
    /// # Errors
    ///
    /// Connection failures are reported as [`Delivery::NoListener`]. An error
    /// is returned only if the connection breaks after it was accepted.
    pub fn trigger(&self, event: SignalEvent) -> io::Result<Delivery> {
        let addr = self.addr(event);
        let mut stream = match TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(err) => {
                if err.kind() != io::ErrorKind::ConnectionRefused {
                    tracing::warn!(%event, %addr, error = %err, "signal endpoint unreachable");
                }
                return Ok(Delivery::NoListener);
            }
        };
        let mut sink = Vec::new();
        loop {
            match stream.read_to_end(&mut sink) {
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) if err.kind() == io::ErrorKind::ConnectionReset => break,
                Err(err) => return Err(err),
            }
        }
        tracing::trace!(%event, "signal delivered");
        Ok(Delivery::Delivered)
    }
}
