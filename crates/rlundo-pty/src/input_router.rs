//! Terminal input routing.
//!
//! Keystrokes normally go straight to the child. While the rewind engine
//! waits for a cursor report, input is diverted to it instead: the report
//! arrives on the same channel as keystrokes, and the child must never see
//! it. When the diversion ends, everything except the report itself goes
//! on to the child: keystrokes the locator read past while looking for the
//! report, and anything it never got to.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rlundo_core::cursor;

/// Routes terminal input to the child or to a pending cursor query.
pub struct InputRouter {
    child: Mutex<Box<dyn Write + Send>>,
    diversion: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl fmt::Debug for InputRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let diverted = self
            .diversion
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("InputRouter")
            .field("diverted", &diverted)
            .finish_non_exhaustive()
    }
}

impl InputRouter {
    #[must_use]
    pub fn new(child: Box<dyn Write + Send>) -> Self {
        Self {
            child: Mutex::new(child),
            diversion: Mutex::new(None),
        }
    }

    /// Deliver a chunk of terminal input.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the child fails.
    pub fn route(&self, chunk: &[u8]) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        {
            let slot = self.diversion.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(tx) = slot.as_ref()
                && tx.send(chunk.to_vec()).is_ok()
            {
                return Ok(());
            }
        }
        self.write_child(chunk)
    }

    /// Start diverting input. The returned reader yields diverted bytes and
    /// fails with [`io::ErrorKind::TimedOut`] once `timeout` (measured from
    /// now) has elapsed; `None` waits forever.
    #[must_use]
    pub fn divert(self: &Arc<Self>, timeout: Option<Duration>) -> DivertedInput {
        let (tx, rx) = mpsc::channel();
        *self.diversion.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        DivertedInput {
            router: Arc::clone(self),
            rx,
            buffered: VecDeque::new(),
            handed_out: Vec::new(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    fn write_child(&self, bytes: &[u8]) -> io::Result<()> {
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        child.write_all(bytes)?;
        child.flush()
    }
}

/// Input diverted away from the child. Dropping it ends the diversion and
/// forwards every byte that was not part of a cursor report to the child.
pub struct DivertedInput {
    router: Arc<InputRouter>,
    rx: mpsc::Receiver<Vec<u8>>,
    buffered: VecDeque<u8>,
    // Everything `read` returned, in order.
    handed_out: Vec<u8>,
    deadline: Option<Instant>,
}

impl fmt::Debug for DivertedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DivertedInput")
            .field("buffered", &self.buffered.len())
            .field("handed_out", &self.handed_out.len())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl DivertedInput {
    fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let received = match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.rx.recv_timeout(remaining) {
                    Ok(chunk) => Some(chunk),
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "no terminal input before deadline",
                        ));
                    }
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
            None => self.rx.recv().ok(),
        };
        Ok(received)
    }
}

impl Read for DivertedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.buffered.is_empty() {
            match self.next_chunk()? {
                Some(chunk) => self.buffered.extend(chunk),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.buffered.len());
        for (slot, byte) in buf.iter_mut().zip(self.buffered.drain(..n)) {
            *slot = byte;
        }
        self.handed_out.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

impl Drop for DivertedInput {
    fn drop(&mut self) {
        self.router
            .diversion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.buffered.extend(chunk),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        let mut leftover = std::mem::take(&mut self.handed_out);
        if let Some(position) = cursor::take_report(&mut leftover) {
            tracing::trace!(?position, "cursor report kept from child");
        }
        leftover.extend(self.buffered.drain(..));
        if leftover.is_empty() {
            return;
        }
        tracing::trace!(bytes = leftover.len(), "returning diverted input to child");
        if let Err(err) = self.router.write_child(&leftover) {
            tracing::warn!(error = %err, "failed to forward diverted input");
        }
    }
}
