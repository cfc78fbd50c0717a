//! Output recording between checkpoints.
//!
//! Every chunk the wrapped session prints is appended to the newest buffer.
//! A "save" opens a new buffer; a restore pops the newest two, which together
//! hold everything drawn since the prompt being returned to.

use std::io::{self, Read, Write};

use crate::rewind::{RewindEngine, RewindOutcome};
use crate::terminal::TerminalExtent;

/// Stack of output buffers, one per checkpoint interval, newest last.
#[derive(Debug, Clone)]
pub struct OutputRecorder {
    buffers: Vec<Vec<u8>>,
}

impl Default for OutputRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputRecorder {
    /// A recorder with a single empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: vec![Vec::new()],
        }
    }

    /// Append session output to the active buffer.
    ///
    /// Does nothing when no buffer is active (after restores drained the
    /// stack); the relay must keep running regardless.
    pub fn append(&mut self, bytes: &[u8]) {
        if let Some(active) = self.buffers.last_mut() {
            active.extend_from_slice(bytes);
        }
    }

    /// Open a new, empty interval.
    pub fn save(&mut self) {
        self.buffers.push(Vec::new());
        tracing::debug!(depth = self.buffers.len(), "output checkpoint saved");
    }

    /// Pop the two newest intervals and return them oldest first.
    ///
    /// Returns fewer bytes when fewer than two buffers remain. Older buffers
    /// are never read.
    pub fn pop_since_last_save(&mut self) -> Vec<u8> {
        let newest = self.buffers.pop().unwrap_or_default();
        let mut text = self.buffers.pop().unwrap_or_default();
        text.extend_from_slice(&newest);
        {
            let preview = String::from_utf8_lossy(&text);
            tracing::debug!(
                depth = self.buffers.len(),
                bytes = text.len(),
                text = %preview.escape_debug(),
                "output since last checkpoint popped"
            );
        }
        text
    }

    /// Number of buffers on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.buffers.len()
    }

    /// All buffers, oldest first.
    #[must_use]
    pub fn buffers(&self) -> &[Vec<u8>] {
        &self.buffers
    }
}

/// The controlling process's view of the real terminal: the recorder plus
/// the writer that session output is relayed to.
///
/// Relay writes, saves and rewinds all go through one value so that a single
/// lock serializes them.
#[derive(Debug)]
pub struct RecordingTerminal<W> {
    recorder: OutputRecorder,
    out: W,
    engine: RewindEngine,
}

impl<W: Write> RecordingTerminal<W> {
    #[must_use]
    pub fn new(out: W) -> Self {
        Self::with_engine(out, RewindEngine::default())
    }

    #[must_use]
    pub fn with_engine(out: W, engine: RewindEngine) -> Self {
        Self {
            recorder: OutputRecorder::new(),
            out,
            engine,
        }
    }

    /// Record a chunk of session output and pass it through to the terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal write fails; the chunk is recorded
    /// either way.
    pub fn relay(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.recorder.append(bytes);
        self.out.write_all(bytes)?;
        self.out.flush()
    }

    /// Handle a "save" event.
    pub fn save(&mut self) {
        self.recorder.save();
    }

    /// Handle a "restore" event: rewind the screen to the previous prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the terminal fails.
    pub fn restore<R: Read + ?Sized>(
        &mut self,
        replies: &mut R,
        extent: TerminalExtent,
    ) -> io::Result<RewindOutcome> {
        self.engine
            .restore(&mut self.recorder, &mut self.out, replies, extent)
    }

    #[must_use]
    pub fn recorder(&self) -> &OutputRecorder {
        &self.recorder
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }
}
