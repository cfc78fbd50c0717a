//! Terminal rewind: erase what the session drew since the previous prompt.
//!
//! # Paths
//!
//! The popped output contains `n` newlines and the cursor sits on row `r`
//! (0-indexed, so `r` rows are visible above it).
//!
//! | Condition | Path | Output |
//! |-----------|------|--------|
//! | `n <= r` | Normal | `CUU n`, left overshoot, `ED 0` |
//! | `n > r` | Overflow | clear every row, marker line, blank space to mid-screen |
//! | no cursor report | Overflow | same as above |
//!
//! The overflow path is a visible degradation. The rows that would need to
//! be restored have already scrolled out of view, so instead of guessing the
//! engine clears the screen and prints [`CONTIGUITY_MARKER`] so the user can
//! see that the history above is no longer contiguous.
//!
//! Column tracking is not maintained, so both paths reach column 0 by moving
//! left further than any line can be long.

use std::io::{self, Read, Write};

use crossterm::cursor::{MoveLeft, MoveUp};
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};

use crate::cursor::{self, CursorError};
use crate::recorder::OutputRecorder;
use crate::terminal::{CursorPosition, TerminalExtent};

/// Line printed when a rewind could not be performed precisely.
pub const CONTIGUITY_MARKER: &str = "#<---History contiguity broken by rewind--->";

/// Minimum number of columns moved left to guarantee column 0.
const MIN_LEFT_OVERSHOOT: u16 = 200;

/// What a restore did to the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewindOutcome {
    /// The cursor moved up `lines` rows and the screen below was cleared.
    Rewound { lines: u16 },
    /// The rewind needed `lines` rows but only `available` were visible
    /// (`None` when the terminal never reported a position).
    Overflow {
        lines: usize,
        available: Option<u16>,
    },
}

impl RewindOutcome {
    /// Decide between the normal and overflow paths.
    #[must_use]
    pub fn plan(lines: usize, cursor: Option<CursorPosition>) -> Self {
        match cursor {
            Some(position) if lines <= usize::from(position.row) => Self::Rewound {
                // Bounded by a u16 row above.
                lines: u16::try_from(lines).unwrap_or(position.row),
            },
            Some(position) => Self::Overflow {
                lines,
                available: Some(position.row),
            },
            None => Self::Overflow {
                lines,
                available: None,
            },
        }
    }

    #[must_use]
    pub const fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }
}

/// Number of terminal lines a chunk of output advanced the cursor by.
#[must_use]
pub fn count_lines(text: &[u8]) -> usize {
    memchr::memchr_iter(b'\n', text).count()
}

/// Performs the visible half of an undo.
#[derive(Debug, Clone)]
pub struct RewindEngine {
    marker: String,
}

impl Default for RewindEngine {
    fn default() -> Self {
        Self {
            marker: CONTIGUITY_MARKER.to_string(),
        }
    }
}

impl RewindEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the overflow marker text.
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Rewind the terminal to where it was two checkpoints ago.
    ///
    /// Consumes the two newest recorder buffers, asks the terminal where the
    /// cursor is (query on `out`, reply on `replies`), then erases.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails. A missing cursor report is
    /// not an error; it selects the overflow path.
    pub fn restore<W, R>(
        &self,
        recorder: &mut OutputRecorder,
        out: &mut W,
        replies: &mut R,
        extent: TerminalExtent,
    ) -> io::Result<RewindOutcome>
    where
        W: Write,
        R: Read + ?Sized,
    {
        let text = recorder.pop_since_last_save();
        let lines = count_lines(&text);

        let cursor = match cursor::locate(out, replies) {
            Ok(position) => Some(position),
            Err(CursorError::NoResponse) => {
                tracing::warn!("no cursor report, falling back to overflow redraw");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "cursor query failed, falling back to overflow redraw");
                None
            }
        };

        let outcome = RewindOutcome::plan(lines, cursor);
        tracing::debug!(?outcome, ?extent, "rewinding terminal");
        match outcome {
            RewindOutcome::Rewound { lines } => self.write_rewind(out, lines, extent)?,
            RewindOutcome::Overflow { .. } => self.write_overflow(out, extent)?,
        }
        out.flush()?;
        Ok(outcome)
    }

    fn write_rewind<W: Write>(&self, out: &mut W, lines: u16, extent: TerminalExtent) -> io::Result<()> {
        if lines > 0 {
            queue!(out, MoveUp(lines))?;
        }
        queue!(
            out,
            MoveLeft(left_overshoot(extent)),
            Clear(ClearType::FromCursorDown)
        )
    }

    fn write_overflow<W: Write>(&self, out: &mut W, extent: TerminalExtent) -> io::Result<()> {
        queue!(
            out,
            MoveLeft(left_overshoot(extent)),
            Clear(ClearType::UntilNewLine)
        )?;
        // The terminal clamps at the top row, so this reaches row 0 from anywhere.
        for _ in 1..extent.height {
            queue!(out, MoveUp(1), Clear(ClearType::CurrentLine))?;
        }
        out.write_all(self.marker.as_bytes())?;
        out.write_all(b"\r\n")?;
        for _ in 1..extent.middle_row() {
            queue!(out, Clear(ClearType::UntilNewLine))?;
            out.write_all(b"\r\n")?;
        }
        queue!(out, Clear(ClearType::FromCursorDown))
    }
}

fn left_overshoot(extent: TerminalExtent) -> u16 {
    extent.width.max(MIN_LEFT_OVERSHOOT)
}
