//! Cursor position queries (DSR 6 / CPR).
//!
//! The rewind engine needs to know how many rows sit above the cursor before
//! it moves up. The terminal is asked directly every time; positions are never
//! cached because the user may have resized or scrolled the terminal since the
//! last prompt.
//!
//! # Protocol
//!
//! | Direction | Sequence | Notes |
//! |-----------|----------|-------|
//! | Request | `CSI 6 n` | Device Status Report, cursor position |
//! | Reply | `CSI Pr ; Pc R` | 1-indexed row and column |
//!
//! # Failure Modes
//!
//! | Failure | Cause | Result |
//! |---------|-------|--------|
//! | Reply channel at EOF | Not an interactive terminal | [`CursorError::NoResponse`] |
//! | Read timed out | Terminal ignores DSR | [`CursorError::NoResponse`] |
//! | Reply never completes | Garbage on the input channel | [`CursorError::NoResponse`] |
//! | Write fails | Output channel closed | [`CursorError::Io`] |
//!
//! Callers treat every error as "precise rewind not possible".

use std::fmt;
use std::io::{self, Read, Write};

use crate::terminal::CursorPosition;

/// Device Status Report, cursor position: `CSI 6 n`.
pub const CURSOR_QUERY: &[u8] = b"\x1b[6n";

/// Give up on a reply after this many bytes.
const MAX_RESPONSE_LEN: usize = 256;

/// Why the cursor position could not be determined.
#[derive(Debug)]
pub enum CursorError {
    /// The terminal did not answer with a complete report.
    NoResponse,
    /// Writing the query failed.
    Io(io::Error),
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => write!(f, "terminal did not report a cursor position"),
            Self::Io(err) => write!(f, "cursor query failed: {err}"),
        }
    }
}

impl std::error::Error for CursorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NoResponse => None,
            Self::Io(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ReportState {
    #[default]
    Ground,
    Escape,
    Row,
    Col,
}

/// Incremental parser for `CSI Pr ; Pc R` replies.
///
/// Bytes that are not part of a cursor report (keystrokes typed while the
/// query was in flight, other CSI replies) are skipped. The parser does not
/// keep them; a reader that needs them back uses [`take_report`].
#[derive(Debug, Clone, Default)]
pub struct CursorReportParser {
    state: ReportState,
    row: u32,
    col: u32,
    digits: usize,
}

impl CursorReportParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns the 0-indexed position once a report completes.
    pub fn feed(&mut self, byte: u8) -> Option<CursorPosition> {
        match (self.state, byte) {
            (_, 0x1b) => {
                self.reset();
                self.state = ReportState::Escape;
            }
            (ReportState::Ground, _) => {}
            (ReportState::Escape, b'[') => {
                self.state = ReportState::Row;
            }
            (ReportState::Escape, _) => self.reset(),
            (ReportState::Row, b'0'..=b'9') => {
                self.row = push_digit(self.row, byte);
                self.digits += 1;
            }
            (ReportState::Row, b';') if self.digits > 0 => {
                self.state = ReportState::Col;
                self.digits = 0;
            }
            (ReportState::Col, b'0'..=b'9') => {
                self.col = push_digit(self.col, byte);
                self.digits += 1;
            }
            (ReportState::Col, b'R') if self.digits > 0 => {
                let position = CursorPosition::new(to_zero_based(self.row), to_zero_based(self.col));
                self.reset();
                return Some(position);
            }
            _ => self.reset(),
        }
        None
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

fn push_digit(acc: u32, byte: u8) -> u32 {
    acc.saturating_mul(10).saturating_add(u32::from(byte - b'0'))
}

fn to_zero_based(value: u32) -> u16 {
    u16::try_from(value.saturating_sub(1)).unwrap_or(u16::MAX)
}

/// Remove the first complete cursor report from `bytes`, keeping everything
/// around it in order.
///
/// [`locate`] stops reading right after a report, so applied to the bytes a
/// locate call consumed this leaves exactly the input it skipped.
pub fn take_report(bytes: &mut Vec<u8>) -> Option<CursorPosition> {
    let mut parser = CursorReportParser::new();
    let (end, position) = bytes
        .iter()
        .enumerate()
        .find_map(|(i, &b)| parser.feed(b).map(|position| (i, position)))?;
    // The parser restarts on every ESC, so the report begins at the last one.
    let start = bytes[..=end].iter().rposition(|&b| b == 0x1b)?;
    bytes.drain(start..=end);
    Some(position)
}

/// Ask the terminal where the cursor is.
///
/// Writes [`CURSOR_QUERY`] to `out`, flushes, then reads `input` one byte at a
/// time until a report is parsed. Exactly one request is made; there are no
/// retries. A reader that returns EOF, `TimedOut` or `WouldBlock` yields
/// [`CursorError::NoResponse`]; bounding the wait is the reader's job.
///
/// # Errors
///
/// See the module-level failure table.
pub fn locate<W, R>(out: &mut W, input: &mut R) -> Result<CursorPosition, CursorError>
where
    W: Write + ?Sized,
    R: Read + ?Sized,
{
    out.write_all(CURSOR_QUERY).map_err(CursorError::Io)?;
    out.flush().map_err(CursorError::Io)?;

    let mut parser = CursorReportParser::new();
    let mut byte = [0u8; 1];
    for _ in 0..MAX_RESPONSE_LEN {
        match input.read(&mut byte) {
            Ok(0) => return Err(CursorError::NoResponse),
            Ok(_) => {
                if let Some(position) = parser.feed(byte[0]) {
                    tracing::trace!(row = position.row, col = position.col, "cursor report");
                    return Ok(position);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::debug!(error = %err, "cursor report read failed");
                return Err(CursorError::NoResponse);
            }
        }
    }
    Err(CursorError::NoResponse)
}
