//! In-memory virtual terminal for testing rewinds.
//!
//! `VirtualTerminal` keeps a character grid with cursor tracking and
//! interprets the subset of ANSI sequences a line-oriented session and the
//! rewind engine produce. It answers cursor position queries (`CSI 6 n`) the
//! way a real terminal does, by queueing a `CSI row ; col R` reply that tests
//! read back through [`SharedTerminal::replies`].
//!
//! # Invariants
//!
//! 1. **Cursor always in bounds**: `cursor_x <= width`, `cursor_y < height`.
//!    `cursor_x == width` is the pending-wrap state; the next printable
//!    character wraps to the next line.
//! 2. **Grid always fully populated**: `grid.len() == width * height`.
//! 3. **Scrollback is append-only**: lines scrolled off the top are pushed to
//!    the back and truncated from the front past `max_scrollback`.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unrecognized CSI | Unknown terminal sequence | Silently ignored |
//! | Cursor wrap past bottom | Output fills screen | Scroll up, top line to scrollback |
//! | Query with reports disabled | Simulated dumb terminal | No reply queued |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use crate::terminal::{CursorPosition, TerminalExtent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Ground,
    Escape,
    Csi,
}

/// In-memory virtual terminal with cursor tracking and ANSI interpretation.
///
/// # Example
///
/// ```
/// use rlundo_core::virtual_terminal::VirtualTerminal;
///
/// let mut vt = VirtualTerminal::new(80, 24);
/// vt.feed(b">>> 1 + 1\r\n2\r\n");
/// assert_eq!(vt.row_text(1), "2");
/// assert_eq!(vt.cursor(), (0, 2));
/// ```
#[derive(Debug, Clone)]
pub struct VirtualTerminal {
    width: u16,
    height: u16,
    grid: Vec<char>,
    cursor_x: u16,
    cursor_y: u16,
    scrollback: VecDeque<String>,
    max_scrollback: usize,
    parse_state: ParseState,
    csi_params: Vec<u16>,
    csi_private: bool,
    reports_cursor: bool,
    replies: VecDeque<u8>,
}

impl VirtualTerminal {
    /// Create a new virtual terminal with the given dimensions.
    ///
    /// # Panics
    ///
    /// Panics if width or height is 0.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        assert!(width > 0 && height > 0, "terminal dimensions must be > 0");
        Self {
            width,
            height,
            grid: vec![' '; usize::from(width) * usize::from(height)],
            cursor_x: 0,
            cursor_y: 0,
            scrollback: VecDeque::new(),
            max_scrollback: 1000,
            parse_state: ParseState::Ground,
            csi_params: Vec::new(),
            csi_private: false,
            reports_cursor: true,
            replies: VecDeque::new(),
        }
    }

    // ── Dimensions & Cursor ─────────────────────────────────────────

    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Size in the shape the rewind engine takes.
    #[must_use]
    pub const fn extent(&self) -> TerminalExtent {
        TerminalExtent::new(self.height, self.width)
    }

    /// Current cursor position (x, y), 0-indexed.
    #[must_use]
    pub const fn cursor(&self) -> (u16, u16) {
        (self.cursor_x, self.cursor_y)
    }

    /// Current cursor position as a row/column pair.
    #[must_use]
    pub fn cursor_position(&self) -> CursorPosition {
        CursorPosition::new(self.cursor_y, self.cursor_x.min(self.width - 1))
    }

    /// Place the cursor directly (clamped to the grid).
    pub fn set_cursor(&mut self, x: u16, y: u16) {
        self.cursor_x = x.min(self.width - 1);
        self.cursor_y = y.min(self.height - 1);
    }

    /// Whether `CSI 6 n` queues a reply. Disable to simulate a terminal that
    /// ignores cursor queries.
    pub fn set_reports_cursor(&mut self, enabled: bool) {
        self.reports_cursor = enabled;
    }

    #[must_use]
    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    /// Get a scrollback line by index (0 = oldest).
    #[must_use]
    pub fn scrollback_line(&self, idx: usize) -> Option<&str> {
        self.scrollback.get(idx).map(String::as_str)
    }

    // ── Cell Access ─────────────────────────────────────────────────

    /// Get the character at (x, y). Returns `None` if out of bounds.
    #[must_use]
    pub fn char_at(&self, x: u16, y: u16) -> Option<char> {
        (x < self.width && y < self.height).then(|| self.grid[self.idx(x, y)])
    }

    /// Get the text content of a row (trailing spaces trimmed).
    #[must_use]
    pub fn row_text(&self, y: u16) -> String {
        if y >= self.height {
            return String::new();
        }
        let start = self.idx(0, y);
        let end = start + usize::from(self.width);
        let s: String = self.grid[start..end].iter().collect();
        s.trim_end().to_string()
    }

    /// Get all visible text as a string (rows separated by newlines).
    #[must_use]
    pub fn screen_text(&self) -> String {
        (0..self.height)
            .map(|y| self.row_text(y))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Rows that contain `needle`.
    #[must_use]
    pub fn rows_containing(&self, needle: &str) -> Vec<u16> {
        (0..self.height)
            .filter(|&y| self.row_text(y).contains(needle))
            .collect()
    }

    // ── Input Processing ────────────────────────────────────────────

    /// Feed raw bytes into the terminal (ANSI-aware).
    pub fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            self.process_byte(byte);
        }
    }

    /// Drain the replies queued for the host (cursor reports).
    pub fn take_replies(&mut self) -> Vec<u8> {
        self.replies.drain(..).collect()
    }

    // ── Internal ────────────────────────────────────────────────────

    fn idx(&self, x: u16, y: u16) -> usize {
        usize::from(y) * usize::from(self.width) + usize::from(x)
    }

    fn process_byte(&mut self, byte: u8) {
        match self.parse_state {
            ParseState::Ground => self.ground(byte),
            ParseState::Escape => self.escape(byte),
            ParseState::Csi => self.csi(byte),
        }
    }

    fn ground(&mut self, byte: u8) {
        match byte {
            0x1b => self.parse_state = ParseState::Escape,
            b'\n' => self.linefeed(),
            b'\r' => self.cursor_x = 0,
            b'\x08' => self.cursor_x = self.cursor_x.saturating_sub(1),
            0x20..=0x7e => self.put_char(char::from(byte)),
            // UTF-8 lead byte; continuation bytes are dropped.
            0xc0..=0xff => self.put_char('\u{FFFD}'),
            _ => {}
        }
    }

    fn escape(&mut self, byte: u8) {
        if byte == b'[' {
            self.parse_state = ParseState::Csi;
            self.csi_params.clear();
            self.csi_private = false;
        } else {
            self.parse_state = ParseState::Ground;
        }
    }

    fn csi(&mut self, byte: u8) {
        match byte {
            b'0'..=b'9' => {
                let digit = u16::from(byte - b'0');
                if let Some(last) = self.csi_params.last_mut() {
                    *last = last.saturating_mul(10).saturating_add(digit);
                } else {
                    self.csi_params.push(digit);
                }
            }
            b';' => {
                if self.csi_params.is_empty() {
                    self.csi_params.push(0);
                }
                self.csi_params.push(0);
            }
            b'?' | b'>' => self.csi_private = true,
            0x40..=0x7e => {
                self.dispatch_csi(byte);
                self.parse_state = ParseState::Ground;
            }
            _ => self.parse_state = ParseState::Ground,
        }
    }

    fn dispatch_csi(&mut self, final_byte: u8) {
        if self.csi_private {
            return;
        }
        let params = &self.csi_params;
        let last_col = self.width - 1;
        let last_row = self.height - 1;

        match final_byte {
            b'A' => {
                let n = Self::param(params, 0, 1);
                self.cursor_y = self.cursor_y.saturating_sub(n);
            }
            b'B' => {
                let n = Self::param(params, 0, 1);
                self.cursor_y = self.cursor_y.saturating_add(n).min(last_row);
            }
            b'C' => {
                let n = Self::param(params, 0, 1);
                self.cursor_x = self.cursor_x.saturating_add(n).min(last_col);
            }
            b'D' => {
                let n = Self::param(params, 0, 1);
                self.cursor_x = self.cursor_x.min(last_col).saturating_sub(n);
            }
            b'G' => {
                let col = Self::param(params, 0, 1).saturating_sub(1);
                self.cursor_x = col.min(last_col);
            }
            b'H' | b'f' => {
                let row = Self::param(params, 0, 1).saturating_sub(1);
                let col = Self::param(params, 1, 1).saturating_sub(1);
                self.cursor_y = row.min(last_row);
                self.cursor_x = col.min(last_col);
            }
            b'J' => {
                let mode = Self::param(params, 0, 0);
                self.erase_display(mode);
            }
            b'K' => {
                let mode = Self::param(params, 0, 0);
                self.erase_line(mode);
            }
            b'n' if Self::param(params, 0, 0) == 6 => {
                if self.reports_cursor {
                    let position = self.cursor_position();
                    let reply = format!("\x1b[{};{}R", position.row + 1, position.col + 1);
                    self.replies.extend(reply.bytes());
                }
            }
            _ => {}
        }
    }

    fn put_char(&mut self, ch: char) {
        if self.cursor_x >= self.width {
            self.cursor_x = 0;
            self.linefeed();
        }
        let idx = self.idx(self.cursor_x, self.cursor_y);
        self.grid[idx] = ch;
        self.cursor_x += 1;
    }

    fn linefeed(&mut self) {
        if self.cursor_y == self.height - 1 {
            self.scroll_up();
        } else {
            self.cursor_y += 1;
        }
    }

    fn scroll_up(&mut self) {
        self.scrollback.push_back(self.row_text(0));
        while self.scrollback.len() > self.max_scrollback {
            self.scrollback.pop_front();
        }
        let w = usize::from(self.width);
        self.grid.drain(..w);
        self.grid.extend(std::iter::repeat_n(' ', w));
    }

    fn erase_display(&mut self, mode: u16) {
        let cursor = self.idx(self.cursor_x.min(self.width - 1), self.cursor_y);
        let range = match mode {
            0 => self.idx(self.cursor_x, self.cursor_y).min(self.grid.len())..self.grid.len(),
            1 => 0..cursor + 1,
            2 | 3 => 0..self.grid.len(),
            _ => return,
        };
        self.grid[range].fill(' ');
        if mode == 3 {
            self.scrollback.clear();
        }
    }

    fn erase_line(&mut self, mode: u16) {
        let row_start = self.idx(0, self.cursor_y);
        let row_end = row_start + usize::from(self.width);
        let cursor = row_start + usize::from(self.cursor_x);
        let range = match mode {
            0 => cursor.min(row_end)..row_end,
            1 => row_start..(cursor + 1).min(row_end),
            2 => row_start..row_end,
            _ => return,
        };
        self.grid[range].fill(' ');
    }

    fn param(params: &[u16], idx: usize, default: u16) -> u16 {
        params
            .get(idx)
            .copied()
            .filter(|&v| v > 0)
            .unwrap_or(default)
    }
}

impl Write for VirtualTerminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.feed(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A virtual terminal shared between the output side (what the engine writes)
/// and the input side (the replies it reads back).
#[derive(Debug, Clone)]
pub struct SharedTerminal {
    inner: Rc<RefCell<VirtualTerminal>>,
}

impl SharedTerminal {
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            inner: Rc::new(RefCell::new(VirtualTerminal::new(width, height))),
        }
    }

    /// Writable end; bytes are fed to the terminal.
    #[must_use]
    pub fn writer(&self) -> TerminalWriter {
        TerminalWriter {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Readable end; yields queued replies, then EOF.
    #[must_use]
    pub fn replies(&self) -> TerminalReplies {
        TerminalReplies {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Run `f` against the terminal state.
    pub fn with<T>(&self, f: impl FnOnce(&mut VirtualTerminal) -> T) -> T {
        f(&mut self.inner.borrow_mut())
    }
}

#[derive(Debug, Clone)]
pub struct TerminalWriter {
    inner: Rc<RefCell<VirtualTerminal>>,
}

impl Write for TerminalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.borrow_mut().feed(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TerminalReplies {
    inner: Rc<RefCell<VirtualTerminal>>,
}

impl Read for TerminalReplies {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut vt = self.inner.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match vt.replies.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}
