//! Live terminal geometry.

use std::io;

/// Height and width of the controlling terminal, in cells.
///
/// Always read live: the terminal may have been resized since the last
/// prompt, so nothing here is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalExtent {
    pub height: u16,
    pub width: u16,
}

impl TerminalExtent {
    /// Conventional fallback when the size cannot be queried.
    pub const FALLBACK: Self = Self {
        height: 24,
        width: 80,
    };

    #[must_use]
    pub const fn new(height: u16, width: u16) -> Self {
        Self { height, width }
    }

    /// Query the controlling terminal.
    ///
    /// # Errors
    ///
    /// Returns an error when stdout is not attached to a terminal.
    pub fn current() -> io::Result<Self> {
        let (width, height) = crossterm::terminal::size()?;
        Ok(Self { height, width })
    }

    /// Query the controlling terminal, falling back to 80x24.
    #[must_use]
    pub fn current_or_fallback() -> Self {
        match Self::current() {
            Ok(extent) if extent.height > 0 && extent.width > 0 => extent,
            Ok(extent) => {
                tracing::warn!(?extent, "terminal reported an empty size, using fallback");
                Self::FALLBACK
            }
            Err(err) => {
                tracing::warn!(error = %err, "terminal size unavailable, using fallback");
                Self::FALLBACK
            }
        }
    }

    /// Row the overflow redraw parks the cursor on.
    #[must_use]
    pub const fn middle_row(&self) -> u16 {
        self.height / 2
    }
}

/// Cursor position, 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    pub row: u16,
    pub col: u16,
}

impl CursorPosition {
    #[must_use]
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}
