//! Character display abstraction.
//!
//! The UI addresses the screen as a grid of character cells, like an HD44780
//! LCD. [`TextGrid`] is the in-memory cell buffer; the firmware renders it
//! onto the OLED, tests inspect it directly.

use core::fmt::{self, Write};

use heapless::String;

/// Write up to the end of the row.
pub const TO_END: usize = usize::MAX;

/// A character-cell display.
pub trait TextDisplay {
    /// Write at most `max_len` characters of `text` starting at
    /// (`row`, `col`). Text is clipped at the end of the row, and stops at
    /// the first NUL. Out-of-range positions are ignored.
    fn display(&mut self, row: usize, col: usize, text: &str, max_len: usize);

    /// Blank every cell.
    fn clear(&mut self);
}

impl<T: TextDisplay + ?Sized> TextDisplay for &mut T {
    fn display(&mut self, row: usize, col: usize, text: &str, max_len: usize) {
        (**self).display(row, col, text, max_len)
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/// Format `args` and display the result.
pub fn display_fmt<D: TextDisplay + ?Sized>(
    display: &mut D,
    row: usize,
    col: usize,
    max_len: usize,
    args: fmt::Arguments<'_>,
) {
    let mut text: String<32> = String::new();
    if text.write_fmt(args).is_err() {
        warn!("display text truncated");
    }
    display.display(row, col, &text, max_len);
}

/// `ROWS` x `COLS` character buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextGrid<const ROWS: usize, const COLS: usize> {
    cells: [[u8; COLS]; ROWS],
    dirty: bool,
}

impl<const ROWS: usize, const COLS: usize> TextGrid<ROWS, COLS> {
    pub const fn new() -> Self {
        Self {
            cells: [[b' '; COLS]; ROWS],
            dirty: true,
        }
    }

    /// Contents of `row`, trailing blanks included.
    pub fn row(&self, row: usize) -> &str {
        self.cells
            .get(row)
            .and_then(|cells| core::str::from_utf8(cells).ok())
            .unwrap_or("")
    }

    /// Contents of `row` without trailing blanks.
    pub fn row_trimmed(&self, row: usize) -> &str {
        self.row(row).trim_end()
    }

    /// Whether anything changed since the last [`take_dirty`](Self::take_dirty).
    pub fn take_dirty(&mut self) -> bool {
        core::mem::replace(&mut self.dirty, false)
    }
}

impl<const ROWS: usize, const COLS: usize> Default for TextGrid<ROWS, COLS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const ROWS: usize, const COLS: usize> TextDisplay for TextGrid<ROWS, COLS> {
    fn display(&mut self, row: usize, col: usize, text: &str, max_len: usize) {
        let Some(cells) = self.cells.get_mut(row) else {
            return;
        };
        if col >= COLS {
            return;
        }
        let room = (COLS - col).min(max_len);
        let chars = text.chars().take_while(|c| *c != '\0').take(room);
        for (cell, c) in cells[col..].iter_mut().zip(chars) {
            // Cells hold single bytes, so anything outside ASCII is shown as '?'.
            *cell = if c.is_ascii() && !c.is_ascii_control() {
                c as u8
            } else {
                b'?'
            };
        }
        self.dirty = true;
    }

    fn clear(&mut self) {
        self.cells = [[b' '; COLS]; ROWS];
        self.dirty = true;
    }
}
