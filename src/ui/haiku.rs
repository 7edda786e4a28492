//! Haiku viewer: the keypad picks a poem (row) and a line (column).
//!
//! Each line is laid out as up to four fragments scattered over the LCD.
//! Column 3 shows the first verse, column 0 the attribution.

use super::display::{TextDisplay, TO_END};
use crate::event::EventHandler;
use crate::input::KeyPress;

/// A fragment of text at a fixed LCD position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub row: u8,
    pub col: u8,
    pub text: &'static str,
}

const fn p(row: u8, col: u8, text: &'static str) -> Part {
    Part { row, col, text }
}

/// One screen: up to four fragments (empty text = unused).
pub type Line = [Part; 4];

/// Three verses and an attribution.
pub type Haiku = [Line; 4];

const NONE: Part = p(0, 0, "");

pub const HAIKU: [Haiku; 4] = [
    [
        [p(0, 0, "Solder"), p(1, 3, "smoke"), p(2, 8, "curls"), p(3, 11, "up")],
        [p(0, 0, "A"), p(1, 2, "quiet"), p(2, 5, "pin"), p(3, 7, "goes high")],
        [p(0, 0, "The"), p(1, 4, "LED"), p(2, 8, "wakes"), p(3, 12, "up")],
        [p(1, 4, "bench notes"), p(2, 2, "late shift"), NONE, NONE],
    ],
    [
        [p(0, 0, "Keys"), p(1, 4, "bounce"), p(2, 6, "and"), p(3, 10, "settle")],
        [p(0, 0, "Twenty"), p(1, 2, "patient"), p(2, 6, "samples"), p(3, 12, "wait")],
        [p(0, 0, "One"), p(1, 4, "press"), p(2, 9, "comes"), p(3, 9, "through")],
        [p(1, 4, "bench notes"), p(2, 3, "debounce"), NONE, NONE],
    ],
    [
        [p(0, 0, "Radio"), p(1, 3, "hums"), p(2, 7, "in"), p(3, 8, "the dark")],
        [p(0, 0, "Two"), p(1, 1, "small"), p(2, 4, "boards"), p(3, 6, "find peers")],
        [p(0, 0, "BP"), p(1, 4, "answers"), p(2, 8, "back"), NONE],
        [p(1, 4, "bench notes"), p(2, 1, "advertising"), NONE, NONE],
    ],
    [
        [p(0, 0, "Wheels"), p(1, 4, "wait"), p(2, 8, "for"), p(3, 10, "a word")],
        [p(0, 0, "Speed"), p(1, 2, "plus"), p(2, 7, "one"), p(3, 7, "turn left")],
        [p(0, 0, "The"), p(1, 3, "barebot"), p(2, 9, "rolls"), p(3, 12, "on")],
        [p(1, 4, "bench notes"), p(2, 0, "remote control"), NONE, NONE],
    ],
];

/// Shows the haiku line selected by each key press.
pub struct HaikuViewer<D> {
    display: D,
}

impl<D: TextDisplay> HaikuViewer<D> {
    pub fn new(display: D) -> Self {
        Self { display }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Show the line for `key`, or an error for keys off the 4x4 pad.
    pub fn show(&mut self, key: KeyPress) {
        let Some(haiku) = HAIKU.get(key.row as usize) else {
            self.display.display(0, 0, "row error", 16);
            return;
        };
        if key.col > 3 {
            self.display.display(0, 0, "col error", 16);
            return;
        }

        let line = &haiku[3 - key.col as usize];
        self.display.clear();
        for part in line.iter().filter(|part| !part.text.is_empty()) {
            self.display
                .display(part.row as usize, part.col as usize, part.text, TO_END);
        }
    }
}

impl<D: TextDisplay> EventHandler<KeyPress> for HaikuViewer<D> {
    async fn handle(&mut self, key: KeyPress) {
        self.show(key);
    }
}
