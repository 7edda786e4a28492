//! Switch input - keypad matrix and discrete buttons.
//!
//! Raw levels are sampled on a fixed tick and filtered by
//! [`debounce::Debouncer`] so that every physical press yields exactly one
//! event. The hardware side is abstracted behind [`KeyMatrix`] and
//! [`ButtonInput`] so the filters run unchanged on the host.

pub mod debounce;

pub use debounce::{ButtonBank, Debouncer, KeypadScanner};

/// A debounced key press on the matrix keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyPress {
    pub row: u8,
    pub col: u8,
}

/// A debounced press of a discrete button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonPress {
    pub id: u8,
}

/// Row-strobed switch matrix.
pub trait KeyMatrix {
    /// Drive `row` active and return the pressed columns as a bitmask
    /// (bit `c` set = column `c` closed).
    fn scan_row(&mut self, row: usize) -> u8;
}

/// A bank of independent push buttons.
pub trait ButtonInput {
    /// Whether button `id` is currently held.
    fn is_pressed(&mut self, id: usize) -> bool;
}
