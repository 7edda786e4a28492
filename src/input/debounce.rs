//! Counter-based debounce filters.
//!
//! A transition is accepted only after `depth` consecutive samples agree
//! with it; a bounce that reverts earlier resets the count. Release is
//! filtered the same way, so a key must be seen released before it can
//! produce another press.

use super::{ButtonInput, ButtonPress, KeyMatrix, KeyPress};

/// Single-line debounce filter.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    depth: u8,
    count: u8,
    pressed: bool,
}

impl Debouncer {
    /// A filter starting in the released state. `depth` is clamped to 1.
    pub const fn new(depth: u8) -> Self {
        Self {
            depth: if depth == 0 { 1 } else { depth },
            count: 0,
            pressed: false,
        }
    }

    /// Feed one raw sample. Returns `true` exactly once per confirmed press.
    pub fn sample(&mut self, raw: bool) -> bool {
        if raw == self.pressed {
            self.count = 0;
            return false;
        }

        self.count += 1;
        if self.count < self.depth {
            return false;
        }

        self.count = 0;
        self.pressed = raw;
        raw
    }

    /// Debounced level.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

/// Debounced scanner for a `ROWS` x `COLS` key matrix.
///
/// Every tick samples the whole matrix. Confirmed presses are latched and
/// reported one per tick in row-major order, so two keys settling on the
/// same tick are both delivered.
pub struct KeypadScanner<const ROWS: usize, const COLS: usize> {
    keys: [[Debouncer; COLS]; ROWS],
    pending: [[bool; COLS]; ROWS],
}

impl<const ROWS: usize, const COLS: usize> KeypadScanner<ROWS, COLS> {
    pub const fn new(depth: u8) -> Self {
        Self {
            keys: [[Debouncer::new(depth); COLS]; ROWS],
            pending: [[false; COLS]; ROWS],
        }
    }

    /// Sample the matrix once and return at most one press.
    pub fn tick(&mut self, matrix: &mut impl KeyMatrix) -> Option<KeyPress> {
        for (row, keys) in self.keys.iter_mut().enumerate() {
            let mask = matrix.scan_row(row);
            for (col, key) in keys.iter_mut().enumerate() {
                if key.sample(mask & (1 << col) != 0) {
                    self.pending[row][col] = true;
                }
            }
        }

        for (row, pending) in self.pending.iter_mut().enumerate() {
            for (col, flag) in pending.iter_mut().enumerate() {
                if *flag {
                    *flag = false;
                    return Some(KeyPress {
                        row: row as u8,
                        col: col as u8,
                    });
                }
            }
        }
        None
    }
}

/// Debounced sampler for `N` independent buttons.
pub struct ButtonBank<const N: usize> {
    buttons: [Debouncer; N],
    pending: [bool; N],
}

impl<const N: usize> ButtonBank<N> {
    pub const fn new(depth: u8) -> Self {
        Self {
            buttons: [Debouncer::new(depth); N],
            pending: [false; N],
        }
    }

    /// Sample every button once and return at most one press.
    pub fn tick(&mut self, input: &mut impl ButtonInput) -> Option<ButtonPress> {
        for (id, button) in self.buttons.iter_mut().enumerate() {
            if button.sample(input.is_pressed(id)) {
                self.pending[id] = true;
            }
        }

        let id = self.pending.iter().position(|p| *p)?;
        self.pending[id] = false;
        Some(ButtonPress { id: id as u8 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Matrix whose closed switches are set directly by the test.
    struct FakeMatrix {
        rows: [u8; 4],
    }

    impl KeyMatrix for FakeMatrix {
        fn scan_row(&mut self, row: usize) -> u8 {
            self.rows[row]
        }
    }

    struct FakeButtons([bool; 4]);

    impl ButtonInput for FakeButtons {
        fn is_pressed(&mut self, id: usize) -> bool {
            self.0[id]
        }
    }

    fn feed(d: &mut Debouncer, level: bool, n: usize) -> usize {
        (0..n).filter(|_| d.sample(level)).count()
    }

    // ════════════════════════════════════════════════════════════════════════
    // Debouncer
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn stable_press_fires_once() {
        let mut d = Debouncer::new(5);
        assert_eq!(feed(&mut d, true, 50), 1);
        assert!(d.is_pressed());
    }

    #[test]
    fn press_fires_exactly_at_depth() {
        let mut d = Debouncer::new(3);
        assert!(!d.sample(true));
        assert!(!d.sample(true));
        assert!(d.sample(true));
    }

    #[test]
    fn short_bounce_is_ignored() {
        let mut d = Debouncer::new(5);
        assert_eq!(feed(&mut d, true, 4), 0);
        assert_eq!(feed(&mut d, false, 10), 0);
        assert!(!d.is_pressed());
    }

    #[test]
    fn bounce_resets_the_count() {
        let mut d = Debouncer::new(4);
        assert_eq!(feed(&mut d, true, 3), 0);
        assert!(!d.sample(false));
        assert_eq!(feed(&mut d, true, 3), 0);
        assert!(d.sample(true));
    }

    #[test]
    fn release_is_debounced_too() {
        let mut d = Debouncer::new(3);
        assert_eq!(feed(&mut d, true, 3), 1);
        // Glitch low for less than depth: still held, no second press.
        assert_eq!(feed(&mut d, false, 2), 0);
        assert_eq!(feed(&mut d, true, 10), 0);
        assert!(d.is_pressed());

        assert_eq!(feed(&mut d, false, 3), 0);
        assert!(!d.is_pressed());
        assert_eq!(feed(&mut d, true, 3), 1);
    }

    #[test]
    fn zero_depth_is_clamped() {
        let mut d = Debouncer::new(0);
        assert!(d.sample(true));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Keypad scanner
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn held_key_reports_once() {
        let mut scanner = KeypadScanner::<4, 4>::new(3);
        let mut m = FakeMatrix { rows: [0, 0, 0, 0] };
        m.rows[2] = 1 << 1;

        let presses: Vec<_> = (0..100).filter_map(|_| scanner.tick(&mut m)).collect();
        assert_eq!(presses, vec![KeyPress { row: 2, col: 1 }]);
    }

    #[test]
    fn no_keys_no_events() {
        let mut scanner = KeypadScanner::<4, 4>::new(3);
        let mut m = FakeMatrix { rows: [0; 4] };
        assert!((0..50).all(|_| scanner.tick(&mut m).is_none()));
    }

    #[test]
    fn simultaneous_keys_come_out_row_major() {
        let mut scanner = KeypadScanner::<4, 4>::new(2);
        let mut m = FakeMatrix {
            rows: [0, 0, 0, 0],
        };
        m.rows[3] = 1 << 3;
        m.rows[0] = 1 << 2;
        m.rows[1] = 1 << 0;

        let presses: Vec<_> = (0..10).filter_map(|_| scanner.tick(&mut m)).collect();
        assert_eq!(
            presses,
            vec![
                KeyPress { row: 0, col: 2 },
                KeyPress { row: 1, col: 0 },
                KeyPress { row: 3, col: 3 },
            ]
        );
    }

    #[test]
    fn repeated_presses_each_report() {
        let mut scanner = KeypadScanner::<4, 4>::new(2);
        let mut m = FakeMatrix { rows: [0; 4] };
        let mut count = 0;
        for _ in 0..3 {
            m.rows[0] = 1;
            count += (0..5).filter_map(|_| scanner.tick(&mut m)).count();
            m.rows[0] = 0;
            count += (0..5).filter_map(|_| scanner.tick(&mut m)).count();
        }
        assert_eq!(count, 3);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Button bank
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn button_press_reports_id() {
        let mut bank = ButtonBank::<4>::new(3);
        let mut b = FakeButtons([false, false, true, false]);
        let presses: Vec<_> = (0..10).filter_map(|_| bank.tick(&mut b)).collect();
        assert_eq!(presses, vec![ButtonPress { id: 2 }]);
    }

    #[test]
    fn two_buttons_settling_together_both_report() {
        let mut bank = ButtonBank::<4>::new(3);
        let mut b = FakeButtons([true, false, false, true]);
        let presses: Vec<_> = (0..10).filter_map(|_| bank.tick(&mut b)).collect();
        assert_eq!(presses, vec![ButtonPress { id: 0 }, ButtonPress { id: 3 }]);
    }
}
