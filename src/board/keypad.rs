//! 4x4 keypad matrix on GPIO.
//!
//! Rows are strobed low one at a time; columns are inputs with pull-ups,
//! so a closed switch reads low. The tick samples the whole matrix every
//! `tick_ms` and posts debounced presses to an event bridge.

use embassy_nrf::gpio::{AnyPin, Input, Level, Output, OutputDrive, Pull};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Ticker};

use crate::config::{DebounceConfig, KEYPAD_COLS, KEYPAD_ROWS};
use crate::event::EventBridge;
use crate::input::{KeyMatrix, KeyPress, KeypadScanner};

/// Cycles to let a strobed row settle before the columns are read.
const SETTLE_CYCLES: u32 = 64;

pub struct GpioMatrix<'d> {
    rows: [Output<'d>; KEYPAD_ROWS],
    cols: [Input<'d>; KEYPAD_COLS],
}

impl GpioMatrix<'static> {
    pub fn new(rows: [AnyPin; KEYPAD_ROWS], cols: [AnyPin; KEYPAD_COLS]) -> Self {
        Self {
            rows: rows.map(|pin| Output::new(pin, Level::High, OutputDrive::Standard)),
            cols: cols.map(|pin| Input::new(pin, Pull::Up)),
        }
    }
}

impl KeyMatrix for GpioMatrix<'_> {
    fn scan_row(&mut self, row: usize) -> u8 {
        let Some(line) = self.rows.get_mut(row) else {
            return 0;
        };
        line.set_low();
        cortex_m::asm::delay(SETTLE_CYCLES);

        let closed = self
            .cols
            .iter()
            .enumerate()
            .filter(|(_, col)| col.is_low())
            .fold(0u8, |bits, (c, _)| bits | (1 << c));

        line.set_high();
        closed
    }
}

/// Debounce tick: sample `matrix` forever, posting each key press.
pub async fn run_keypad<M, E, const N: usize>(
    matrix: &mut impl KeyMatrix,
    bridge: &EventBridge<M, E, N>,
    config: DebounceConfig,
) -> !
where
    M: RawMutex,
    E: From<KeyPress>,
{
    let mut scanner = KeypadScanner::<KEYPAD_ROWS, KEYPAD_COLS>::new(config.depth);
    let mut ticker = Ticker::every(Duration::from_millis(config.tick_ms));

    loop {
        if let Some(key) = scanner.tick(matrix) {
            debug!("key {}", key);
            // Overflow is counted by the bridge.
            let _ = bridge.post(E::from(key));
        }
        ticker.next().await;
    }
}
