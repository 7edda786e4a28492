//! Barebot push buttons (active-low with internal pull-up).
//!
//! Unlike an edge-triggered handler, the buttons are polled on the same
//! 1 ms tick as the keypad and filtered by [`ButtonBank`], so a bouncing
//! contact still yields a single press.

use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Ticker};

use crate::config::{DebounceConfig, NUM_BUTTONS};
use crate::event::EventBridge;
use crate::input::{ButtonBank, ButtonInput};
use crate::peripheral::PeripheralEvent;

pub struct ButtonPins<'d> {
    pins: [Input<'d>; NUM_BUTTONS],
}

impl ButtonPins<'static> {
    pub fn new(pins: [AnyPin; NUM_BUTTONS]) -> Self {
        Self {
            pins: pins.map(|pin| Input::new(pin, Pull::Up)),
        }
    }
}

impl ButtonInput for ButtonPins<'_> {
    fn is_pressed(&mut self, id: usize) -> bool {
        self.pins.get(id).is_some_and(|pin| pin.is_low())
    }
}

/// Poll the buttons forever, posting presses to the peripheral task.
pub async fn run_buttons<M: RawMutex, const N: usize>(
    buttons: &mut impl ButtonInput,
    bridge: &EventBridge<M, PeripheralEvent, N>,
    config: DebounceConfig,
) -> ! {
    let mut bank = ButtonBank::<NUM_BUTTONS>::new(config.depth);
    let mut ticker = Ticker::every(Duration::from_millis(config.tick_ms));

    loop {
        if let Some(press) = bank.tick(buttons) {
            info!("Button: {}", press.id);
            let _ = bridge.post(PeripheralEvent::ButtonPressed(press));
        }
        ticker.next().await;
    }
}
