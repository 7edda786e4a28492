//! Keypad/LCD remote control running on the central board.
//!
//! Key map (row, col):
//!
//! | key   | action                                   |
//! |-------|------------------------------------------|
//! | (3,3) | CONTROL screen: read and show speed/turn |
//! | (3,2) | THOUGHTS screen: read and show thoughts  |
//! | (3,0) | blank the display                        |
//! | (3,1) | blank the display                        |
//! | (1,1) | up: speed +1 (CONTROL only)              |
//! | (0,1) | down: speed -1 (CONTROL only)            |
//! | (0,2) | left: turn -1 (CONTROL only)             |
//! | (0,0) | right: turn +1 (CONTROL only)            |

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;

use super::display::{display_fmt, TextDisplay};
use crate::ble::central::{Central, CentralListener, ConnectionState};
use crate::ble::profile::{decode_i16, encode_i16, CharId, CharValue};
use crate::ble::stack::BleStack;
use crate::config::LCD_COLS;
use crate::error::Error;
use crate::event::{EventBridge, EventHandler};
use crate::input::KeyPress;

/// Column where live speed/turn values are printed.
const VALUE_COL: usize = 8;
const VALUE_WIDTH: usize = 4;

const SPEED_ROW: usize = 1;
const TURN_ROW: usize = 2;

/// Events handled by the UI task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UiEvent {
    KeyPressed(KeyPress),
    StateChanged(ConnectionState),
    SpeedChanged(i16),
    TurnChanged(i16),
}

impl From<KeyPress> for UiEvent {
    fn from(key: KeyPress) -> Self {
        UiEvent::KeyPressed(key)
    }
}

/// Screen currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Screen {
    Uninitialized,
    Control,
    Thoughts,
}

/// LCD label of a connection state.
pub fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Idle => "Idle",
        ConnectionState::Initializing => "Initializing",
        ConnectionState::Scanning => "Scanning",
        ConnectionState::Connecting => "Connecting",
        ConnectionState::DiscoveringCharacteristics => "Disc chars",
        ConnectionState::Ready => "Ready",
        ConnectionState::Error => "Error",
    }
}

/// Access to the barebot's characteristics.
#[allow(async_fn_in_trait)]
pub trait RemoteControl {
    /// Read a characteristic, waiting for the answer.
    async fn read(&mut self, id: CharId) -> Result<CharValue, Error>;

    /// Write a characteristic without waiting.
    fn write(&mut self, id: CharId, value: &[u8]) -> Result<(), Error>;
}

/// [`RemoteControl`] backed by the BLE central.
pub struct CentralRemote<'a, M: RawMutex, S: BleStack, L: CentralListener, D> {
    central: &'a Central<M, S, L>,
    delay: D,
}

impl<'a, M: RawMutex, S: BleStack, L: CentralListener, D: DelayNs> CentralRemote<'a, M, S, L, D> {
    pub fn new(central: &'a Central<M, S, L>, delay: D) -> Self {
        Self { central, delay }
    }
}

impl<M: RawMutex, S: BleStack, L: CentralListener, D: DelayNs> RemoteControl
    for CentralRemote<'_, M, S, L, D>
{
    async fn read(&mut self, id: CharId) -> Result<CharValue, Error> {
        self.central.read(id, &mut self.delay).await
    }

    fn write(&mut self, id: CharId, value: &[u8]) -> Result<(), Error> {
        self.central.write(id, value)
    }
}

/// Forwards central notifications into the UI queue.
impl<M: RawMutex, const N: usize> CentralListener for EventBridge<M, UiEvent, N> {
    fn state_changed(&self, state: ConnectionState) {
        let _ = self.post(UiEvent::StateChanged(state));
    }

    fn value_notified(&self, id: CharId, value: &[u8]) {
        let Some(v) = decode_i16(value) else {
            warn!("bad notification length {} for {}", value.len(), id);
            return;
        };
        let event = match id {
            CharId::Speed => UiEvent::SpeedChanged(v),
            CharId::Turn => UiEvent::TurnChanged(v),
            _ => return,
        };
        let _ = self.post(event);
    }
}

/// The remote's UI state machine.
pub struct RemoteUi<D, R> {
    display: D,
    remote: R,
    screen: Screen,
}

impl<D: TextDisplay, R: RemoteControl> RemoteUi<D, R> {
    pub fn new(display: D, remote: R) -> Self {
        Self {
            display,
            remote,
            screen: Screen::Uninitialized,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    async fn on_key(&mut self, key: KeyPress) {
        match (key.row, key.col) {
            (3, 3) => self.show_control().await,
            (3, 2) => self.show_thoughts().await,
            // Unassigned menu keys blank the screen but keep its state.
            (3, _) => self.display.clear(),
            (row, col) if self.screen == Screen::Control => {
                let command = match (row, col) {
                    (0, 2) => Some((CharId::TurnUpdate, -1)),
                    (0, 0) => Some((CharId::TurnUpdate, 1)),
                    (1, 1) => Some((CharId::SpeedUpdate, 1)),
                    (0, 1) => Some((CharId::SpeedUpdate, -1)),
                    _ => None,
                };
                if let Some((id, delta)) = command {
                    if let Err(e) = self.remote.write(id, &encode_i16(delta)) {
                        warn!("{} write failed: {}", id, e);
                    }
                }
            }
            (row, col) => trace!("key ({}, {}) unused", row, col),
        }
    }

    async fn show_control(&mut self) {
        self.display.clear();
        self.display.display(0, 0, "CONTROL", LCD_COLS);
        self.screen = Screen::Control;

        self.show_value(CharId::Speed, SPEED_ROW, "Speed:").await;
        self.show_value(CharId::Turn, TURN_ROW, "Turn:").await;
    }

    async fn show_value(&mut self, id: CharId, row: usize, label: &str) {
        match self.remote.read(id).await.and_then(|v| decode_i16(&v).ok_or(Error::InvalidValueSize)) {
            Ok(v) => display_fmt(&mut self.display, row, 0, 12, format_args!("{:<8}{}", label, v)),
            Err(e) => {
                warn!("{} read failed: {}", id, e);
                self.display.display(row, 0, "no response", LCD_COLS);
            }
        }
    }

    async fn show_thoughts(&mut self) {
        self.display.clear();
        self.display.display(0, 0, "THOUGHTS", LCD_COLS);
        self.screen = Screen::Thoughts;

        match self.remote.read(CharId::Thoughts).await {
            Ok(value) => {
                let end = value.iter().position(|b| *b == 0).unwrap_or(value.len());
                let text = core::str::from_utf8(&value[..end]).unwrap_or("?");
                self.display.display(1, 0, text, LCD_COLS);
            }
            Err(e) => {
                warn!("thoughts read failed: {}", e);
                self.display.display(1, 0, "no response", LCD_COLS);
            }
        }
    }

    fn on_state(&mut self, state: ConnectionState) {
        self.display.clear();
        self.display.display(0, 0, state_label(state), LCD_COLS);
        self.screen = Screen::Uninitialized;
    }

    fn on_value(&mut self, row: usize, value: i16) {
        if self.screen != Screen::Control {
            return;
        }
        display_fmt(
            &mut self.display,
            row,
            VALUE_COL,
            VALUE_WIDTH,
            format_args!("{:<4}", value),
        );
    }
}

impl<D: TextDisplay, R: RemoteControl> EventHandler<UiEvent> for RemoteUi<D, R> {
    async fn handle(&mut self, event: UiEvent) {
        match event {
            UiEvent::KeyPressed(key) => self.on_key(key).await,
            UiEvent::StateChanged(state) => self.on_state(state),
            UiEvent::SpeedChanged(v) => self.on_value(SPEED_ROW, v),
            UiEvent::TurnChanged(v) => self.on_value(TURN_ROW, v),
        }
    }
}
