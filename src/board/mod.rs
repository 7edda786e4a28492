//! nRF52840 board glue.
//!
//! Everything here touches real hardware and only builds with the
//! `embedded` feature:
//!
//! - [`keypad`]: GPIO keypad matrix plus its 1 ms debounce tick
//! - [`buttons`]: the barebot's push buttons
//! - [`display`]: the SSD1306 OLED used as a 4x16 character display
//! - [`softdevice`]: S140 bring-up
//! - [`central`]: [`BleStack`](crate::ble::stack::BleStack) on top of the SoftDevice
//! - [`server`]: the barebot GATT server and advertiser
//! - [`blinker`]: LED pins and GATT server of the blinker demo

pub mod blinker;
pub mod buttons;
pub mod central;
pub mod display;
pub mod keypad;
pub mod server;
pub mod softdevice;

use embassy_nrf::interrupt::Priority;

/// HAL configuration compatible with the SoftDevice.
///
/// The SoftDevice reserves interrupt priorities 0, 1 and 4.
pub fn embassy_config() -> embassy_nrf::config::Config {
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    config
}
