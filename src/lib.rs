//! barebot - keypad/LCD demos and a BLE remote-controlled robot.
//!
//! The library holds all logic that can run on the host: debounce filters,
//! the event queue and loop, the BLE central state machine, the GATT
//! profiles and the UI state machines. Hardware glue for the nRF52840
//! (SoftDevice, GPIO, OLED) is in [`board`], behind the `embedded` feature.
//!
//! Usage: `cargo test` runs every host test.
//!
//! The firmware binaries live in `src/bin/` and need
//! `--features embedded` plus a thumbv7em target.

#![cfg_attr(not(test), no_std)]

// This must go first so the logging macros are visible everywhere.
mod fmt;

pub mod ble;
pub mod blinker;
pub mod config;
pub mod error;
pub mod event;
pub mod input;
pub mod peripheral;
pub mod ui;

#[cfg(feature = "embedded")]
pub mod board;

pub use error::Error;
