//! Bluetooth Low Energy subsystem.
//!
//! Both roles of the barebot demo share this module:
//!
//! 1. **Central** - scans for the peripheral named `BP`, connects,
//!    discovers the barebot characteristics and then offers read/write
//!    access to the remote UI.
//! 2. **GATT service** - the peripheral's attribute values and their
//!    read/write rules.
//!
//! The host stack itself sits behind [`stack::BleStack`]; the SoftDevice
//! implementation lives in `board::central`.

pub mod adv_parser;
pub mod central;
pub mod gatt_service;
pub mod profile;
pub mod stack;

pub use central::{Central, CentralListener, ConnectionState};
pub use gatt_service::{AttrType, BarebotProfile, ProfileCallbacks};
pub use profile::{CharId, CharValue};
pub use stack::{BleStack, CentralEvent};
