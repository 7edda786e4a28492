//! Application-wide constants and compile-time configuration.
//!
//! Timing parameters, queue depths, and protocol constants live here so
//! they can be tuned in one place. Values that tests or the firmware may
//! want to override at runtime are collected into [`CentralConfig`] and
//! [`DebounceConfig`], whose defaults come from these constants.

use crate::ble::adv_parser::NameMatch;

// Input

/// Keypad matrix geometry (4x4 membrane keypad).
pub const KEYPAD_ROWS: usize = 4;
pub const KEYPAD_COLS: usize = 4;

/// Number of discrete push buttons on the barebot board.
pub const NUM_BUTTONS: usize = 4;

/// Poll period of the debounce tick (ms).
pub const SCAN_TICK_MS: u64 = 1;

/// Consecutive identical samples required before a transition is accepted.
/// At a 1 ms tick this is a 20 ms settle time.
pub const DEBOUNCE_DEPTH: u8 = 20;

// Event queues

/// Depth of the UI task's event queue (keys + central state changes).
pub const UI_QUEUE_DEPTH: usize = 16;

/// Depth of the central's own event queue (stack callbacks).
pub const CENTRAL_QUEUE_DEPTH: usize = 16;

/// Depth of the peripheral application's event queue.
pub const PERIPHERAL_QUEUE_DEPTH: usize = 8;

// BLE central

/// Local name advertised by the barebot peripheral.
pub const PEER_NAME: &str = "BP";

/// Longest device name kept from an advertisement (bytes).
pub const DEVICE_NAME_MAX_LEN: usize = 20;

/// Scan window duration (10 ms units). 1000 = 10 s.
pub const SCAN_DURATION: u16 = 1000;

/// Scan period (1.28 s units). 0 = no periodic scanning.
pub const SCAN_PERIOD: u16 = 0;

/// How many times characteristic discovery is re-issued before giving up.
pub const DISCOVERY_MAX_RETRIES: u8 = 2;

/// How long the central waits for discovery to finish (ms).
pub const DISCOVERY_TIMEOUT_MS: u64 = 5_000;

/// Consecutive raw SoftDevice failures taken as a hardware fault.
pub const STACK_FAULT_LIMIT: u8 = 3;

/// Back-off before a refused scan start is retried (ms).
pub const SCAN_RETRY_MS: u64 = 250;

/// Read completion timeout (ms). `None` waits forever.
pub const READ_TIMEOUT_MS: Option<u32> = None;

/// BLE connection interval range (in 1.25 ms units).
pub const BLE_CONN_INTERVAL_MIN: u16 = 24;
pub const BLE_CONN_INTERVAL_MAX: u16 = 40;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

// BLE peripheral

/// Advertising interval (0.625 ms units). 160 = 100 ms.
pub const ADV_INTERVAL: u32 = 160;

/// Text served by the Thoughts characteristic after boot.
pub const INITIAL_THOUGHTS: &str = "Just a barebot, rolling along.";

// LED blinker

/// Local name advertised by the blinker demo.
pub const BLINKER_NAME: &str = "Blinker";

/// Depth of the blinker task's event queue.
pub const BLINKER_QUEUE_DEPTH: usize = 8;

/// Red LED toggle request period (ms).
pub const RED_BLINK_MS: u64 = 500;

/// Green LED toggle request period (ms).
pub const GREEN_BLINK_MS: u64 = 1_300;

// Display

/// Character LCD geometry.
pub const LCD_ROWS: usize = 4;
pub const LCD_COLS: usize = 16;

// GPIO pin assignments (nRF52840-DK defaults)
//
//   Keypad rows    → P0.03, P0.04, P0.28, P0.29   (outputs, active-low)
//   Keypad cols    → P0.30, P0.31, P1.14, P1.15   (inputs, pull-up)
//   Buttons 0..3   → P0.11, P0.12, P0.24, P0.25   (active-low)
//   I²C SDA        → P0.26
//   I²C SCL        → P0.27
//   Red LED        → P0.13                        (active-low)
//   Green LED      → P0.14                        (active-low)

/// Runtime knobs of the BLE central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralConfig {
    /// Name the central connects to.
    pub peer_name: &'static str,
    /// Exact name or prefix comparison.
    pub name_match: NameMatch,
    /// Scan window (10 ms units).
    pub scan_duration: u16,
    /// Scan period (1.28 s units); 0 disables periodic scanning.
    pub scan_period: u16,
    /// Discovery re-issues before the link is dropped.
    pub max_discovery_retries: u8,
    /// Read completion timeout (ms); `None` waits forever.
    pub read_timeout_ms: Option<u32>,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            peer_name: PEER_NAME,
            name_match: NameMatch::Exact,
            scan_duration: SCAN_DURATION,
            scan_period: SCAN_PERIOD,
            max_discovery_retries: DISCOVERY_MAX_RETRIES,
            read_timeout_ms: READ_TIMEOUT_MS,
        }
    }
}

/// Runtime knobs of the debounce filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub depth: u8,
    pub tick_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            depth: DEBOUNCE_DEPTH,
            tick_ms: SCAN_TICK_MS,
        }
    }
}
