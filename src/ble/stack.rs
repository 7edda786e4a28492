//! Request/callback boundary to the BLE host stack.
//!
//! The central state machine never talks to the radio directly. It submits
//! requests through [`BleStack`] (each call only reports whether the request
//! was accepted) and learns the outcome later from a [`CentralEvent`] posted
//! by the stack's callback context.

use heapless::Vec;

use super::profile::CharValue;
use crate::error::{Error, StackError};

/// Connection handle assigned by the stack.
pub type ConnHandle = u16;

/// Lowest and highest valid ATT handles.
pub const ATT_HANDLE_MIN: u16 = 0x0001;
pub const ATT_HANDLE_MAX: u16 = 0xFFFF;

/// HCI status code for success.
pub const HCI_SUCCESS: u8 = 0x00;

/// Largest legacy advertising payload.
pub const ADV_DATA_MAX_LEN: usize = 31;

/// Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BdAddr {
    /// 0 = public, 1 = random static, 2/3 = random private.
    pub addr_type: u8,
    /// Little-endian address bytes, as on the air.
    pub bytes: [u8; 6],
}

/// Report filters applied by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanFilter {
    /// Only report connectable advertisements.
    pub connectable_only: bool,
    /// Drop incomplete (truncated) reports.
    pub complete_only: bool,
    /// Report each advertiser once per scan window.
    pub filter_duplicates: bool,
}

impl ScanFilter {
    /// Filters used when looking for the barebot peripheral.
    pub const PEER_SEARCH: Self = Self {
        connectable_only: true,
        complete_only: true,
        filter_duplicates: true,
    };
}

/// One received advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvReport {
    pub address: BdAddr,
    pub rssi: i8,
    pub data: Vec<u8, ADV_DATA_MAX_LEN>,
}

/// Events posted to the central by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CentralEvent {
    /// The central role finished initialising.
    InitDone { success: bool },
    /// An advertisement passed the scan filters.
    AdvReport(AdvReport),
    /// The current scan window elapsed.
    ScanDurationEnded,
    /// A new scan period began (periodic scanning only).
    ScanPeriodEnded,
    /// Time to retry a scan the stack refused to start.
    ScanRetry,
    /// Outcome of a connect request.
    LinkEstablished {
        status: u8,
        conn: ConnHandle,
        peer: BdAddr,
    },
    /// A connection went away.
    LinkTerminated { conn: ConnHandle, reason: u8 },
    /// Discovery found a characteristic value handle.
    CharDiscovered { uuid: u16, handle: u16 },
    /// The stack finished a discovery procedure.
    DiscoveryComplete,
    /// Discovery did not finish in time.
    DiscoveryTimeout,
    /// A notification or indication from the peer.
    CharNotified { handle: u16, value: CharValue },
    /// The controller reported an unrecoverable fault.
    HardwareError,
}

/// Requests the central submits to the BLE host stack.
///
/// Every method returns as soon as the request is queued; results arrive
/// as [`CentralEvent`]s or through the central's read-completion path.
pub trait BleStack {
    fn init_central(&mut self) -> Result<(), StackError>;

    fn configure_scan(&mut self, filter: &ScanFilter) -> Result<(), StackError>;

    /// Start scanning. `duration` is in 10 ms units, `period` in 1.28 s
    /// units (0 = one-shot window).
    fn start_scan(&mut self, duration: u16, period: u16) -> Result<(), StackError>;

    fn stop_scan(&mut self) -> Result<(), StackError>;

    fn connect(&mut self, peer: BdAddr) -> Result<(), StackError>;

    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), StackError>;

    /// Discover characteristics in the ATT handle range `start..=end`.
    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        start: u16,
        end: u16,
    ) -> Result<(), StackError>;

    fn read(&mut self, conn: ConnHandle, handle: u16) -> Result<(), StackError>;

    /// Write without waiting for the peer's acknowledgement.
    fn write(&mut self, conn: ConnHandle, handle: u16, value: &[u8]) -> Result<(), StackError>;

    /// Subscribe to notifications of the characteristic at `value_handle`.
    fn enable_notifications(&mut self, conn: ConnHandle, value_handle: u16)
        -> Result<(), StackError>;
}

/// Tracks consecutive raw failures from the radio stack.
///
/// A single failed procedure is retried by the central; a run of `limit`
/// failures with no success in between is reported as a hardware fault.
pub struct FaultCounter {
    run: u8,
    limit: u8,
}

impl FaultCounter {
    pub const fn new(limit: u8) -> Self {
        Self { run: 0, limit }
    }

    /// Record a failure. Fails with [`Error::HardwareFault`] once the run
    /// reaches the limit.
    pub fn failed(&mut self, cause: StackError) -> Result<(), Error> {
        self.run = self.run.saturating_add(1);
        warn!("stack failure {} ({}/{})", cause, self.run, self.limit);
        if self.run >= self.limit {
            return Err(Error::HardwareFault);
        }
        Ok(())
    }

    pub fn succeeded(&mut self) {
        self.run = 0;
    }
}
