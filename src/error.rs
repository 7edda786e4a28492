//! Unified error type for barebot.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// The BLE stack refused to accept a request.
    Stack(StackError),

    /// The central is not in the `Ready` state.
    NotReady,

    /// A value of the wrong length for its characteristic.
    InvalidValueSize,

    /// A read did not complete before its timeout.
    NoResponse,

    /// The peer answered a read with an ATT error code.
    ReadFailed(u8),

    /// Connection to the peripheral was lost while waiting.
    Disconnected,

    // Events
    /// The target event queue was full; the event was dropped.
    QueueFull,

    // Generic
    /// Unrecoverable fault reported by the radio or the stack.
    HardwareFault,

    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Why the BLE stack rejected a request (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// Raw error code from the underlying stack.
    Raw(u32),
    /// A procedure of the same kind is already running.
    Busy,
    /// The stack's request queue is full.
    NoResources,
}

/// ATT error codes returned to a remote client by the GATT server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AttError {
    InvalidHandle = 0x01,
    WriteNotPermitted = 0x03,
    AttrNotLong = 0x0B,
    AttrNotFound = 0x0A,
    InvalidValueSize = 0x0D,
    CccdImproperlyConfigured = 0xFD,
}

impl AttError {
    /// Wire value of the error code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

// Convenience conversions

impl From<StackError> for Error {
    fn from(e: StackError) -> Self {
        Error::Stack(e)
    }
}

impl From<AttError> for Error {
    fn from(e: AttError) -> Self {
        match e {
            AttError::InvalidValueSize => Error::InvalidValueSize,
            other => Error::ReadFailed(other.code()),
        }
    }
}
