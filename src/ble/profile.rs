//! The barebot GATT profile: one primary service with five characteristics.
//!
//! | UUID   | Characteristic | Value                         |
//! |--------|----------------|-------------------------------|
//! | 0xFFF0 | service        |                               |
//! | 0xFFF1 | Thoughts       | 32-byte text                  |
//! | 0xFFF2 | Speed          | `i16` LE                      |
//! | 0xFFF3 | Turn           | `i16` LE                      |
//! | 0xFFF4 | SpeedUpdate    | `i16` LE delta, write-only    |
//! | 0xFFF5 | TurnUpdate     | `i16` LE delta, write-only    |

use heapless::Vec;

pub const SERVICE_UUID: u16 = 0xFFF0;
pub const THOUGHTS_UUID: u16 = 0xFFF1;
pub const SPEED_UUID: u16 = 0xFFF2;
pub const TURN_UUID: u16 = 0xFFF3;
pub const SPEED_UPDATE_UUID: u16 = 0xFFF4;
pub const TURN_UPDATE_UUID: u16 = 0xFFF5;

/// Client Characteristic Configuration descriptor.
pub const CLIENT_CHAR_CONFIG_UUID: u16 = 0x2902;

pub const THOUGHTS_LEN: usize = 32;
pub const SPEED_LEN: usize = 2;
pub const TURN_LEN: usize = 2;

/// Largest characteristic value in the profile.
pub const MAX_VALUE_LEN: usize = THOUGHTS_LEN;

/// A characteristic value as carried between tasks.
pub type CharValue = Vec<u8, MAX_VALUE_LEN>;

/// Logical characteristic IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CharId {
    Thoughts = 0,
    Speed = 1,
    Turn = 2,
    SpeedUpdate = 3,
    TurnUpdate = 4,
}

impl CharId {
    pub const COUNT: usize = 5;

    pub const ALL: [CharId; Self::COUNT] = [
        CharId::Thoughts,
        CharId::Speed,
        CharId::Turn,
        CharId::SpeedUpdate,
        CharId::TurnUpdate,
    ];

    pub fn uuid(self) -> u16 {
        match self {
            CharId::Thoughts => THOUGHTS_UUID,
            CharId::Speed => SPEED_UUID,
            CharId::Turn => TURN_UUID,
            CharId::SpeedUpdate => SPEED_UPDATE_UUID,
            CharId::TurnUpdate => TURN_UPDATE_UUID,
        }
    }

    pub fn from_uuid(uuid: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.uuid() == uuid)
    }

    /// Fixed length of the characteristic's value.
    pub fn value_len(self) -> usize {
        match self {
            CharId::Thoughts => THOUGHTS_LEN,
            CharId::Speed | CharId::SpeedUpdate => SPEED_LEN,
            CharId::Turn | CharId::TurnUpdate => TURN_LEN,
        }
    }

    /// Index into per-characteristic tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Write-only delta characteristics and the value they adjust.
    pub fn update_target(self) -> Option<CharId> {
        match self {
            CharId::SpeedUpdate => Some(CharId::Speed),
            CharId::TurnUpdate => Some(CharId::Turn),
            _ => None,
        }
    }
}

pub fn encode_i16(v: i16) -> [u8; 2] {
    v.to_le_bytes()
}

/// Decode a 2-byte little-endian value; any other length is rejected.
pub fn decode_i16(bytes: &[u8]) -> Option<i16> {
    let raw: [u8; 2] = bytes.try_into().ok()?;
    Some(i16::from_le_bytes(raw))
}
