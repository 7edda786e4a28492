//! Barebot GATT profile, server side.
//!
//! [`BarebotProfile`] owns the attribute values and implements the ATT
//! read/write rules for them. The radio glue forwards each remote access
//! here and returns the resulting [`AttError`] to the peer; the profile
//! reports successful changes to its [`ProfileCallbacks`] so the
//! application can notify subscribers.

use super::profile::{
    decode_i16, encode_i16, CharId, CLIENT_CHAR_CONFIG_UUID, SPEED_LEN, THOUGHTS_LEN, TURN_LEN,
};
use super::stack::ConnHandle;
use crate::error::AttError;

/// Attribute type as presented by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttrType {
    Uuid16(u16),
    Uuid128([u8; 16]),
}

/// Stored value of the write-only delta characteristics.
const NO_DELTA: [u8; 2] = [0; 2];

/// A remote write the profile refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rejected {
    pub error: AttError,
    /// Characteristic whose stored copy the write overwrote, if any.
    pub clobbered: Option<CharId>,
}

/// CCCD bit enabling notifications.
pub const CCCD_NOTIFY: u16 = 0x0001;
/// CCCD bit enabling indications.
pub const CCCD_INDICATE: u16 = 0x0002;

/// Application hooks of the profile.
pub trait ProfileCallbacks {
    /// A characteristic value changed. Called once per change, with the
    /// base characteristic for delta writes.
    fn value_changed(&mut self, id: CharId);

    /// A client wrote a Client Characteristic Configuration descriptor.
    /// The default accepts the notify/indicate bits and nothing else.
    fn client_config_write(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        value: &[u8],
        offset: u16,
    ) -> Result<(), AttError> {
        let _ = (conn, handle);
        if offset != 0 {
            return Err(AttError::AttrNotLong);
        }
        let raw: [u8; 2] = value.try_into().map_err(|_| AttError::InvalidValueSize)?;
        if u16::from_le_bytes(raw) & !(CCCD_NOTIFY | CCCD_INDICATE) != 0 {
            return Err(AttError::CccdImproperlyConfigured);
        }
        Ok(())
    }
}

impl ProfileCallbacks for () {
    fn value_changed(&mut self, _id: CharId) {}
}

/// Attribute values of the barebot service.
pub struct BarebotProfile<C> {
    speed: [u8; SPEED_LEN],
    turn: [u8; TURN_LEN],
    thoughts: [u8; THOUGHTS_LEN],
    callbacks: Option<C>,
}

impl<C: ProfileCallbacks> BarebotProfile<C> {
    /// Stopped, straight ahead, and thinking `thoughts` (NUL padded,
    /// truncated to 32 bytes).
    pub fn new(thoughts: &str) -> Self {
        let mut profile = Self {
            speed: encode_i16(0),
            turn: encode_i16(0),
            thoughts: [0; THOUGHTS_LEN],
            callbacks: None,
        };
        profile.fill_thoughts(thoughts.as_bytes());
        profile
    }

    /// Install the application callbacks, replacing any previous ones.
    pub fn register_callbacks(&mut self, callbacks: C) {
        self.callbacks = Some(callbacks);
    }

    pub fn callbacks(&self) -> Option<&C> {
        self.callbacks.as_ref()
    }

    /// Remote read.
    pub fn read(&self, attr: AttrType, offset: u16, max_len: usize) -> Result<&[u8], AttError> {
        if offset != 0 {
            return Err(AttError::AttrNotLong);
        }
        let AttrType::Uuid16(uuid) = attr else {
            return Err(AttError::InvalidHandle);
        };
        let value = match CharId::from_uuid(uuid) {
            Some(CharId::Speed) => &self.speed[..],
            Some(CharId::Turn) => &self.turn[..],
            Some(CharId::Thoughts) => &self.thoughts[..],
            // Update characteristics are write-only.
            _ => return Err(AttError::AttrNotFound),
        };
        Ok(&value[..value.len().min(max_len)])
    }

    /// Remote write.
    pub fn write(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        attr: AttrType,
        value: &[u8],
        offset: u16,
    ) -> Result<(), AttError> {
        let AttrType::Uuid16(uuid) = attr else {
            return Err(AttError::InvalidHandle);
        };

        if uuid == CLIENT_CHAR_CONFIG_UUID {
            return match self.callbacks.as_mut() {
                Some(cb) => cb.client_config_write(conn, handle, value, offset),
                None => ().client_config_write(conn, handle, value, offset),
            };
        }

        if offset != 0 {
            return Err(AttError::AttrNotLong);
        }
        let id = CharId::from_uuid(uuid).ok_or(AttError::AttrNotFound)?;
        if value.len() != id.value_len() {
            return Err(AttError::InvalidValueSize);
        }

        let changed = match id {
            CharId::Thoughts => {
                self.thoughts.copy_from_slice(value);
                CharId::Thoughts
            }
            CharId::Speed => {
                self.speed.copy_from_slice(value);
                CharId::Speed
            }
            CharId::Turn => {
                self.turn.copy_from_slice(value);
                CharId::Turn
            }
            CharId::SpeedUpdate | CharId::TurnUpdate => {
                let delta = decode_i16(value).ok_or(AttError::InvalidValueSize)?;
                let target = id.update_target().unwrap_or(CharId::Speed);
                let slot = self.slot_mut(target);
                let current = decode_i16(&slot[..]).unwrap_or(0);
                *slot = encode_i16(current.saturating_add(delta));
                target
            }
        };
        debug!("{} written by {}", changed, conn);
        self.changed(changed);
        Ok(())
    }

    /// Remote write that the stack has already stored in its own attribute
    /// table. On rejection, the stack's copy of `clobbered` must be reset
    /// to [`value`](Self::value).
    pub fn apply_committed_write(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        attr: AttrType,
        value: &[u8],
        offset: u16,
    ) -> Result<(), Rejected> {
        self.write(conn, handle, attr, value, offset)
            .map_err(|error| Rejected {
                error,
                clobbered: match attr {
                    AttrType::Uuid16(uuid) => CharId::from_uuid(uuid),
                    AttrType::Uuid128(_) => None,
                },
            })
    }

    pub fn speed(&self) -> i16 {
        i16::from_le_bytes(self.speed)
    }

    pub fn turn(&self) -> i16 {
        i16::from_le_bytes(self.turn)
    }

    /// Thoughts text up to the first NUL (or invalid UTF-8).
    pub fn thoughts(&self) -> &str {
        let end = self
            .thoughts
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(THOUGHTS_LEN);
        match core::str::from_utf8(&self.thoughts[..end]) {
            Ok(s) => s,
            Err(e) => {
                let valid = e.valid_up_to();
                core::str::from_utf8(&self.thoughts[..valid]).unwrap_or("")
            }
        }
    }

    /// Raw stored value of `id`. Delta characteristics hold zero.
    pub fn value(&self, id: CharId) -> &[u8] {
        match id {
            CharId::Thoughts => &self.thoughts[..],
            CharId::Speed => &self.speed[..],
            CharId::Turn => &self.turn[..],
            CharId::SpeedUpdate | CharId::TurnUpdate => &NO_DELTA[..],
        }
    }

    pub fn set_speed(&mut self, speed: i16) {
        self.speed = encode_i16(speed);
        self.changed(CharId::Speed);
    }

    pub fn set_turn(&mut self, turn: i16) {
        self.turn = encode_i16(turn);
        self.changed(CharId::Turn);
    }

    pub fn set_thoughts(&mut self, thoughts: &str) {
        self.fill_thoughts(thoughts.as_bytes());
        self.changed(CharId::Thoughts);
    }

    fn fill_thoughts(&mut self, text: &[u8]) {
        let n = text.len().min(THOUGHTS_LEN);
        self.thoughts = [0; THOUGHTS_LEN];
        self.thoughts[..n].copy_from_slice(&text[..n]);
    }

    fn slot_mut(&mut self, id: CharId) -> &mut [u8; 2] {
        match id {
            CharId::Turn | CharId::TurnUpdate => &mut self.turn,
            _ => &mut self.speed,
        }
    }

    fn changed(&mut self, id: CharId) {
        if let Some(cb) = self.callbacks.as_mut() {
            cb.value_changed(id);
        }
    }
}
