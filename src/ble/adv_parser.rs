//! Advertising payload parsing.
//!
//! The payload is a sequence of AD structures: `[len, type, data...]`,
//! where `len` counts the type byte plus the data. Parsing stops at the
//! first zero length or a structure running past the end.

use heapless::{String, Vec};

use super::stack::ADV_DATA_MAX_LEN;
use crate::config::DEVICE_NAME_MAX_LEN;
use crate::error::Error;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_COMPLETE_UUID16: u8 = 0x03;
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

/// LE General Discoverable, BR/EDR not supported.
pub const FLAGS_LE_GENERAL_DISC: u8 = 0x06;

/// Advertising payload.
pub type AdvData = Vec<u8, ADV_DATA_MAX_LEN>;

/// Device name as kept from an advertisement.
pub type DeviceName = String<DEVICE_NAME_MAX_LEN>;

/// How an advertised name is compared with the configured peer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NameMatch {
    Exact,
    Prefix,
}

/// Iterate over the `(ad_type, data)` pairs of a payload.
pub fn ad_structures<'a>(data: &'a [u8]) -> impl Iterator<Item = (u8, &'a [u8])> + 'a {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let ad_type = data[i + 1];
        let body = &data[i + 2..i + 1 + len];
        i += len + 1;
        Some((ad_type, body))
    })
}

/// Extract the complete or shortened local name, truncated to
/// [`DEVICE_NAME_MAX_LEN`] bytes. Non-ASCII bytes end the name.
pub fn extract_local_name(data: &[u8]) -> Option<DeviceName> {
    let (_, bytes) = ad_structures(data)
        .find(|(ad_type, _)| *ad_type == AD_TYPE_SHORT_NAME || *ad_type == AD_TYPE_COMPLETE_NAME)?;

    let mut name = String::new();
    for &b in bytes {
        if !b.is_ascii() || name.push(b as char).is_err() {
            break;
        }
    }
    Some(name)
}

/// Whether `name` selects the configured peer.
pub fn name_matches(name: &str, peer: &str, mode: NameMatch) -> bool {
    match mode {
        NameMatch::Exact => name == peer,
        NameMatch::Prefix => name.starts_with(peer),
    }
}

/// Build a connectable advertisement: flags, one 16-bit service UUID and
/// the complete local name.
pub fn encode_advertisement(name: &str, service_uuid: u16) -> Result<AdvData, Error> {
    let name_len = u8::try_from(name.len()).map_err(|_| Error::BufferOverflow)?;
    let uuid = service_uuid.to_le_bytes();

    let mut data = AdvData::new();
    let mut push = |bytes: &[u8]| data.extend_from_slice(bytes).map_err(|_| Error::BufferOverflow);
    push(&[0x02, AD_TYPE_FLAGS, FLAGS_LE_GENERAL_DISC])?;
    push(&[0x03, AD_TYPE_COMPLETE_UUID16, uuid[0], uuid[1]])?;
    push(&[name_len + 1, AD_TYPE_COMPLETE_NAME])?;
    push(name.as_bytes())?;
    Ok(data)
}
