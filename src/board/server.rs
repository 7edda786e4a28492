//! Barebot GATT server on the SoftDevice.
//!
//! The SoftDevice keeps its own copy of every attribute value and answers
//! reads from it. Remote writes are forwarded into the shared
//! [`BarebotProfile`](crate::ble::BarebotProfile), whose change callback feeds the peripheral task;
//! that task mirrors new values back with [`SoftdeviceNotifier`]. A write
//! the profile rejects has already landed in the SoftDevice table, so
//! [`run_server`] puts the profile's value back.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Timer;
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, CharacteristicHandles, RegisterError, WriteOp};
use nrf_softdevice::ble::{peripheral, Connection, Uuid};
use nrf_softdevice::Softdevice;

use crate::ble::adv_parser::AdvData;
use crate::ble::gatt_service::{AttrType, ProfileCallbacks};
use crate::ble::profile::{
    CharId, CharValue, CLIENT_CHAR_CONFIG_UUID, MAX_VALUE_LEN, SERVICE_UUID,
};
use crate::config::ADV_INTERVAL;
use crate::error::{Error, StackError};
use crate::peripheral::{Notifier, SharedProfile};

/// The connected central, if any.
pub type ConnSlot = Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>>;

/// Attribute value to write back after a rejected remote write.
pub struct Restore {
    pub handle: u16,
    pub value: CharValue,
}

pub struct BarebotServer<C: 'static> {
    profile: &'static SharedProfile<CriticalSectionRawMutex, C>,
    chars: [CharacteristicHandles; CharId::COUNT],
}

impl<C: ProfileCallbacks> BarebotServer<C> {
    /// Register the barebot service, seeded with the profile's values.
    pub fn new(
        sd: &mut Softdevice,
        profile: &'static SharedProfile<CriticalSectionRawMutex, C>,
    ) -> Result<Self, RegisterError> {
        let mut service = ServiceBuilder::new(sd, Uuid::new_16(SERVICE_UUID))?;

        let mut add = |id: CharId| -> Result<CharacteristicHandles, RegisterError> {
            let props = match id {
                CharId::Thoughts => Properties::new().read().write(),
                CharId::Speed | CharId::Turn => Properties::new()
                    .read()
                    .write()
                    .write_without_response()
                    .notify(),
                CharId::SpeedUpdate | CharId::TurnUpdate => {
                    Properties::new().write().write_without_response()
                }
            };
            // Update characteristics have no value of their own; they start zeroed.
            let mut initial = [0u8; MAX_VALUE_LEN];
            let len = id.value_len();
            profile.lock(|p| {
                let p = p.borrow();
                let value = p.value(id);
                let n = value.len().min(len);
                initial[..n].copy_from_slice(&value[..n]);
            });
            let attr = Attribute::new(&initial[..len]);
            Ok(service
                .add_characteristic(Uuid::new_16(id.uuid()), attr, Metadata::new(props))?
                .build())
        };

        let chars = [
            add(CharId::Thoughts)?,
            add(CharId::Speed)?,
            add(CharId::Turn)?,
            add(CharId::SpeedUpdate)?,
            add(CharId::TurnUpdate)?,
        ];
        let _ = service.build();

        Ok(Self { profile, chars })
    }

    pub fn value_handle(&self, id: CharId) -> u16 {
        self.chars[id.index()].value_handle
    }

    /// Attribute type behind a server handle.
    fn attr_of(&self, handle: u16) -> Option<AttrType> {
        CharId::ALL.into_iter().find_map(|id| {
            let chars = &self.chars[id.index()];
            if chars.value_handle == handle {
                Some(AttrType::Uuid16(id.uuid()))
            } else if chars.cccd_handle == handle {
                Some(AttrType::Uuid16(CLIENT_CHAR_CONFIG_UUID))
            } else {
                None
            }
        })
    }
}

impl<C: ProfileCallbacks> gatt_server::Server for BarebotServer<C> {
    type Event = Restore;

    fn on_write(
        &self,
        conn: &Connection,
        handle: u16,
        _op: WriteOp,
        offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        let Some(attr) = self.attr_of(handle) else {
            debug!("write to unknown handle {=u16:#x}", handle);
            return None;
        };
        let conn = conn.handle().unwrap_or_default();
        let offset = u16::try_from(offset).unwrap_or(u16::MAX);

        let rejected = self.profile.lock(|p| {
            let mut p = p.borrow_mut();
            let rejected = p
                .apply_committed_write(conn, handle, attr, data, offset)
                .err()?;
            let previous = rejected
                .clobbered
                .and_then(|id| CharValue::from_slice(p.value(id)).ok());
            Some((rejected.error, previous))
        })?;

        let (error, previous) = rejected;
        warn!("write to {=u16:#x} rejected: {}", handle, error);
        previous.map(|value| Restore { handle, value })
    }
}

/// Publishes profile values through the SoftDevice.
pub struct SoftdeviceNotifier<C: 'static> {
    sd: &'static Softdevice,
    server: &'static BarebotServer<C>,
    conn: &'static ConnSlot,
}

impl<C> SoftdeviceNotifier<C> {
    pub fn new(
        sd: &'static Softdevice,
        server: &'static BarebotServer<C>,
        conn: &'static ConnSlot,
    ) -> Self {
        Self { sd, server, conn }
    }
}

impl<C: ProfileCallbacks> Notifier for SoftdeviceNotifier<C> {
    fn notify(&mut self, id: CharId, value: &[u8]) -> Result<(), Error> {
        let handle = self.server.value_handle(id);
        gatt_server::set_value(self.sd, handle, value)
            .map_err(|_| Error::Stack(StackError::NoResources))?;

        let Some(conn) = self.conn.lock(|c| c.borrow().clone()) else {
            trace!("no central, {} not notified", id);
            return Ok(());
        };
        gatt_server::notify_value(&conn, handle, value).map_err(|e| match e {
            gatt_server::NotifyValueError::Disconnected => Error::Disconnected,
            // Includes a central that has not subscribed.
            gatt_server::NotifyValueError::Raw(_) => Error::Stack(StackError::Busy),
        })
    }
}

/// Advertise, serve one central until it leaves, repeat.
pub async fn run_server<C: ProfileCallbacks>(
    sd: &'static Softdevice,
    server: &'static BarebotServer<C>,
    conn_slot: &'static ConnSlot,
    adv_data: &AdvData,
) -> ! {
    serve_forever(sd, server, conn_slot, adv_data).await
}

/// Advertising and connection loop shared by every GATT server here.
///
/// Each [`Restore`] a server raises is written back into the SoftDevice
/// attribute table.
pub async fn serve_forever<S>(
    sd: &'static Softdevice,
    server: &S,
    conn_slot: &'static ConnSlot,
    adv_data: &AdvData,
) -> !
where
    S: gatt_server::Server<Event = Restore>,
{
    let config = peripheral::Config {
        interval: ADV_INTERVAL,
        ..Default::default()
    };

    loop {
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &adv_data[..],
            scan_data: &[],
        };
        let conn = match peripheral::advertise_connectable(sd, adv, &config).await {
            Ok(conn) => conn,
            Err(_) => {
                warn!("advertising failed, retrying");
                Timer::after_secs(1).await;
                continue;
            }
        };

        info!("central connected");
        conn_slot.lock(|c| *c.borrow_mut() = Some(conn.clone()));
        let _ = gatt_server::run(&conn, server, |restore: Restore| {
            if gatt_server::set_value(sd, restore.handle, &restore.value).is_err() {
                warn!("could not restore {=u16:#x}", restore.handle);
            }
        })
        .await;
        conn_slot.lock(|c| *c.borrow_mut() = None);
        info!("central disconnected");
    }
}
