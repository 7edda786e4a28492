//! LED blinker GATT server and pins.
//!
//! The two LEDs sit on plain GPIO outputs. Remote writes go through
//! [`apply_write`], which queues the pin update for the blinker task; the
//! per-LED tickers queue toggle requests for the same task.

use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Ticker};
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, CharacteristicHandles, RegisterError, WriteOp};
use nrf_softdevice::ble::{Connection, Uuid};
use nrf_softdevice::Softdevice;

use crate::blinker::{
    apply_write, BlinkerChar, BlinkerEvent, Led, LedPins, SharedBlinker, ToggleNotifier,
    SERVICE_UUID, TOGGLE_VALUE,
};
use crate::ble::profile::CharValue;
use crate::board::server::{ConnSlot, Restore};
use crate::config::BLINKER_QUEUE_DEPTH;
use crate::error::{Error, StackError};
use crate::event::EventBridge;

pub type BlinkerBridge = EventBridge<CriticalSectionRawMutex, BlinkerEvent, BLINKER_QUEUE_DEPTH>;
pub type BlinkerShared = SharedBlinker<CriticalSectionRawMutex>;

/// Active-low LEDs of the nRF52840-DK.
pub struct LedOutputs<'d> {
    red: Output<'d>,
    green: Output<'d>,
}

impl LedOutputs<'static> {
    /// Both LEDs start dark.
    pub fn new(red: AnyPin, green: AnyPin) -> Self {
        Self {
            red: Output::new(red, Level::High, OutputDrive::Standard),
            green: Output::new(green, Level::High, OutputDrive::Standard),
        }
    }
}

impl LedPins for LedOutputs<'_> {
    fn set(&mut self, led: Led, lit: bool) {
        let pin = match led {
            Led::Red => &mut self.red,
            Led::Green => &mut self.green,
        };
        pin.set_level(if lit { Level::Low } else { Level::High });
    }
}

pub struct BlinkerServer {
    profile: &'static BlinkerShared,
    events: &'static BlinkerBridge,
    chars: [CharacteristicHandles; BlinkerChar::COUNT],
}

impl BlinkerServer {
    pub fn new(
        sd: &mut Softdevice,
        profile: &'static BlinkerShared,
        events: &'static BlinkerBridge,
    ) -> Result<Self, RegisterError> {
        let mut service = ServiceBuilder::new(sd, Uuid::new_16(SERVICE_UUID))?;

        let mut add = |ch: BlinkerChar| -> Result<CharacteristicHandles, RegisterError> {
            let props = if ch.is_writable() {
                Properties::new().read().write()
            } else {
                Properties::new().read().notify()
            };
            let initial = [profile.lock(|p| p.borrow().value(ch))];
            let attr = Attribute::new(&initial[..]);
            Ok(service
                .add_characteristic(Uuid::new_16(ch.uuid()), attr, Metadata::new(props))?
                .build())
        };

        let chars = [
            add(BlinkerChar::RedLed)?,
            add(BlinkerChar::GreenLed)?,
            add(BlinkerChar::RedToggle)?,
            add(BlinkerChar::GreenToggle)?,
        ];
        let _ = service.build();

        Ok(Self {
            profile,
            events,
            chars,
        })
    }

    pub fn value_handle(&self, ch: BlinkerChar) -> u16 {
        self.chars[ch.index()].value_handle
    }

    fn char_of(&self, handle: u16) -> Option<BlinkerChar> {
        BlinkerChar::ALL
            .into_iter()
            .find(|ch| self.chars[ch.index()].value_handle == handle)
    }
}

impl gatt_server::Server for BlinkerServer {
    type Event = Restore;

    fn on_write(
        &self,
        _conn: &Connection,
        handle: u16,
        _op: WriteOp,
        offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        // Toggle subscriptions land on CCCD handles; the SoftDevice keeps those.
        let Some(ch) = self.char_of(handle) else {
            trace!("write to {=u16:#x} ignored", handle);
            return None;
        };
        let offset = u16::try_from(offset).unwrap_or(u16::MAX);

        let error = apply_write(self.profile, self.events, ch, data, offset).err()?;
        warn!("{} write rejected: {}", ch, error);
        let previous = self.profile.lock(|p| p.borrow().value(ch));
        CharValue::from_slice(&[previous])
            .ok()
            .map(|value| Restore { handle, value })
    }
}

/// Sends toggle notifications through the SoftDevice.
pub struct BlinkerNotifier {
    server: &'static BlinkerServer,
    conn: &'static ConnSlot,
}

impl BlinkerNotifier {
    pub fn new(server: &'static BlinkerServer, conn: &'static ConnSlot) -> Self {
        Self { server, conn }
    }
}

impl ToggleNotifier for BlinkerNotifier {
    fn notify_toggle(&mut self, led: Led) -> Result<(), Error> {
        let Some(conn) = self.conn.lock(|c| c.borrow().clone()) else {
            return Err(Error::Disconnected);
        };
        let handle = self.server.value_handle(BlinkerChar::toggle_of(led));
        gatt_server::notify_value(&conn, handle, &TOGGLE_VALUE).map_err(|e| match e {
            gatt_server::NotifyValueError::Disconnected => Error::Disconnected,
            gatt_server::NotifyValueError::Raw(_) => Error::Stack(StackError::Busy),
        })
    }
}

/// Queue a toggle request for `led` every `period_ms`.
pub async fn run_blink_timer(events: &'static BlinkerBridge, led: Led, period_ms: u64) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(period_ms));
    loop {
        ticker.next().await;
        let _ = events.post(BlinkerEvent::Blink(led));
    }
}
