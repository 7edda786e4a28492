//! LED blinker demo.
//!
//! A peripheral serving one service with two LED characteristics and two
//! toggle characteristics:
//!
//! | UUID   | Characteristic | Value                               |
//! |--------|----------------|-------------------------------------|
//! | 0xFFE0 | service        |                                     |
//! | 0xFFE1 | RedLed         | `u8`, nonzero lights the red LED    |
//! | 0xFFE2 | GreenLed       | `u8`, nonzero lights the green LED  |
//! | 0xFFE3 | RedToggle      | `u8`, always 0, notify only         |
//! | 0xFFE4 | GreenToggle    | `u8`, always 0, notify only         |
//!
//! Each LED has its own timer. A tick posts [`BlinkerEvent::Blink`] and
//! the app notifies that LED's toggle characteristic, asking the central
//! to flip it. The central answers by writing the LED characteristic; the
//! write posts [`BlinkerEvent::LedWritten`] and the app drives the pin to
//! the new value. The LEDs only ever change through GATT writes.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::{AttError, Error};
use crate::event::{EventBridge, EventHandler};

pub const SERVICE_UUID: u16 = 0xFFE0;
pub const RED_LED_UUID: u16 = 0xFFE1;
pub const GREEN_LED_UUID: u16 = 0xFFE2;
pub const RED_TOGGLE_UUID: u16 = 0xFFE3;
pub const GREEN_TOGGLE_UUID: u16 = 0xFFE4;

/// Every blinker characteristic holds one byte.
pub const VALUE_LEN: usize = 1;

/// Value carried by toggle notifications.
pub const TOGGLE_VALUE: [u8; VALUE_LEN] = [0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Led {
    Red,
    Green,
}

/// Logical characteristic IDs of the blinker service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlinkerChar {
    RedLed,
    GreenLed,
    RedToggle,
    GreenToggle,
}

impl BlinkerChar {
    pub const COUNT: usize = 4;

    pub const ALL: [BlinkerChar; Self::COUNT] = [
        BlinkerChar::RedLed,
        BlinkerChar::GreenLed,
        BlinkerChar::RedToggle,
        BlinkerChar::GreenToggle,
    ];

    pub fn uuid(self) -> u16 {
        match self {
            BlinkerChar::RedLed => RED_LED_UUID,
            BlinkerChar::GreenLed => GREEN_LED_UUID,
            BlinkerChar::RedToggle => RED_TOGGLE_UUID,
            BlinkerChar::GreenToggle => GREEN_TOGGLE_UUID,
        }
    }

    pub fn from_uuid(uuid: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.uuid() == uuid)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn led(self) -> Led {
        match self {
            BlinkerChar::RedLed | BlinkerChar::RedToggle => Led::Red,
            BlinkerChar::GreenLed | BlinkerChar::GreenToggle => Led::Green,
        }
    }

    /// Toggle characteristics are notify-only.
    pub fn is_writable(self) -> bool {
        matches!(self, BlinkerChar::RedLed | BlinkerChar::GreenLed)
    }

    pub fn toggle_of(led: Led) -> Self {
        match led {
            Led::Red => BlinkerChar::RedToggle,
            Led::Green => BlinkerChar::GreenToggle,
        }
    }
}

/// Attribute values of the blinker service.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlinkerProfile {
    red: u8,
    green: u8,
}

impl BlinkerProfile {
    /// Both LEDs start dark.
    pub const fn new() -> Self {
        Self { red: 0, green: 0 }
    }

    pub fn is_lit(&self, led: Led) -> bool {
        self.led_value(led) != 0
    }

    fn led_value(&self, led: Led) -> u8 {
        match led {
            Led::Red => self.red,
            Led::Green => self.green,
        }
    }

    pub fn value(&self, ch: BlinkerChar) -> u8 {
        if ch.is_writable() {
            self.led_value(ch.led())
        } else {
            TOGGLE_VALUE[0]
        }
    }

    /// Remote write. Returns the LED whose value was stored.
    pub fn write(&mut self, ch: BlinkerChar, value: &[u8], offset: u16) -> Result<Led, AttError> {
        if !ch.is_writable() {
            return Err(AttError::WriteNotPermitted);
        }
        if offset != 0 {
            return Err(AttError::AttrNotLong);
        }
        let [byte] = value else {
            return Err(AttError::InvalidValueSize);
        };
        let led = ch.led();
        match led {
            Led::Red => self.red = *byte,
            Led::Green => self.green = *byte,
        }
        Ok(led)
    }
}

/// Profile shared between the GATT server glue and the blinker task.
pub type SharedBlinker<M> = Mutex<M, RefCell<BlinkerProfile>>;

/// Events handled by the blinker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlinkerEvent {
    /// The LED's timer fired.
    Blink(Led),
    /// A central wrote the LED characteristic.
    LedWritten(Led),
}

/// Store a remote write and queue the pin update.
///
/// A write the profile accepts but the queue cannot take still lands in
/// the profile; the pin catches up on the next write to that LED.
pub fn apply_write<M: RawMutex, const N: usize>(
    profile: &SharedBlinker<M>,
    bridge: &EventBridge<M, BlinkerEvent, N>,
    ch: BlinkerChar,
    value: &[u8],
    offset: u16,
) -> Result<(), AttError> {
    let led = profile.lock(|p| p.borrow_mut().write(ch, value, offset))?;
    // A full queue is already counted by the bridge.
    let _ = bridge.post(BlinkerEvent::LedWritten(led));
    Ok(())
}

/// The two LED outputs.
pub trait LedPins {
    fn set(&mut self, led: Led, lit: bool);
}

/// Sends a toggle notification to the connected central.
pub trait ToggleNotifier {
    fn notify_toggle(&mut self, led: Led) -> Result<(), Error>;
}

/// The blinker task's event handler.
pub struct BlinkerApp<'a, M: RawMutex, L, N> {
    profile: &'a SharedBlinker<M>,
    leds: L,
    notifier: N,
}

impl<'a, M, L, N> BlinkerApp<'a, M, L, N>
where
    M: RawMutex,
    L: LedPins,
    N: ToggleNotifier,
{
    /// Drives both pins to the profile's values before returning.
    pub fn new(profile: &'a SharedBlinker<M>, mut leds: L, notifier: N) -> Self {
        let (red, green) = profile.lock(|p| {
            let p = p.borrow();
            (p.is_lit(Led::Red), p.is_lit(Led::Green))
        });
        leds.set(Led::Red, red);
        leds.set(Led::Green, green);
        Self {
            profile,
            leds,
            notifier,
        }
    }

    pub fn leds(&self) -> &L {
        &self.leds
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

impl<M, L, N> EventHandler<BlinkerEvent> for BlinkerApp<'_, M, L, N>
where
    M: RawMutex,
    L: LedPins,
    N: ToggleNotifier,
{
    async fn handle(&mut self, event: BlinkerEvent) {
        match event {
            BlinkerEvent::Blink(led) => {
                if let Err(e) = self.notifier.notify_toggle(led) {
                    debug!("{} toggle not sent: {}", led, e);
                }
            }
            BlinkerEvent::LedWritten(led) => {
                let lit = self.profile.lock(|p| p.borrow().is_lit(led));
                self.leds.set(led, lit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventLoop;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[derive(Default)]
    struct Pins(Vec<(Led, bool)>);

    impl LedPins for Pins {
        fn set(&mut self, led: Led, lit: bool) {
            self.0.push((led, lit));
        }
    }

    #[derive(Default)]
    struct Toggles {
        sent: Vec<Led>,
        connected: bool,
    }

    impl ToggleNotifier for Toggles {
        fn notify_toggle(&mut self, led: Led) -> Result<(), Error> {
            if !self.connected {
                return Err(Error::Disconnected);
            }
            self.sent.push(led);
            Ok(())
        }
    }

    type Bridge = EventBridge<NoopRawMutex, BlinkerEvent, 4>;
    type Shared = SharedBlinker<NoopRawMutex>;
    type App = BlinkerApp<'static, NoopRawMutex, Pins, Toggles>;

    fn setup() -> (&'static Bridge, &'static Shared, App) {
        let bridge: &'static Bridge = Box::leak(Box::new(Bridge::new()));
        let shared: &'static Shared =
            Box::leak(Box::new(Mutex::new(RefCell::new(BlinkerProfile::new()))));
        let toggles = Toggles {
            connected: true,
            ..Default::default()
        };
        (bridge, shared, BlinkerApp::new(shared, Pins::default(), toggles))
    }

    #[test]
    fn characteristics_map_to_their_leds() {
        for ch in BlinkerChar::ALL {
            assert_eq!(BlinkerChar::from_uuid(ch.uuid()), Some(ch));
        }
        assert_eq!(BlinkerChar::from_uuid(SERVICE_UUID), None);
        assert_eq!(BlinkerChar::toggle_of(Led::Red).led(), Led::Red);
        assert_eq!(BlinkerChar::GreenToggle.index(), 3);
    }

    #[test]
    fn led_writes_validate_length_and_offset() {
        let mut p = BlinkerProfile::new();
        assert_eq!(p.write(BlinkerChar::RedLed, &[1], 0), Ok(Led::Red));
        assert!(p.is_lit(Led::Red));
        assert_eq!(p.value(BlinkerChar::RedLed), 1);

        assert_eq!(p.write(BlinkerChar::GreenLed, &[1, 0], 0), Err(AttError::InvalidValueSize));
        assert_eq!(p.write(BlinkerChar::GreenLed, &[], 0), Err(AttError::InvalidValueSize));
        assert_eq!(p.write(BlinkerChar::GreenLed, &[1], 1), Err(AttError::AttrNotLong));
        assert!(!p.is_lit(Led::Green));
    }

    #[test]
    fn toggles_are_not_writable() {
        let mut p = BlinkerProfile::new();
        assert_eq!(
            p.write(BlinkerChar::GreenToggle, &[1], 0),
            Err(AttError::WriteNotPermitted)
        );
        assert_eq!(p.value(BlinkerChar::GreenToggle), 0);
    }

    #[test]
    fn app_starts_with_leds_dark() {
        let (_, _, app) = setup();
        assert_eq!(app.leds().0, vec![(Led::Red, false), (Led::Green, false)]);
    }

    #[test]
    fn blink_tick_sends_toggle_but_leaves_led() {
        let (bridge, _, mut app) = setup();
        let ev = EventLoop::new(bridge);
        bridge.post(BlinkerEvent::Blink(Led::Green)).unwrap();
        block_on(ev.drain(&mut app));

        assert_eq!(app.notifier().sent, vec![Led::Green]);
        assert_eq!(app.leds().0.len(), 2);
    }

    #[test]
    fn remote_write_drives_the_pin() {
        let (bridge, shared, mut app) = setup();
        let ev = EventLoop::new(bridge);

        apply_write(shared, bridge, BlinkerChar::RedLed, &[0xFF], 0).unwrap();
        block_on(ev.drain(&mut app));
        apply_write(shared, bridge, BlinkerChar::RedLed, &[0], 0).unwrap();
        block_on(ev.drain(&mut app));

        assert_eq!(app.leds().0[2..], [(Led::Red, true), (Led::Red, false)]);
    }

    #[test]
    fn rejected_write_queues_nothing() {
        let (bridge, shared, _) = setup();
        assert_eq!(
            apply_write(shared, bridge, BlinkerChar::RedToggle, &[1], 0),
            Err(AttError::WriteNotPermitted)
        );
        assert!(bridge.is_empty());
        assert!(!shared.lock(|p| p.borrow().is_lit(Led::Red)));
    }

    #[test]
    fn blink_without_central_is_dropped() {
        let (bridge, shared, _) = setup();
        let mut app = BlinkerApp::new(shared, Pins::default(), Toggles::default());
        let ev = EventLoop::new(bridge);
        bridge.post(BlinkerEvent::Blink(Led::Red)).unwrap();
        assert_eq!(block_on(ev.drain(&mut app)), 1);
        assert!(app.notifier().sent.is_empty());
    }

    #[test]
    fn full_queue_keeps_the_stored_value() {
        let (bridge, shared, _) = setup();
        for _ in 0..4 {
            bridge.post(BlinkerEvent::Blink(Led::Red)).unwrap();
        }
        assert_eq!(apply_write(shared, bridge, BlinkerChar::GreenLed, &[1], 0), Ok(()));
        assert!(shared.lock(|p| p.borrow().is_lit(Led::Green)));
        assert_eq!(bridge.dropped(), 1);
    }
}
