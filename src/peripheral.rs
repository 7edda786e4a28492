//! Barebot peripheral application.
//!
//! The peripheral task owns one event queue fed by two producers: the
//! button tick (local speed/turn changes) and the GATT profile's change
//! callback (remote writes as well as local ones). Every Speed or Turn
//! change ends up as a notification to subscribed centrals.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::ble::gatt_service::{BarebotProfile, ProfileCallbacks};
use crate::ble::profile::{encode_i16, CharId};
use crate::error::Error;
use crate::event::{EventBridge, EventHandler};
use crate::input::ButtonPress;

/// Full stop: speed and turn to zero.
pub const BUTTON_STOP: u8 = 0;
pub const BUTTON_FASTER: u8 = 1;
pub const BUTTON_SLOWER: u8 = 2;
/// Centre the steering.
pub const BUTTON_STRAIGHT: u8 = 3;

/// Events handled by the peripheral task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralEvent {
    ButtonPressed(ButtonPress),
    CharChanged(CharId),
}

/// Sends a characteristic value to subscribed centrals.
pub trait Notifier {
    fn notify(&mut self, id: CharId, value: &[u8]) -> Result<(), Error>;
}

/// Profile callback that turns changes into [`PeripheralEvent::CharChanged`].
pub struct ChangeForwarder<'a, M: RawMutex, const N: usize> {
    bridge: &'a EventBridge<M, PeripheralEvent, N>,
}

impl<'a, M: RawMutex, const N: usize> ChangeForwarder<'a, M, N> {
    pub fn new(bridge: &'a EventBridge<M, PeripheralEvent, N>) -> Self {
        Self { bridge }
    }
}

impl<M: RawMutex, const N: usize> ProfileCallbacks for ChangeForwarder<'_, M, N> {
    fn value_changed(&mut self, id: CharId) {
        // A full queue is already counted by the bridge.
        let _ = self.bridge.post(PeripheralEvent::CharChanged(id));
    }
}

/// Profile shared between the GATT server glue and the application task.
pub type SharedProfile<M, C> = Mutex<M, RefCell<BarebotProfile<C>>>;

/// The peripheral task's event handler.
pub struct PeripheralApp<'a, M: RawMutex, C, N> {
    profile: &'a SharedProfile<M, C>,
    notifier: N,
}

impl<'a, M, C, N> PeripheralApp<'a, M, C, N>
where
    M: RawMutex,
    C: ProfileCallbacks,
    N: Notifier,
{
    pub fn new(profile: &'a SharedProfile<M, C>, notifier: N) -> Self {
        Self { profile, notifier }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    fn on_button(&mut self, id: u8) {
        self.profile.lock(|profile| {
            let mut profile = profile.borrow_mut();
            match id {
                BUTTON_STOP => {
                    profile.set_speed(0);
                    profile.set_turn(0);
                }
                BUTTON_FASTER => {
                    let speed = profile.speed().saturating_add(1);
                    profile.set_speed(speed);
                }
                BUTTON_SLOWER => {
                    let speed = profile.speed().saturating_sub(1);
                    profile.set_speed(speed);
                }
                BUTTON_STRAIGHT => profile.set_turn(0),
                _ => warn!("Button error: {}", id),
            }
        });
    }

    fn on_char_changed(&mut self, id: CharId) {
        let value = match id {
            CharId::Speed | CharId::Turn => self.profile.lock(|profile| {
                let profile = profile.borrow();
                encode_i16(if id == CharId::Speed {
                    profile.speed()
                } else {
                    profile.turn()
                })
            }),
            _ => {
                trace!("{} changed, not notified", id);
                return;
            }
        };

        if let Err(e) = self.notifier.notify(id, &value) {
            warn!("notify {} failed: {}", id, e);
        }
    }
}

impl<M, C, N> EventHandler<PeripheralEvent> for PeripheralApp<'_, M, C, N>
where
    M: RawMutex,
    C: ProfileCallbacks,
    N: Notifier,
{
    async fn handle(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::ButtonPressed(press) => self.on_button(press.id),
            PeripheralEvent::CharChanged(id) => self.on_char_changed(id),
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
    struct Sent(Vec<(CharId, Vec<u8>)>);

    impl Notifier for Sent {
        fn notify(&mut self, id: CharId, value: &[u8]) -> Result<(), Error> {
            self.0.push((id, value.to_vec()));
            Ok(())
        }
    }

    type Bridge = EventBridge<NoopRawMutex, PeripheralEvent, 8>;
    type Forwarder = ChangeForwarder<'static, NoopRawMutex, 8>;
    type Shared = SharedProfile<NoopRawMutex, Forwarder>;
    type App = PeripheralApp<'static, NoopRawMutex, Forwarder, Sent>;

    fn press(id: u8) -> PeripheralEvent {
        PeripheralEvent::ButtonPressed(ButtonPress { id })
    }

    fn setup() -> (&'static Bridge, &'static Shared, App) {
        let bridge: &'static Bridge = Box::leak(Box::new(Bridge::new()));
        let mut profile = BarebotProfile::new("hi");
        profile.register_callbacks(ChangeForwarder::new(bridge));
        let shared: &'static Shared = Box::leak(Box::new(Mutex::new(RefCell::new(profile))));
        (bridge, shared, PeripheralApp::new(shared, Sent::default()))
    }

    #[test]
    fn faster_button_notifies_new_speed() {
        let (bridge, shared, mut app) = setup();
        let ev = EventLoop::new(bridge);
        bridge.post(press(BUTTON_FASTER)).unwrap();
        block_on(ev.drain(&mut app));

        assert_eq!(shared.lock(|p| p.borrow().speed()), 1);
        assert_eq!(app.notifier().0, vec![(CharId::Speed, vec![1, 0])]);
    }

    #[test]
    fn stop_button_zeroes_both() {
        let (bridge, shared, mut app) = setup();
        shared.lock(|p| {
            let mut p = p.borrow_mut();
            p.set_speed(3);
            p.set_turn(-2);
        });
        let ev = EventLoop::new(bridge);
        bridge.post(press(BUTTON_STOP)).unwrap();
        block_on(ev.drain(&mut app));

        assert_eq!(shared.lock(|p| (p.borrow().speed(), p.borrow().turn())), (0, 0));
        let sent = &app.notifier().0;
        assert_eq!(sent.last(), Some(&(CharId::Turn, vec![0, 0])));
    }

    #[test]
    fn slower_and_straight_buttons() {
        let (bridge, shared, mut app) = setup();
        shared.lock(|p| p.borrow_mut().set_turn(4));
        let ev = EventLoop::new(bridge);
        bridge.post(press(BUTTON_SLOWER)).unwrap();
        bridge.post(press(BUTTON_STRAIGHT)).unwrap();
        block_on(ev.drain(&mut app));

        assert_eq!(shared.lock(|p| p.borrow().speed()), -1);
        assert_eq!(shared.lock(|p| p.borrow().turn()), 0);
    }

    #[test]
    fn unknown_button_changes_nothing() {
        let (bridge, shared, mut app) = setup();
        let ev = EventLoop::new(bridge);
        bridge.post(press(9)).unwrap();
        assert_eq!(block_on(ev.drain(&mut app)), 1);
        assert_eq!(shared.lock(|p| p.borrow().speed()), 0);
        assert!(app.notifier().0.is_empty());
    }

    #[test]
    fn thoughts_changes_are_not_notified() {
        let (bridge, shared, mut app) = setup();
        shared.lock(|p| p.borrow_mut().set_thoughts("new"));
        let ev = EventLoop::new(bridge);
        block_on(ev.drain(&mut app));
        assert!(app.notifier().0.is_empty());
    }
}
