//! barebot peripheral: advertises as `BP` and serves speed, turn and
//! thoughts. The four buttons stop, speed up, slow down and straighten.

#![no_std]
#![no_main]

use core::cell::RefCell;

use barebot::ble::adv_parser::{encode_advertisement, AdvData};
use barebot::ble::profile::SERVICE_UUID;
use barebot::ble::BarebotProfile;
use barebot::board::buttons::{self, ButtonPins};
use barebot::board::server::{self, BarebotServer, ConnSlot, SoftdeviceNotifier};
use barebot::board::{self, softdevice};
use barebot::config::{DebounceConfig, INITIAL_THOUGHTS, PEER_NAME, PERIPHERAL_QUEUE_DEPTH};
use barebot::event::{EventBridge, EventLoop};
use barebot::peripheral::{ChangeForwarder, PeripheralApp, PeripheralEvent, SharedProfile};
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::Pin;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

type Forwarder = ChangeForwarder<'static, CriticalSectionRawMutex, PERIPHERAL_QUEUE_DEPTH>;
type Profile = SharedProfile<CriticalSectionRawMutex, Forwarder>;
type Server = BarebotServer<Forwarder>;

static EVENTS: EventBridge<CriticalSectionRawMutex, PeripheralEvent, PERIPHERAL_QUEUE_DEPTH> =
    EventBridge::new();
static CONN: ConnSlot = Mutex::new(RefCell::new(None));
static PROFILE: StaticCell<Profile> = StaticCell::new();
static SERVER: StaticCell<Server> = StaticCell::new();
static ADV_DATA: StaticCell<AdvData> = StaticCell::new();

#[embassy_executor::task]
async fn server_task(sd: &'static Softdevice, server: &'static Server, adv: &'static AdvData) -> ! {
    server::run_server(sd, server, &CONN, adv).await
}

#[embassy_executor::task]
async fn buttons_task(mut pins: ButtonPins<'static>) -> ! {
    buttons::run_buttons(&mut pins, &EVENTS, DebounceConfig::default()).await
}

#[embassy_executor::task]
async fn app_task(sd: &'static Softdevice, server: &'static Server, profile: &'static Profile) -> ! {
    let mut app = PeripheralApp::new(profile, SoftdeviceNotifier::new(sd, server, &CONN));
    EventLoop::new(&EVENTS).run(&mut app).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("barebot peripheral starting");

    let p = embassy_nrf::init(board::embassy_config());
    let sd = Softdevice::enable(&softdevice::config(PEER_NAME));

    let mut initial = BarebotProfile::new(INITIAL_THOUGHTS);
    initial.register_callbacks(ChangeForwarder::new(&EVENTS));
    let profile = PROFILE.init(Mutex::new(RefCell::new(initial)));
    let server = SERVER.init(unwrap!(BarebotServer::new(sd, profile)));
    let sd: &'static Softdevice = sd;
    let adv = ADV_DATA.init(unwrap!(encode_advertisement(PEER_NAME, SERVICE_UUID)));

    let pins = ButtonPins::new([
        p.P0_11.degrade(),
        p.P0_12.degrade(),
        p.P0_24.degrade(),
        p.P0_25.degrade(),
    ]);

    unwrap!(spawner.spawn(softdevice::softdevice_task(sd)));
    unwrap!(spawner.spawn(server_task(sd, server, adv)));
    unwrap!(spawner.spawn(buttons_task(pins)));
    unwrap!(spawner.spawn(app_task(sd, server, profile)));
}
