//! LED blinker: advertises as `Blinker`. Each LED's timer asks the
//! connected central to toggle it; the central's writes drive the LEDs.

#![no_std]
#![no_main]

use core::cell::RefCell;

use barebot::ble::adv_parser::{encode_advertisement, AdvData};
use barebot::blinker::{BlinkerApp, BlinkerProfile, Led, SERVICE_UUID};
use barebot::board::blinker::{
    self, BlinkerBridge, BlinkerNotifier, BlinkerServer, BlinkerShared, LedOutputs,
};
use barebot::board::server::{self, ConnSlot};
use barebot::board::{self, softdevice};
use barebot::config::{BLINKER_NAME, GREEN_BLINK_MS, RED_BLINK_MS};
use barebot::event::{EventBridge, EventLoop};
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::Pin;
use embassy_sync::blocking_mutex::Mutex;
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

static EVENTS: BlinkerBridge = EventBridge::new();
static PROFILE: BlinkerShared = Mutex::new(RefCell::new(BlinkerProfile::new()));
static CONN: ConnSlot = Mutex::new(RefCell::new(None));
static SERVER: StaticCell<BlinkerServer> = StaticCell::new();
static ADV_DATA: StaticCell<AdvData> = StaticCell::new();

#[embassy_executor::task]
async fn server_task(sd: &'static Softdevice, server: &'static BlinkerServer, adv: &'static AdvData) -> ! {
    server::serve_forever(sd, server, &CONN, adv).await
}

#[embassy_executor::task(pool_size = 2)]
async fn blink_task(led: Led, period_ms: u64) -> ! {
    blinker::run_blink_timer(&EVENTS, led, period_ms).await
}

#[embassy_executor::task]
async fn app_task(leds: LedOutputs<'static>, server: &'static BlinkerServer) -> ! {
    let mut app = BlinkerApp::new(&PROFILE, leds, BlinkerNotifier::new(server, &CONN));
    EventLoop::new(&EVENTS).run(&mut app).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("blinker starting");

    let p = embassy_nrf::init(board::embassy_config());
    let sd = Softdevice::enable(&softdevice::config(BLINKER_NAME));

    let server = SERVER.init(unwrap!(BlinkerServer::new(sd, &PROFILE, &EVENTS)));
    let sd: &'static Softdevice = sd;
    let adv = ADV_DATA.init(unwrap!(encode_advertisement(BLINKER_NAME, SERVICE_UUID)));

    let leds = LedOutputs::new(p.P0_13.degrade(), p.P0_14.degrade());

    unwrap!(spawner.spawn(softdevice::softdevice_task(sd)));
    unwrap!(spawner.spawn(server_task(sd, server, adv)));
    unwrap!(spawner.spawn(blink_task(Led::Red, RED_BLINK_MS)));
    unwrap!(spawner.spawn(blink_task(Led::Green, GREEN_BLINK_MS)));
    unwrap!(spawner.spawn(app_task(leds, server)));
}
