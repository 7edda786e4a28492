//! Keypad haiku viewer: row picks the poem, column the line.

#![no_std]
#![no_main]

use barebot::board::display::OledDisplay;
use barebot::board;
use barebot::board::keypad::{self, GpioMatrix};
use barebot::config::{DebounceConfig, UI_QUEUE_DEPTH};
use barebot::event::{EventBridge, EventLoop};
use barebot::input::KeyPress;
use barebot::ui::{HaikuViewer, TextDisplay};
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::Pin;
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

type Display = OledDisplay<Twim<'static, peripherals::TWISPI0>>;

static KEYS: EventBridge<CriticalSectionRawMutex, KeyPress, UI_QUEUE_DEPTH> = EventBridge::new();

#[embassy_executor::task]
async fn keypad_task(mut matrix: GpioMatrix<'static>) -> ! {
    keypad::run_keypad(&mut matrix, &KEYS, DebounceConfig::default()).await
}

#[embassy_executor::task]
async fn viewer_task(mut display: Display) -> ! {
    display.display(0, 0, "press a key", 16);
    display.flush();

    let mut viewer = HaikuViewer::new(display);
    let keys = EventLoop::new(&KEYS);
    loop {
        keys.run_once(&mut viewer).await;
        viewer.display_mut().flush();
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("haiku viewer starting");

    let p = embassy_nrf::init(board::embassy_config());

    let matrix = GpioMatrix::new(
        [
            p.P0_03.degrade(),
            p.P0_04.degrade(),
            p.P0_28.degrade(),
            p.P0_29.degrade(),
        ],
        [
            p.P0_30.degrade(),
            p.P0_31.degrade(),
            p.P1_14.degrade(),
            p.P1_15.degrade(),
        ],
    );
    let i2c = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());

    unwrap!(spawner.spawn(keypad_task(matrix)));
    unwrap!(spawner.spawn(viewer_task(OledDisplay::new(i2c))));
}
