//! barebot remote: keypad + OLED + BLE central.
//!
//! Scans for the barebot peripheral, connects, and lets the keypad drive
//! its speed and turn. `DEFMT_LOG=debug cargo run --release --features
//! embedded --bin barebot-remote`

#![no_std]
#![no_main]

use barebot::ble::Central;
use barebot::board::central::{self, CentralEvents, SoftdeviceStack, StackCommands};
use barebot::board::display::OledDisplay;
use barebot::board::keypad::{self, GpioMatrix};
use barebot::board::{self, softdevice};
use barebot::config::{CentralConfig, DebounceConfig, UI_QUEUE_DEPTH};
use barebot::event::{EventBridge, EventLoop};
use barebot::ui::remote::CentralRemote;
use barebot::ui::{RemoteUi, UiEvent};
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::Pin;
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Delay;
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

type UiBridge = EventBridge<CriticalSectionRawMutex, UiEvent, UI_QUEUE_DEPTH>;
type RemoteCentral = Central<CriticalSectionRawMutex, SoftdeviceStack, &'static UiBridge>;
type Display = OledDisplay<Twim<'static, peripherals::TWISPI0>>;

static UI_EVENTS: UiBridge = UiBridge::new();
static CENTRAL_EVENTS: CentralEvents = CentralEvents::new();
static STACK_COMMANDS: StackCommands = StackCommands::new();
static CENTRAL: StaticCell<RemoteCentral> = StaticCell::new();

#[embassy_executor::task]
async fn stack_task(sd: &'static Softdevice, central: &'static RemoteCentral) -> ! {
    central::run_stack(sd, &STACK_COMMANDS, &CENTRAL_EVENTS, central).await
}

#[embassy_executor::task]
async fn central_task(central: &'static RemoteCentral) -> ! {
    central::run_central(central, &CENTRAL_EVENTS).await
}

#[embassy_executor::task]
async fn keypad_task(mut matrix: GpioMatrix<'static>) -> ! {
    keypad::run_keypad(&mut matrix, &UI_EVENTS, DebounceConfig::default()).await
}

#[embassy_executor::task]
async fn ui_task(display: Display, central: &'static RemoteCentral) -> ! {
    let mut ui = RemoteUi::new(display, CentralRemote::new(central, Delay));
    let events = EventLoop::new(&UI_EVENTS);
    loop {
        events.run_once(&mut ui).await;
        ui.display_mut().flush();
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("barebot remote starting");

    let p = embassy_nrf::init(board::embassy_config());
    interrupt::TWISPI0.set_priority(Priority::P3);

    let sd: &'static Softdevice = Softdevice::enable(&softdevice::config("barebot remote"));
    let central = CENTRAL.init(Central::new(
        SoftdeviceStack::new(&STACK_COMMANDS),
        &UI_EVENTS,
        CentralConfig::default(),
    ));

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
    let display = OledDisplay::new(i2c);

    unwrap!(spawner.spawn(softdevice::softdevice_task(sd)));
    unwrap!(spawner.spawn(stack_task(sd, central)));
    unwrap!(spawner.spawn(central_task(central)));
    unwrap!(spawner.spawn(keypad_task(matrix)));
    unwrap!(spawner.spawn(ui_task(display, central)));
}
