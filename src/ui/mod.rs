//! User interface subsystem - character LCD driven by keypad events.
//!
//! ## Components
//!
//! - **Display**: character-cell abstraction over the LCD/OLED
//! - **Remote**: CONTROL / THOUGHTS screens of the BLE remote
//! - **Haiku**: the keypad haiku viewer

pub mod display;
pub mod haiku;
pub mod remote;

pub use display::{TextDisplay, TextGrid};
pub use haiku::HaikuViewer;
pub use remote::{RemoteControl, RemoteUi, Screen, UiEvent};
