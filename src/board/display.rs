//! SSD1306 OLED driven as a 4x16 character display.
//!
//! Writes land in a [`TextGrid`]; [`OledDisplay::flush`] redraws the panel
//! only when the grid changed.

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

use crate::config::{LCD_COLS, LCD_ROWS};
use crate::ui::{TextDisplay, TextGrid};

/// Concrete display driver, generic over the HAL's I²C peripheral.
pub type Oled<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// Baselines of the four text rows.
const ROW_Y: [i32; LCD_ROWS] = [10, 24, 38, 52];

fn text_style() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(BinaryColor::On)
        .build()
}

pub struct OledDisplay<I2C> {
    oled: Oled<I2C>,
    grid: TextGrid<LCD_ROWS, LCD_COLS>,
}

impl<I2C: embedded_hal::i2c::I2c> OledDisplay<I2C> {
    /// Initialise the panel and clear it.
    pub fn new(i2c: I2C) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let mut oled = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        if oled.init().is_err() {
            warn!("OLED init failed");
        }
        let mut display = Self {
            oled,
            grid: TextGrid::new(),
        };
        display.flush();
        display
    }

    /// Redraw the panel if the text changed.
    pub fn flush(&mut self) {
        if !self.grid.take_dirty() {
            return;
        }

        self.oled.clear_buffer();
        for (row, y) in ROW_Y.iter().enumerate() {
            let line = self.grid.row_trimmed(row);
            if !line.is_empty() {
                let _ = Text::new(line, Point::new(0, *y), text_style()).draw(&mut self.oled);
            }
        }
        if self.oled.flush().is_err() {
            warn!("OLED flush failed");
        }
    }
}

impl<I2C> TextDisplay for OledDisplay<I2C> {
    fn display(&mut self, row: usize, col: usize, text: &str, max_len: usize) {
        self.grid.display(row, col, text, max_len);
    }

    fn clear(&mut self) {
        self.grid.clear();
    }
}
