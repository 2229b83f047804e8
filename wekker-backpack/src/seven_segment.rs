//! Digit and glyph helpers for a 4-digit seven-segment backpack.
//!
//! Positions 0, 1, 3 and 4 are the digits; position 2 drives the colon.

use chrono::Timelike;
use log::{debug, trace};

use crate::backpack::{Backpack, BUFFER_SIZE};
use crate::config::Config;
use crate::error::Error;
use crate::transport::{OpenBus, Transport};

/// Segment patterns for the hexadecimal digits 0-9 and A-F.
pub const DIGITS: [u16; 16] = [
    0x3F, /* 0 */
    0x06, /* 1 */
    0x5B, /* 2 */
    0x4F, /* 3 */
    0x66, /* 4 */
    0x6D, /* 5 */
    0x7D, /* 6 */
    0x07, /* 7 */
    0x7F, /* 8 */
    0x6F, /* 9 */
    0x77, /* A */
    0x7C, /* b */
    0x39, /* C */
    0x5E, /* d */
    0x79, /* E */
    0x71, /* F */
];

/// Segment pattern for a hexadecimal character (`0-9`, `a-f` in either case).
pub fn glyph(c: char) -> Option<u16> {
    c.to_digit(16).map(|digit| DIGITS[digit as usize])
}

/// Decimal point segment, overlaid on a digit.
pub const DOT: u16 = 1 << 7;

pub const COLON_POSITION: usize = 2;
pub const COLON: u16 = 0x0002;

/// Buffer positions of the four digits, left to right.
pub const DIGIT_POSITIONS: [usize; 4] = [0, 1, 3, 4];

pub const MAX_NUMBER: u32 = 9999;

pub struct SevenSegment<T: Transport> {
    display: Backpack<T>,
}

impl<T: Transport> SevenSegment<T> {
    pub async fn open<O>(opener: O, bus: u8, address: u8) -> Result<Self, Error<T::Error>>
    where
        O: OpenBus<Transport = T>,
    {
        Backpack::open(opener, bus, address).await.map(Self::new)
    }

    pub async fn open_with<O>(opener: O, config: &Config) -> Result<Self, Error<T::Error>>
    where
        O: OpenBus<Transport = T>,
    {
        Backpack::open_with(opener, config).await.map(Self::new)
    }

    pub fn new(display: Backpack<T>) -> Self {
        Self { display }
    }

    pub fn display(&self) -> &Backpack<T> {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut Backpack<T> {
        &mut self.display
    }

    pub fn into_inner(self) -> Backpack<T> {
        self.display
    }

    /// Put hexadecimal digit `glyph` (0x0-0xF) at `position`, optionally with the dot.
    ///
    /// Out-of-range positions or glyphs are ignored; returns whether the
    /// buffer was written.
    pub fn write_digit(&mut self, position: usize, glyph: u8, dot: bool) -> bool {
        let Some(&pattern) = DIGITS.get(usize::from(glyph)) else {
            trace!("ignoring glyph {:#x}", glyph);
            return false;
        };
        let dot = if dot { DOT } else { 0 };

        self.write_digit_raw(position, pattern | dot)
    }

    /// Put an arbitrary segment pattern at `position`. Out-of-range positions are ignored.
    pub fn write_digit_raw(&mut self, position: usize, value: u16) -> bool {
        if position >= BUFFER_SIZE {
            trace!("ignoring digit position {}", position);
            return false;
        }
        self.display.set_buffer_block(position, value).is_ok()
    }

    /// Turn the middle colon on or off.
    ///
    /// Overwrites the whole colon cell, including any other segments set there.
    pub fn set_colon(&mut self, on: bool) {
        self.write_digit_raw(COLON_POSITION, if on { COLON } else { 0 });
    }

    /// Show `HH:MM` for the given time. Does not flush.
    pub fn write_time<Tm: Timelike>(&mut self, time: &Tm) {
        let (hour, minute) = (time.hour(), time.minute());
        debug!("wrote time: {:02}:{:02}", hour, minute);

        let digits = [hour / 10, hour % 10, minute / 10, minute % 10];
        for (position, digit) in DIGIT_POSITIONS.into_iter().zip(digits) {
            self.write_digit(position, digit as u8, false);
        }

        self.set_colon(true);
    }

    /// Show a right-aligned decimal number without leading zeros. Does not flush.
    ///
    /// The digit cells are blanked first; numbers above 9999 leave them blank
    /// and return `false`. The colon and cells past the digits are kept.
    pub fn write_number(&mut self, number: u32) -> bool {
        for position in DIGIT_POSITIONS {
            self.write_digit_raw(position, 0);
        }

        if number > MAX_NUMBER {
            debug!("{} does not fit on the display", number);
            return false;
        }

        let mut rest = number;
        for position in DIGIT_POSITIONS.into_iter().rev() {
            self.write_digit(position, (rest % 10) as u8, false);
            rest /= 10;

            if rest == 0 {
                break;
            }
        }
        true
    }

    pub async fn clear(&mut self) -> Result<(), Error<T::Error>> {
        self.display.clear().await
    }

    /// Write the current buffer to the display.
    pub async fn flush(&mut self) -> Result<(), Error<T::Error>> {
        self.display.write_display().await
    }
}
