//! Driver for HT16K33 seven-segment LED backpacks.
//!
//! [`Backpack`] speaks the chip's command protocol and owns the display
//! buffer; [`SevenSegment`] turns digits, numbers and times into buffer
//! contents. Both are opened through an [`OpenBus`] and talk to the chip
//! through a [`Transport`].

pub mod backpack;
pub mod config;
mod error;
pub mod mock;
pub mod seven_segment;
mod transport;

pub use backpack::{Backpack, BlinkRate, Command, DeviceState, BUFFER_SIZE};
pub use config::Config;
pub use error::Error;
pub use seven_segment::SevenSegment;
pub use transport::{Blocking, OpenBus, Transport};

/// Default address of an HT16K33 backpack with no address jumpers set.
pub const I2C_ADDR: u8 = 0x70;
