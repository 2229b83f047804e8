//! Bus transport seam.
//!
//! The driver only needs two write primitives and a way to open a bus. How
//! the bytes reach the wire is up to the implementor: [`Blocking`] adapts any
//! blocking `embedded-hal` I2C master (for example an MCP2221 bridge), and
//! [`crate::mock`] records transactions for tests.

use std::fmt::Debug;

use embedded_hal::blocking::i2c::Write;

/// Byte-level and block I2C writes addressed by a 7-bit device address.
///
/// Every call completes exactly once, either with success or with the
/// transport's error. Implementations must not retry on their own.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Error: Debug;

    /// Write a command byte followed by a single data byte.
    async fn write_byte(&mut self, address: u8, command: u8, value: u8) -> Result<(), Self::Error>;

    /// Write `data` starting at `register`. Returns the number of data bytes written.
    async fn write_block(
        &mut self,
        address: u8,
        register: u8,
        data: &[u8],
    ) -> Result<usize, Self::Error>;
}

/// Something that can open a numbered bus and hand back its transport.
#[allow(async_fn_in_trait)]
pub trait OpenBus {
    type Transport: Transport;

    async fn open(self, bus: u8) -> Result<Self::Transport, <Self::Transport as Transport>::Error>;
}

impl<F, T> OpenBus for F
where
    F: FnOnce(u8) -> Result<T, T::Error>,
    T: Transport,
{
    type Transport = T;

    async fn open(self, bus: u8) -> Result<T, T::Error> {
        self(bus)
    }
}

/// Adapts a blocking `embedded-hal` I2C master into a [`Transport`].
///
/// Each primitive maps onto exactly one I2C write, so the futures are always
/// ready on first poll.
pub struct Blocking<I2C> {
    i2c: I2C,
}

impl<I2C> Blocking<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn into_inner(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> Transport for Blocking<I2C>
where
    I2C: Write<Error = E>,
    E: Debug,
{
    type Error = E;

    async fn write_byte(&mut self, address: u8, command: u8, value: u8) -> Result<(), E> {
        self.i2c.write(address, &[command, value])
    }

    async fn write_block(&mut self, address: u8, register: u8, data: &[u8]) -> Result<usize, E> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);

        self.i2c.write(address, &frame)?;
        Ok(data.len())
    }
}
