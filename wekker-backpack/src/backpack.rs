//! HT16K33 backpack driver.
//!
//! Owns the bus transport, an 8-cell display buffer mirroring the chip's
//! display RAM, and a cache of the last acknowledged chip state.

use getset::CopyGetters;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::transport::{OpenBus, Transport};

/// Number of 16-bit cells in the display buffer.
pub const BUFFER_SIZE: usize = 8;

pub const DEFAULT_BRIGHTNESS: u8 = 10;
pub const MAX_BRIGHTNESS: u8 = 15;

const CMD_OSCILLATOR: u8 = 0x20;
const OSCILLATOR_ON: u8 = 0x01;

const CMD_DISPLAY: u8 = 0x80;
const DISPLAY_ON: u8 = 0x01;

const CMD_BRIGHTNESS: u8 = 0xE0;

const DISPLAY_RAM: u8 = 0x00;

/// Blink rate of the whole display.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum BlinkRate {
    #[default]
    Off = 0,
    /// 2 Hz
    Double = 1,
    /// 1 Hz
    Normal = 2,
    /// 0.5 Hz
    Half = 3,
}

impl From<u8> for BlinkRate {
    /// Unknown rates fall back to [`BlinkRate::Off`].
    fn from(raw: u8) -> Self {
        match raw {
            1 => BlinkRate::Double,
            2 => BlinkRate::Normal,
            3 => BlinkRate::Half,
            _ => BlinkRate::Off,
        }
    }
}

/// A single-byte control command, built per call and discarded once sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Command {
    opcode: u8,
    argument: u8,
    label: &'static str,
}

impl Command {
    pub const fn new(opcode: u8, label: &'static str) -> Self {
        Self {
            opcode,
            argument: 0x00,
            label,
        }
    }

    pub const fn oscillator(on: bool) -> Self {
        if on {
            Self::new(CMD_OSCILLATOR | OSCILLATOR_ON, "HT16K33_CMD_OSCILATOR_ON")
        } else {
            Self::new(CMD_OSCILLATOR, "HT16K33_CMD_OSCILATOR_OFF")
        }
    }

    pub const fn display(on: bool, rate: BlinkRate) -> Self {
        let on = if on { DISPLAY_ON } else { 0 };
        Self::new(CMD_DISPLAY | on | ((rate as u8) << 1), "HT16K33_CMD_DISPLAY")
    }

    /// `level` must already be within `0..=MAX_BRIGHTNESS`.
    pub const fn brightness(level: u8) -> Self {
        Self::new(CMD_BRIGHTNESS | level, "HT16K33_CMD_BRIGHTNESS")
    }
}

/// Chip state as of the last acknowledged command. Never read back from the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct DeviceState {
    oscillator_on: bool,
    /// On bit used when composing display-control commands.
    display_on: bool,
    blink_rate: BlinkRate,
    brightness: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            oscillator_on: false,
            display_on: true,
            blink_rate: BlinkRate::Off,
            brightness: MAX_BRIGHTNESS,
        }
    }
}

/// Serialize the buffer for the display RAM: low byte first, cells in order.
pub fn encode_buffer(buffer: &[u16; BUFFER_SIZE]) -> [u8; BUFFER_SIZE * 2] {
    let mut bytes = [0u8; BUFFER_SIZE * 2];
    for (chunk, cell) in bytes.chunks_exact_mut(2).zip(buffer) {
        chunk.copy_from_slice(&cell.to_le_bytes());
    }
    bytes
}

/// Driver for one backpack at one address.
///
/// Only exists once the bus is open and the startup sequence succeeded.
/// Every bus operation borrows the driver mutably, so a caller can never have
/// two transactions of the same driver in flight.
#[derive(Debug)]
pub struct Backpack<T: Transport> {
    transport: T,
    address: u8,
    buffer: [u16; BUFFER_SIZE],
    state: DeviceState,
}

impl<T: Transport> Backpack<T> {
    /// Open `bus` and initialize the backpack at `address` with the default settings.
    pub async fn open<O>(opener: O, bus: u8, address: u8) -> Result<Self, Error<T::Error>>
    where
        O: OpenBus<Transport = T>,
    {
        let config = Config {
            bus,
            address,
            ..Config::default()
        };
        Self::open_with(opener, &config).await
    }

    /// Open the configured bus and run the startup sequence.
    ///
    /// Resolves to the ready driver, or to the first failure: either the
    /// open itself or the startup step that failed. Nothing is retried.
    pub async fn open_with<O>(opener: O, config: &Config) -> Result<Self, Error<T::Error>>
    where
        O: OpenBus<Transport = T>,
    {
        debug!(
            "initializing backpack {:#04x} on bus {}...",
            config.address, config.bus
        );

        let transport = opener.open(config.bus).await.map_err(|cause| {
            warn!("unable to open bus {}: {:?}", config.bus, cause);
            Error::Open {
                bus: config.bus,
                cause,
            }
        })?;
        debug!("successfully opened bus {}", config.bus);

        let mut backpack = Self {
            transport,
            address: config.address,
            buffer: [0; BUFFER_SIZE],
            state: DeviceState::default(),
        };

        match backpack.startup(config).await {
            Ok(()) => {
                debug!("successfully initialized the segmented display");
                Ok(backpack)
            }
            Err(err) => {
                warn!("unable to complete system startup: {}", err);
                Err(err)
            }
        }
    }

    async fn startup(&mut self, config: &Config) -> Result<(), Error<T::Error>> {
        self.set_oscillator(true).await?;
        self.set_blinkrate(config.blink_rate).await?;
        self.set_brightness(config.brightness.into()).await?;
        self.clear().await
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn buffer(&self) -> &[u16; BUFFER_SIZE] {
        &self.buffer
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Give the transport back, ending the driver's lifetime.
    pub fn release(self) -> T {
        self.transport
    }

    pub async fn set_oscillator(&mut self, on: bool) -> Result<(), Error<T::Error>> {
        self.execute(Command::oscillator(on)).await?;
        self.state.oscillator_on = on;
        Ok(())
    }

    /// Set the blink rate. Raw values outside the known rates mean "off".
    pub async fn set_blinkrate(&mut self, rate: impl Into<BlinkRate>) -> Result<(), Error<T::Error>> {
        let rate = rate.into();

        debug!("changing blinkrate to {:?}...", rate);
        self.execute(Command::display(self.state.display_on, rate))
            .await?;

        self.state.blink_rate = rate;
        Ok(())
    }

    /// Turn the display on or off, keeping the current blink rate.
    pub async fn set_display(&mut self, on: bool) -> Result<(), Error<T::Error>> {
        debug!("turning display {}...", if on { "on" } else { "off" });
        self.execute(Command::display(on, self.state.blink_rate))
            .await?;

        self.state.display_on = on;
        Ok(())
    }

    /// Set the brightness, pinned to `0..=15`.
    pub async fn set_brightness(&mut self, level: i32) -> Result<(), Error<T::Error>> {
        let level = level.clamp(0, MAX_BRIGHTNESS.into()) as u8;

        debug!("changing brightness to level {}...", level);
        self.execute(Command::brightness(level)).await?;

        self.state.brightness = level;
        Ok(())
    }

    /// Blank the display and stop the oscillator.
    pub async fn shutdown(&mut self) -> Result<(), Error<T::Error>> {
        self.set_display(false).await?;
        self.set_oscillator(false).await
    }

    /// Overwrite one buffer cell. No I/O; call [`Backpack::write_display`] to show it.
    pub fn set_buffer_block(&mut self, index: usize, value: u16) -> Result<(), Error<T::Error>> {
        match self.buffer.get_mut(index) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::BufferRange { index }),
        }
    }

    /// Flush the whole buffer to display RAM in one block write.
    pub async fn write_display(&mut self) -> Result<(), Error<T::Error>> {
        debug!("writing buffer to display...");

        let bytes = encode_buffer(&self.buffer);
        let written = self
            .transport
            .write_block(self.address, DISPLAY_RAM, &bytes)
            .await
            .map_err(|cause| {
                warn!("unable to write buffer: {:?}", cause);
                Error::Write(cause)
            })?;

        debug!("successfully wrote buffer with size {}", written);
        Ok(())
    }

    /// Zero the buffer and flush it.
    pub async fn clear(&mut self) -> Result<(), Error<T::Error>> {
        self.buffer.fill(0);
        self.write_display().await
    }

    async fn execute(&mut self, command: Command) -> Result<(), Error<T::Error>> {
        self.transport
            .write_byte(self.address, command.opcode, command.argument)
            .await
            .map_err(|cause| {
                warn!("unable to execute command \"{}\": {:?}", command.label, cause);
                Error::Command {
                    label: command.label,
                    cause,
                }
            })?;

        trace!("successfully executed command \"{}\"", command.label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, MockError, MockTransport, Transaction};
    use embassy_futures::block_on;

    fn ready(bus: &MockBus) -> Backpack<MockTransport> {
        let backpack = block_on(Backpack::open(bus.clone(), 1, 0x70)).unwrap();
        bus.reset();
        backpack
    }

    fn last_command(bus: &MockBus) -> u8 {
        bus.transactions().last().and_then(Transaction::command).unwrap()
    }

    #[test]
    fn startup_runs_four_steps_in_order() {
        let bus = MockBus::new();
        let backpack = block_on(Backpack::open(bus.clone(), 1, 0x70)).unwrap();

        assert_eq!(
            bus.transactions(),
            vec![
                Transaction::Byte { address: 0x70, command: 0x21, value: 0 },
                Transaction::Byte { address: 0x70, command: 0x81, value: 0 },
                Transaction::Byte { address: 0x70, command: 0xEA, value: 0 },
                Transaction::Block { address: 0x70, register: 0x00, data: vec![0; 16] },
            ]
        );

        let state = backpack.state();
        assert!(state.oscillator_on());
        assert!(state.display_on());
        assert_eq!(state.blink_rate(), BlinkRate::Off);
        assert_eq!(state.brightness(), DEFAULT_BRIGHTNESS);
    }

    #[test]
    fn startup_uses_configured_settings() {
        let bus = MockBus::new();
        let config = Config {
            bus: 3,
            address: 0x72,
            brightness: 4,
            blink_rate: BlinkRate::Half,
        };
        block_on(Backpack::open_with(bus.clone(), &config)).unwrap();

        let commands: Vec<u8> = bus.transactions().iter().filter_map(Transaction::command).collect();
        assert_eq!(commands, vec![0x21, 0x87, 0xE4]);
    }

    #[test]
    fn open_failure_sends_nothing() {
        let bus = MockBus::unavailable();
        let err = block_on(Backpack::open(bus.clone(), 4, 0x70)).unwrap_err();

        assert!(matches!(err, Error::Open { bus: 4, cause: MockError::Open(4) }));
        assert_eq!(bus.attempts(), 0);
    }

    #[test]
    fn startup_stops_at_first_failure() {
        for step in 0..4 {
            let bus = MockBus::failing_at(step);
            let err = block_on(Backpack::open(bus.clone(), 1, 0x70)).unwrap_err();

            assert_eq!(bus.attempts(), step + 1, "step {step}");
            assert_eq!(bus.transactions().len(), step);
            assert_eq!(err.cause(), Some(&MockError::Nack(step)));
            if step < 3 {
                assert!(matches!(err, Error::Command { .. }));
            } else {
                assert!(matches!(err, Error::Write(_)));
            }
        }
    }

    #[test]
    fn brightness_in_range_is_sent_verbatim() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);

        for level in 0..=15 {
            block_on(backpack.set_brightness(level)).unwrap();
            assert_eq!(last_command(&bus), 0xE0 | level as u8);
            assert_eq!(backpack.state().brightness(), level as u8);
        }
    }

    #[test]
    fn brightness_is_clamped() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);

        block_on(backpack.set_brightness(-3)).unwrap();
        assert_eq!(last_command(&bus), 0xE0);

        block_on(backpack.set_brightness(16)).unwrap();
        assert_eq!(last_command(&bus), 0xEF);

        block_on(backpack.set_brightness(i32::MAX)).unwrap();
        assert_eq!(last_command(&bus), 0xEF);
    }

    #[test]
    fn blinkrate_encodes_rate_and_on_bit() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);

        block_on(backpack.set_blinkrate(BlinkRate::Double)).unwrap();
        assert_eq!(last_command(&bus), 0x83);
        block_on(backpack.set_blinkrate(BlinkRate::Normal)).unwrap();
        assert_eq!(last_command(&bus), 0x85);
        block_on(backpack.set_blinkrate(BlinkRate::Half)).unwrap();
        assert_eq!(last_command(&bus), 0x87);
        assert_eq!(backpack.state().blink_rate(), BlinkRate::Half);
    }

    #[test]
    fn unknown_blinkrate_means_off() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);

        block_on(backpack.set_blinkrate(BlinkRate::Off)).unwrap();
        let off = last_command(&bus);

        for raw in [4u8, 7, 0x80, u8::MAX] {
            block_on(backpack.set_blinkrate(raw)).unwrap();
            assert_eq!(last_command(&bus), off);
            assert_eq!(backpack.state().blink_rate(), BlinkRate::Off);
        }
    }

    #[test]
    fn display_off_keeps_blink_rate() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);

        block_on(backpack.set_blinkrate(BlinkRate::Normal)).unwrap();
        block_on(backpack.set_display(false)).unwrap();
        assert_eq!(last_command(&bus), 0x84);

        // the next blink change keeps the display dark
        block_on(backpack.set_blinkrate(BlinkRate::Double)).unwrap();
        assert_eq!(last_command(&bus), 0x82);
        assert!(!backpack.state().display_on());
    }

    #[test]
    fn failed_command_leaves_state_untouched() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);
        let before = backpack.state();

        bus.fail_at(Some(0));
        let err = block_on(backpack.set_brightness(3)).unwrap_err();
        assert!(matches!(err, Error::Command { label: "HT16K33_CMD_BRIGHTNESS", .. }));

        bus.fail_at(Some(0));
        block_on(backpack.set_blinkrate(BlinkRate::Half)).unwrap_err();

        bus.fail_at(Some(0));
        block_on(backpack.set_display(false)).unwrap_err();

        assert_eq!(backpack.state(), before);
    }

    #[test]
    fn buffer_cells_land_at_their_wire_offset() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);

        backpack.set_buffer_block(0, 0x1234).unwrap();
        backpack.set_buffer_block(5, 0xBEEF).unwrap();
        backpack.set_buffer_block(7, 0x00FF).unwrap();
        block_on(backpack.write_display()).unwrap();

        let data = bus.transactions()[0].data().unwrap().to_vec();
        assert_eq!(data.len(), 16);
        assert_eq!(&data[0..2], &[0x34, 0x12]);
        assert_eq!(&data[10..12], &[0xEF, 0xBE]);
        assert_eq!(&data[14..16], &[0xFF, 0x00]);
        assert!(data[2..10].iter().all(|&b| b == 0));
    }

    #[test]
    fn out_of_range_block_is_rejected() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);
        backpack.set_buffer_block(7, 0xAAAA).unwrap();

        let err = backpack.set_buffer_block(8, 0xFFFF).unwrap_err();
        assert!(matches!(err, Error::BufferRange { index: 8 }));
        assert!(backpack.set_buffer_block(usize::MAX, 1).is_err());

        assert_eq!(backpack.buffer(), &[0, 0, 0, 0, 0, 0, 0, 0xAAAA]);
        assert_eq!(bus.attempts(), 0);
    }

    #[test]
    fn clear_zeroes_and_flushes() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);
        for index in 0..BUFFER_SIZE {
            backpack.set_buffer_block(index, 0xFFFF).unwrap();
        }

        block_on(backpack.clear()).unwrap();

        assert_eq!(backpack.buffer(), &[0; BUFFER_SIZE]);
        assert_eq!(bus.transactions()[0].data(), Some(&[0u8; 16][..]));
    }

    #[test]
    fn failed_flush_reports_transport_error() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);

        bus.fail_at(Some(0));
        let err = block_on(backpack.write_display()).unwrap_err();
        assert!(matches!(err, Error::Write(MockError::Nack(_))));
        assert!(bus.transactions().is_empty());
    }

    #[test]
    fn shutdown_blanks_then_stops_oscillator() {
        let bus = MockBus::new();
        let mut backpack = ready(&bus);

        block_on(backpack.shutdown()).unwrap();

        let commands: Vec<u8> = bus.transactions().iter().filter_map(Transaction::command).collect();
        assert_eq!(commands, vec![0x80, 0x20]);
        assert!(!backpack.state().oscillator_on());
        assert!(!backpack.state().display_on());
    }

    #[test]
    fn commands_compose_expected_opcodes() {
        assert_eq!(Command::oscillator(true).opcode(), 0x21);
        assert_eq!(Command::oscillator(false).opcode(), 0x20);
        assert_eq!(Command::display(true, BlinkRate::Off).opcode(), 0x81);
        assert_eq!(Command::display(false, BlinkRate::Half).opcode(), 0x86);
        assert_eq!(Command::brightness(15).opcode(), 0xEF);
        assert_eq!(Command::brightness(7).argument(), 0x00);
    }

    #[test]
    fn encode_is_little_endian_per_cell() {
        let bytes = encode_buffer(&[0x0102, 0, 0, 0, 0, 0, 0, 0xA0B0]);
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
        assert_eq!(&bytes[14..], &[0xB0, 0xA0]);
    }

    #[test]
    fn release_returns_the_transport() {
        let bus = MockBus::new();
        let backpack = ready(&bus);
        assert_eq!(backpack.address(), 0x70);

        let mut transport = backpack.release();
        block_on(transport.write_byte(0x70, 0x21, 0)).unwrap();
        assert_eq!(bus.transactions().len(), 1);
    }
}
