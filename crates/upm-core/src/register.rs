//! Register transaction helper.
//!
//! Register-addressable chips speak the same protocol over I2C and SPI:
//! an 8-bit register address followed by one or more data bytes. This module
//! hides the transport difference behind [`RegisterIo`].
//!
//! # SPI framing
//!
//! - Reads set bit 7 of the register address, writes clear it.
//! - A software chip-select pin, if owned, is driven low for the duration of
//!   a transfer and always released afterwards, including on failure.
//! - A block read is ONE full-duplex transfer of `len + 1` bytes. Splitting
//!   it would toggle chip-select and drop the device out of its register
//!   auto-increment sequence.
//!
//! # Errors
//!
//! Reads return `Result`: a failed transfer is an error, never an in-band
//! `0xFF`. Nothing here retries.

use crate::bus::{BusError, Direction, GpioPin, I2cHandle, Platform, SpiHandle, SpiMode};
use crate::error::{UpmError, UpmResult};
use crate::subsystem::BusSubsystem;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Bit 7 of the register address marks an SPI read.
pub const SPI_READ_BIT: u8 = 0x80;

/// Default SPI clock used by the register chips in this workspace.
pub const DEFAULT_SPI_FREQUENCY_HZ: u32 = 5_000_000;

/// Which communication path a register chip uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSelector {
    /// I2C bus number and 7-bit address.
    I2c {
        /// Bus number
        bus: u32,
        /// 7-bit slave address
        address: u8,
    },
    /// SPI bus number and optional software chip-select GPIO.
    ///
    /// `None` means the controller drives chip-select in hardware.
    Spi {
        /// Bus number
        bus: u32,
        /// GPIO pin used as active-low chip select
        chip_select: Option<u32>,
    },
}

impl BusSelector {
    /// I2C selector.
    pub fn i2c(bus: u32, address: u8) -> Self {
        BusSelector::I2c { bus, address }
    }

    /// SPI selector.
    pub fn spi(bus: u32, chip_select: Option<u32>) -> Self {
        BusSelector::Spi { bus, chip_select }
    }

    /// Decode the integer convention used by C-style driver constructors:
    /// a negative `address` selects SPI, a negative `chip_select` means
    /// hardware chip-select.
    pub fn from_sentinel(bus: u32, address: i32, chip_select: i32) -> UpmResult<Self> {
        if address < 0 {
            let cs = u32::try_from(chip_select).ok();
            return Ok(BusSelector::Spi {
                bus,
                chip_select: cs,
            });
        }
        let address = u8::try_from(address)
            .ok()
            .filter(|a| *a <= 0x7f)
            .ok_or_else(|| {
                UpmError::InvalidParameter(format!("i2c address {address} is not 7-bit"))
            })?;
        Ok(BusSelector::I2c { bus, address })
    }

    /// Whether this selector uses SPI.
    pub fn is_spi(&self) -> bool {
        matches!(self, BusSelector::Spi { .. })
    }
}

impl std::fmt::Display for BusSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusSelector::I2c { bus, address } => write!(f, "i2c{}@{:#04x}", bus, address),
            BusSelector::Spi {
                bus,
                chip_select: Some(cs),
            } => write!(f, "spi{}/cs{}", bus, cs),
            BusSelector::Spi {
                bus,
                chip_select: None,
            } => write!(f, "spi{}", bus),
        }
    }
}

/// Transport family in a driver's TOML configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    /// I2C (default)
    #[default]
    I2c,
    /// SPI
    Spi,
}

/// Bus fields shared by every register-chip configuration.
///
/// Flattened into each driver's config:
///
/// ```toml
/// interface = "spi"
/// bus = 0
/// chip_select = 9
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Transport family
    pub interface: Interface,
    /// Bus number
    pub bus: u32,
    /// I2C address (driver default when absent)
    pub address: Option<u8>,
    /// Software chip-select pin for SPI
    pub chip_select: Option<u32>,
}

impl BusConfig {
    /// Resolve to a selector, filling in the driver's default I2C address.
    pub fn selector(&self, default_address: u8) -> UpmResult<BusSelector> {
        match self.interface {
            Interface::I2c => {
                let address = self.address.unwrap_or(default_address);
                if address > 0x7f {
                    return Err(UpmError::InvalidParameter(format!(
                        "i2c address {address:#04x} is not 7-bit"
                    )));
                }
                Ok(BusSelector::i2c(self.bus, address))
            }
            Interface::Spi => Ok(BusSelector::spi(self.bus, self.chip_select)),
        }
    }
}

/// SPI link parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    /// Clock polarity/phase
    pub mode: SpiMode,
    /// Clock frequency in Hz
    pub frequency_hz: u32,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            mode: SpiMode::Mode0,
            frequency_hz: DEFAULT_SPI_FREQUENCY_HZ,
        }
    }
}

/// Byte-wide register access.
pub trait RegisterIo: Send {
    /// Read one register.
    fn read_reg(&mut self, register: u8) -> UpmResult<u8>;

    /// Read `buf.len()` consecutive registers as one transaction.
    fn read_regs(&mut self, register: u8, buf: &mut [u8]) -> UpmResult<()>;

    /// Write one register.
    fn write_reg(&mut self, register: u8, value: u8) -> UpmResult<()>;

    /// Read-modify-write: replace the bits selected by `mask` with `bits`.
    /// Returns the value written.
    fn modify_reg(&mut self, register: u8, mask: u8, bits: u8) -> UpmResult<u8> {
        let current = self.read_reg(register)?;
        let next = (current & !mask) | (bits & mask);
        self.write_reg(register, next)?;
        Ok(next)
    }
}

enum Link {
    I2c {
        handle: Box<dyn I2cHandle>,
    },
    Spi {
        handle: Box<dyn SpiHandle>,
        chip_select: Option<Box<dyn GpioPin>>,
    },
}

/// Exclusive register path to one chip.
///
/// Owns the I2C handle, or the SPI handle plus optional chip-select pin.
/// Dropping the `RegisterBus` releases them.
pub struct RegisterBus {
    link: Link,
    selector: BusSelector,
    platform: Arc<dyn Platform>,
    i2c_block_flag: u8,
}

impl RegisterBus {
    /// Open the path described by `selector`.
    ///
    /// Requires a live subsystem. On failure every handle opened so far is
    /// dropped before returning.
    pub fn open(
        subsystem: &BusSubsystem,
        selector: BusSelector,
        spi: SpiSettings,
    ) -> UpmResult<Self> {
        let platform = subsystem.platform()?.clone();
        let link = match selector {
            BusSelector::I2c { bus, address } => {
                let mut handle = platform.open_i2c(bus)?;
                handle.set_address(address)?;
                Link::I2c { handle }
            }
            BusSelector::Spi { bus, chip_select } => {
                let mut handle = platform.open_spi(bus)?;
                handle.set_mode(spi.mode)?;
                handle.set_frequency(spi.frequency_hz)?;
                let chip_select = match chip_select {
                    Some(pin) => {
                        let mut cs = platform.open_gpio(pin)?;
                        cs.set_direction(Direction::Out)?;
                        cs.write(true)?;
                        Some(cs)
                    }
                    None => None,
                };
                Link::Spi {
                    handle,
                    chip_select,
                }
            }
        };
        debug!(%selector, platform = platform.name(), "Opened register bus");
        Ok(Self {
            link,
            selector,
            platform,
            i2c_block_flag: 0,
        })
    }

    /// OR `flag` into the register address of I2C block reads.
    ///
    /// Some ST parts only auto-increment over I2C when bit 7 is set.
    pub fn with_i2c_block_flag(mut self, flag: u8) -> Self {
        self.i2c_block_flag = flag;
        self
    }

    /// The path this bus was opened on.
    pub fn selector(&self) -> BusSelector {
        self.selector
    }

    /// The platform the handles came from.
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Block for `duration` via the platform.
    pub fn delay(&self, duration: Duration) {
        self.platform.delay(duration);
    }

    /// Assert chip-select for `hold`, then release it.
    ///
    /// Bosch parts power up in I2C mode and latch SPI mode on the first
    /// falling edge of CSB. No-op without a software chip-select.
    pub fn pulse_chip_select(&mut self, hold: Duration) -> UpmResult<()> {
        if let Link::Spi {
            chip_select: Some(cs),
            ..
        } = &mut self.link
        {
            cs.write(false)?;
            self.platform.delay(hold);
            cs.write(true)?;
        }
        Ok(())
    }

    fn spi_transfer(
        handle: &mut Box<dyn SpiHandle>,
        chip_select: &mut Option<Box<dyn GpioPin>>,
        frame: &mut [u8],
    ) -> UpmResult<()> {
        if let Some(cs) = chip_select.as_mut() {
            cs.write(false)?;
        }
        let transfer = handle.transfer(frame);
        let release: Result<(), BusError> = match chip_select.as_mut() {
            Some(cs) => cs.write(true),
            None => Ok(()),
        };
        transfer?;
        release?;
        Ok(())
    }
}

impl RegisterIo for RegisterBus {
    fn read_reg(&mut self, register: u8) -> UpmResult<u8> {
        let value = match &mut self.link {
            Link::I2c { handle } => handle.read_byte_data(register)?,
            Link::Spi {
                handle,
                chip_select,
            } => {
                let mut frame = [register | SPI_READ_BIT, 0];
                Self::spi_transfer(handle, chip_select, &mut frame)?;
                frame[1]
            }
        };
        trace!(register = format_args!("{:#04x}", register), value, "read_reg");
        Ok(value)
    }

    fn read_regs(&mut self, register: u8, buf: &mut [u8]) -> UpmResult<()> {
        if buf.is_empty() {
            return Err(UpmError::InvalidSize("block read of zero bytes".into()));
        }
        match &mut self.link {
            Link::I2c { handle } => {
                let read = handle.read_bytes_data(register | self.i2c_block_flag, buf)?;
                if read != buf.len() {
                    return Err(UpmError::ShortRead {
                        register,
                        expected: buf.len(),
                        actual: read,
                    });
                }
            }
            Link::Spi {
                handle,
                chip_select,
            } => {
                let mut frame = vec![0u8; buf.len() + 1];
                frame[0] = register | SPI_READ_BIT;
                Self::spi_transfer(handle, chip_select, &mut frame)?;
                buf.copy_from_slice(&frame[1..]);
            }
        }
        trace!(
            register = format_args!("{:#04x}", register),
            len = buf.len(),
            "read_regs"
        );
        Ok(())
    }

    fn write_reg(&mut self, register: u8, value: u8) -> UpmResult<()> {
        match &mut self.link {
            Link::I2c { handle } => handle.write_byte_data(register, value)?,
            Link::Spi {
                handle,
                chip_select,
            } => {
                let mut frame = [register & !SPI_READ_BIT, value];
                Self::spi_transfer(handle, chip_select, &mut frame)?;
            }
        }
        trace!(register = format_args!("{:#04x}", register), value, "write_reg");
        Ok(())
    }
}

impl std::fmt::Debug for RegisterBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterBus")
            .field("selector", &self.selector)
            .field("platform", &self.platform.name())
            .finish()
    }
}
