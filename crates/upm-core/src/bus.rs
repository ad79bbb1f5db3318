//! Bus platform abstraction.
//!
//! The drivers never talk to hardware directly. They consume a small set of
//! primitives supplied by a [`Platform`]: addressed I2C byte/block access,
//! full-duplex SPI transfers, GPIO levels, PWM duty cycle and analog reads.
//!
//! Handles are returned as owned boxes. A driver context moves them in at
//! `init` and the platform reclaims the underlying resource when the box is
//! dropped, so a handle is released exactly once and is never shared between
//! two contexts.

use crate::error::ResultCode;
use std::time::Duration;
use thiserror::Error;

/// Kind of bus primitive, used in error reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusKind {
    /// Inter-integrated circuit bus
    I2c,
    /// Serial peripheral interface bus
    Spi,
    /// Digital pin
    Gpio,
    /// Pulse-width modulated pin
    Pwm,
    /// Analog input pin
    Analog,
}

impl std::fmt::Display for BusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BusKind::I2c => "i2c",
            BusKind::Spi => "spi",
            BusKind::Gpio => "gpio",
            BusKind::Pwm => "pwm",
            BusKind::Analog => "analog",
        };
        write!(f, "{}", label)
    }
}

/// Failure reported by a bus platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Platform-wide initialization failed.
    #[error("Platform initialization failed: {0}")]
    Init(String),

    /// A bus or pin could not be opened.
    #[error("Failed to open {kind} {index}: {reason}")]
    Open {
        /// Kind of handle requested
        kind: BusKind,
        /// Bus or pin number
        index: u32,
        /// Platform-specific reason
        reason: String,
    },

    /// A transfer did not complete.
    #[error("{kind} transfer failed: {reason}")]
    Transfer {
        /// Bus the transfer ran on
        kind: BusKind,
        /// Platform-specific reason
        reason: String,
    },

    /// No device acknowledged the I2C address.
    #[error("No acknowledge from i2c address {0:#04x}")]
    Nack(u8),

    /// The platform gave up waiting for the bus.
    #[error("{0} operation timed out")]
    Timeout(BusKind),

    /// The handle cannot be configured this way.
    #[error("Unsupported {kind} setting: {reason}")]
    Unsupported {
        /// Handle kind
        kind: BusKind,
        /// What was rejected
        reason: String,
    },
}

impl BusError {
    /// Flat result code for this bus failure.
    pub fn code(&self) -> ResultCode {
        match self {
            BusError::Init(_) | BusError::Open { .. } => ResultCode::NoResources,
            BusError::Transfer { .. } | BusError::Nack(_) => ResultCode::OperationFailed,
            BusError::Timeout(_) => ResultCode::TimedOut,
            BusError::Unsupported { .. } => ResultCode::NotSupported,
        }
    }
}

/// SPI clock polarity/phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiMode {
    /// CPOL 0, CPHA 0
    #[default]
    Mode0,
    /// CPOL 0, CPHA 1
    Mode1,
    /// CPOL 1, CPHA 0
    Mode2,
    /// CPOL 1, CPHA 1
    Mode3,
}

/// GPIO pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Input
    In,
    /// Output
    Out,
}

/// An open I2C bus.
pub trait I2cHandle: Send {
    /// Set the 7-bit slave address used by subsequent transactions.
    fn set_address(&mut self, address: u8) -> Result<(), BusError>;

    /// Read one byte from `register`.
    fn read_byte_data(&mut self, register: u8) -> Result<u8, BusError>;

    /// Read `buf.len()` bytes starting at `register`.
    ///
    /// Returns the number of bytes actually read, which may be short.
    fn read_bytes_data(&mut self, register: u8, buf: &mut [u8]) -> Result<usize, BusError>;

    /// Write one byte to `register`.
    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<(), BusError>;
}

/// An open SPI bus.
pub trait SpiHandle: Send {
    /// Set clock polarity/phase.
    fn set_mode(&mut self, mode: SpiMode) -> Result<(), BusError>;

    /// Set the clock frequency in Hz.
    fn set_frequency(&mut self, hz: u32) -> Result<(), BusError>;

    /// Full-duplex transfer: `buf` is sent and overwritten with the bytes
    /// clocked in during the same transaction.
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), BusError>;
}

/// An open GPIO pin.
pub trait GpioPin: Send {
    /// Configure the pin direction.
    fn set_direction(&mut self, direction: Direction) -> Result<(), BusError>;

    /// Read the pin level (`true` = high).
    fn read(&mut self) -> Result<bool, BusError>;

    /// Drive the pin level (`true` = high).
    fn write(&mut self, high: bool) -> Result<(), BusError>;
}

/// An open PWM output.
pub trait PwmPin: Send {
    /// Set the period in microseconds.
    fn set_period_us(&mut self, period_us: u32) -> Result<(), BusError>;

    /// Set the duty cycle as a fraction in `0.0..=1.0`.
    fn set_duty_cycle(&mut self, duty: f32) -> Result<(), BusError>;

    /// Read back the programmed duty cycle.
    fn duty_cycle(&mut self) -> Result<f32, BusError>;

    /// Enable or disable the output.
    fn enable(&mut self, enabled: bool) -> Result<(), BusError>;
}

/// An open analog input.
pub trait AnalogPin: Send {
    /// Raw ADC reading.
    fn read(&mut self) -> Result<u16, BusError>;

    /// ADC resolution in bits.
    fn resolution_bits(&self) -> u8;

    /// Reading normalised to `0.0..=1.0`.
    fn read_normalized(&mut self) -> Result<f32, BusError> {
        let max = ((1u32 << self.resolution_bits()) - 1) as f32;
        Ok(f32::from(self.read()?) / max)
    }
}

/// Source of bus handles.
///
/// Implemented by real hardware backends and by the simulated platform used
/// in tests. Platforms are shared (`Arc<dyn Platform>`) and must be
/// thread-safe; the handles they return are exclusively owned.
pub trait Platform: Send + Sync {
    /// Short platform name for logs.
    fn name(&self) -> &str;

    /// One-time platform initialization. Called through
    /// [`crate::BusSubsystem::initialize`], never by drivers.
    fn init(&self) -> Result<(), BusError> {
        Ok(())
    }

    /// Open I2C bus `bus`.
    fn open_i2c(&self, bus: u32) -> Result<Box<dyn I2cHandle>, BusError>;

    /// Open SPI bus `bus`.
    fn open_spi(&self, bus: u32) -> Result<Box<dyn SpiHandle>, BusError>;

    /// Open GPIO pin `pin`.
    fn open_gpio(&self, pin: u32) -> Result<Box<dyn GpioPin>, BusError>;

    /// Open PWM pin `pin`.
    fn open_pwm(&self, pin: u32) -> Result<Box<dyn PwmPin>, BusError>;

    /// Open analog input `pin`.
    fn open_analog(&self, pin: u32) -> Result<Box<dyn AnalogPin>, BusError>;

    /// Block for `duration`. Settling times and status polls go through here
    /// so simulated platforms can skip them.
    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAdc(u16);

    impl AnalogPin for FixedAdc {
        fn read(&mut self) -> Result<u16, BusError> {
            Ok(self.0)
        }

        fn resolution_bits(&self) -> u8 {
            10
        }
    }

    #[test]
    fn analog_normalisation_uses_resolution() {
        let mut adc = FixedAdc(1023);
        assert!((adc.read_normalized().unwrap() - 1.0).abs() < f32::EPSILON);
        let mut adc = FixedAdc(0);
        assert_eq!(adc.read_normalized().unwrap(), 0.0);
    }

    #[test]
    fn bus_error_codes() {
        let open = BusError::Open {
            kind: BusKind::I2c,
            index: 1,
            reason: "no such device".into(),
        };
        assert_eq!(open.code(), ResultCode::NoResources);
        assert_eq!(BusError::Nack(0x77).code(), ResultCode::OperationFailed);
        assert_eq!(BusError::Timeout(BusKind::Spi).code(), ResultCode::TimedOut);
        assert!(open.to_string().contains("i2c 1"));
    }
}
