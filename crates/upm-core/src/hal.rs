//! `embedded-hal` 1.0 adapters.
//!
//! Wraps HAL bus and pin implementations so the drivers can run on any
//! target with an `embedded-hal` board support crate. HAL peripherals are
//! constructed up front, so [`HalPlatform`] hands each one out at most once:
//! opening the same bus twice is an `Open` error, which keeps handle
//! ownership exclusive.

use crate::bus::{
    AnalogPin, BusError, BusKind, Direction, GpioPin, I2cHandle, Platform, PwmPin, SpiHandle,
    SpiMode,
};
use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};
use embedded_hal::i2c::{Error as _, ErrorKind as I2cErrorKind, I2c};
use embedded_hal::pwm::SetDutyCycle;
use embedded_hal::spi::{Error as _, SpiBus};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

fn transfer_error(kind: BusKind, reason: impl std::fmt::Debug) -> BusError {
    BusError::Transfer {
        kind,
        reason: format!("{reason:?}"),
    }
}

/// I2C adapter.
pub struct HalI2c<T> {
    bus: T,
    address: u8,
}

impl<T: I2c> HalI2c<T> {
    /// Wrap an `embedded-hal` I2C bus.
    pub fn new(bus: T) -> Self {
        Self { bus, address: 0 }
    }

    fn map_err(&self, err: T::Error) -> BusError {
        match err.kind() {
            I2cErrorKind::NoAcknowledge(_) => BusError::Nack(self.address),
            other => transfer_error(BusKind::I2c, other),
        }
    }
}

impl<T: I2c + Send> I2cHandle for HalI2c<T> {
    fn set_address(&mut self, address: u8) -> Result<(), BusError> {
        self.address = address;
        Ok(())
    }

    fn read_byte_data(&mut self, register: u8) -> Result<u8, BusError> {
        let mut byte = [0u8];
        self.bus
            .write_read(self.address, &[register], &mut byte)
            .map_err(|e| self.map_err(e))?;
        Ok(byte[0])
    }

    fn read_bytes_data(&mut self, register: u8, buf: &mut [u8]) -> Result<usize, BusError> {
        self.bus
            .write_read(self.address, &[register], buf)
            .map_err(|e| self.map_err(e))?;
        Ok(buf.len())
    }

    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        self.bus
            .write(self.address, &[register, value])
            .map_err(|e| self.map_err(e))
    }
}

/// SPI adapter. Mode and clock are fixed when the HAL bus is built.
pub struct HalSpi<T> {
    bus: T,
    mode: SpiMode,
}

impl<T: SpiBus> HalSpi<T> {
    /// Wrap an `embedded-hal` SPI bus configured for `mode`.
    pub fn new(bus: T, mode: SpiMode) -> Self {
        Self { bus, mode }
    }
}

impl<T: SpiBus + Send> SpiHandle for HalSpi<T> {
    fn set_mode(&mut self, mode: SpiMode) -> Result<(), BusError> {
        if mode == self.mode {
            Ok(())
        } else {
            Err(BusError::Unsupported {
                kind: BusKind::Spi,
                reason: format!("bus was configured for {:?}, not {:?}", self.mode, mode),
            })
        }
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), BusError> {
        debug!(hz, "SPI clock is fixed by the HAL bus configuration");
        Ok(())
    }

    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        self.bus
            .transfer_in_place(buf)
            .and_then(|_| self.bus.flush())
            .map_err(|e| transfer_error(BusKind::Spi, e.kind()))
    }
}

/// Output pin adapter.
pub struct HalOutput<P>(pub P);

impl<P: OutputPin + StatefulOutputPin + Send> GpioPin for HalOutput<P> {
    fn set_direction(&mut self, direction: Direction) -> Result<(), BusError> {
        match direction {
            Direction::Out => Ok(()),
            Direction::In => Err(BusError::Unsupported {
                kind: BusKind::Gpio,
                reason: "pin is an output".into(),
            }),
        }
    }

    fn read(&mut self) -> Result<bool, BusError> {
        self.0
            .is_set_high()
            .map_err(|e| transfer_error(BusKind::Gpio, e))
    }

    fn write(&mut self, high: bool) -> Result<(), BusError> {
        let result = if high {
            self.0.set_high()
        } else {
            self.0.set_low()
        };
        result.map_err(|e| transfer_error(BusKind::Gpio, e))
    }
}

/// Input pin adapter.
pub struct HalInput<P>(pub P);

impl<P: InputPin + Send> GpioPin for HalInput<P> {
    fn set_direction(&mut self, direction: Direction) -> Result<(), BusError> {
        match direction {
            Direction::In => Ok(()),
            Direction::Out => Err(BusError::Unsupported {
                kind: BusKind::Gpio,
                reason: "pin is an input".into(),
            }),
        }
    }

    fn read(&mut self) -> Result<bool, BusError> {
        self.0.is_high().map_err(|e| transfer_error(BusKind::Gpio, e))
    }

    fn write(&mut self, _high: bool) -> Result<(), BusError> {
        Err(BusError::Unsupported {
            kind: BusKind::Gpio,
            reason: "cannot drive an input pin".into(),
        })
    }
}

/// PWM channel adapter. The period belongs to the timer configuration.
pub struct HalPwm<P> {
    channel: P,
    duty: f32,
    enabled: bool,
}

impl<P: SetDutyCycle> HalPwm<P> {
    /// Wrap an `embedded-hal` PWM channel.
    pub fn new(channel: P) -> Self {
        Self {
            channel,
            duty: 0.0,
            enabled: false,
        }
    }

    fn apply(&mut self) -> Result<(), BusError> {
        let result = if self.enabled {
            let max = f32::from(self.channel.max_duty_cycle());
            self.channel
                .set_duty_cycle((self.duty.clamp(0.0, 1.0) * max).round() as u16)
        } else {
            self.channel.set_duty_cycle_fully_off()
        };
        result.map_err(|e| transfer_error(BusKind::Pwm, e))
    }
}

impl<P: SetDutyCycle + Send> PwmPin for HalPwm<P> {
    fn set_period_us(&mut self, period_us: u32) -> Result<(), BusError> {
        debug!(period_us, "PWM period is fixed by the HAL timer configuration");
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty: f32) -> Result<(), BusError> {
        self.duty = duty;
        self.apply()
    }

    fn duty_cycle(&mut self) -> Result<f32, BusError> {
        Ok(self.duty)
    }

    fn enable(&mut self, enabled: bool) -> Result<(), BusError> {
        self.enabled = enabled;
        self.apply()
    }
}

type Slot<T> = Mutex<HashMap<u32, Box<T>>>;

/// Platform serving pre-built HAL peripherals by bus/pin number.
#[derive(Default)]
pub struct HalPlatform {
    i2c: Slot<dyn I2cHandle>,
    spi: Slot<dyn SpiHandle>,
    gpio: Slot<dyn GpioPin>,
    pwm: Slot<dyn PwmPin>,
    analog: Slot<dyn AnalogPin>,
}

fn take<T: ?Sized>(slot: &Slot<T>, kind: BusKind, index: u32) -> Result<Box<T>, BusError> {
    slot.lock().remove(&index).ok_or_else(|| BusError::Open {
        kind,
        index,
        reason: "not registered or already in use".into(),
    })
}

impl HalPlatform {
    /// Empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `handle` as I2C bus `bus`.
    pub fn with_i2c(self, bus: u32, handle: impl I2cHandle + 'static) -> Self {
        self.i2c.lock().insert(bus, Box::new(handle));
        self
    }

    /// Serve `handle` as SPI bus `bus`.
    pub fn with_spi(self, bus: u32, handle: impl SpiHandle + 'static) -> Self {
        self.spi.lock().insert(bus, Box::new(handle));
        self
    }

    /// Serve `pin` as GPIO `index`.
    pub fn with_gpio(self, index: u32, pin: impl GpioPin + 'static) -> Self {
        self.gpio.lock().insert(index, Box::new(pin));
        self
    }

    /// Serve `pin` as PWM `index`.
    pub fn with_pwm(self, index: u32, pin: impl PwmPin + 'static) -> Self {
        self.pwm.lock().insert(index, Box::new(pin));
        self
    }

    /// Serve `pin` as analog input `index`.
    pub fn with_analog(self, index: u32, pin: impl AnalogPin + 'static) -> Self {
        self.analog.lock().insert(index, Box::new(pin));
        self
    }
}

impl Platform for HalPlatform {
    fn name(&self) -> &str {
        "embedded-hal"
    }

    fn open_i2c(&self, bus: u32) -> Result<Box<dyn I2cHandle>, BusError> {
        take(&self.i2c, BusKind::I2c, bus)
    }

    fn open_spi(&self, bus: u32) -> Result<Box<dyn SpiHandle>, BusError> {
        take(&self.spi, BusKind::Spi, bus)
    }

    fn open_gpio(&self, pin: u32) -> Result<Box<dyn GpioPin>, BusError> {
        take(&self.gpio, BusKind::Gpio, pin)
    }

    fn open_pwm(&self, pin: u32) -> Result<Box<dyn PwmPin>, BusError> {
        take(&self.pwm, BusKind::Pwm, pin)
    }

    fn open_analog(&self, pin: u32) -> Result<Box<dyn AnalogPin>, BusError> {
        take(&self.analog, BusKind::Analog, pin)
    }
}
