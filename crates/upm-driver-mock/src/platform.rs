//! Simulated bus platform.
//!
//! [`MockPlatform`] implements [`Platform`] over in-memory register devices
//! and pins. It counts live handles, logs every transaction and can inject
//! faults, which is what driver tests assert against:
//!
//! ```rust,ignore
//! let platform = MockPlatform::new();
//! platform.add_i2c_device(1, 0x77, chips::bmp280());
//! let subsystem = platform.subsystem()?;
//! let sensor = Bmp280::init(&subsystem, BusSelector::i2c(1, 0x77), Default::default())?;
//! drop(sensor);
//! assert_eq!(platform.open_handles(), 0);
//! ```
//!
//! SPI devices are attached to a bus together with the GPIO pin used as
//! their chip select. A transfer is routed to the device whose chip-select
//! pin is driven low, or to the device on hardware chip-select when no
//! software pin is asserted.

use crate::common::{ops, FaultConfig, MockMode};
use crate::device::MockRegisterDevice;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use upm_core::{
    AnalogPin, BusError, BusKind, BusSubsystem, Direction, GpioPin, I2cHandle, Platform, PwmPin,
    SpiHandle, SpiMode, UpmResult,
};

/// One logged bus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    /// I2C read of `len` bytes starting at `register`.
    I2cRead {
        /// Bus number
        bus: u32,
        /// Slave address
        address: u8,
        /// First register
        register: u8,
        /// Bytes requested
        len: usize,
    },
    /// I2C register write.
    I2cWrite {
        /// Bus number
        bus: u32,
        /// Slave address
        address: u8,
        /// Register
        register: u8,
        /// Value written
        value: u8,
    },
    /// One full-duplex SPI transfer; `tx` is the frame as sent.
    SpiTransfer {
        /// Bus number
        bus: u32,
        /// Frame sent
        tx: Vec<u8>,
    },
    /// GPIO level change.
    GpioWrite {
        /// Pin number
        pin: u32,
        /// Level driven
        high: bool,
    },
}

/// Simulated PWM output state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PwmState {
    /// Period in microseconds
    pub period_us: u32,
    /// Duty cycle fraction
    pub duty: f32,
    /// Output enabled
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct PinState {
    direction: Direction,
    high: bool,
    open: bool,
}

impl Default for PinState {
    fn default() -> Self {
        Self {
            direction: Direction::In,
            high: false,
            open: false,
        }
    }
}

#[derive(Default)]
struct State {
    i2c: HashMap<(u32, u8), MockRegisterDevice>,
    spi: HashMap<(u32, Option<u32>), MockRegisterDevice>,
    gpio: HashMap<u32, PinState>,
    pwm: HashMap<u32, (PwmState, bool)>,
    analog: HashMap<u32, (u16, bool)>,
    log: Vec<Transaction>,
    delays: Vec<Duration>,
}

struct Inner {
    state: Mutex<State>,
    faults: FaultConfig,
    mode: MockMode,
    open_handles: AtomicUsize,
    inits: AtomicUsize,
    analog_bits: u8,
}

/// Simulated platform. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockPlatform {
    inner: Arc<Inner>,
}

/// Decrements the open-handle count when the owning handle is dropped.
struct HandleGuard {
    inner: Arc<Inner>,
    kind: BusKind,
    index: u32,
}

impl HandleGuard {
    fn acquire(inner: &Arc<Inner>, kind: BusKind, index: u32) -> Self {
        let open = inner.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(%kind, index, open, "Handle opened");
        Self {
            inner: inner.clone(),
            kind,
            index,
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        let open = self.inner.open_handles.fetch_sub(1, Ordering::SeqCst) - 1;
        let mut state = self.inner.state.lock();
        match self.kind {
            BusKind::Gpio => {
                if let Some(pin) = state.gpio.get_mut(&self.index) {
                    pin.open = false;
                }
            }
            BusKind::Pwm => {
                if let Some(pwm) = state.pwm.get_mut(&self.index) {
                    pwm.1 = false;
                }
            }
            BusKind::Analog => {
                if let Some(adc) = state.analog.get_mut(&self.index) {
                    adc.1 = false;
                }
            }
            BusKind::I2c | BusKind::Spi => {}
        }
        trace!(kind = %self.kind, index = self.index, open, "Handle released");
    }
}

impl MockPlatform {
    /// Platform with no devices, instant timing and no faults.
    pub fn new() -> Self {
        Self::with_options(MockMode::Instant, FaultConfig::none())
    }

    /// Platform with explicit timing mode and fault configuration.
    pub fn with_options(mode: MockMode, faults: FaultConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                faults,
                mode,
                open_handles: AtomicUsize::new(0),
                inits: AtomicUsize::new(0),
                analog_bits: 10,
            }),
        }
    }

    /// Platform with fault injection and instant timing.
    pub fn with_faults(faults: FaultConfig) -> Self {
        Self::with_options(MockMode::Instant, faults)
    }

    /// Wrap this platform in an initialized [`BusSubsystem`].
    pub fn subsystem(&self) -> UpmResult<BusSubsystem> {
        BusSubsystem::init(Arc::new(self.clone()))
    }

    /// Attach a register device at `address` on I2C bus `bus`.
    pub fn add_i2c_device(&self, bus: u32, address: u8, device: MockRegisterDevice) {
        debug!(bus, address, "Attached mock i2c device");
        self.inner.state.lock().i2c.insert((bus, address), device);
    }

    /// Attach a register device on SPI bus `bus`, selected by GPIO
    /// `chip_select` (or hardware chip-select when `None`).
    pub fn add_spi_device(&self, bus: u32, chip_select: Option<u32>, device: MockRegisterDevice) {
        debug!(bus, ?chip_select, "Attached mock spi device");
        self.inner
            .state
            .lock()
            .spi
            .insert((bus, chip_select), device);
    }

    /// Drive an input pin from the outside world.
    pub fn set_gpio_input(&self, pin: u32, high: bool) {
        self.inner.state.lock().gpio.entry(pin).or_default().high = high;
    }

    /// Current level of a GPIO pin, if it was ever touched.
    pub fn gpio_level(&self, pin: u32) -> Option<bool> {
        self.inner.state.lock().gpio.get(&pin).map(|p| p.high)
    }

    /// Current direction of a GPIO pin, if it was ever touched.
    pub fn gpio_direction(&self, pin: u32) -> Option<Direction> {
        self.inner.state.lock().gpio.get(&pin).map(|p| p.direction)
    }

    /// Current state of a PWM output, if it was ever opened.
    pub fn pwm_state(&self, pin: u32) -> Option<PwmState> {
        self.inner.state.lock().pwm.get(&pin).map(|p| p.0)
    }

    /// Set the raw value an analog input reads.
    pub fn set_analog(&self, pin: u32, value: u16) {
        self.inner.state.lock().analog.entry(pin).or_default().0 = value;
    }

    /// Run `f` against the I2C device at `bus`/`address`.
    pub fn with_i2c_device<R>(
        &self,
        bus: u32,
        address: u8,
        f: impl FnOnce(&mut MockRegisterDevice) -> R,
    ) -> Option<R> {
        self.inner.state.lock().i2c.get_mut(&(bus, address)).map(f)
    }

    /// Run `f` against the SPI device at `bus`/`chip_select`.
    pub fn with_spi_device<R>(
        &self,
        bus: u32,
        chip_select: Option<u32>,
        f: impl FnOnce(&mut MockRegisterDevice) -> R,
    ) -> Option<R> {
        self.inner
            .state
            .lock()
            .spi
            .get_mut(&(bus, chip_select))
            .map(f)
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.inner.open_handles.load(Ordering::SeqCst)
    }

    /// Number of times [`Platform::init`] ran.
    pub fn init_count(&self) -> usize {
        self.inner.inits.load(Ordering::SeqCst)
    }

    /// All transactions so far.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.state.lock().log.clone()
    }

    /// Forget logged transactions.
    pub fn clear_transactions(&self) {
        self.inner.state.lock().log.clear();
    }

    /// Every delay requested through [`Platform::delay`].
    pub fn delays(&self) -> Vec<Duration> {
        self.inner.state.lock().delays.clone()
    }

    /// Sum of requested delays.
    pub fn total_delay(&self) -> Duration {
        self.inner.state.lock().delays.iter().sum()
    }

    /// Fault configuration in effect.
    pub fn faults(&self) -> &FaultConfig {
        &self.inner.faults
    }

    fn claim_pin<T>(
        map: &mut HashMap<u32, T>,
        pin: u32,
        kind: BusKind,
        open: impl FnOnce(&mut T) -> &mut bool,
    ) -> Result<(), BusError>
    where
        T: Default,
    {
        let slot = open(map.entry(pin).or_default());
        if *slot {
            return Err(BusError::Open {
                kind,
                index: pin,
                reason: "already in use".into(),
            });
        }
        *slot = true;
        Ok(())
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPlatform")
            .field("mode", &self.inner.mode)
            .field("open_handles", &self.open_handles())
            .finish()
    }
}

impl Platform for MockPlatform {
    fn name(&self) -> &str {
        "mock"
    }

    fn init(&self) -> Result<(), BusError> {
        self.inner.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_i2c(&self, bus: u32) -> Result<Box<dyn I2cHandle>, BusError> {
        self.inner.faults.check_open(BusKind::I2c, bus)?;
        Ok(Box::new(MockI2c {
            guard: HandleGuard::acquire(&self.inner, BusKind::I2c, bus),
            bus,
            address: None,
        }))
    }

    fn open_spi(&self, bus: u32) -> Result<Box<dyn SpiHandle>, BusError> {
        self.inner.faults.check_open(BusKind::Spi, bus)?;
        Ok(Box::new(MockSpi {
            guard: HandleGuard::acquire(&self.inner, BusKind::Spi, bus),
            bus,
            mode: SpiMode::Mode0,
            frequency_hz: 0,
        }))
    }

    fn open_gpio(&self, pin: u32) -> Result<Box<dyn GpioPin>, BusError> {
        self.inner.faults.check_open(BusKind::Gpio, pin)?;
        {
            let mut state = self.inner.state.lock();
            Self::claim_pin(&mut state.gpio, pin, BusKind::Gpio, |p| &mut p.open)?;
        }
        Ok(Box::new(MockGpio {
            guard: HandleGuard::acquire(&self.inner, BusKind::Gpio, pin),
            pin,
        }))
    }

    fn open_pwm(&self, pin: u32) -> Result<Box<dyn PwmPin>, BusError> {
        self.inner.faults.check_open(BusKind::Pwm, pin)?;
        {
            let mut state = self.inner.state.lock();
            Self::claim_pin(&mut state.pwm, pin, BusKind::Pwm, |p| &mut p.1)?;
        }
        Ok(Box::new(MockPwm {
            guard: HandleGuard::acquire(&self.inner, BusKind::Pwm, pin),
            pin,
        }))
    }

    fn open_analog(&self, pin: u32) -> Result<Box<dyn AnalogPin>, BusError> {
        self.inner.faults.check_open(BusKind::Analog, pin)?;
        {
            let mut state = self.inner.state.lock();
            Self::claim_pin(&mut state.analog, pin, BusKind::Analog, |p| &mut p.1)?;
        }
        Ok(Box::new(MockAnalog {
            guard: HandleGuard::acquire(&self.inner, BusKind::Analog, pin),
            pin,
        }))
    }

    fn delay(&self, duration: Duration) {
        self.inner.state.lock().delays.push(duration);
        self.inner.mode.delay(duration);
    }
}

// =============================================================================
// Handles
// =============================================================================

struct MockI2c {
    guard: HandleGuard,
    bus: u32,
    address: Option<u8>,
}

impl MockI2c {
    fn target(&self) -> Result<u8, BusError> {
        self.address.ok_or(BusError::Transfer {
            kind: BusKind::I2c,
            reason: "no slave address set".into(),
        })
    }
}

impl I2cHandle for MockI2c {
    fn set_address(&mut self, address: u8) -> Result<(), BusError> {
        self.address = Some(address);
        Ok(())
    }

    fn read_byte_data(&mut self, register: u8) -> Result<u8, BusError> {
        let address = self.target()?;
        let inner = &self.guard.inner;
        inner.faults.check_operation(BusKind::I2c, ops::I2C_READ)?;
        let mut state = inner.state.lock();
        let device = state
            .i2c
            .get_mut(&(self.bus, address))
            .ok_or(BusError::Nack(address))?;
        let value = device.read(register);
        state.log.push(Transaction::I2cRead {
            bus: self.bus,
            address,
            register,
            len: 1,
        });
        Ok(value)
    }

    fn read_bytes_data(&mut self, register: u8, buf: &mut [u8]) -> Result<usize, BusError> {
        let address = self.target()?;
        let inner = &self.guard.inner;
        inner.faults.check_operation(BusKind::I2c, ops::I2C_READ)?;
        let len = inner
            .faults
            .short_read_limit()
            .map_or(buf.len(), |max| max.min(buf.len()));
        let mut state = inner.state.lock();
        let device = state
            .i2c
            .get_mut(&(self.bus, address))
            .ok_or(BusError::Nack(address))?;
        device.read_block(register, &mut buf[..len]);
        state.log.push(Transaction::I2cRead {
            bus: self.bus,
            address,
            register,
            len: buf.len(),
        });
        Ok(len)
    }

    fn write_byte_data(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        let address = self.target()?;
        let inner = &self.guard.inner;
        inner.faults.check_operation(BusKind::I2c, ops::I2C_WRITE)?;
        let mut state = inner.state.lock();
        let device = state
            .i2c
            .get_mut(&(self.bus, address))
            .ok_or(BusError::Nack(address))?;
        device.write(register, value);
        state.log.push(Transaction::I2cWrite {
            bus: self.bus,
            address,
            register,
            value,
        });
        Ok(())
    }
}

struct MockSpi {
    guard: HandleGuard,
    bus: u32,
    mode: SpiMode,
    frequency_hz: u32,
}

impl SpiHandle for MockSpi {
    fn set_mode(&mut self, mode: SpiMode) -> Result<(), BusError> {
        self.mode = mode;
        Ok(())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), BusError> {
        if hz == 0 {
            return Err(BusError::Unsupported {
                kind: BusKind::Spi,
                reason: "zero clock frequency".into(),
            });
        }
        self.frequency_hz = hz;
        Ok(())
    }

    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let inner = &self.guard.inner;
        inner.faults.check_operation(BusKind::Spi, ops::SPI_TRANSFER)?;
        if buf.is_empty() {
            return Ok(());
        }
        let mut state = inner.state.lock();
        state.log.push(Transaction::SpiTransfer {
            bus: self.bus,
            tx: buf.to_vec(),
        });

        let State { spi, gpio, .. } = &mut *state;
        let asserted = spi.keys().copied().find(|(bus, cs)| {
            *bus == self.bus
                && cs.is_some_and(|pin| {
                    gpio.get(&pin)
                        .is_some_and(|p| p.direction == Direction::Out && !p.high)
                })
        });
        let key = asserted.unwrap_or((self.bus, None));
        let device = spi.get_mut(&key).ok_or(BusError::Transfer {
            kind: BusKind::Spi,
            reason: format!("no device selected on spi{}", self.bus),
        })?;

        let command = buf[0];
        let register = device.spi_register(command);
        buf[0] = 0;
        if command & 0x80 != 0 {
            device.read_block(register, &mut buf[1..]);
        } else {
            for (i, b) in buf[1..].iter_mut().enumerate() {
                device.write(register.wrapping_add(i as u8), *b);
                *b = 0;
            }
        }
        Ok(())
    }
}

struct MockGpio {
    guard: HandleGuard,
    pin: u32,
}

impl GpioPin for MockGpio {
    fn set_direction(&mut self, direction: Direction) -> Result<(), BusError> {
        self.guard.inner.state.lock().gpio.entry(self.pin).or_default().direction = direction;
        Ok(())
    }

    fn read(&mut self) -> Result<bool, BusError> {
        let inner = &self.guard.inner;
        inner.faults.check_operation(BusKind::Gpio, ops::GPIO_READ)?;
        Ok(inner.state.lock().gpio.get(&self.pin).is_some_and(|p| p.high))
    }

    fn write(&mut self, high: bool) -> Result<(), BusError> {
        let inner = &self.guard.inner;
        inner.faults.check_operation(BusKind::Gpio, ops::GPIO_WRITE)?;
        let mut state = inner.state.lock();
        let pin = state.gpio.entry(self.pin).or_default();
        if pin.direction != Direction::Out {
            return Err(BusError::Unsupported {
                kind: BusKind::Gpio,
                reason: format!("pin {} is not an output", self.pin),
            });
        }
        pin.high = high;
        state.log.push(Transaction::GpioWrite {
            pin: self.pin,
            high,
        });
        Ok(())
    }
}

struct MockPwm {
    guard: HandleGuard,
    pin: u32,
}

impl MockPwm {
    fn update(&self, f: impl FnOnce(&mut PwmState)) -> Result<(), BusError> {
        let inner = &self.guard.inner;
        inner.faults.check_operation(BusKind::Pwm, ops::PWM_WRITE)?;
        f(&mut inner.state.lock().pwm.entry(self.pin).or_default().0);
        Ok(())
    }
}

impl PwmPin for MockPwm {
    fn set_period_us(&mut self, period_us: u32) -> Result<(), BusError> {
        if period_us == 0 {
            return Err(BusError::Unsupported {
                kind: BusKind::Pwm,
                reason: "zero period".into(),
            });
        }
        self.update(|s| s.period_us = period_us)
    }

    fn set_duty_cycle(&mut self, duty: f32) -> Result<(), BusError> {
        if !(0.0..=1.0).contains(&duty) {
            return Err(BusError::Unsupported {
                kind: BusKind::Pwm,
                reason: format!("duty cycle {duty} outside 0.0..=1.0"),
            });
        }
        self.update(|s| s.duty = duty)
    }

    fn duty_cycle(&mut self) -> Result<f32, BusError> {
        Ok(self
            .guard
            .inner
            .state
            .lock()
            .pwm
            .get(&self.pin)
            .map_or(0.0, |p| p.0.duty))
    }

    fn enable(&mut self, enabled: bool) -> Result<(), BusError> {
        self.update(|s| s.enabled = enabled)
    }
}

struct MockAnalog {
    guard: HandleGuard,
    pin: u32,
}

impl AnalogPin for MockAnalog {
    fn read(&mut self) -> Result<u16, BusError> {
        let inner = &self.guard.inner;
        inner.faults.check_operation(BusKind::Analog, ops::ANALOG_READ)?;
        Ok(inner.state.lock().analog.get(&self.pin).map_or(0, |a| a.0))
    }

    fn resolution_bits(&self) -> u8 {
        self.guard.inner.analog_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chips;

    #[test]
    fn handles_are_counted_until_dropped() {
        let platform = MockPlatform::new();
        let a = platform.open_i2c(0).unwrap();
        let b = platform.open_gpio(4).unwrap();
        assert_eq!(platform.open_handles(), 2);
        drop(a);
        assert_eq!(platform.open_handles(), 1);
        drop(b);
        assert_eq!(platform.open_handles(), 0);
    }

    #[test]
    #[tracing_test::traced_test]
    fn config_build_is_logged() {
        let config = crate::config::MockPlatformConfig::default();
        let _platform = MockPlatform::from_config(&config);
        assert!(logs_contain("Built mock platform from config"));
    }

    #[test]
    fn gpio_pin_is_exclusive() {
        let platform = MockPlatform::new();
        let pin = platform.open_gpio(4).unwrap();
        assert!(matches!(
            platform.open_gpio(4),
            Err(BusError::Open { kind: BusKind::Gpio, index: 4, .. })
        ));
        drop(pin);
        assert!(platform.open_gpio(4).is_ok());
    }

    #[test]
    fn i2c_missing_device_nacks() {
        let platform = MockPlatform::new();
        let mut i2c = platform.open_i2c(1).unwrap();
        i2c.set_address(0x40).unwrap();
        assert_eq!(i2c.read_byte_data(0x00), Err(BusError::Nack(0x40)));
    }

    #[test]
    fn i2c_reads_device_registers() {
        let platform = MockPlatform::new();
        platform.add_i2c_device(1, 0x77, chips::bmp280());
        let mut i2c = platform.open_i2c(1).unwrap();
        i2c.set_address(0x77).unwrap();
        assert_eq!(i2c.read_byte_data(0xd0).unwrap(), 0x58);
        let mut buf = [0u8; 3];
        assert_eq!(i2c.read_bytes_data(0xf7, &mut buf).unwrap(), 3);
        assert_eq!(buf, [0x65, 0x5a, 0xc0]);
        assert_eq!(platform.transactions().len(), 2);
    }

    #[test]
    fn spi_routes_by_chip_select() {
        let platform = MockPlatform::new();
        platform.add_spi_device(0, Some(7), MockRegisterDevice::new().with_register(0x0f, 0x43));
        platform.add_spi_device(0, Some(8), MockRegisterDevice::new().with_register(0x0f, 0x11));

        let mut spi = platform.open_spi(0).unwrap();
        let mut cs7 = platform.open_gpio(7).unwrap();
        let mut cs8 = platform.open_gpio(8).unwrap();
        for cs in [&mut cs7, &mut cs8] {
            cs.set_direction(Direction::Out).unwrap();
            cs.write(true).unwrap();
        }

        cs8.write(false).unwrap();
        let mut frame = [0x8f, 0];
        spi.transfer(&mut frame).unwrap();
        cs8.write(true).unwrap();
        assert_eq!(frame[1], 0x11);

        // Nothing asserted and no hardware-CS device: no target.
        let mut frame = [0x8f, 0];
        assert!(spi.transfer(&mut frame).is_err());
    }

    #[test]
    fn short_read_scenario_truncates_block_reads() {
        let platform = MockPlatform::with_faults(FaultConfig::scenario(
            crate::FaultScenario::ShortRead { max_len: 4 },
        ));
        platform.add_i2c_device(0, 0x77, chips::bmp280());
        let mut i2c = platform.open_i2c(0).unwrap();
        i2c.set_address(0x77).unwrap();
        let mut buf = [0u8; 24];
        assert_eq!(i2c.read_bytes_data(0x88, &mut buf).unwrap(), 4);
    }

    #[test]
    fn pwm_rejects_out_of_range_duty() {
        let platform = MockPlatform::new();
        let mut pwm = platform.open_pwm(3).unwrap();
        assert!(pwm.set_duty_cycle(1.5).is_err());
        pwm.set_duty_cycle(0.25).unwrap();
        assert_eq!(platform.pwm_state(3).unwrap().duty, 0.25);
    }

    #[test]
    fn delays_are_recorded_not_slept() {
        let platform = MockPlatform::new();
        platform.delay(Duration::from_secs(3));
        platform.delay(Duration::from_millis(10));
        assert_eq!(platform.total_delay(), Duration::from_millis(3010));
    }
}
