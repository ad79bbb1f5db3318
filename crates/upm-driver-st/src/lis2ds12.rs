//! ST LIS2DS12 3-Axis Accelerometer Driver
//!
//! Reference: LIS2DS12 datasheet DocID029121
//!
//! Protocol overview:
//! - I2C at 0x1E (0x1D with SA0 low), or 4-wire SPI mode 0 at 5 MHz
//! - WHO_AM_I (0x0F) reads 0x43
//! - Axis data is 16-bit little endian at OUT_X_L (0x28); block reads rely on
//!   CTRL2.IF_ADD_INC, which init enables
//! - OUT_T (0x26) is a signed 8-bit temperature, scaled by 1/256 around a
//!   25 °C center point
//!
//! # Usage
//!
//! ```rust,ignore
//! use upm_driver_st::lis2ds12::{Lis2ds12, Lis2ds12Options};
//!
//! let accel = Lis2ds12::init(&subsystem, BusSelector::i2c(0, 0x1e), Lis2ds12Options::default())?;
//! accel.update()?;
//! let [x, y, z] = accel.acceleration()?;
//! ```

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use upm_core::{
    Accelerometer, Adjustment, BusConfig, BusSelector, BusSubsystem, Category, Descriptor,
    DeviceComponents, DriverFactory, Protocol, RegisterBus, RegisterIo, Sensor, SpiSettings,
    TemperatureSensor, UpmError, UpmResult,
};

/// Default I2C address.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x1e;
/// WHO_AM_I value.
pub const CHIP_ID: u8 = 0x43;

const REG_WHO_AM_I: u8 = 0x0f;
const REG_CTRL1: u8 = 0x20;
const REG_CTRL2: u8 = 0x21;
const REG_CTRL3: u8 = 0x22;
const REG_CTRL4: u8 = 0x23;
const REG_CTRL5: u8 = 0x24;
const REG_OUT_T: u8 = 0x26;
const REG_STATUS: u8 = 0x27;
const REG_OUT_X_L: u8 = 0x28;

const CTRL1_BDU: u8 = 0x01;
const CTRL1_HF_ODR: u8 = 0x02;
const CTRL1_FS_SHIFT: u8 = 2;
const CTRL1_FS_MASK: u8 = 0x03 << CTRL1_FS_SHIFT;
const CTRL1_ODR_SHIFT: u8 = 4;
const CTRL1_ODR_MASK: u8 = 0x0f << CTRL1_ODR_SHIFT;

const CTRL2_IF_ADD_INC: u8 = 0x04;
const CTRL2_FDS_SLOPE: u8 = 0x08;
const CTRL2_SOFT_RESET: u8 = 0x40;

const CTRL3_PP_OD: u8 = 0x01;
const CTRL3_H_LACTIVE: u8 = 0x02;
const CTRL3_LIR: u8 = 0x04;

/// STATUS: new sample available.
pub const STATUS_DRDY: u8 = 0x01;

const RESET_DELAY: Duration = Duration::from_millis(100);
const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Descriptor of the LIS2DS12.
pub static LIS2DS12_DESCRIPTOR: Descriptor = Descriptor {
    name: "lis2ds12",
    description: "ST LIS2DS12 3-axis accelerometer",
    protocols: &[Protocol::I2c, Protocol::Spi],
    categories: &[Category::Sensor, Category::Accelerometer, Category::Temperature],
};

/// Output data rate.
///
/// High-resolution rates up to 800 Hz give 14-bit samples; 1600 Hz and up
/// switch the chip to its 12-bit high-frequency mode. Low-power rates give
/// 10-bit samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Odr {
    /// Power down
    PowerDown,
    /// 12.5 Hz
    Hz12_5,
    /// 25 Hz
    Hz25,
    /// 50 Hz
    Hz50,
    /// 100 Hz
    #[default]
    Hz100,
    /// 200 Hz
    Hz200,
    /// 400 Hz
    Hz400,
    /// 800 Hz
    Hz800,
    /// 1600 Hz (high-frequency mode)
    Hz1600,
    /// 3200 Hz (high-frequency mode)
    Hz3200,
    /// 6400 Hz (high-frequency mode)
    Hz6400,
    /// 1 Hz low power
    LowPowerHz1,
    /// 12.5 Hz low power
    LowPowerHz12_5,
    /// 25 Hz low power
    LowPowerHz25,
    /// 50 Hz low power
    LowPowerHz50,
    /// 100 Hz low power
    LowPowerHz100,
    /// 200 Hz low power
    LowPowerHz200,
    /// 400 Hz low power
    LowPowerHz400,
    /// 800 Hz low power
    LowPowerHz800,
}

impl Odr {
    /// CTRL1 ODR field value and whether HF_ODR must be set.
    pub fn encoding(self) -> (u8, bool) {
        match self {
            Odr::PowerDown => (0, false),
            Odr::Hz12_5 => (1, false),
            Odr::Hz25 => (2, false),
            Odr::Hz50 => (3, false),
            Odr::Hz100 => (4, false),
            Odr::Hz200 => (5, false),
            Odr::Hz400 => (6, false),
            Odr::Hz800 => (7, false),
            Odr::Hz1600 => (5, true),
            Odr::Hz3200 => (6, true),
            Odr::Hz6400 => (7, true),
            Odr::LowPowerHz1 => (8, false),
            Odr::LowPowerHz12_5 => (9, false),
            Odr::LowPowerHz25 => (10, false),
            Odr::LowPowerHz50 => (11, false),
            Odr::LowPowerHz100 => (12, false),
            Odr::LowPowerHz200 => (13, false),
            Odr::LowPowerHz400 => (14, false),
            Odr::LowPowerHz800 => (15, false),
        }
    }
}

/// Full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullScale {
    /// ±2 g
    #[default]
    G2,
    /// ±4 g
    G4,
    /// ±8 g
    G8,
    /// ±16 g
    G16,
}

impl FullScale {
    /// CTRL1 FS field value. The encoding is not monotonic.
    pub fn bits(self) -> u8 {
        match self {
            FullScale::G2 => 0,
            FullScale::G16 => 1,
            FullScale::G4 => 2,
            FullScale::G8 => 3,
        }
    }

    /// Sensitivity in mg/LSB for 16-bit samples.
    pub fn sensitivity(self) -> f32 {
        match self {
            FullScale::G2 => 0.061,
            FullScale::G4 => 0.122,
            FullScale::G8 => 0.244,
            FullScale::G16 => 0.488,
        }
    }
}

// =============================================================================
// Lis2ds12Factory - DriverFactory implementation
// =============================================================================

/// Configuration for the LIS2DS12 driver
///
/// ```toml
/// interface = "spi"
/// bus = 0
/// chip_select = 8
/// odr = "hz400"
/// full_scale = "g4"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Lis2ds12Config {
    /// Bus selection; default I2C address 0x1E
    #[serde(flatten)]
    pub bus: BusConfig,
    /// Output data rate (default 100 Hz)
    #[serde(default)]
    pub odr: Odr,
    /// Full scale (default ±2 g)
    #[serde(default)]
    pub full_scale: FullScale,
}

/// Factory for LIS2DS12 driver instances.
pub struct Lis2ds12Factory;

impl DriverFactory for Lis2ds12Factory {
    fn driver_type(&self) -> &'static str {
        "lis2ds12"
    }

    fn descriptor(&self) -> &'static Descriptor {
        &LIS2DS12_DESCRIPTOR
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Lis2ds12Config = config.clone().try_into()?;
        cfg.bus.selector(DEFAULT_I2C_ADDRESS)?;
        Ok(())
    }

    fn build(&self, subsystem: &BusSubsystem, config: toml::Value) -> Result<DeviceComponents> {
        let cfg: Lis2ds12Config = config.try_into().context("Invalid LIS2DS12 config")?;
        let selector = cfg.bus.selector(DEFAULT_I2C_ADDRESS)?;
        let options = Lis2ds12Options {
            odr: cfg.odr,
            full_scale: cfg.full_scale,
        };
        let accel = Arc::new(
            Lis2ds12::init(subsystem, selector, options)
                .with_context(|| format!("Failed to initialize LIS2DS12 on {selector}"))?,
        );

        Ok(DeviceComponents::new(accel.clone())
            .with_accelerometer(accel.clone())
            .with_temperature(accel))
    }
}

// =============================================================================
// Lis2ds12
// =============================================================================

/// Init-time options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lis2ds12Options {
    /// Output data rate
    pub odr: Odr,
    /// Full scale
    pub full_scale: FullScale,
}

struct State {
    bus: RegisterBus,
    full_scale: FullScale,
    raw: [i16; 3],
    temperature: f32,
    axis_adj: [Adjustment; 3],
    temperature_adj: Adjustment,
}

impl State {
    fn set_bits(&mut self, register: u8, mask: u8, on: bool) -> UpmResult<()> {
        self.bus
            .modify_reg(register, mask, if on { mask } else { 0 })?;
        Ok(())
    }
}

/// LIS2DS12 device context.
pub struct Lis2ds12 {
    state: Mutex<State>,
}

impl Lis2ds12 {
    /// Open the chip, verify WHO_AM_I, soft-reset it and configure
    /// `options`.
    #[instrument(skip(subsystem), err)]
    pub fn init(
        subsystem: &BusSubsystem,
        selector: BusSelector,
        options: Lis2ds12Options,
    ) -> UpmResult<Self> {
        let mut bus = RegisterBus::open(subsystem, selector, SpiSettings::default())?;
        let chip_id = bus.read_reg(REG_WHO_AM_I)?;
        if chip_id != CHIP_ID {
            warn!(%selector, chip_id, "Unexpected LIS2DS12 chip id");
            return Err(UpmError::ChipIdMismatch {
                driver: "lis2ds12",
                expected: &[CHIP_ID],
                found: chip_id,
            });
        }

        let accel = Self {
            state: Mutex::new(State {
                bus,
                full_scale: options.full_scale,
                raw: [0; 3],
                temperature: 0.0,
                axis_adj: [Adjustment::IDENTITY; 3],
                temperature_adj: Adjustment::IDENTITY,
            }),
        };
        accel.reset()?;
        accel.devinit(options.odr, options.full_scale)?;
        info!(%selector, ?options, "LIS2DS12 ready");
        Ok(accel)
    }

    /// Release the bus handles.
    pub fn close(self) {
        debug!("Closing LIS2DS12");
    }

    /// Enable register auto-increment, apply ODR and full scale, disable the
    /// output high-pass filter, then wait for the chip to settle.
    pub fn devinit(&self, odr: Odr, full_scale: FullScale) -> UpmResult<()> {
        self.state
            .lock()
            .set_bits(REG_CTRL2, CTRL2_IF_ADD_INC, true)?;
        self.set_odr(odr)?;
        self.set_full_scale(full_scale)?;
        self.enable_hp_filtering(false)?;
        self.state.lock().bus.delay(SETTLE_DELAY);
        Ok(())
    }

    /// Soft reset; blocks 100 ms.
    #[instrument(skip(self), err)]
    pub fn reset(&self) -> UpmResult<()> {
        let mut state = self.state.lock();
        state.set_bits(REG_CTRL2, CTRL2_SOFT_RESET, true)?;
        state.bus.delay(RESET_DELAY);
        Ok(())
    }

    /// Set the output data rate. Block data update is always enabled.
    pub fn set_odr(&self, odr: Odr) -> UpmResult<()> {
        let (code, hf) = odr.encoding();
        let mut bits = (code << CTRL1_ODR_SHIFT) | CTRL1_BDU;
        if hf {
            bits |= CTRL1_HF_ODR;
        }
        self.state.lock().bus.modify_reg(
            REG_CTRL1,
            CTRL1_ODR_MASK | CTRL1_HF_ODR | CTRL1_BDU,
            bits,
        )?;
        debug!(?odr, "LIS2DS12 ODR set");
        Ok(())
    }

    /// Set the full-scale range and the matching sensitivity.
    pub fn set_full_scale(&self, full_scale: FullScale) -> UpmResult<()> {
        let mut state = self.state.lock();
        state.bus.modify_reg(
            REG_CTRL1,
            CTRL1_FS_MASK,
            full_scale.bits() << CTRL1_FS_SHIFT,
        )?;
        state.full_scale = full_scale;
        Ok(())
    }

    /// Current full scale.
    pub fn full_scale(&self) -> FullScale {
        self.state.lock().full_scale
    }

    /// Route the high-pass (slope) filter to the output registers.
    pub fn enable_hp_filtering(&self, enable: bool) -> UpmResult<()> {
        self.state
            .lock()
            .set_bits(REG_CTRL2, CTRL2_FDS_SLOPE, enable)
    }

    /// Latch interrupt sources until read.
    pub fn enable_interrupt_latching(&self, latch: bool) -> UpmResult<()> {
        self.state.lock().set_bits(REG_CTRL3, CTRL3_LIR, latch)
    }

    /// Interrupt polarity. The chip's bit is active-low when set.
    pub fn set_interrupt_active_high(&self, high: bool) -> UpmResult<()> {
        self.state.lock().set_bits(REG_CTRL3, CTRL3_H_LACTIVE, !high)
    }

    /// Push-pull (`true`) or open-drain interrupt outputs.
    pub fn set_interrupt_push_pull(&self, push_pull: bool) -> UpmResult<()> {
        self.state.lock().set_bits(REG_CTRL3, CTRL3_PP_OD, !push_pull)
    }

    /// Write the INT1 routing register (CTRL4).
    pub fn set_int1_config(&self, bits: u8) -> UpmResult<()> {
        self.state.lock().bus.write_reg(REG_CTRL4, bits)
    }

    /// Write the INT2 routing register (CTRL5).
    pub fn set_int2_config(&self, bits: u8) -> UpmResult<()> {
        self.state.lock().bus.write_reg(REG_CTRL5, bits)
    }

    /// Raw STATUS register.
    pub fn status(&self) -> UpmResult<u8> {
        self.state.lock().bus.read_reg(REG_STATUS)
    }

    /// WHO_AM_I, read from the chip.
    pub fn chip_id(&self) -> UpmResult<u8> {
        self.state.lock().bus.read_reg(REG_WHO_AM_I)
    }
}

impl std::fmt::Debug for Lis2ds12 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Lis2ds12")
            .field("bus", &state.bus)
            .field("full_scale", &state.full_scale)
            .finish()
    }
}

impl Sensor for Lis2ds12 {
    fn descriptor(&self) -> &'static Descriptor {
        &LIS2DS12_DESCRIPTOR
    }

    /// Read the three axes as one block, then the temperature register.
    fn update(&self) -> UpmResult<()> {
        let mut state = self.state.lock();
        let mut buf = [0u8; 6];
        state.bus.read_regs(REG_OUT_X_L, &mut buf)?;
        state.raw = [
            i16::from_le_bytes([buf[0], buf[1]]),
            i16::from_le_bytes([buf[2], buf[3]]),
            i16::from_le_bytes([buf[4], buf[5]]),
        ];
        let t = state.bus.read_reg(REG_OUT_T)? as i8;
        state.temperature = f32::from(t) / 256.0 + 25.0;
        debug!(raw = ?state.raw, temperature = state.temperature, "LIS2DS12 sample");
        Ok(())
    }
}

impl Accelerometer for Lis2ds12 {
    /// Acceleration in g.
    fn acceleration(&self) -> UpmResult<[f32; 3]> {
        let state = self.state.lock();
        let scale = state.full_scale.sensitivity() / 1000.0;
        let mut out = [0.0; 3];
        for (axis, value) in out.iter_mut().enumerate() {
            *value = state.axis_adj[axis].apply(f32::from(state.raw[axis]) * scale);
        }
        Ok(out)
    }

    fn set_acceleration_offset(&self, offset: [f32; 3]) -> UpmResult<()> {
        let mut state = self.state.lock();
        for (adj, o) in state.axis_adj.iter_mut().zip(offset) {
            adj.offset = o;
        }
        Ok(())
    }

    fn set_acceleration_scale(&self, scale: [f32; 3]) -> UpmResult<()> {
        let mut state = self.state.lock();
        for (adj, s) in state.axis_adj.iter_mut().zip(scale) {
            adj.scale = s;
        }
        Ok(())
    }
}

impl TemperatureSensor for Lis2ds12 {
    /// Degrees Celsius.
    fn temperature(&self) -> UpmResult<f32> {
        let state = self.state.lock();
        Ok(state.temperature_adj.apply(state.temperature))
    }

    fn set_temperature_offset(&self, offset: f32) -> UpmResult<()> {
        self.state.lock().temperature_adj.offset = offset;
        Ok(())
    }

    fn set_temperature_scale(&self, scale: f32) -> UpmResult<()> {
        self.state.lock().temperature_adj.scale = scale;
        Ok(())
    }
}
