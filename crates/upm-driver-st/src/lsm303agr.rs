//! ST LSM303AGR eCompass Driver
//!
//! Reference: LSM303AGR datasheet DocID027765
//!
//! The package holds two I2C slaves:
//! - accelerometer at 0x19, WHO_AM_I_A (0x0F) = 0x33, registers 0x00..=0x3F
//! - magnetometer at 0x1E, WHO_AM_I_M (0x4F) = 0x40, registers 0x40 and up
//!
//! Register addresses never overlap, so every access is routed to the right
//! slave by address alone. Either half may be left out, not both.
//!
//! Block reads set bit 7 of the register address to request auto-increment.
//!
//! # Usage
//!
//! ```rust,ignore
//! use upm_driver_st::lsm303agr::{Lsm303agr, Lsm303agrOptions};
//!
//! let compass = Lsm303agr::init(&subsystem, 0, Some(0x19), Some(0x1e), Lsm303agrOptions::default())?;
//! compass.update()?;
//! let [x, y, z] = compass.magnetic_field()?;
//! ```

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use upm_core::{
    Accelerometer, Adjustment, BusSelector, BusSubsystem, Category, Descriptor, DeviceComponents,
    DriverFactory, Magnetometer, Protocol, RegisterBus, RegisterIo, Sensor, SpiSettings,
    TemperatureSensor, UpmError, UpmResult,
};

/// Default accelerometer address.
pub const DEFAULT_ACCEL_ADDRESS: u8 = 0x19;
/// Default magnetometer address.
pub const DEFAULT_MAG_ADDRESS: u8 = 0x1e;
/// WHO_AM_I_A value.
pub const ACCEL_CHIP_ID: u8 = 0x33;
/// WHO_AM_I_M value.
pub const MAG_CHIP_ID: u8 = 0x40;
/// Highest accelerometer register.
pub const MAX_ACCEL_REGISTER: u8 = 0x3f;

const I2C_AUTO_INCREMENT: u8 = 0x80;

const REG_OUT_TEMP_L_A: u8 = 0x0c;
const REG_WHO_AM_I_A: u8 = 0x0f;
const REG_TEMP_CFG_REG_A: u8 = 0x1f;
const REG_CTRL_REG1_A: u8 = 0x20;
const REG_CTRL_REG4_A: u8 = 0x23;
const REG_OUT_X_L_A: u8 = 0x28;
const REG_INT1_CFG_A: u8 = 0x30;
const REG_INT1_SRC_A: u8 = 0x31;
const REG_INT2_CFG_A: u8 = 0x34;
const REG_INT2_SRC_A: u8 = 0x35;
const REG_WHO_AM_I_M: u8 = 0x4f;
const REG_CFG_REG_A_M: u8 = 0x60;
const REG_INT_CTRL_REG_M: u8 = 0x63;
const REG_INT_SRC_REG_M: u8 = 0x64;
const REG_OUTX_L_REG_M: u8 = 0x68;

const TEMP_EN_MASK: u8 = 0xc0;
const CTRL_REG1_A_XYZ_EN: u8 = 0x07;
const CTRL_REG1_A_LPEN: u8 = 0x08;
const CTRL_REG1_A_ODR_SHIFT: u8 = 4;
const CTRL_REG4_A_HR: u8 = 0x08;
const CTRL_REG4_A_FS_SHIFT: u8 = 4;
const CTRL_REG4_A_FS_MASK: u8 = 0x03 << CTRL_REG4_A_FS_SHIFT;
const CTRL_REG4_A_BDU: u8 = 0x80;
const CFG_REG_A_M_MD_MASK: u8 = 0x03;
const CFG_REG_A_M_ODR_SHIFT: u8 = 2;
const CFG_REG_A_M_ODR_MASK: u8 = 0x03 << CFG_REG_A_M_ODR_SHIFT;
const CFG_REG_A_M_LP: u8 = 0x10;
const CFG_REG_A_M_COMP_TEMP_EN: u8 = 0x80;

const SETTLE_DELAY: Duration = Duration::from_millis(10);
const FULL_SCALE_DELAY: Duration = Duration::from_millis(50);

/// Descriptor of the LSM303AGR.
pub static LSM303AGR_DESCRIPTOR: Descriptor = Descriptor {
    name: "lsm303agr",
    description: "ST LSM303AGR accelerometer and magnetometer",
    protocols: &[Protocol::I2c],
    categories: &[
        Category::Sensor,
        Category::Accelerometer,
        Category::Magnetometer,
        Category::Temperature,
    ],
};

/// Power mode, which also fixes accelerometer resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    /// 8-bit accelerometer samples; magnetometer low-power
    LowPower,
    /// 10-bit accelerometer samples
    Normal,
    /// 12-bit accelerometer samples
    #[default]
    HighResolution,
}

/// Accelerometer full-scale range.
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
    /// CTRL_REG4_A FS field value.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Left-justified sample divisor and sensitivity in mg/digit.
pub fn accel_scale(mode: PowerMode, full_scale: FullScale) -> (f32, f32) {
    use FullScale::*;
    match mode {
        PowerMode::LowPower => (
            256.0,
            match full_scale {
                G2 => 15.63,
                G4 => 31.26,
                G8 => 62.52,
                G16 => 187.58,
            },
        ),
        PowerMode::Normal => (
            64.0,
            match full_scale {
                G2 => 3.9,
                G4 => 7.82,
                G8 => 15.63,
                G16 => 46.9,
            },
        ),
        PowerMode::HighResolution => (
            16.0,
            match full_scale {
                G2 => 0.98,
                G4 => 1.95,
                G8 => 3.9,
                G16 => 11.72,
            },
        ),
    }
}

/// Accelerometer output data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelOdr {
    /// Power down
    PowerDown,
    /// 1 Hz
    Hz1,
    /// 10 Hz
    Hz10,
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
    /// 1.620 kHz, low power only
    Khz1_620,
    /// 1.344 kHz (5.376 kHz in low power)
    Khz1_344,
}

impl AccelOdr {
    /// CTRL_REG1_A ODR field value.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Magnetometer output data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagOdr {
    /// 10 Hz
    #[default]
    Hz10,
    /// 20 Hz
    Hz20,
    /// 50 Hz
    Hz50,
    /// 100 Hz
    Hz100,
}

impl MagOdr {
    /// CFG_REG_A_M ODR field value.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// Lsm303agrFactory - DriverFactory implementation
// =============================================================================

/// Configuration for the LSM303AGR driver
///
/// ```toml
/// bus = 1
/// magnetometer = false
/// power_mode = "normal"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Lsm303agrConfig {
    /// I2C bus shared by both halves
    #[serde(default)]
    pub bus: u32,
    /// Enable the accelerometer half
    #[serde(default = "enabled")]
    pub accelerometer: bool,
    /// Accelerometer address
    #[serde(default = "default_accel_address")]
    pub accel_address: u8,
    /// Enable the magnetometer half
    #[serde(default = "enabled")]
    pub magnetometer: bool,
    /// Magnetometer address
    #[serde(default = "default_mag_address")]
    pub mag_address: u8,
    /// Power mode (default high resolution)
    #[serde(default)]
    pub power_mode: PowerMode,
    /// Accelerometer full scale (default ±2 g)
    #[serde(default)]
    pub full_scale: FullScale,
    /// Accelerometer ODR (default 100 Hz)
    #[serde(default)]
    pub accel_odr: AccelOdr,
    /// Magnetometer ODR (default 10 Hz)
    #[serde(default)]
    pub mag_odr: MagOdr,
}

fn enabled() -> bool {
    true
}

fn default_accel_address() -> u8 {
    DEFAULT_ACCEL_ADDRESS
}

fn default_mag_address() -> u8 {
    DEFAULT_MAG_ADDRESS
}

impl Lsm303agrConfig {
    fn addresses(&self) -> (Option<u8>, Option<u8>) {
        (
            self.accelerometer.then_some(self.accel_address),
            self.magnetometer.then_some(self.mag_address),
        )
    }

    fn options(&self) -> Lsm303agrOptions {
        Lsm303agrOptions {
            power_mode: self.power_mode,
            full_scale: self.full_scale,
            accel_odr: self.accel_odr,
            mag_odr: self.mag_odr,
        }
    }
}

/// Factory for LSM303AGR driver instances.
pub struct Lsm303agrFactory;

impl DriverFactory for Lsm303agrFactory {
    fn driver_type(&self) -> &'static str {
        "lsm303agr"
    }

    fn descriptor(&self) -> &'static Descriptor {
        &LSM303AGR_DESCRIPTOR
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Lsm303agrConfig = config.clone().try_into()?;
        let (accel, mag) = cfg.addresses();
        check_addresses(cfg.bus, accel, mag)?;
        Ok(())
    }

    fn build(&self, subsystem: &BusSubsystem, config: toml::Value) -> Result<DeviceComponents> {
        let cfg: Lsm303agrConfig = config.try_into().context("Invalid LSM303AGR config")?;
        let (accel, mag) = cfg.addresses();
        let compass = Arc::new(
            Lsm303agr::init(subsystem, cfg.bus, accel, mag, cfg.options())
                .with_context(|| format!("Failed to initialize LSM303AGR on i2c{}", cfg.bus))?,
        );

        Ok(DeviceComponents::new(compass.clone())
            .with_accelerometer(compass.clone())
            .with_magnetometer(compass.clone())
            .with_temperature(compass))
    }
}

fn check_addresses(
    bus: u32,
    accel: Option<u8>,
    mag: Option<u8>,
) -> UpmResult<(Option<BusSelector>, Option<BusSelector>)> {
    if accel.is_none() && mag.is_none() {
        return Err(UpmError::InvalidParameter(
            "at least one of accelerometer and magnetometer must be enabled".into(),
        ));
    }
    let selector = |address: u8| {
        if address > 0x7f {
            return Err(UpmError::InvalidParameter(format!(
                "i2c address {address:#04x} is not 7-bit"
            )));
        }
        Ok(BusSelector::i2c(bus, address))
    };
    Ok((
        accel.map(selector).transpose()?,
        mag.map(selector).transpose()?,
    ))
}

// =============================================================================
// Lsm303agr
// =============================================================================

/// Init-time options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lsm303agrOptions {
    /// Power mode
    pub power_mode: PowerMode,
    /// Accelerometer full scale
    pub full_scale: FullScale,
    /// Accelerometer ODR
    pub accel_odr: AccelOdr,
    /// Magnetometer ODR
    pub mag_odr: MagOdr,
}

struct State {
    accel: Option<RegisterBus>,
    mag: Option<RegisterBus>,
    power_mode: PowerMode,
    full_scale: FullScale,
    accel_raw: [i16; 3],
    mag_raw: [i16; 3],
    temperature_raw: i16,
    axis_adj: [Adjustment; 3],
}

impl State {
    /// Bus owning `register`.
    fn route(&mut self, register: u8) -> UpmResult<&mut RegisterBus> {
        let (bus, half) = if register <= MAX_ACCEL_REGISTER {
            (self.accel.as_mut(), "accelerometer")
        } else {
            (self.mag.as_mut(), "magnetometer")
        };
        bus.ok_or_else(|| UpmError::NoResources(format!("{half} is disabled")))
    }

    fn read_reg(&mut self, register: u8) -> UpmResult<u8> {
        self.route(register)?.read_reg(register)
    }

    fn read_regs(&mut self, register: u8, buf: &mut [u8]) -> UpmResult<()> {
        self.route(register)?.read_regs(register, buf)
    }

    fn write_reg(&mut self, register: u8, value: u8) -> UpmResult<()> {
        self.route(register)?.write_reg(register, value)
    }

    fn modify_reg(&mut self, register: u8, mask: u8, bits: u8) -> UpmResult<u8> {
        self.route(register)?.modify_reg(register, mask, bits)
    }

    fn delay(&self, duration: Duration) {
        if let Some(bus) = self.accel.as_ref().or(self.mag.as_ref()) {
            bus.delay(duration);
        }
    }

    fn require_accel(&self) -> UpmResult<()> {
        match self.accel {
            Some(_) => Ok(()),
            None => Err(UpmError::NoResources("accelerometer is disabled".into())),
        }
    }

    fn require_mag(&self) -> UpmResult<()> {
        match self.mag {
            Some(_) => Ok(()),
            None => Err(UpmError::NoResources("magnetometer is disabled".into())),
        }
    }
}

fn open_half(
    subsystem: &BusSubsystem,
    selector: BusSelector,
    who_am_i: u8,
    expected: &'static [u8],
    driver: &'static str,
) -> UpmResult<RegisterBus> {
    let mut bus = RegisterBus::open(subsystem, selector, SpiSettings::default())?
        .with_i2c_block_flag(I2C_AUTO_INCREMENT);
    let chip_id = bus.read_reg(who_am_i)?;
    if !expected.contains(&chip_id) {
        warn!(%selector, chip_id, driver, "Unexpected LSM303AGR chip id");
        return Err(UpmError::ChipIdMismatch {
            driver,
            expected,
            found: chip_id,
        });
    }
    Ok(bus)
}

/// LSM303AGR device context.
pub struct Lsm303agr {
    state: Mutex<State>,
}

impl Lsm303agr {
    /// Open the enabled halves on I2C `bus`, verify their WHO_AM_I values
    /// and run [`devinit`](Self::devinit).
    ///
    /// # Errors
    /// - [`UpmError::InvalidParameter`] if both addresses are `None`
    /// - [`UpmError::ChipIdMismatch`] if either half answers with a wrong id
    #[instrument(skip(subsystem), err)]
    pub fn init(
        subsystem: &BusSubsystem,
        bus: u32,
        accel_address: Option<u8>,
        mag_address: Option<u8>,
        options: Lsm303agrOptions,
    ) -> UpmResult<Self> {
        let (accel_sel, mag_sel) = check_addresses(bus, accel_address, mag_address)?;
        let accel = accel_sel
            .map(|s| open_half(subsystem, s, REG_WHO_AM_I_A, &[ACCEL_CHIP_ID], "lsm303agr_accel"))
            .transpose()?;
        let mag = mag_sel
            .map(|s| open_half(subsystem, s, REG_WHO_AM_I_M, &[MAG_CHIP_ID], "lsm303agr_mag"))
            .transpose()?;

        let compass = Self {
            state: Mutex::new(State {
                accel,
                mag,
                power_mode: options.power_mode,
                full_scale: options.full_scale,
                accel_raw: [0; 3],
                mag_raw: [0; 3],
                temperature_raw: 0,
                axis_adj: [Adjustment::IDENTITY; 3],
            }),
        };
        compass.devinit(options)?;
        info!(bus, ?accel_address, ?mag_address, "LSM303AGR ready");
        Ok(compass)
    }

    /// Release the bus handles.
    pub fn close(self) {
        debug!("Closing LSM303AGR");
    }

    /// Configure the enabled halves.
    ///
    /// Magnetometer: continuous mode with temperature compensation, then
    /// `mag_odr`. Accelerometer: all axes, block data update, temperature
    /// sensor, then `accel_odr` and `full_scale`. Finally `power_mode`.
    pub fn devinit(&self, options: Lsm303agrOptions) -> UpmResult<()> {
        let (has_accel, has_mag) = {
            let state = self.state.lock();
            (state.accel.is_some(), state.mag.is_some())
        };

        if has_mag {
            let mut state = self.state.lock();
            state.modify_reg(
                REG_CFG_REG_A_M,
                CFG_REG_A_M_MD_MASK | CFG_REG_A_M_COMP_TEMP_EN,
                CFG_REG_A_M_COMP_TEMP_EN,
            )?;
            drop(state);
            self.set_mag_odr(options.mag_odr)?;
            self.state.lock().delay(SETTLE_DELAY);
        }

        if has_accel {
            let mut state = self.state.lock();
            state.modify_reg(REG_CTRL_REG1_A, CTRL_REG1_A_XYZ_EN, CTRL_REG1_A_XYZ_EN)?;
            state.modify_reg(REG_CTRL_REG4_A, CTRL_REG4_A_BDU, CTRL_REG4_A_BDU)?;
            state.modify_reg(REG_TEMP_CFG_REG_A, TEMP_EN_MASK, TEMP_EN_MASK)?;
            drop(state);
            self.set_accel_odr(options.accel_odr)?;
            self.set_full_scale(options.full_scale)?;
            self.state.lock().delay(SETTLE_DELAY);
        }

        self.set_power_mode(options.power_mode)
    }

    /// Set the power mode on both halves.
    ///
    /// The magnetometer only distinguishes low power from the rest.
    #[instrument(skip(self), err)]
    pub fn set_power_mode(&self, mode: PowerMode) -> UpmResult<()> {
        let mut state = self.state.lock();
        if state.mag.is_some() {
            let lp = if mode == PowerMode::LowPower {
                CFG_REG_A_M_LP
            } else {
                0
            };
            state.modify_reg(REG_CFG_REG_A_M, CFG_REG_A_M_LP, lp)?;
        }
        if state.accel.is_some() {
            let (lpen, hr) = match mode {
                PowerMode::LowPower => (CTRL_REG1_A_LPEN, 0),
                PowerMode::Normal => (0, 0),
                PowerMode::HighResolution => (0, CTRL_REG4_A_HR),
            };
            state.modify_reg(REG_CTRL_REG1_A, CTRL_REG1_A_LPEN, lpen)?;
            state.modify_reg(REG_CTRL_REG4_A, CTRL_REG4_A_HR, hr)?;
        }
        state.delay(SETTLE_DELAY);
        state.power_mode = mode;
        Ok(())
    }

    /// Current power mode.
    pub fn power_mode(&self) -> PowerMode {
        self.state.lock().power_mode
    }

    /// Set the accelerometer full scale.
    pub fn set_full_scale(&self, full_scale: FullScale) -> UpmResult<()> {
        let mut state = self.state.lock();
        state.modify_reg(
            REG_CTRL_REG4_A,
            CTRL_REG4_A_FS_MASK,
            full_scale.bits() << CTRL_REG4_A_FS_SHIFT,
        )?;
        state.delay(FULL_SCALE_DELAY);
        state.full_scale = full_scale;
        Ok(())
    }

    /// Current accelerometer full scale.
    pub fn full_scale(&self) -> FullScale {
        self.state.lock().full_scale
    }

    /// Set the accelerometer output data rate.
    pub fn set_accel_odr(&self, odr: AccelOdr) -> UpmResult<()> {
        self.state.lock().modify_reg(
            REG_CTRL_REG1_A,
            0x0f << CTRL_REG1_A_ODR_SHIFT,
            odr.bits() << CTRL_REG1_A_ODR_SHIFT,
        )?;
        Ok(())
    }

    /// Set the magnetometer output data rate.
    pub fn set_mag_odr(&self, odr: MagOdr) -> UpmResult<()> {
        self.state.lock().modify_reg(
            REG_CFG_REG_A_M,
            CFG_REG_A_M_ODR_MASK,
            odr.bits() << CFG_REG_A_M_ODR_SHIFT,
        )?;
        Ok(())
    }

    /// INT1_CFG_A.
    pub fn accel_int1_config(&self) -> UpmResult<u8> {
        self.state.lock().read_reg(REG_INT1_CFG_A)
    }

    /// Write INT1_CFG_A.
    pub fn set_accel_int1_config(&self, bits: u8) -> UpmResult<()> {
        self.state.lock().write_reg(REG_INT1_CFG_A, bits)
    }

    /// INT2_CFG_A.
    pub fn accel_int2_config(&self) -> UpmResult<u8> {
        self.state.lock().read_reg(REG_INT2_CFG_A)
    }

    /// Write INT2_CFG_A.
    pub fn set_accel_int2_config(&self, bits: u8) -> UpmResult<()> {
        self.state.lock().write_reg(REG_INT2_CFG_A, bits)
    }

    /// INT_CTRL_REG_M.
    pub fn mag_int_config(&self) -> UpmResult<u8> {
        self.state.lock().read_reg(REG_INT_CTRL_REG_M)
    }

    /// Write INT_CTRL_REG_M.
    pub fn set_mag_int_config(&self, bits: u8) -> UpmResult<()> {
        self.state.lock().write_reg(REG_INT_CTRL_REG_M, bits)
    }

    /// INT1_SRC_A. Reading clears a latched interrupt.
    pub fn accel_int1_source(&self) -> UpmResult<u8> {
        self.state.lock().read_reg(REG_INT1_SRC_A)
    }

    /// INT2_SRC_A. Reading clears a latched interrupt.
    pub fn accel_int2_source(&self) -> UpmResult<u8> {
        self.state.lock().read_reg(REG_INT2_SRC_A)
    }

    /// INT_SRC_REG_M.
    pub fn mag_int_source(&self) -> UpmResult<u8> {
        self.state.lock().read_reg(REG_INT_SRC_REG_M)
    }
}

impl std::fmt::Debug for Lsm303agr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Lsm303agr")
            .field("accel", &state.accel)
            .field("mag", &state.mag)
            .field("power_mode", &state.power_mode)
            .finish()
    }
}

fn le_axes(buf: &[u8; 6]) -> [i16; 3] {
    [
        i16::from_le_bytes([buf[0], buf[1]]),
        i16::from_le_bytes([buf[2], buf[3]]),
        i16::from_le_bytes([buf[4], buf[5]]),
    ]
}

impl Sensor for Lsm303agr {
    fn descriptor(&self) -> &'static Descriptor {
        &LSM303AGR_DESCRIPTOR
    }

    /// Read temperature and acceleration from the accelerometer half, then
    /// the field from the magnetometer half. Disabled halves are skipped.
    fn update(&self) -> UpmResult<()> {
        let mut state = self.state.lock();
        let mut buf = [0u8; 6];
        if state.accel.is_some() {
            let mut t = [0u8; 2];
            state.read_regs(REG_OUT_TEMP_L_A, &mut t)?;
            state.temperature_raw = i16::from_le_bytes(t);
            state.read_regs(REG_OUT_X_L_A, &mut buf)?;
            state.accel_raw = le_axes(&buf);
        }
        if state.mag.is_some() {
            state.read_regs(REG_OUTX_L_REG_M, &mut buf)?;
            state.mag_raw = le_axes(&buf);
        }
        debug!(
            accel = ?state.accel_raw,
            mag = ?state.mag_raw,
            temperature = state.temperature_raw,
            "LSM303AGR sample"
        );
        Ok(())
    }
}

impl Accelerometer for Lsm303agr {
    /// Acceleration in g.
    fn acceleration(&self) -> UpmResult<[f32; 3]> {
        let state = self.state.lock();
        state.require_accel()?;
        let (divisor, scale) = accel_scale(state.power_mode, state.full_scale);
        let mut out = [0.0; 3];
        for (axis, value) in out.iter_mut().enumerate() {
            let g = f32::from(state.accel_raw[axis]) / divisor * scale / 1000.0;
            *value = state.axis_adj[axis].apply(g);
        }
        Ok(out)
    }

    fn set_acceleration_offset(&self, offset: [f32; 3]) -> UpmResult<()> {
        let mut state = self.state.lock();
        state.require_accel()?;
        for (adj, o) in state.axis_adj.iter_mut().zip(offset) {
            adj.offset = o;
        }
        Ok(())
    }

    fn set_acceleration_scale(&self, scale: [f32; 3]) -> UpmResult<()> {
        let mut state = self.state.lock();
        state.require_accel()?;
        for (adj, s) in state.axis_adj.iter_mut().zip(scale) {
            adj.scale = s;
        }
        Ok(())
    }
}

impl Magnetometer for Lsm303agr {
    /// Field in microtesla (1.5 mG/digit).
    fn magnetic_field(&self) -> UpmResult<[f32; 3]> {
        let state = self.state.lock();
        state.require_mag()?;
        Ok(state.mag_raw.map(|v| f32::from(v) * 1.5 / 10.0))
    }
}

impl TemperatureSensor for Lsm303agr {
    /// Degrees Celsius, from the accelerometer half.
    fn temperature(&self) -> UpmResult<f32> {
        let state = self.state.lock();
        state.require_accel()?;
        Ok(f32::from(state.temperature_raw) / 256.0 + 25.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_table() {
        assert_eq!(accel_scale(PowerMode::LowPower, FullScale::G16), (256.0, 187.58));
        assert_eq!(accel_scale(PowerMode::Normal, FullScale::G4), (64.0, 7.82));
        assert_eq!(
            accel_scale(PowerMode::HighResolution, FullScale::G2),
            (16.0, 0.98)
        );
    }

    #[test]
    fn both_halves_disabled_is_rejected() {
        assert!(matches!(
            check_addresses(0, None, None),
            Err(UpmError::InvalidParameter(_))
        ));
        assert!(check_addresses(0, None, Some(0x1e)).is_ok());
        assert!(check_addresses(0, Some(0x99), None).is_err());
    }

    #[test]
    fn config_defaults_enable_both_halves() {
        let value: toml::Value = toml::from_str("bus = 2").unwrap();
        let cfg: Lsm303agrConfig = value.try_into().unwrap();
        assert_eq!(cfg.addresses(), (Some(0x19), Some(0x1e)));
        assert_eq!(cfg.power_mode, PowerMode::HighResolution);

        let value: toml::Value = toml::from_str("magnetometer = false").unwrap();
        let cfg: Lsm303agrConfig = value.try_into().unwrap();
        assert_eq!(cfg.addresses(), (Some(0x19), None));
    }

    #[test]
    #[tracing_test::traced_test]
    fn chip_id_mismatch_is_logged() {
        let platform = upm_driver_mock::MockPlatform::new();
        platform.add_i2c_device(
            1,
            DEFAULT_ACCEL_ADDRESS,
            upm_driver_mock::chips::lsm303agr_accel().with_register(0x0f, 0x44),
        );
        let subsystem = platform.subsystem().unwrap();

        let err = Lsm303agr::init(
            &subsystem,
            1,
            Some(DEFAULT_ACCEL_ADDRESS),
            None,
            Lsm303agrOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, UpmError::ChipIdMismatch { found: 0x44, .. }));
        assert!(logs_contain("Unexpected LSM303AGR chip id"));
        assert_eq!(platform.open_handles(), 0);
    }
}
