//! Bosch BMP280 / BME280 Barometric Sensor Driver
//!
//! Reference: BST-BMP280-DS001, BST-BME280-DS002
//!
//! The two parts share a register map; the BME280 adds a humidity channel.
//! The driver probes the chip id at init and adapts:
//!
//! - `0x58` BMP280: temperature and pressure, humidity reads 0.0
//! - `0x60` BME280: temperature, pressure and humidity
//!
//! Protocol overview:
//! - I2C at 0x77 (0x76 with SDO low), or 4-wire SPI mode 0 up to 10 MHz
//! - The chip powers up in I2C mode; a falling edge on CSB latches SPI mode
//! - One block read of 0xF7.. returns pressure, temperature (and humidity)
//!   from the same conversion
//!
//! # Usage
//!
//! ```rust,ignore
//! use upm_driver_bosch::{Bmp280, Bmp280Options};
//! use upm_core::{BusSelector, Sensor, PressureSensor};
//!
//! let sensor = Bmp280::init(&subsystem, BusSelector::i2c(1, 0x77), Bmp280Options::default())?;
//! sensor.update()?;
//! println!("{} Pa, {} m", sensor.pressure()?, sensor.altitude());
//! ```

use crate::compensation::{raw20, HumidityTrim, TrimParameters};
use crate::registers::*;
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use upm_core::{
    Adjustment, BusConfig, BusSelector, BusSubsystem, Category, Descriptor, DeviceComponents,
    DriverFactory, HumiditySensor, PressureSensor, Protocol, RegisterBus, RegisterIo, Sensor,
    SpiSettings, TemperatureSensor, UpmError, UpmResult,
};

/// Chip-select low time that switches the chip into SPI mode.
const CS_PULSE: Duration = Duration::from_millis(10);
/// Delay between STATUS polls in forced mode.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Start-up time after a soft reset.
const RESET_DELAY: Duration = Duration::from_secs(1);
/// Default bound on forced-mode STATUS polls (one second).
pub const DEFAULT_MAX_STATUS_POLLS: u32 = 100;

static CATEGORIES: &[Category] = &[
    Category::Sensor,
    Category::Temperature,
    Category::Pressure,
    Category::Humidity,
];

/// Descriptor of the BMP280.
pub static BMP280_DESCRIPTOR: Descriptor = Descriptor {
    name: "bmp280",
    description: "Bosch BMP280 digital barometric pressure sensor",
    protocols: &[Protocol::I2c, Protocol::Spi],
    categories: CATEGORIES,
};

/// Descriptor of the BME280.
pub static BME280_DESCRIPTOR: Descriptor = Descriptor {
    name: "bme280",
    description: "Bosch BME280 humidity, pressure and temperature sensor",
    protocols: &[Protocol::I2c, Protocol::Spi],
    categories: CATEGORIES,
};

// =============================================================================
// Bmp280Factory - DriverFactory implementation
// =============================================================================

/// Configuration for the BMP280/BME280 driver
///
/// ```toml
/// interface = "i2c"
/// bus = 1
/// address = 0x76
/// usage_mode = "weather_monitor"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Bmp280Config {
    /// Bus selection; default I2C address 0x77
    #[serde(flatten)]
    pub bus: BusConfig,
    /// Preset applied at init (default: indoor navigation)
    #[serde(default)]
    pub usage_mode: UsageMode,
    /// Forced-mode STATUS poll bound
    #[serde(default = "default_max_status_polls")]
    pub max_status_polls: u32,
    /// Sea-level reference for altitude, hPa
    #[serde(default = "default_sea_level_hpa")]
    pub sea_level_hpa: f32,
}

fn default_max_status_polls() -> u32 {
    DEFAULT_MAX_STATUS_POLLS
}

fn default_sea_level_hpa() -> f32 {
    SEA_LEVEL_HPA
}

impl Bmp280Config {
    fn options(&self) -> Bmp280Options {
        Bmp280Options {
            usage_mode: self.usage_mode,
            max_status_polls: self.max_status_polls,
            sea_level_hpa: self.sea_level_hpa,
        }
    }
}

/// Factory for BMP280/BME280 driver instances.
pub struct Bmp280Factory;

impl DriverFactory for Bmp280Factory {
    fn driver_type(&self) -> &'static str {
        "bmp280"
    }

    fn descriptor(&self) -> &'static Descriptor {
        &BMP280_DESCRIPTOR
    }

    fn name(&self) -> &'static str {
        "Bosch BMP280/BME280 Barometric Sensor"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg = parse_config(config)?;
        cfg.bus.selector(DEFAULT_I2C_ADDRESS)?;
        cfg.options().check()?;
        Ok(())
    }

    fn build(&self, subsystem: &BusSubsystem, config: toml::Value) -> Result<DeviceComponents> {
        let cfg: Bmp280Config = config.try_into().context("Invalid BMP280 config")?;
        let selector = cfg.bus.selector(DEFAULT_I2C_ADDRESS)?;
        let sensor = Arc::new(
            Bmp280::init(subsystem, selector, cfg.options())
                .with_context(|| format!("Failed to initialize BMP280 on {selector}"))?,
        );

        Ok(DeviceComponents::new(sensor.clone())
            .with_temperature(sensor.clone())
            .with_pressure(sensor.clone())
            .with_humidity(sensor))
    }
}

// =============================================================================
// Bmp280
// =============================================================================

/// Which member of the family answered the chip-id probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// BMP280 (0x58)
    Bmp280,
    /// BME280 (0x60)
    Bme280,
}

impl Variant {
    fn from_chip_id(id: u8) -> Option<Self> {
        match id {
            BMP280_CHIP_ID => Some(Variant::Bmp280),
            BME280_CHIP_ID => Some(Variant::Bme280),
            _ => None,
        }
    }

    /// Chip id of this variant.
    pub fn chip_id(self) -> u8 {
        match self {
            Variant::Bmp280 => BMP280_CHIP_ID,
            Variant::Bme280 => BME280_CHIP_ID,
        }
    }

    /// Descriptor of this variant.
    pub fn descriptor(self) -> &'static Descriptor {
        match self {
            Variant::Bmp280 => &BMP280_DESCRIPTOR,
            Variant::Bme280 => &BME280_DESCRIPTOR,
        }
    }

    fn has_humidity(self) -> bool {
        self == Variant::Bme280
    }
}

/// Init-time options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bmp280Options {
    /// Preset applied after calibration is read
    pub usage_mode: UsageMode,
    /// Forced-mode STATUS poll bound
    pub max_status_polls: u32,
    /// Sea-level reference for altitude, hPa
    pub sea_level_hpa: f32,
}

impl Bmp280Options {
    fn check(&self) -> UpmResult<()> {
        if self.max_status_polls == 0 {
            return Err(UpmError::InvalidParameter(
                "max_status_polls must be at least 1".into(),
            ));
        }
        if self.sea_level_hpa.is_nan() || self.sea_level_hpa <= 0.0 {
            return Err(UpmError::OutOfRange(format!(
                "sea level pressure {} hPa",
                self.sea_level_hpa
            )));
        }
        Ok(())
    }
}

impl Default for Bmp280Options {
    fn default() -> Self {
        Self {
            usage_mode: UsageMode::default(),
            max_status_polls: DEFAULT_MAX_STATUS_POLLS,
            sea_level_hpa: SEA_LEVEL_HPA,
        }
    }
}

struct State {
    bus: RegisterBus,
    mode: MeasureMode,
    temperature: f32,
    pressure: f32,
    humidity: f32,
    sea_level_hpa: f32,
    temperature_adj: Adjustment,
    pressure_adj: Adjustment,
    humidity_adj: Adjustment,
}

impl State {
    fn write_field(&mut self, register: u8, mask: u8, bits: u8) -> UpmResult<()> {
        self.bus.modify_reg(register, mask, bits)?;
        Ok(())
    }

    fn set_measure_mode(&mut self, mode: MeasureMode) -> UpmResult<()> {
        self.write_field(REG_CTRL_MEAS, CTRL_MEAS_MODE_MASK, mode.bits())?;
        self.mode = mode;
        Ok(())
    }

    fn clear_samples(&mut self) {
        self.temperature = 0.0;
        self.pressure = 0.0;
        self.humidity = 0.0;
    }
}

/// BMP280 / BME280 device context.
///
/// Owns the register path to the chip. Dropping it (or calling
/// [`close`](Self::close)) releases the bus handles.
pub struct Bmp280 {
    variant: Variant,
    trim: TrimParameters,
    max_status_polls: u32,
    state: Mutex<State>,
}

impl Bmp280 {
    /// Open the chip, verify its id, read calibration and apply
    /// `options.usage_mode`.
    ///
    /// # Errors
    /// - [`UpmError::NotInitialized`] if the bus subsystem is not live
    /// - [`UpmError::ChipIdMismatch`] if the id is neither 0x58 nor 0x60
    /// - bus and short-read errors while reading calibration
    ///
    /// Every handle opened so far is released before an error is returned.
    #[instrument(skip(subsystem), err)]
    pub fn init(
        subsystem: &BusSubsystem,
        selector: BusSelector,
        options: Bmp280Options,
    ) -> UpmResult<Self> {
        options.check()?;
        let mut bus = RegisterBus::open(subsystem, selector, SpiSettings::default())?;
        bus.pulse_chip_select(CS_PULSE)?;

        let chip_id = bus.read_reg(REG_CHIP_ID)?;
        let Some(variant) = Variant::from_chip_id(chip_id) else {
            warn!(%selector, chip_id, "Unexpected BMP280 chip id");
            return Err(UpmError::ChipIdMismatch {
                driver: "bmp280",
                expected: ACCEPTED_CHIP_IDS,
                found: chip_id,
            });
        };

        bus.modify_reg(REG_CTRL_MEAS, CTRL_MEAS_MODE_MASK, MeasureMode::Sleep.bits())?;
        let trim = read_calibration(&mut bus, variant)?;
        debug!(?trim, "Read calibration");

        let sensor = Self {
            variant,
            trim,
            max_status_polls: options.max_status_polls,
            state: Mutex::new(State {
                bus,
                mode: MeasureMode::Sleep,
                temperature: 0.0,
                pressure: 0.0,
                humidity: 0.0,
                sea_level_hpa: options.sea_level_hpa,
                temperature_adj: Adjustment::IDENTITY,
                pressure_adj: Adjustment::IDENTITY,
                humidity_adj: Adjustment::IDENTITY,
            }),
        };
        sensor.set_usage_mode(options.usage_mode)?;
        info!(%selector, ?variant, "BMP280 family sensor ready");
        Ok(sensor)
    }

    /// Release the bus handles.
    pub fn close(self) {
        debug!(variant = ?self.variant, "Closing BMP280");
    }

    /// Which part answered the chip-id probe.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Trim constants read at init.
    pub fn trim(&self) -> &TrimParameters {
        &self.trim
    }

    /// Current power mode.
    pub fn measure_mode(&self) -> MeasureMode {
        self.state.lock().mode
    }

    /// Soft reset. All registers return to their power-on values and the
    /// chip is left in sleep mode.
    #[instrument(skip(self), err)]
    pub fn reset(&self) -> UpmResult<()> {
        let mut state = self.state.lock();
        state.bus.write_reg(REG_RESET, RESET_COMMAND)?;
        state.bus.delay(RESET_DELAY);
        state.mode = MeasureMode::Sleep;
        Ok(())
    }

    /// Apply one of the datasheet presets.
    ///
    /// Cached samples are cleared; the next [`Sensor::update`] refills them.
    #[instrument(skip(self), err)]
    pub fn set_usage_mode(&self, mode: UsageMode) -> UpmResult<()> {
        let settings = mode.settings();
        let mut state = self.state.lock();
        state.clear_samples();
        state.set_measure_mode(MeasureMode::Sleep)?;
        state.write_field(
            REG_CTRL_MEAS,
            FIELD3_MASK << CTRL_MEAS_OSRS_P_SHIFT,
            settings.pressure.bits() << CTRL_MEAS_OSRS_P_SHIFT,
        )?;
        state.write_field(
            REG_CTRL_MEAS,
            FIELD3_MASK << CTRL_MEAS_OSRS_T_SHIFT,
            settings.temperature.bits() << CTRL_MEAS_OSRS_T_SHIFT,
        )?;
        if self.variant.has_humidity() {
            // ctrl_hum only takes effect after the next ctrl_meas write
            state.write_field(REG_CTRL_HUM, CTRL_HUM_OSRS_H_MASK, settings.humidity.bits())?;
        }
        state.write_field(
            REG_CONFIG,
            FIELD3_MASK << CONFIG_FILTER_SHIFT,
            settings.filter.bits() << CONFIG_FILTER_SHIFT,
        )?;
        state.set_measure_mode(settings.mode)
    }

    /// Set the power mode.
    pub fn set_measure_mode(&self, mode: MeasureMode) -> UpmResult<()> {
        self.state.lock().set_measure_mode(mode)
    }

    /// Set the IIR filter coefficient.
    pub fn set_filter(&self, filter: Filter) -> UpmResult<()> {
        self.state.lock().write_field(
            REG_CONFIG,
            FIELD3_MASK << CONFIG_FILTER_SHIFT,
            filter.bits() << CONFIG_FILTER_SHIFT,
        )
    }

    /// Set the normal-mode standby time.
    pub fn set_standby(&self, standby: Standby) -> UpmResult<()> {
        self.state.lock().write_field(
            REG_CONFIG,
            FIELD3_MASK << CONFIG_T_SB_SHIFT,
            standby.bits() << CONFIG_T_SB_SHIFT,
        )
    }

    /// Set pressure oversampling.
    pub fn set_oversampling_pressure(&self, rate: Oversampling) -> UpmResult<()> {
        self.state.lock().write_field(
            REG_CTRL_MEAS,
            FIELD3_MASK << CTRL_MEAS_OSRS_P_SHIFT,
            rate.bits() << CTRL_MEAS_OSRS_P_SHIFT,
        )
    }

    /// Set temperature oversampling.
    pub fn set_oversampling_temperature(&self, rate: Oversampling) -> UpmResult<()> {
        self.state.lock().write_field(
            REG_CTRL_MEAS,
            FIELD3_MASK << CTRL_MEAS_OSRS_T_SHIFT,
            rate.bits() << CTRL_MEAS_OSRS_T_SHIFT,
        )
    }

    /// Set humidity oversampling (BME280 only).
    pub fn set_oversampling_humidity(&self, rate: Oversampling) -> UpmResult<()> {
        if !self.variant.has_humidity() {
            return Err(UpmError::NotSupported("BMP280 has no humidity channel".into()));
        }
        let mut state = self.state.lock();
        state.write_field(REG_CTRL_HUM, CTRL_HUM_OSRS_H_MASK, rate.bits())?;
        // latch: rewrite ctrl_meas unchanged
        let ctrl_meas = state.bus.read_reg(REG_CTRL_MEAS)?;
        state.bus.write_reg(REG_CTRL_MEAS, ctrl_meas)
    }

    /// Raw STATUS register.
    pub fn status(&self) -> UpmResult<u8> {
        self.state.lock().bus.read_reg(REG_STATUS)
    }

    /// Set the sea-level reference used by [`altitude`](Self::altitude).
    pub fn set_sea_level_pressure(&self, hpa: f32) -> UpmResult<()> {
        if hpa.is_nan() || hpa <= 0.0 {
            return Err(UpmError::OutOfRange(format!("sea level pressure {hpa} hPa")));
        }
        self.state.lock().sea_level_hpa = hpa;
        Ok(())
    }

    /// Altitude in meters from the last pressure sample and the sea-level
    /// reference (NOAA pressure-altitude formula).
    pub fn altitude(&self) -> f32 {
        let state = self.state.lock();
        44307.69 * (1.0 - ((state.pressure / 100.0) / state.sea_level_hpa).powf(0.190284))
    }

    fn wait_for_conversion(&self, state: &mut State) -> UpmResult<()> {
        for _ in 0..self.max_status_polls {
            state.bus.delay(STATUS_POLL_INTERVAL);
            if state.bus.read_reg(REG_STATUS)? & STATUS_MEASURING == 0 {
                return Ok(());
            }
        }
        warn!(polls = self.max_status_polls, "BMP280 conversion did not finish");
        Err(UpmError::TimedOut(format!(
            "conversion still running after {} status polls",
            self.max_status_polls
        )))
    }
}

fn read_calibration(bus: &mut RegisterBus, variant: Variant) -> UpmResult<TrimParameters> {
    let mut block = [0u8; CALIBRATION_LEN];
    bus.read_regs(REG_CALIB00, &mut block)?;
    let trim = TrimParameters::from_registers(&block);
    if !variant.has_humidity() {
        return Ok(trim);
    }

    let h1 = bus.read_reg(REG_DIG_H1)?;
    let mut block = [0u8; HUMIDITY_CALIBRATION_LEN];
    bus.read_regs(REG_DIG_H2, &mut block)?;
    Ok(trim.with_humidity(HumidityTrim::from_registers(h1, &block)))
}

impl std::fmt::Debug for Bmp280 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Bmp280")
            .field("variant", &self.variant)
            .field("bus", &state.bus)
            .field("mode", &state.mode)
            .finish()
    }
}

// =============================================================================
// Capability tables
// =============================================================================

impl Sensor for Bmp280 {
    fn descriptor(&self) -> &'static Descriptor {
        self.variant.descriptor()
    }

    /// One measurement cycle.
    ///
    /// In forced mode this triggers a conversion and polls STATUS every
    /// 10 ms, at most `max_status_polls` times. Pressure, temperature and
    /// humidity are then read in a single block so they come from the same
    /// conversion.
    #[instrument(skip(self), err)]
    fn update(&self) -> UpmResult<()> {
        let mut state = self.state.lock();
        if state.mode == MeasureMode::Forced {
            state.set_measure_mode(MeasureMode::Forced)?;
            self.wait_for_conversion(&mut state)?;
        }

        let len = if self.variant.has_humidity() {
            BME280_DATA_LEN
        } else {
            BMP280_DATA_LEN
        };
        let mut data = [0u8; BME280_DATA_LEN];
        state.bus.read_regs(REG_PRESSURE_MSB, &mut data[..len])?;

        let adc_p = raw20([data[0], data[1], data[2]]);
        let adc_t = raw20([data[3], data[4], data[5]]);
        let (t_fine, centi_celsius) = self.trim.compensate_temperature(adc_t);
        state.temperature = centi_celsius as f32 / 100.0;
        state.pressure = (f64::from(self.trim.compensate_pressure(adc_p, t_fine)) / 256.0) as f32;
        if self.variant.has_humidity() {
            let adc_h = i32::from(u16::from_be_bytes([data[6], data[7]]));
            state.humidity = self.trim.compensate_humidity(adc_h, t_fine) as f32 / 1024.0;
        }

        debug!(
            temperature = state.temperature,
            pressure = state.pressure,
            humidity = state.humidity,
            "BMP280 sample"
        );
        Ok(())
    }
}

impl TemperatureSensor for Bmp280 {
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

impl PressureSensor for Bmp280 {
    /// Pascal.
    fn pressure(&self) -> UpmResult<f32> {
        let state = self.state.lock();
        Ok(state.pressure_adj.apply(state.pressure))
    }

    fn set_pressure_offset(&self, offset: f32) -> UpmResult<()> {
        self.state.lock().pressure_adj.offset = offset;
        Ok(())
    }

    fn set_pressure_scale(&self, scale: f32) -> UpmResult<()> {
        self.state.lock().pressure_adj.scale = scale;
        Ok(())
    }
}

impl HumiditySensor for Bmp280 {
    /// Percent relative humidity; always 0.0 on a BMP280.
    fn humidity(&self) -> UpmResult<f32> {
        if !self.variant.has_humidity() {
            return Ok(0.0);
        }
        let state = self.state.lock();
        Ok(state.humidity_adj.apply(state.humidity))
    }

    fn set_humidity_offset(&self, offset: f32) -> UpmResult<()> {
        if !self.variant.has_humidity() {
            return Err(UpmError::NotSupported("BMP280 has no humidity channel".into()));
        }
        self.state.lock().humidity_adj.offset = offset;
        Ok(())
    }

    fn set_humidity_scale(&self, scale: f32) -> UpmResult<()> {
        if !self.variant.has_humidity() {
            return Err(UpmError::NotSupported("BMP280 has no humidity channel".into()));
        }
        self.state.lock().humidity_adj.scale = scale;
        Ok(())
    }
}

/// Parse a driver config, for callers that hold raw TOML.
pub fn parse_config(config: &toml::Value) -> Result<Bmp280Config> {
    config
        .clone()
        .try_into()
        .map_err(|e| anyhow!("Invalid BMP280 config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;
    use upm_driver_mock::{chips, MockPlatform};

    #[test]
    fn variant_from_chip_id() {
        assert_eq!(Variant::from_chip_id(0x58), Some(Variant::Bmp280));
        assert_eq!(Variant::from_chip_id(0x60), Some(Variant::Bme280));
        assert_eq!(Variant::from_chip_id(0x55), None);
        assert_eq!(Variant::Bme280.descriptor().name, "bme280");
    }

    #[test]
    fn config_defaults() {
        let value: toml::Value = toml::from_str("bus = 1").unwrap();
        let cfg = parse_config(&value).unwrap();
        assert_eq!(cfg.usage_mode, UsageMode::IndoorNavigation);
        assert_eq!(cfg.max_status_polls, DEFAULT_MAX_STATUS_POLLS);
        assert_eq!(
            cfg.bus.selector(DEFAULT_I2C_ADDRESS).unwrap(),
            BusSelector::i2c(1, 0x77)
        );
    }

    #[test]
    fn config_spi_selector() {
        let value: toml::Value = toml::from_str(
            r#"
            interface = "spi"
            bus = 0
            chip_select = 9
            usage_mode = "weather_monitor"
            "#,
        )
        .unwrap();
        let cfg = parse_config(&value).unwrap();
        assert_eq!(
            cfg.bus.selector(DEFAULT_I2C_ADDRESS).unwrap(),
            BusSelector::spi(0, Some(9))
        );
        assert_eq!(cfg.usage_mode, UsageMode::WeatherMonitor);
    }

    #[test]
    fn factory_validation_rejects_bad_values() {
        let factory = Bmp280Factory;
        let zero_polls: toml::Value = toml::from_str("max_status_polls = 0").unwrap();
        assert!(factory.validate(&zero_polls).is_err());
        let wide_address: toml::Value = toml::from_str("address = 0xee").unwrap();
        assert!(factory.validate(&wide_address).is_err());
        let ok: toml::Value = toml::from_str("address = 0x76").unwrap();
        assert!(factory.validate(&ok).is_ok());
    }

    #[test]
    #[traced_test]
    fn chip_id_mismatch_is_logged() {
        let platform = MockPlatform::new();
        platform.add_i2c_device(1, 0x77, chips::bosch_sensor(0x55, 2));
        let subsystem = platform.subsystem().unwrap();

        let err = Bmp280::init(&subsystem, BusSelector::i2c(1, 0x77), Bmp280Options::default())
            .unwrap_err();
        assert!(matches!(err, UpmError::ChipIdMismatch { found: 0x55, .. }));
        assert!(logs_contain("Unexpected BMP280 chip id"));
        assert_eq!(platform.open_handles(), 0);
    }
}
