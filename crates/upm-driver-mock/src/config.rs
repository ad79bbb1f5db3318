//! Declarative simulated platform.
//!
//! Lets a hardware TOML file describe the simulated bus alongside the
//! devices that will be opened on it:
//!
//! ```toml
//! [platform]
//! mode = "instant"
//! seed = 7
//!
//! [[platform.i2c]]
//! bus = 1
//! address = 0x77
//! chip = "bme280"
//!
//! [[platform.gpio_inputs]]
//! pin = 5
//! high = false
//! ```

use crate::chips;
use crate::common::{FaultConfig, MockMode, MockRng};
use crate::device::MockRegisterDevice;
use crate::platform::MockPlatform;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Simulated chip model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockChip {
    /// Bosch BMP280
    Bmp280,
    /// Bosch BME280
    Bme280,
    /// ST LIS2DS12
    Lis2ds12,
    /// ST LSM303AGR accelerometer half
    Lsm303agrAccel,
    /// ST LSM303AGR magnetometer half
    Lsm303agrMag,
    /// Deterministic per-address pattern
    Patterned,
    /// Seeded random register image
    Random,
}

impl MockChip {
    fn device(self, rng: &MockRng) -> MockRegisterDevice {
        match self {
            MockChip::Bmp280 => chips::bmp280(),
            MockChip::Bme280 => chips::bme280(),
            MockChip::Lis2ds12 => chips::lis2ds12(),
            MockChip::Lsm303agrAccel => chips::lsm303agr_accel(),
            MockChip::Lsm303agrMag => chips::lsm303agr_mag(),
            MockChip::Patterned => MockRegisterDevice::patterned(rng.next_u8()),
            MockChip::Random => MockRegisterDevice::random(rng),
        }
    }
}

/// Register chip on an I2C bus.
#[derive(Debug, Clone, Deserialize)]
pub struct MockI2cEntry {
    /// Bus number
    #[serde(default)]
    pub bus: u32,
    /// 7-bit address
    pub address: u8,
    /// Chip model
    pub chip: MockChip,
}

/// Register chip on an SPI bus.
#[derive(Debug, Clone, Deserialize)]
pub struct MockSpiEntry {
    /// Bus number
    #[serde(default)]
    pub bus: u32,
    /// Chip-select GPIO, absent for hardware chip select
    #[serde(default)]
    pub chip_select: Option<u32>,
    /// Chip model
    pub chip: MockChip,
}

/// Level of an input pin.
#[derive(Debug, Clone, Deserialize)]
pub struct MockPinLevel {
    /// Pin number
    pub pin: u32,
    /// Level
    pub high: bool,
}

/// Raw value of an analog input.
#[derive(Debug, Clone, Deserialize)]
pub struct MockAnalogLevel {
    /// Pin number
    pub pin: u32,
    /// Raw ADC value
    pub value: u16,
}

/// Full simulated platform description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MockPlatformConfig {
    /// Timing mode
    pub mode: MockMode,
    /// RNG seed for patterned/random chips and random faults
    pub seed: Option<u64>,
    /// Uniform random failure rate for all transfers
    pub failure_rate: f64,
    /// I2C chips
    pub i2c: Vec<MockI2cEntry>,
    /// SPI chips
    pub spi: Vec<MockSpiEntry>,
    /// Input pin levels
    pub gpio_inputs: Vec<MockPinLevel>,
    /// Analog input values
    pub analog: Vec<MockAnalogLevel>,
}

impl MockPlatform {
    /// Build a platform from a parsed description.
    pub fn from_config(config: &MockPlatformConfig) -> Self {
        let faults = if config.failure_rate > 0.0 {
            FaultConfig::random_failures_seeded(config.failure_rate, config.seed)
        } else {
            FaultConfig::none()
        };
        let platform = MockPlatform::with_options(config.mode, faults);
        let rng = MockRng::new(config.seed);
        for entry in &config.i2c {
            platform.add_i2c_device(entry.bus, entry.address, entry.chip.device(&rng));
        }
        for entry in &config.spi {
            platform.add_spi_device(entry.bus, entry.chip_select, entry.chip.device(&rng));
        }
        for level in &config.gpio_inputs {
            platform.set_gpio_input(level.pin, level.high);
        }
        for level in &config.analog {
            platform.set_analog(level.pin, level.value);
        }
        info!(
            i2c = config.i2c.len(),
            spi = config.spi.len(),
            "Built mock platform from config"
        );
        platform
    }

    /// Build a platform from a TOML table.
    pub fn from_toml(value: toml::Value) -> Result<Self> {
        let config: MockPlatformConfig = value
            .try_into()
            .context("Invalid mock platform configuration")?;
        Ok(Self::from_config(&config))
    }
}
