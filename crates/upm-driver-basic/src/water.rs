//! Water Sensor Driver
//!
//! Exposed traces on the sensor board bridge to ground when wet, pulling the
//! GPIO input low. A dry board reads high through the pull-up.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use upm_core::{
    BinarySensor, BusSubsystem, Category, Descriptor, DeviceComponents, Direction, DriverFactory,
    GpioPin, Protocol, Sensor, UpmResult,
};

/// Descriptor of the water sensor.
pub static WATER_DESCRIPTOR: Descriptor = Descriptor {
    name: "water",
    description: "GPIO water sensor",
    protocols: &[Protocol::Gpio],
    categories: &[Category::Sensor, Category::Binary],
};

// =============================================================================
// WaterSensorFactory - DriverFactory implementation
// =============================================================================

/// Configuration for the water sensor driver
#[derive(Debug, Clone, Deserialize)]
pub struct WaterSensorConfig {
    /// GPIO pin number
    pub pin: u32,
}

/// Factory for water sensor instances.
pub struct WaterSensorFactory;

impl DriverFactory for WaterSensorFactory {
    fn driver_type(&self) -> &'static str {
        "water"
    }

    fn descriptor(&self) -> &'static Descriptor {
        &WATER_DESCRIPTOR
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let _: WaterSensorConfig = config.clone().try_into()?;
        Ok(())
    }

    fn build(&self, subsystem: &BusSubsystem, config: toml::Value) -> Result<DeviceComponents> {
        let cfg: WaterSensorConfig = config.try_into().context("Invalid water sensor config")?;
        let sensor = Arc::new(
            WaterSensor::init(subsystem, cfg.pin)
                .with_context(|| format!("Failed to initialize water sensor on gpio{}", cfg.pin))?,
        );
        Ok(DeviceComponents::new(sensor.clone()).with_binary(sensor))
    }
}

// =============================================================================
// WaterSensor
// =============================================================================

/// Water sensor device context.
pub struct WaterSensor {
    pin_number: u32,
    pin: Mutex<Box<dyn GpioPin>>,
}

impl WaterSensor {
    /// Claim `pin` as an input.
    #[instrument(skip(subsystem), err)]
    pub fn init(subsystem: &BusSubsystem, pin: u32) -> UpmResult<Self> {
        let mut gpio = subsystem.platform()?.open_gpio(pin)?;
        gpio.set_direction(Direction::In)?;
        info!(pin, "Water sensor ready");
        Ok(Self {
            pin_number: pin,
            pin: Mutex::new(gpio),
        })
    }

    /// Release the pin.
    pub fn close(self) {
        debug!(pin = self.pin_number, "Closing water sensor");
    }

    /// Whether the sensor is wet right now.
    pub fn is_wet(&self) -> UpmResult<bool> {
        Ok(!self.pin.lock().read()?)
    }
}

impl std::fmt::Debug for WaterSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaterSensor")
            .field("pin", &self.pin_number)
            .finish()
    }
}

impl Sensor for WaterSensor {
    fn descriptor(&self) -> &'static Descriptor {
        &WATER_DESCRIPTOR
    }

    /// Nothing is latched; [`BinarySensor::is_active`] samples the pin.
    fn update(&self) -> UpmResult<()> {
        Ok(())
    }
}

impl BinarySensor for WaterSensor {
    fn is_active(&self) -> UpmResult<bool> {
        self.is_wet()
    }
}
