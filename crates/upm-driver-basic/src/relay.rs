//! GPIO Relay Driver
//!
//! A relay coil driven from a GPIO output, high = energised (closed).
//! Unlike the LED, the relay state is read back from the pin, so it reflects
//! whatever last drove the line.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use upm_core::{
    BusSubsystem, Category, Descriptor, DeviceComponents, Direction, DriverFactory, GpioPin,
    Protocol, Sensor, Switch, UpmResult,
};

/// Descriptor of the GPIO relay.
pub static RELAY_DESCRIPTOR: Descriptor = Descriptor {
    name: "relay",
    description: "GPIO relay",
    protocols: &[Protocol::Gpio],
    categories: &[Category::Sensor, Category::Switch],
};

// =============================================================================
// RelayFactory - DriverFactory implementation
// =============================================================================

/// Configuration for the relay driver
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// GPIO pin number
    pub pin: u32,
}

/// Factory for relay driver instances.
pub struct RelayFactory;

impl DriverFactory for RelayFactory {
    fn driver_type(&self) -> &'static str {
        "relay"
    }

    fn descriptor(&self) -> &'static Descriptor {
        &RELAY_DESCRIPTOR
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let _: RelayConfig = config.clone().try_into()?;
        Ok(())
    }

    fn build(&self, subsystem: &BusSubsystem, config: toml::Value) -> Result<DeviceComponents> {
        let cfg: RelayConfig = config.try_into().context("Invalid relay config")?;
        let relay = Arc::new(
            Relay::init(subsystem, cfg.pin)
                .with_context(|| format!("Failed to initialize relay on gpio{}", cfg.pin))?,
        );
        Ok(DeviceComponents::new(relay.clone()).with_switch(relay))
    }
}

// =============================================================================
// Relay
// =============================================================================

/// GPIO relay device context.
pub struct Relay {
    pin_number: u32,
    pin: Mutex<Box<dyn GpioPin>>,
}

impl Relay {
    /// Claim `pin` as an output and open the relay.
    #[instrument(skip(subsystem), err)]
    pub fn init(subsystem: &BusSubsystem, pin: u32) -> UpmResult<Self> {
        let mut gpio = subsystem.platform()?.open_gpio(pin)?;
        gpio.set_direction(Direction::Out)?;
        gpio.write(false)?;
        info!(pin, "Relay ready");
        Ok(Self {
            pin_number: pin,
            pin: Mutex::new(gpio),
        })
    }

    /// Release the pin.
    pub fn close(self) {
        debug!(pin = self.pin_number, "Closing relay");
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("pin", &self.pin_number)
            .finish()
    }
}

impl Sensor for Relay {
    fn descriptor(&self) -> &'static Descriptor {
        &RELAY_DESCRIPTOR
    }

    fn update(&self) -> UpmResult<()> {
        Ok(())
    }
}

impl Switch for Relay {
    fn set_on(&self, on: bool) -> UpmResult<()> {
        self.pin.lock().write(on)?;
        debug!(pin = self.pin_number, on, "Relay switched");
        Ok(())
    }

    fn is_on(&self) -> UpmResult<bool> {
        Ok(self.pin.lock().read()?)
    }
}
