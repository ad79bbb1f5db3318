//! GPIO LED Driver
//!
//! One LED on a GPIO output. The pin is driven high for "on" unless the LED
//! is wired active-low (anode to the supply, cathode to the pin).
//!
//! # Usage
//!
//! ```rust,ignore
//! use upm_driver_basic::led::{Led, Polarity};
//!
//! let led = Led::init(&subsystem, 13, Polarity::ActiveHigh)?;
//! led.on()?;
//! led.toggle()?;
//! ```

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use upm_core::{
    BusSubsystem, Category, Descriptor, DeviceComponents, Direction, DriverFactory, GpioPin,
    Protocol, Sensor, Switch, UpmResult,
};

/// Descriptor of the GPIO LED.
pub static LED_DESCRIPTOR: Descriptor = Descriptor {
    name: "led",
    description: "GPIO LED",
    protocols: &[Protocol::Gpio],
    categories: &[Category::Sensor, Category::Switch],
};

/// Electrical sense of the LED pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Pin high lights the LED
    #[default]
    ActiveHigh,
    /// Pin low lights the LED
    ActiveLow,
}

impl Polarity {
    /// Pin level for the logical state `on`.
    pub fn level(self, on: bool) -> bool {
        match self {
            Polarity::ActiveHigh => on,
            Polarity::ActiveLow => !on,
        }
    }
}

// =============================================================================
// LedFactory - DriverFactory implementation
// =============================================================================

/// Configuration for the LED driver
///
/// ```toml
/// pin = 13
/// polarity = "active_low"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LedConfig {
    /// GPIO pin number
    pub pin: u32,
    /// Pin polarity (default active-high)
    #[serde(default)]
    pub polarity: Polarity,
}

/// Factory for LED driver instances.
pub struct LedFactory;

impl DriverFactory for LedFactory {
    fn driver_type(&self) -> &'static str {
        "led"
    }

    fn descriptor(&self) -> &'static Descriptor {
        &LED_DESCRIPTOR
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let _: LedConfig = config.clone().try_into()?;
        Ok(())
    }

    fn build(&self, subsystem: &BusSubsystem, config: toml::Value) -> Result<DeviceComponents> {
        let cfg: LedConfig = config.try_into().context("Invalid LED config")?;
        let led = Arc::new(
            Led::init(subsystem, cfg.pin, cfg.polarity)
                .with_context(|| format!("Failed to initialize LED on gpio{}", cfg.pin))?,
        );
        Ok(DeviceComponents::new(led.clone()).with_switch(led))
    }
}

// =============================================================================
// Led
// =============================================================================

struct State {
    pin: Box<dyn GpioPin>,
    on: bool,
}

/// GPIO LED device context.
pub struct Led {
    pin_number: u32,
    polarity: Polarity,
    state: Mutex<State>,
}

impl Led {
    /// Claim `pin` as an output and switch the LED off.
    #[instrument(skip(subsystem), err)]
    pub fn init(subsystem: &BusSubsystem, pin: u32, polarity: Polarity) -> UpmResult<Self> {
        let mut gpio = subsystem.platform()?.open_gpio(pin)?;
        gpio.set_direction(Direction::Out)?;
        gpio.write(polarity.level(false))?;
        info!(pin, ?polarity, "LED ready");
        Ok(Self {
            pin_number: pin,
            polarity,
            state: Mutex::new(State {
                pin: gpio,
                on: false,
            }),
        })
    }

    /// Release the pin.
    pub fn close(self) {
        debug!(pin = self.pin_number, "Closing LED");
    }

    /// Light the LED.
    pub fn on(&self) -> UpmResult<()> {
        self.set_on(true)
    }

    /// Switch the LED off.
    pub fn off(&self) -> UpmResult<()> {
        self.set_on(false)
    }

    /// Configured polarity.
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }
}

impl std::fmt::Debug for Led {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Led")
            .field("pin", &self.pin_number)
            .field("polarity", &self.polarity)
            .field("on", &self.state.lock().on)
            .finish()
    }
}

impl Sensor for Led {
    fn descriptor(&self) -> &'static Descriptor {
        &LED_DESCRIPTOR
    }

    fn update(&self) -> UpmResult<()> {
        Ok(())
    }
}

impl Switch for Led {
    fn set_on(&self, on: bool) -> UpmResult<()> {
        let mut state = self.state.lock();
        state.pin.write(self.polarity.level(on))?;
        state.on = on;
        debug!(pin = self.pin_number, on, "LED switched");
        Ok(())
    }

    /// Last state written; the pin is not read back.
    fn is_on(&self) -> UpmResult<bool> {
        Ok(self.state.lock().on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polarity_inverts_level() {
        assert!(Polarity::ActiveHigh.level(true));
        assert!(!Polarity::ActiveLow.level(true));
        assert!(Polarity::ActiveLow.level(false));
    }

    #[test]
    fn test_factory_validate_config() {
        let ok: toml::Value = toml::from_str("pin = 4\npolarity = \"active_low\"").unwrap();
        assert!(LedFactory.validate(&ok).is_ok());

        let missing_pin: toml::Value = toml::from_str("polarity = \"active_high\"").unwrap();
        assert!(LedFactory.validate(&missing_pin).is_err());
    }
}
