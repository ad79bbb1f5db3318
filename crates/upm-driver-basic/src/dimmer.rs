//! PWM Dimmer Driver
//!
//! Brightness in percent maps linearly onto PWM duty cycle. Out-of-range
//! requests are clamped to 0..=100 and the applied value is returned, so
//! callers always learn what the hardware is actually doing.
//!
//! The switch capability gates the PWM output without touching the duty
//! cycle: switching off and on again restores the previous brightness.
//!
//! # Usage
//!
//! ```rust,ignore
//! use upm_driver_basic::dimmer::Dimmer;
//!
//! let dimmer = Dimmer::init(&subsystem, 3, 1000)?;
//! assert_eq!(dimmer.set_brightness(150)?, 100);
//! ```

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use upm_core::{
    BusSubsystem, Category, Descriptor, DeviceComponents, Dimmable, DriverFactory, Protocol,
    PwmPin, Sensor, Switch, UpmError, UpmResult,
};

/// Default PWM period (1 kHz).
pub const DEFAULT_PERIOD_US: u32 = 1000;

/// Maximum brightness in percent.
pub const MAX_BRIGHTNESS: u8 = 100;

/// Descriptor of the PWM dimmer.
pub static DIMMER_DESCRIPTOR: Descriptor = Descriptor {
    name: "dimmer",
    description: "PWM dimmer",
    protocols: &[Protocol::Pwm],
    categories: &[Category::Sensor, Category::Switch, Category::Dimmer],
};

/// Clamp a requested brightness to 0..=100.
pub fn clamp_brightness(percent: i32) -> u8 {
    percent.clamp(0, i32::from(MAX_BRIGHTNESS)) as u8
}

// =============================================================================
// DimmerFactory - DriverFactory implementation
// =============================================================================

/// Configuration for the dimmer driver
///
/// ```toml
/// pin = 3
/// period_us = 2000
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DimmerConfig {
    /// PWM channel
    pub pin: u32,
    /// PWM period in microseconds (default 1000)
    #[serde(default = "default_period")]
    pub period_us: u32,
}

fn default_period() -> u32 {
    DEFAULT_PERIOD_US
}

/// Factory for dimmer driver instances.
pub struct DimmerFactory;

impl DriverFactory for DimmerFactory {
    fn driver_type(&self) -> &'static str {
        "dimmer"
    }

    fn descriptor(&self) -> &'static Descriptor {
        &DIMMER_DESCRIPTOR
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: DimmerConfig = config.clone().try_into()?;
        check_period(cfg.period_us)?;
        Ok(())
    }

    fn build(&self, subsystem: &BusSubsystem, config: toml::Value) -> Result<DeviceComponents> {
        let cfg: DimmerConfig = config.try_into().context("Invalid dimmer config")?;
        let dimmer = Arc::new(
            Dimmer::init(subsystem, cfg.pin, cfg.period_us)
                .with_context(|| format!("Failed to initialize dimmer on pwm{}", cfg.pin))?,
        );
        Ok(DeviceComponents::new(dimmer.clone())
            .with_switch(dimmer.clone())
            .with_dimmer(dimmer))
    }
}

fn check_period(period_us: u32) -> UpmResult<()> {
    if period_us == 0 {
        return Err(UpmError::InvalidParameter(
            "PWM period must be non-zero".into(),
        ));
    }
    Ok(())
}

// =============================================================================
// Dimmer
// =============================================================================

struct State {
    pwm: Box<dyn PwmPin>,
    brightness: u8,
    enabled: bool,
}

/// PWM dimmer device context.
pub struct Dimmer {
    pin_number: u32,
    state: Mutex<State>,
}

impl Dimmer {
    /// Claim PWM `pin`, program `period_us` and enable the output at 0 %.
    #[instrument(skip(subsystem), err)]
    pub fn init(subsystem: &BusSubsystem, pin: u32, period_us: u32) -> UpmResult<Self> {
        check_period(period_us)?;
        let mut pwm = subsystem.platform()?.open_pwm(pin)?;
        pwm.set_period_us(period_us)?;
        pwm.set_duty_cycle(0.0)?;
        pwm.enable(true)?;
        info!(pin, period_us, "Dimmer ready");
        Ok(Self {
            pin_number: pin,
            state: Mutex::new(State {
                pwm,
                brightness: 0,
                enabled: true,
            }),
        })
    }

    /// Release the PWM channel.
    pub fn close(self) {
        debug!(pin = self.pin_number, "Closing dimmer");
    }
}

impl std::fmt::Debug for Dimmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Dimmer")
            .field("pin", &self.pin_number)
            .field("brightness", &state.brightness)
            .field("enabled", &state.enabled)
            .finish()
    }
}

impl Sensor for Dimmer {
    fn descriptor(&self) -> &'static Descriptor {
        &DIMMER_DESCRIPTOR
    }

    fn update(&self) -> UpmResult<()> {
        Ok(())
    }
}

impl Dimmable for Dimmer {
    fn set_brightness(&self, percent: i32) -> UpmResult<u8> {
        let applied = clamp_brightness(percent);
        if i32::from(applied) != percent {
            warn!(pin = self.pin_number, requested = percent, applied, "Brightness clamped");
        }
        let mut state = self.state.lock();
        state
            .pwm
            .set_duty_cycle(f32::from(applied) / f32::from(MAX_BRIGHTNESS))?;
        state.brightness = applied;
        debug!(pin = self.pin_number, brightness = applied, "Brightness set");
        Ok(applied)
    }

    fn brightness(&self) -> UpmResult<u8> {
        Ok(self.state.lock().brightness)
    }
}

impl Switch for Dimmer {
    fn set_on(&self, on: bool) -> UpmResult<()> {
        let mut state = self.state.lock();
        state.pwm.enable(on)?;
        state.enabled = on;
        Ok(())
    }

    fn is_on(&self) -> UpmResult<bool> {
        Ok(self.state.lock().enabled)
    }
}
