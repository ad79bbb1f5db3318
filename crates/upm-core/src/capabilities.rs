//! Capability traits.
//!
//! Each trait is one capability table. A driver implements the traits for
//! the capabilities it has and publishes them through
//! [`DeviceComponents`](crate::driver::DeviceComponents); generic code holds
//! `Arc<dyn Trait>` and never needs to know the concrete driver type.
//!
//! # Design
//!
//! - **Synchronous**: every call blocks for the duration of the bus
//!   transaction, including fixed settling delays.
//! - **`&self` + interior mutability**: drivers keep their state behind a
//!   mutex, so calls from several threads serialise instead of interleaving
//!   transactions on one device.
//! - **Optional operations** have default bodies returning
//!   [`UpmError::NotImplemented`]; a driver overrides only what it supports.
//! - **Getters read cached state**: `temperature()`, `pressure()`, etc.
//!   return the value computed by the last [`Sensor::update`] and do not touch
//!   the bus. Before the first update they return zero.

use crate::descriptor::Descriptor;
use crate::error::{UpmError, UpmResult};

/// Linear correction applied to a reported value: `raw * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    /// Additive offset, applied after scaling
    pub offset: f32,
    /// Multiplicative scale
    pub scale: f32,
}

impl Adjustment {
    /// Identity correction.
    pub const IDENTITY: Adjustment = Adjustment {
        offset: 0.0,
        scale: 1.0,
    };

    /// Apply the correction.
    pub fn apply(&self, raw: f32) -> f32 {
        raw * self.scale + self.offset
    }
}

impl Default for Adjustment {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Generic sensor table: introspection and the measurement cycle.
pub trait Sensor: Send + Sync {
    /// Static descriptor of the driver.
    fn descriptor(&self) -> &'static Descriptor;

    /// Run one measurement cycle and refresh cached values.
    fn update(&self) -> UpmResult<()>;
}

/// Temperature in degrees Celsius.
pub trait TemperatureSensor: Send + Sync {
    /// Temperature from the last update.
    fn temperature(&self) -> UpmResult<f32>;

    /// Set the additive offset applied to reported temperatures.
    fn set_temperature_offset(&self, _offset: f32) -> UpmResult<()> {
        Err(UpmError::NotImplemented("set_temperature_offset"))
    }

    /// Set the scale applied to reported temperatures.
    fn set_temperature_scale(&self, _scale: f32) -> UpmResult<()> {
        Err(UpmError::NotImplemented("set_temperature_scale"))
    }
}

/// Pressure in pascal.
pub trait PressureSensor: Send + Sync {
    /// Pressure from the last update.
    fn pressure(&self) -> UpmResult<f32>;

    /// Set the additive offset applied to reported pressures.
    fn set_pressure_offset(&self, _offset: f32) -> UpmResult<()> {
        Err(UpmError::NotImplemented("set_pressure_offset"))
    }

    /// Set the scale applied to reported pressures.
    fn set_pressure_scale(&self, _scale: f32) -> UpmResult<()> {
        Err(UpmError::NotImplemented("set_pressure_scale"))
    }
}

/// Relative humidity in percent.
pub trait HumiditySensor: Send + Sync {
    /// Humidity from the last update.
    fn humidity(&self) -> UpmResult<f32>;

    /// Set the additive offset applied to reported humidity.
    fn set_humidity_offset(&self, _offset: f32) -> UpmResult<()> {
        Err(UpmError::NotImplemented("set_humidity_offset"))
    }

    /// Set the scale applied to reported humidity.
    fn set_humidity_scale(&self, _scale: f32) -> UpmResult<()> {
        Err(UpmError::NotImplemented("set_humidity_scale"))
    }
}

/// Three-axis acceleration in g.
pub trait Accelerometer: Send + Sync {
    /// `[x, y, z]` from the last update.
    fn acceleration(&self) -> UpmResult<[f32; 3]>;

    /// Set per-axis offsets in g.
    fn set_acceleration_offset(&self, _offset: [f32; 3]) -> UpmResult<()> {
        Err(UpmError::NotImplemented("set_acceleration_offset"))
    }

    /// Set per-axis scale factors.
    fn set_acceleration_scale(&self, _scale: [f32; 3]) -> UpmResult<()> {
        Err(UpmError::NotImplemented("set_acceleration_scale"))
    }
}

/// Three-axis magnetic field in microtesla.
pub trait Magnetometer: Send + Sync {
    /// `[x, y, z]` from the last update.
    fn magnetic_field(&self) -> UpmResult<[f32; 3]>;
}

/// On/off actuator.
pub trait Switch: Send + Sync {
    /// Turn the output on or off.
    fn set_on(&self, on: bool) -> UpmResult<()>;

    /// Current output state.
    fn is_on(&self) -> UpmResult<bool>;

    /// Invert the output state; returns the new state.
    fn toggle(&self) -> UpmResult<bool> {
        let next = !self.is_on()?;
        self.set_on(next)?;
        Ok(next)
    }
}

/// Two-state input (wet/dry, present/absent).
pub trait BinarySensor: Send + Sync {
    /// Whether the sensed condition is present.
    fn is_active(&self) -> UpmResult<bool>;
}

/// Brightness control in percent.
pub trait Dimmable: Send + Sync {
    /// Set brightness. Inputs outside `0..=100` are clamped; the applied
    /// value is returned.
    fn set_brightness(&self, percent: i32) -> UpmResult<u8>;

    /// Currently applied brightness.
    fn brightness(&self) -> UpmResult<u8>;
}
