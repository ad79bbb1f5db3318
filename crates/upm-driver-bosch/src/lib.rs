//! Bosch barometric sensor drivers for rust-upm.
//!
//! This crate provides one driver for two parts sharing a register map:
//! - BMP280 digital pressure sensor (temperature, pressure)
//! - BME280 combined humidity and pressure sensor
//!
//! # Usage
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! upm-driver-bosch = { path = "../upm-driver-bosch" }
//! ```
//!
//! Register the factory with your device registry:
//!
//! ```rust,ignore
//! use upm_driver_bosch::register_all;
//!
//! register_all(&registry);
//! ```

pub mod bmp280;
pub mod compensation;
pub mod registers;

pub use bmp280::{Bmp280, Bmp280Config, Bmp280Factory, Bmp280Options, Variant};
pub use registers::{Filter, MeasureMode, Oversampling, Standby, UsageMode};

use upm_core::FactoryRegistry;

/// Force the linker to include this crate.
///
/// Call this function from main() to ensure the driver factories are
/// linked into the final binary and not stripped by the linker.
#[inline(never)]
pub fn link() {
    std::hint::black_box(std::any::TypeId::of::<Bmp280Factory>());
}

/// Register the Bosch driver factories with a device registry.
pub fn register_all(registry: &impl FactoryRegistry) {
    registry.register_factory(Box::new(Bmp280Factory));
}
