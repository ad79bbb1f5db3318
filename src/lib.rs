//! # rust-upm
//!
//! Register-level drivers for sensors and actuators, published through typed
//! capability tables.
//!
//! ## Crate Structure
//!
//! - **`upm_core`**: bus platform traits, the one-time [`BusSubsystem`]
//!   guard, the shared register helper, capability traits and
//!   [`DeviceComponents`].
//! - **`upm_driver_mock`**: a simulated bus platform with register-file chips,
//!   handle accounting and fault injection.
//! - **`upm_driver_bosch`**: BMP280/BME280 pressure, temperature and humidity.
//! - **`upm_driver_st`**: LIS2DS12 and LSM303AGR motion sensors.
//! - **`upm_driver_basic`**: LED, relay, water sensor and PWM dimmer.
//! - **`upm_hardware`**: [`DeviceRegistry`] and the hardware file loader.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! rust_upm::telemetry::init(Default::default())?;
//! let (_platform, registry) = rust_upm::create_registry_from_file(Path::new("hardware.toml"))?;
//! registry.update_all()?;
//! if let Some(t) = registry.get_temperature("weather") {
//!     println!("{} °C", t.temperature()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod telemetry;

pub use upm_core::{
    Accelerometer, BinarySensor, BusSubsystem, CapabilityTable, Category, Descriptor,
    DeviceComponents, Dimmable, DriverFactory, FactoryRegistry, HumiditySensor, Magnetometer,
    PressureSensor, Protocol, ResultCode, Sensor, Switch, TemperatureSensor, UpmError, UpmResult,
};
pub use upm_hardware::{
    load_hardware_config, populate_registry, DeviceInfo, DeviceRegistry, HardwareConfig,
};

pub use upm_driver_basic as basic;
pub use upm_driver_bosch as bosch;
pub use upm_driver_mock as mock;
pub use upm_driver_st as st;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use upm_driver_mock::MockPlatform;

/// Register every shipped driver factory.
pub fn register_all_factories(registry: &impl FactoryRegistry) {
    upm_driver_bosch::register_all(registry);
    upm_driver_st::register_all(registry);
    upm_driver_basic::register_all(registry);
}

/// Load a hardware file and create its devices on the simulated platform
/// it describes.
///
/// The platform is returned alongside the registry so callers can inspect
/// bus traffic and drive input pins.
pub fn create_registry_from_file(path: &Path) -> Result<(MockPlatform, DeviceRegistry)> {
    let config = load_hardware_config(path)?;
    let platform = config.mock_platform();
    let subsystem = platform
        .subsystem()
        .context("Failed to initialize the bus subsystem")?;

    let registry = DeviceRegistry::new(Arc::new(subsystem));
    register_all_factories(&registry);
    let created = populate_registry(&registry, &config)?;
    info!(path = %path.display(), created, "Registry ready");
    Ok((platform, registry))
}
