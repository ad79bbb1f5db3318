//! Device registry and hardware configuration for rust-upm.
//!
//! - [`registry`]: [`DeviceRegistry`], the init-by-name front end over the
//!   driver factories
//! - [`config`]: figment-based loader for hardware files
//!
//! ```rust,ignore
//! let config = load_hardware_config(Path::new("hardware.toml"))?;
//! let platform = config.mock_platform();
//! let registry = DeviceRegistry::new(Arc::new(platform.subsystem()?));
//! upm_driver_bosch::register_all(&registry);
//! populate_registry(&registry, &config)?;
//! ```

pub mod config;
pub mod registry;

pub use config::{
    load_hardware_config, load_hardware_config_from_str, populate_registry, ConfigLoadError,
    DeviceEntry, HardwareConfig,
};
pub use registry::{
    validate_device_id, DeviceId, DeviceInfo, DeviceRegistry, FactoryInfo, RegistrationFailure,
};
