//! Hardware configuration loading.
//!
//! A hardware file lists the devices to create by driver type, plus an
//! optional `[platform]` table describing the simulated bus:
//!
//! ```toml
//! [platform]
//! seed = 7
//! i2c = [{ bus = 1, address = 0x76, chip = "bme280" }]
//!
//! [[devices]]
//! id = "weather"
//! name = "Rooftop BME280"
//! type = "bmp280"
//! [devices.config]
//! bus = 1
//! address = 0x76
//! usage_mode = "weather_monitor"
//! ```
//!
//! Values can be overridden from the environment with the `UPM_` prefix and
//! `__` as the key separator, e.g. `UPM_PLATFORM__SEED=11`.

use crate::registry::{validate_device_id, DeviceRegistry, RegistrationFailure};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use serde_valid::Validate;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};
use upm_driver_mock::{MockPlatform, MockPlatformConfig};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "UPM_";

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Parse error (invalid TOML or wrong shape)
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Cross-entry validation error
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Schema validation error
    #[error("Schema validation failed:\n{0}")]
    SchemaValidationError(String),
}

/// One device entry of a hardware file.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeviceEntry {
    /// Registry id
    #[validate(min_length = 1)]
    #[validate(max_length = 64)]
    pub id: String,

    /// Human-readable name (defaults to the driver name)
    #[serde(default)]
    pub name: Option<String>,

    /// Driver type, e.g. "bmp280"
    #[serde(rename = "type")]
    #[validate(min_length = 1)]
    pub driver_type: String,

    /// Driver-specific configuration handed to the factory
    #[serde(default = "empty_table")]
    pub config: toml::Value,
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

/// Contents of a hardware file.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct HardwareConfig {
    /// Simulated platform description
    #[serde(default)]
    pub platform: Option<MockPlatformConfig>,

    /// Devices to create
    #[serde(default)]
    #[validate]
    pub devices: Vec<DeviceEntry>,
}

impl HardwareConfig {
    /// Build the simulated platform this file describes.
    ///
    /// A file without a `[platform]` table gets an empty platform.
    pub fn mock_platform(&self) -> MockPlatform {
        match &self.platform {
            Some(platform) => MockPlatform::from_config(platform),
            None => MockPlatform::new(),
        }
    }

    fn check(self) -> Result<Self> {
        if let Err(errors) = self.validate() {
            let error_messages: Vec<String> =
                errors.to_string().lines().map(|s| s.to_string()).collect();
            return Err(ConfigLoadError::SchemaValidationError(error_messages.join("\n")).into());
        }

        let mut seen = HashSet::new();
        let mut problems = Vec::new();
        for entry in &self.devices {
            if let Err(err) = validate_device_id(&entry.id) {
                problems.push(err.to_string());
            }
            if !seen.insert(entry.id.as_str()) {
                problems.push(format!("Duplicate device id '{}'", entry.id));
            }
        }
        if !problems.is_empty() {
            return Err(ConfigLoadError::ValidationError(problems.join("\n")).into());
        }
        Ok(self)
    }
}

/// Load a hardware file, applying `UPM_` environment overrides.
///
/// 1. Checks the file exists
/// 2. Merges the TOML file and the environment with figment
/// 3. Runs schema validation and the id checks
pub fn load_hardware_config(path: &Path) -> Result<HardwareConfig> {
    if !path.exists() {
        return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
    }

    debug!("Loading hardware config from: {}", path.display());

    let figment = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: HardwareConfig = figment
        .extract()
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    let config = config.check()?;
    info!(
        path = %path.display(),
        devices = config.devices.len(),
        "Loaded hardware config"
    );
    Ok(config)
}

/// Parse a hardware config from a TOML string (no environment overrides).
pub fn load_hardware_config_from_str(content: &str) -> Result<HardwareConfig> {
    let config: HardwareConfig =
        toml::from_str(content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
    config.check()
}

/// Create every device of `config` in `registry`.
///
/// All entries are validated first and any invalid entry fails the whole
/// call before a bus is touched. Build failures afterwards are recorded with
/// [`DeviceRegistry::record_registration_failure`] and skipped.
///
/// Returns the number of devices created.
pub fn populate_registry(registry: &DeviceRegistry, config: &HardwareConfig) -> Result<usize> {
    for entry in &config.devices {
        registry.validate(&entry.driver_type, &entry.config).with_context(|| {
            format!(
                "Device '{}' ({}) failed validation",
                entry.id, entry.driver_type
            )
        })?;
    }

    let mut created = 0;
    for entry in &config.devices {
        let result = match &entry.name {
            Some(name) => {
                registry.create_named(&entry.id, name, &entry.driver_type, entry.config.clone())
            }
            None => registry.create(&entry.id, &entry.driver_type, entry.config.clone()),
        };
        match result {
            Ok(_) => created += 1,
            Err(err) => registry.record_registration_failure(RegistrationFailure {
                device_id: entry.id.clone(),
                driver_type: entry.driver_type.clone(),
                error: format!("{err:#}"),
            }),
        }
    }

    let failed = config.devices.len() - created;
    if failed > 0 {
        warn!(created, failed, "Some devices failed to register");
    } else {
        info!(created, "All configured devices registered");
    }
    Ok(created)
}
