//! Device Registry
//!
//! Central hub for driver factories and the devices built from them. Devices
//! are created by driver type name, held by id, and reached either through
//! a typed accessor (`get_temperature`, `get_switch`, ...) or through
//! [`DeviceRegistry::table`] with a [`Category`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     DeviceRegistry                       │
//! │  factories: "bmp280" → Bmp280Factory, "led" → LedFactory │
//! │  devices:   "weather" → DeviceComponents { sensor, ... } │
//! ├──────────────────────────────────────────────────────────┤
//! │                    BusSubsystem                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let registry = DeviceRegistry::new(Arc::new(subsystem));
//! upm_driver_bosch::register_all(&registry);
//!
//! let config: toml::Value = toml::from_str("bus = 1\naddress = 0x76")?;
//! registry.create("weather", "bmp280", config)?;
//!
//! registry.update_all()?;
//! let t = registry.get_temperature("weather").unwrap().temperature()?;
//! ```
//!
//! All methods take `&self`; the maps are [`DashMap`]s, so the registry can
//! be shared as `Arc<DeviceRegistry>` without an outer lock.

use anyhow::{anyhow, bail, Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use upm_core::{
    Accelerometer, BinarySensor, BusSubsystem, CapabilityTable, Category, Descriptor,
    DeviceComponents, Dimmable, DriverFactory, FactoryRegistry, HumiditySensor, Magnetometer,
    PressureSensor, Sensor, Switch, TemperatureSensor, UpmError,
};

/// Unique identifier for a registered device
///
/// Format: lowercase alphanumeric with underscores or dashes (e.g. "weather",
/// "compass_2").
pub type DeviceId = String;

/// Check that `id` is a usable device identifier.
pub fn validate_device_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("Device id must not be empty");
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
    {
        bail!("Device id '{id}' contains invalid character '{c}'");
    }
    Ok(())
}

// =============================================================================
// Device Info (for introspection)
// =============================================================================

/// Information about a registered device (returned by list operations)
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Unique identifier
    pub id: DeviceId,
    /// Human-readable name
    pub name: String,
    /// Driver type name (e.g., "bmp280", "led")
    pub driver_type: String,
    /// Descriptor of the driver instance
    pub descriptor: &'static Descriptor,
    /// Capability tables this device publishes
    pub capabilities: Vec<Category>,
}

/// Information about a registered driver factory
#[derive(Debug, Clone)]
pub struct FactoryInfo {
    /// The driver_type string this factory handles
    pub driver_type: String,
    /// Human-readable factory name
    pub name: String,
    /// Capability tables the driver publishes
    pub capabilities: Vec<Category>,
}

/// Information about a failed device registration
#[derive(Debug, Clone)]
pub struct RegistrationFailure {
    /// Device ID that failed to register
    pub device_id: String,
    /// Driver type that failed
    pub driver_type: String,
    /// Error message describing the failure
    pub error: String,
}

struct RegisteredDevice {
    name: String,
    driver_type: String,
    components: DeviceComponents,
}

impl RegisteredDevice {
    fn info(&self, id: &str) -> DeviceInfo {
        DeviceInfo {
            id: id.to_string(),
            name: self.name.clone(),
            driver_type: self.driver_type.clone(),
            descriptor: self.components.descriptor(),
            capabilities: self.components.capabilities(),
        }
    }
}

// =============================================================================
// Device Registry
// =============================================================================

/// Central registry for driver factories and device instances
pub struct DeviceRegistry {
    subsystem: Arc<BusSubsystem>,

    /// Registered devices by ID
    devices: DashMap<DeviceId, RegisteredDevice>,

    /// Registered driver factories by driver_type
    factories: DashMap<String, Box<dyn DriverFactory>>,

    /// Failures recorded by bulk loading
    registration_failures: DashMap<DeviceId, RegistrationFailure>,
}

impl DeviceRegistry {
    /// Create an empty registry whose devices are opened on `subsystem`.
    pub fn new(subsystem: Arc<BusSubsystem>) -> Self {
        Self {
            subsystem,
            devices: DashMap::new(),
            factories: DashMap::new(),
            registration_failures: DashMap::new(),
        }
    }

    /// The subsystem devices are opened on.
    pub fn subsystem(&self) -> &Arc<BusSubsystem> {
        &self.subsystem
    }

    // =========================================================================
    // Driver Factory Management
    // =========================================================================

    /// Register a driver factory for its driver type.
    ///
    /// Returns the factory previously registered for the same type, if any.
    pub fn register_factory(
        &self,
        factory: Box<dyn DriverFactory>,
    ) -> Option<Box<dyn DriverFactory>> {
        let driver_type = factory.driver_type().to_string();
        info!(
            driver_type = %driver_type,
            name = %factory.name(),
            capabilities = ?factory.capabilities(),
            "Registering driver factory"
        );
        self.factories.insert(driver_type, factory)
    }

    /// Unregister a driver factory by driver type.
    pub fn unregister_factory(&self, driver_type: &str) -> Option<Box<dyn DriverFactory>> {
        self.factories
            .remove(driver_type)
            .map(|(_, factory)| factory)
    }

    /// Check if a factory is registered for a driver type.
    pub fn has_factory(&self, driver_type: &str) -> bool {
        self.factories.contains_key(driver_type)
    }

    /// All registered driver types, sorted.
    pub fn factory_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        types
    }

    /// Factory information for introspection.
    pub fn factory_info(&self, driver_type: &str) -> Option<FactoryInfo> {
        self.factories.get(driver_type).map(|entry| {
            let factory = entry.value();
            FactoryInfo {
                driver_type: factory.driver_type().to_string(),
                name: factory.name().to_string(),
                capabilities: factory.capabilities().to_vec(),
            }
        })
    }

    /// Validate `config` against the factory for `driver_type` without
    /// touching the bus.
    pub fn validate(&self, driver_type: &str, config: &toml::Value) -> Result<()> {
        let factory = self.factory(driver_type)?;
        factory
            .validate(config)
            .with_context(|| format!("Invalid configuration for driver '{driver_type}'"))
    }

    fn factory(
        &self,
        driver_type: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, Box<dyn DriverFactory>>> {
        self.factories.get(driver_type).ok_or_else(|| {
            anyhow!(
                "No factory registered for driver_type '{}'. Available factories: {:?}",
                driver_type,
                self.factory_types()
            )
        })
    }

    // =========================================================================
    // Device Lifecycle
    // =========================================================================

    /// Create a device by driver type name, using the factory name as the
    /// device name.
    pub fn create(&self, id: &str, driver_type: &str, config: toml::Value) -> Result<DeviceInfo> {
        let name = self.factory(driver_type)?.name().to_string();
        self.create_named(id, &name, driver_type, config)
    }

    /// Create a device by driver type name.
    ///
    /// 1. Rejects a duplicate or malformed id
    /// 2. Looks up the factory for `driver_type`
    /// 3. Validates `config` (no bus access)
    /// 4. Builds the device on the registry's subsystem
    ///
    /// On any failure nothing is registered and no handle stays open.
    pub fn create_named(
        &self,
        id: &str,
        name: &str,
        driver_type: &str,
        config: toml::Value,
    ) -> Result<DeviceInfo> {
        validate_device_id(id)?;
        if self.devices.contains_key(id) {
            bail!("Device '{id}' is already registered");
        }

        let components = {
            let factory = self.factory(driver_type)?;
            factory.validate(&config).with_context(|| {
                format!("Configuration validation failed for device '{id}' ({driver_type})")
            })?;
            info!(device_id = %id, device_name = %name, driver_type = %driver_type, "Building device from factory");
            factory
                .build(&self.subsystem, config)
                .with_context(|| format!("Factory build failed for device '{id}' ({driver_type})"))?
        };

        let registered = RegisteredDevice {
            name: name.to_string(),
            driver_type: driver_type.to_string(),
            components,
        };
        let info = registered.info(id);
        match self.devices.entry(id.to_string()) {
            Entry::Occupied(_) => bail!("Device '{id}' is already registered"),
            Entry::Vacant(slot) => {
                slot.insert(registered);
            }
        }
        info!(device_id = %id, capabilities = ?info.capabilities, "Device registered");
        Ok(info)
    }

    /// Remove a device. Its handles are released once every table handed
    /// out for it has been dropped.
    ///
    /// Returns true if the device was found.
    pub fn unregister(&self, id: &str) -> bool {
        match self.devices.remove(id) {
            Some((_, device)) => {
                info!(device_id = %id, driver_type = %device.driver_type, "Device unregistered");
                true
            }
            None => false,
        }
    }

    /// Remove every device.
    pub fn clear(&self) {
        let count = self.devices.len();
        self.devices.clear();
        debug!(count, "Cleared device registry");
    }

    /// Run `update` on every device.
    ///
    /// All devices are attempted; failures are collected into one error.
    pub fn update_all(&self) -> Result<()> {
        let sensors: Vec<(DeviceId, Arc<dyn Sensor>)> = self
            .devices
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().components.sensor.clone()))
            .collect();

        let mut failures = Vec::new();
        for (id, sensor) in sensors {
            if let Err(err) = sensor.update() {
                warn!(device_id = %id, error = %err, "Device update failed");
                failures.push(format!("{id}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort();
            bail!(
                "{} device(s) failed to update:\n  - {}",
                failures.len(),
                failures.join("\n  - ")
            )
        }
    }

    /// Run `update` on one device.
    pub fn update(&self, id: &str) -> Result<(), UpmError> {
        let sensor = self
            .get_sensor(id)
            .ok_or_else(|| UpmError::InvalidParameter(format!("unknown device '{id}'")))?;
        sensor.update()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// List all registered devices, sorted by id
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self
            .devices
            .iter()
            .map(|entry| entry.value().info(entry.key()))
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Get device info by ID
    pub fn get_device_info(&self, id: &str) -> Option<DeviceInfo> {
        self.devices.get(id).map(|d| d.info(id))
    }

    /// Check if a device is registered
    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Get count of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Ids of all devices publishing `category`, sorted
    pub fn devices_with_capability(&self, category: Category) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|entry| entry.value().components.table(category).is_some())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Record a registration failure from bulk loading.
    pub fn record_registration_failure(&self, failure: RegistrationFailure) {
        warn!(
            device_id = %failure.device_id,
            driver_type = %failure.driver_type,
            error = %failure.error,
            "Device registration failed"
        );
        self.registration_failures
            .insert(failure.device_id.clone(), failure);
    }

    /// All recorded registration failures
    pub fn list_registration_failures(&self) -> Vec<RegistrationFailure> {
        self.registration_failures
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    // =========================================================================
    // Capability Access
    // =========================================================================

    /// Capability table of a device by category
    pub fn table(&self, id: &str, category: Category) -> Option<CapabilityTable> {
        self.devices
            .get(id)
            .and_then(|d| d.components.table(category))
    }

    /// Generic sensor table of a device
    pub fn get_sensor(&self, id: &str) -> Option<Arc<dyn Sensor>> {
        self.devices.get(id).map(|d| d.components.sensor.clone())
    }

    /// Get a device as TemperatureSensor (if it supports this capability)
    pub fn get_temperature(&self, id: &str) -> Option<Arc<dyn TemperatureSensor>> {
        self.devices
            .get(id)
            .and_then(|d| d.components.temperature.clone())
    }

    /// Get a device as PressureSensor (if it supports this capability)
    pub fn get_pressure(&self, id: &str) -> Option<Arc<dyn PressureSensor>> {
        self.devices
            .get(id)
            .and_then(|d| d.components.pressure.clone())
    }

    /// Get a device as HumiditySensor (if it supports this capability)
    pub fn get_humidity(&self, id: &str) -> Option<Arc<dyn HumiditySensor>> {
        self.devices
            .get(id)
            .and_then(|d| d.components.humidity.clone())
    }

    /// Get a device as Accelerometer (if it supports this capability)
    pub fn get_accelerometer(&self, id: &str) -> Option<Arc<dyn Accelerometer>> {
        self.devices
            .get(id)
            .and_then(|d| d.components.accelerometer.clone())
    }

    /// Get a device as Magnetometer (if it supports this capability)
    pub fn get_magnetometer(&self, id: &str) -> Option<Arc<dyn Magnetometer>> {
        self.devices
            .get(id)
            .and_then(|d| d.components.magnetometer.clone())
    }

    /// Get a device as Switch (if it supports this capability)
    pub fn get_switch(&self, id: &str) -> Option<Arc<dyn Switch>> {
        self.devices
            .get(id)
            .and_then(|d| d.components.switch.clone())
    }

    /// Get a device as BinarySensor (if it supports this capability)
    pub fn get_binary(&self, id: &str) -> Option<Arc<dyn BinarySensor>> {
        self.devices
            .get(id)
            .and_then(|d| d.components.binary.clone())
    }

    /// Get a device as Dimmable (if it supports this capability)
    pub fn get_dimmer(&self, id: &str) -> Option<Arc<dyn Dimmable>> {
        self.devices
            .get(id)
            .and_then(|d| d.components.dimmer.clone())
    }
}

impl FactoryRegistry for DeviceRegistry {
    fn register_factory(&self, factory: Box<dyn DriverFactory>) {
        DeviceRegistry::register_factory(self, factory);
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("subsystem", &self.subsystem)
            .field("factories", &self.factory_types())
            .field("devices", &self.len())
            .finish()
    }
}
