//! Driver Factory and Capability Tables
//!
//! A driver publishes its capabilities as a [`DeviceComponents`] bag: one
//! `Arc<dyn Trait>` per capability, all pointing at the same driver context.
//! Generic code asks the bag for a table by [`Category`] and receives a
//! [`CapabilityTable`], a sum type whose variant fixes the trait. There is no
//! way to call one driver's operations on another driver's context.
//!
//! ```text
//! DriverFactory::build(subsystem, config)
//!         │
//!         ▼
//! DeviceComponents { sensor, temperature, pressure, ... }
//!         │  table(Category::Pressure)
//!         ▼
//! CapabilityTable::Pressure(Arc<dyn PressureSensor>)
//! ```
//!
//! # Example: Implementing a Driver Factory
//!
//! ```rust,ignore
//! pub struct LedFactory;
//!
//! impl DriverFactory for LedFactory {
//!     fn driver_type(&self) -> &'static str { "led" }
//!     fn descriptor(&self) -> &'static Descriptor { &LED_DESCRIPTOR }
//!
//!     fn validate(&self, config: &toml::Value) -> anyhow::Result<()> {
//!         let _: LedConfig = config.clone().try_into()?;
//!         Ok(())
//!     }
//!
//!     fn build(&self, bus: &BusSubsystem, config: toml::Value) -> anyhow::Result<DeviceComponents> {
//!         let cfg: LedConfig = config.try_into()?;
//!         let led = Arc::new(Led::init(bus, cfg.pin)?);
//!         Ok(DeviceComponents::new(led.clone()).with_switch(led))
//!     }
//! }
//! ```

use crate::capabilities::{
    Accelerometer, BinarySensor, Dimmable, HumiditySensor, Magnetometer, PressureSensor, Sensor,
    Switch, TemperatureSensor,
};
use crate::descriptor::Descriptor;
use crate::subsystem::BusSubsystem;
use crate::tags::Category;
use anyhow::Result;
use std::sync::Arc;

// =============================================================================
// Capability Table
// =============================================================================

/// A capability table bound to one driver context.
#[derive(Clone)]
pub enum CapabilityTable {
    /// Generic sensor table
    Sensor(Arc<dyn Sensor>),
    /// Temperature table
    Temperature(Arc<dyn TemperatureSensor>),
    /// Pressure table
    Pressure(Arc<dyn PressureSensor>),
    /// Humidity table
    Humidity(Arc<dyn HumiditySensor>),
    /// Accelerometer table
    Accelerometer(Arc<dyn Accelerometer>),
    /// Magnetometer table
    Magnetometer(Arc<dyn Magnetometer>),
    /// Switch table
    Switch(Arc<dyn Switch>),
    /// Binary input table
    Binary(Arc<dyn BinarySensor>),
    /// Dimmer table
    Dimmer(Arc<dyn Dimmable>),
}

impl CapabilityTable {
    /// Category this table answers for.
    pub fn category(&self) -> Category {
        match self {
            Self::Sensor(_) => Category::Sensor,
            Self::Temperature(_) => Category::Temperature,
            Self::Pressure(_) => Category::Pressure,
            Self::Humidity(_) => Category::Humidity,
            Self::Accelerometer(_) => Category::Accelerometer,
            Self::Magnetometer(_) => Category::Magnetometer,
            Self::Switch(_) => Category::Switch,
            Self::Binary(_) => Category::Binary,
            Self::Dimmer(_) => Category::Dimmer,
        }
    }
}

impl std::fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CapabilityTable::{:?}", self.category())
    }
}

// =============================================================================
// Device Components (Capability Bag)
// =============================================================================

/// Container for capability trait objects returned by drivers.
///
/// The generic [`Sensor`] table is mandatory; every other capability is
/// optional and `None` when the driver lacks it.
#[derive(Clone)]
pub struct DeviceComponents {
    /// Generic sensor table
    pub sensor: Arc<dyn Sensor>,
    /// Temperature table
    pub temperature: Option<Arc<dyn TemperatureSensor>>,
    /// Pressure table
    pub pressure: Option<Arc<dyn PressureSensor>>,
    /// Humidity table
    pub humidity: Option<Arc<dyn HumiditySensor>>,
    /// Accelerometer table
    pub accelerometer: Option<Arc<dyn Accelerometer>>,
    /// Magnetometer table
    pub magnetometer: Option<Arc<dyn Magnetometer>>,
    /// Switch table
    pub switch: Option<Arc<dyn Switch>>,
    /// Binary input table
    pub binary: Option<Arc<dyn BinarySensor>>,
    /// Dimmer table
    pub dimmer: Option<Arc<dyn Dimmable>>,
}

impl DeviceComponents {
    /// Bag holding only the generic sensor table.
    pub fn new(sensor: Arc<dyn Sensor>) -> Self {
        Self {
            sensor,
            temperature: None,
            pressure: None,
            humidity: None,
            accelerometer: None,
            magnetometer: None,
            switch: None,
            binary: None,
            dimmer: None,
        }
    }

    /// Add the temperature table.
    pub fn with_temperature(mut self, t: Arc<dyn TemperatureSensor>) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Add the pressure table.
    pub fn with_pressure(mut self, p: Arc<dyn PressureSensor>) -> Self {
        self.pressure = Some(p);
        self
    }

    /// Add the humidity table.
    pub fn with_humidity(mut self, h: Arc<dyn HumiditySensor>) -> Self {
        self.humidity = Some(h);
        self
    }

    /// Add the accelerometer table.
    pub fn with_accelerometer(mut self, a: Arc<dyn Accelerometer>) -> Self {
        self.accelerometer = Some(a);
        self
    }

    /// Add the magnetometer table.
    pub fn with_magnetometer(mut self, m: Arc<dyn Magnetometer>) -> Self {
        self.magnetometer = Some(m);
        self
    }

    /// Add the switch table.
    pub fn with_switch(mut self, s: Arc<dyn Switch>) -> Self {
        self.switch = Some(s);
        self
    }

    /// Add the binary input table.
    pub fn with_binary(mut self, b: Arc<dyn BinarySensor>) -> Self {
        self.binary = Some(b);
        self
    }

    /// Add the dimmer table.
    pub fn with_dimmer(mut self, d: Arc<dyn Dimmable>) -> Self {
        self.dimmer = Some(d);
        self
    }

    /// Descriptor of the driver behind this bag.
    pub fn descriptor(&self) -> &'static Descriptor {
        self.sensor.descriptor()
    }

    /// Look up the table for `category`.
    ///
    /// `None` when the driver has no table for it, including categories no
    /// shipped trait covers (gyroscope, light, ...).
    pub fn table(&self, category: Category) -> Option<CapabilityTable> {
        match category {
            Category::Sensor => Some(CapabilityTable::Sensor(self.sensor.clone())),
            Category::Temperature => self.temperature.clone().map(CapabilityTable::Temperature),
            Category::Pressure => self.pressure.clone().map(CapabilityTable::Pressure),
            Category::Humidity => self.humidity.clone().map(CapabilityTable::Humidity),
            Category::Accelerometer => {
                self.accelerometer.clone().map(CapabilityTable::Accelerometer)
            }
            Category::Magnetometer => self.magnetometer.clone().map(CapabilityTable::Magnetometer),
            Category::Switch => self.switch.clone().map(CapabilityTable::Switch),
            Category::Binary => self.binary.clone().map(CapabilityTable::Binary),
            Category::Dimmer => self.dimmer.clone().map(CapabilityTable::Dimmer),
            Category::Gyroscope
            | Category::Light
            | Category::Voltage
            | Category::Raw
            | Category::Servo
            | Category::Joystick
            | Category::Stream => None,
        }
    }

    /// Categories with a populated table, in [`Category::ALL`] order.
    pub fn capabilities(&self) -> Vec<Category> {
        Category::ALL
            .iter()
            .copied()
            .filter(|c| self.table(*c).is_some())
            .collect()
    }
}

impl std::fmt::Debug for DeviceComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceComponents")
            .field("driver", &self.descriptor().name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

// =============================================================================
// Driver Factory
// =============================================================================

/// Constructs drivers by name from TOML configuration.
///
/// This is the "init by name" path: the registry looks a factory up by
/// [`driver_type`](Self::driver_type), validates the config, then builds.
pub trait DriverFactory: Send + Sync + 'static {
    /// Config `type` string, e.g. `"bmp280"`.
    fn driver_type(&self) -> &'static str;

    /// Static descriptor of the driver this factory builds.
    fn descriptor(&self) -> &'static Descriptor;

    /// Human-readable driver name.
    fn name(&self) -> &'static str {
        self.descriptor().description
    }

    /// Categories the built device publishes.
    fn capabilities(&self) -> &'static [Category] {
        self.descriptor().categories
    }

    /// Check `config` without touching hardware.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Open the device and return its capability tables.
    fn build(&self, subsystem: &BusSubsystem, config: toml::Value) -> Result<DeviceComponents>;
}

/// Trait for registries that can accept driver factories.
///
/// Lets driver crates expose a `register_all` helper without depending on
/// the registry crate.
pub trait FactoryRegistry {
    /// Register a driver factory.
    fn register_factory(&self, factory: Box<dyn DriverFactory>);
}
