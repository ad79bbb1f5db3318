//! Core types and traits for rust-upm.
//!
//! - [`bus`]: platform and handle traits (I2C, SPI, GPIO, PWM, analog)
//! - [`subsystem`]: explicit one-time bus initialization
//! - [`register`]: register transactions over I2C or SPI
//! - [`capabilities`]: capability traits (temperature, pressure, switch, ...)
//! - [`driver`]: capability tables and driver factories
//! - [`tags`], [`descriptor`]: introspection
//! - [`error`]: error enum and result codes

pub mod bus;
pub mod capabilities;
pub mod descriptor;
pub mod driver;
pub mod error;
#[cfg(feature = "embedded-hal")]
pub mod hal;
pub mod register;
pub mod subsystem;
pub mod tags;

pub use bus::{
    AnalogPin, BusError, BusKind, Direction, GpioPin, I2cHandle, Platform, PwmPin, SpiHandle,
    SpiMode,
};
pub use capabilities::{
    Accelerometer, Adjustment, BinarySensor, Dimmable, HumiditySensor, Magnetometer,
    PressureSensor, Sensor, Switch, TemperatureSensor,
};
pub use descriptor::Descriptor;
pub use driver::{CapabilityTable, DeviceComponents, DriverFactory, FactoryRegistry};
pub use error::{ResultCode, UpmError, UpmResult};
pub use register::{BusConfig, BusSelector, Interface, RegisterBus, RegisterIo, SpiSettings};
pub use subsystem::BusSubsystem;
pub use tags::{Category, Protocol};
