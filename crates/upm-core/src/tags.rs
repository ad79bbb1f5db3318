//! Capability and protocol tags.
//!
//! These two closed enumerations are the contract between generic caller
//! code and any driver: a [`Category`] names a capability table, a
//! [`Protocol`] names an I/O primitive a driver requires.

use serde::{Deserialize, Serialize};

/// Sensor/actuator category, i.e. the key of a capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Generic sensor table: descriptor and update.
    /// Corresponds to [`crate::capabilities::Sensor`]
    Sensor,
    /// Corresponds to [`crate::capabilities::TemperatureSensor`]
    Temperature,
    /// Corresponds to [`crate::capabilities::PressureSensor`]
    Pressure,
    /// Corresponds to [`crate::capabilities::HumiditySensor`]
    Humidity,
    /// Corresponds to [`crate::capabilities::Accelerometer`]
    Accelerometer,
    /// Angular rate sensors
    Gyroscope,
    /// Corresponds to [`crate::capabilities::Magnetometer`]
    Magnetometer,
    /// Ambient light sensors
    Light,
    /// Voltage measurement
    Voltage,
    /// Raw ADC or register values
    Raw,
    /// Corresponds to [`crate::capabilities::Switch`]
    Switch,
    /// Angle-controlled actuators
    Servo,
    /// Two-axis analog input
    Joystick,
    /// Byte-stream devices
    Stream,
    /// Corresponds to [`crate::capabilities::BinarySensor`]
    Binary,
    /// Corresponds to [`crate::capabilities::Dimmable`]
    Dimmer,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: &'static [Category] = &[
        Category::Sensor,
        Category::Temperature,
        Category::Pressure,
        Category::Humidity,
        Category::Accelerometer,
        Category::Gyroscope,
        Category::Magnetometer,
        Category::Light,
        Category::Voltage,
        Category::Raw,
        Category::Switch,
        Category::Servo,
        Category::Joystick,
        Category::Stream,
        Category::Binary,
        Category::Dimmer,
    ];

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sensor => "Sensor",
            Self::Temperature => "Temperature",
            Self::Pressure => "Pressure",
            Self::Humidity => "Humidity",
            Self::Accelerometer => "Accelerometer",
            Self::Gyroscope => "Gyroscope",
            Self::Magnetometer => "Magnetometer",
            Self::Light => "Light",
            Self::Voltage => "Voltage",
            Self::Raw => "Raw",
            Self::Switch => "Switch",
            Self::Servo => "Servo",
            Self::Joystick => "Joystick",
            Self::Stream => "Stream",
            Self::Binary => "Binary",
            Self::Dimmer => "Dimmer",
        }
    }

    /// Unit of the value reported by this category's table, if scalar.
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Self::Temperature => Some("°C"),
            Self::Pressure => Some("Pa"),
            Self::Humidity => Some("%RH"),
            Self::Accelerometer => Some("g"),
            Self::Magnetometer => Some("µT"),
            Self::Dimmer => Some("%"),
            Self::Voltage => Some("V"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// I/O protocol a driver requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Analog input
    Analog,
    /// Digital pin
    Gpio,
    /// Pulse-width modulation
    Pwm,
    /// I2C bus
    I2c,
    /// SPI bus
    Spi,
    /// Serial UART
    Uart,
    /// Dallas 1-Wire
    #[serde(rename = "onewire")]
    OneWire,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Protocol::Analog => "analog",
            Protocol::Gpio => "gpio",
            Protocol::Pwm => "pwm",
            Protocol::I2c => "i2c",
            Protocol::Spi => "spi",
            Protocol::Uart => "uart",
            Protocol::OneWire => "onewire",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_serde_is_snake_case() {
        let json = serde_json::to_string(&Category::Accelerometer).unwrap();
        assert_eq!(json, "\"accelerometer\"");
        let back: Category = serde_json::from_str("\"dimmer\"").unwrap();
        assert_eq!(back, Category::Dimmer);
    }

    #[test]
    fn protocol_onewire_spelling() {
        let json = serde_json::to_string(&Protocol::OneWire).unwrap();
        assert_eq!(json, "\"onewire\"");
        assert_eq!(Protocol::OneWire.to_string(), "onewire");
    }

    #[test]
    fn all_categories_listed_once() {
        let mut seen = std::collections::HashSet::new();
        for c in Category::ALL {
            assert!(seen.insert(*c), "{c} listed twice");
        }
        assert_eq!(seen.len(), 16);
    }
}
