//! Simulated bus platform for rust-upm.
//!
//! This crate stands in for real I2C/SPI/GPIO/PWM/analog hardware so every
//! driver can be exercised without a board attached.
//!
//! # Building Blocks
//!
//! - [`MockPlatform`] - implements [`upm_core::Platform`], counts open
//!   handles, logs transactions and records delays instead of sleeping
//! - [`MockRegisterDevice`] - 256-register chip with auto-increment, busy
//!   flags, self-clearing bits and reset commands
//! - [`chips`] - register images of the BMP280, BME280, LIS2DS12 and LSM303AGR
//! - [`FaultConfig`] - deterministic or seeded random fault injection
//! - [`MockPlatformConfig`] - declarative platform description from TOML
//!
//! ```rust,ignore
//! use upm_driver_mock::{chips, MockPlatform};
//!
//! let platform = MockPlatform::new();
//! platform.add_i2c_device(1, 0x77, chips::bme280());
//! let subsystem = platform.subsystem()?;
//! ```

pub mod chips;
pub mod common;
pub mod config;
pub mod device;
pub mod platform;

// Re-export common types
pub use common::{ops, FaultConfig, FaultScenario, MockMode, MockRng};

pub use config::{MockChip, MockPlatformConfig};
pub use device::{MockRegisterDevice, SpiAddressing};
pub use platform::{MockPlatform, PwmState, Transaction};
