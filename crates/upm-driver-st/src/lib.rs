//! ST Microelectronics motion sensor drivers for rust-upm.
//!
//! This crate provides drivers for:
//! - LIS2DS12 3-axis accelerometer (I2C or SPI)
//! - LSM303AGR accelerometer and magnetometer (I2C, two slaves in one package)
//!
//! # Usage
//!
//! ```rust,ignore
//! use upm_driver_st::register_all;
//!
//! register_all(&registry);
//! ```

pub mod lis2ds12;
pub mod lsm303agr;

pub use lis2ds12::{Lis2ds12, Lis2ds12Config, Lis2ds12Factory, Lis2ds12Options};
pub use lsm303agr::{Lsm303agr, Lsm303agrConfig, Lsm303agrFactory, Lsm303agrOptions};

use upm_core::FactoryRegistry;

/// Force the linker to include this crate.
///
/// Call this function from main() to ensure the driver factories are
/// linked into the final binary and not stripped by the linker.
#[inline(never)]
pub fn link() {
    std::hint::black_box(std::any::TypeId::of::<Lis2ds12Factory>());
    std::hint::black_box(std::any::TypeId::of::<Lsm303agrFactory>());
}

/// Register all ST driver factories with a device registry.
pub fn register_all(registry: &impl FactoryRegistry) {
    registry.register_factory(Box::new(Lis2ds12Factory));
    registry.register_factory(Box::new(Lsm303agrFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_does_not_panic() {
        link();
    }
}
