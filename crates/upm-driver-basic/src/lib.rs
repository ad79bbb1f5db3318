//! Single-pin drivers for rust-upm.
//!
//! This crate provides drivers that own one GPIO or PWM pin:
//! - [`led`] - LED on a GPIO output, either polarity
//! - [`relay`] - relay coil on a GPIO output
//! - [`water`] - water sensor on a GPIO input, wet when pulled low
//! - [`dimmer`] - PWM brightness control
//!
//! # Usage
//!
//! ```rust,ignore
//! use upm_driver_basic::register_all;
//!
//! register_all(&registry);
//! ```

pub mod dimmer;
pub mod led;
pub mod relay;
pub mod water;

pub use dimmer::{Dimmer, DimmerConfig, DimmerFactory};
pub use led::{Led, LedConfig, LedFactory, Polarity};
pub use relay::{Relay, RelayConfig, RelayFactory};
pub use water::{WaterSensor, WaterSensorConfig, WaterSensorFactory};

use upm_core::FactoryRegistry;

/// Force the linker to include this crate.
///
/// Call this function from main() to ensure the driver factories are
/// linked into the final binary and not stripped by the linker.
#[inline(never)]
pub fn link() {
    std::hint::black_box(std::any::TypeId::of::<LedFactory>());
    std::hint::black_box(std::any::TypeId::of::<RelayFactory>());
    std::hint::black_box(std::any::TypeId::of::<WaterSensorFactory>());
    std::hint::black_box(std::any::TypeId::of::<DimmerFactory>());
}

/// Register all single-pin driver factories with a device registry.
pub fn register_all(registry: &impl FactoryRegistry) {
    registry.register_factory(Box::new(LedFactory));
    registry.register_factory(Box::new(RelayFactory));
    registry.register_factory(Box::new(WaterSensorFactory));
    registry.register_factory(Box::new(DimmerFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_does_not_panic() {
        link();
    }
}
