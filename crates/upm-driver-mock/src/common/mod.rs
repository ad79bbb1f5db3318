//! Common infrastructure for the simulated platform.
//!
//! - **mode**: timing modes (Instant, Realistic)
//! - **errors**: fault injection framework
//! - **rng**: seeded random number generator

pub mod errors;
pub mod mode;
pub mod rng;

// Re-export commonly used types
pub use errors::{ops, FaultConfig, FaultScenario};
pub use mode::MockMode;
pub use rng::MockRng;
