//! Timing modes for the simulated platform.

use serde::Deserialize;
use std::time::Duration;

/// How the simulated platform handles driver delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    /// Record delays, return immediately. Default for tests.
    #[default]
    Instant,
    /// Sleep for the requested duration, like real hardware.
    Realistic,
}

impl MockMode {
    /// Perform (or skip) a delay of `duration`.
    pub fn delay(&self, duration: Duration) {
        if *self == MockMode::Realistic {
            std::thread::sleep(duration);
        }
    }
}
