//! Fault injection for the simulated bus.
//!
//! Enables configurable bus failures for resilience testing. Failures are
//! reported as [`BusError`]s, exactly as a real platform would report them,
//! so drivers exercise their normal error paths.

use super::rng::MockRng;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use upm_core::{BusError, BusKind};

/// Operation names used for rates and scenarios.
pub mod ops {
    /// I2C single or block read
    pub const I2C_READ: &str = "i2c_read";
    /// I2C register write
    pub const I2C_WRITE: &str = "i2c_write";
    /// SPI full-duplex transfer
    pub const SPI_TRANSFER: &str = "spi_transfer";
    /// GPIO read
    pub const GPIO_READ: &str = "gpio_read";
    /// GPIO write
    pub const GPIO_WRITE: &str = "gpio_write";
    /// PWM configuration
    pub const PWM_WRITE: &str = "pwm_write";
    /// Analog read
    pub const ANALOG_READ: &str = "analog_read";
}

/// Fault injection configuration for the simulated platform
#[derive(Clone, Debug)]
pub struct FaultConfig {
    /// Per-operation failure rate (0.0 to 1.0)
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<FaultScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<FaultState>>,
}

/// A scripted bus failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultScenario {
    /// Fail after N successful operations
    FailAfterN {
        /// Operation name from [`ops`]
        operation: &'static str,
        /// Successful calls allowed before failing
        count: u32,
    },
    /// Timeout on specific operation
    Timeout {
        /// Operation name from [`ops`]
        operation: &'static str,
    },
    /// All transfers fail from the first one on
    CommunicationLoss,
    /// I2C block reads return at most `max_len` bytes
    ShortRead {
        /// Bytes delivered per block read
        max_len: usize,
    },
    /// Opening a specific bus or pin fails
    OpenFailure {
        /// Handle kind
        kind: BusKind,
        /// Bus or pin number
        index: u32,
    },
}

#[derive(Default, Debug)]
struct FaultState {
    /// Operation counters for FailAfterN scenarios
    operation_counts: HashMap<&'static str, u32>,
    /// Whether communication is lost
    communication_lost: bool,
}

impl FaultConfig {
    /// Create fault config with no faults (default)
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Create fault config with uniform random failures and specific seed
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate); // Wildcard for all operations
        Self::build(rates, Vec::new(), seed)
    }

    /// Create fault config with a single scenario
    pub fn scenario(scenario: FaultScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Create fault config with multiple scenarios
    pub fn scenarios(scenarios: Vec<FaultScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Create fault config with custom failure rates per operation
    pub fn with_rates(rates: HashMap<&'static str, f64>, seed: Option<u64>) -> Self {
        Self::build(rates, Vec::new(), seed)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<FaultScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(FaultState::default())),
        }
    }

    /// Check whether opening `kind` `index` should fail.
    pub fn check_open(&self, kind: BusKind, index: u32) -> Result<(), BusError> {
        let blocked = self.scenarios.iter().any(|s| {
            matches!(s, FaultScenario::OpenFailure { kind: k, index: i } if *k == kind && *i == index)
        });
        if blocked {
            return Err(BusError::Open {
                kind,
                index,
                reason: "injected open failure".into(),
            });
        }
        Ok(())
    }

    /// Check if a transfer should fail and return the appropriate error
    pub fn check_operation(&self, kind: BusKind, operation: &'static str) -> Result<(), BusError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(BusError::Transfer {
                kind,
                reason: "communication lost".into(),
            });
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                FaultScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let current = state.operation_counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(BusError::Transfer {
                            kind,
                            reason: format!("injected failure after {} operations", count),
                        });
                    }
                }
                FaultScenario::Timeout { operation: op } if *op == operation => {
                    return Err(BusError::Timeout(kind));
                }
                FaultScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(BusError::Transfer {
                        kind,
                        reason: "communication lost".into(),
                    });
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(BusError::Transfer {
                kind,
                reason: format!("random failure on operation '{}'", operation),
            });
        }

        Ok(())
    }

    /// Cap on I2C block read length, if a short-read scenario is active.
    pub fn short_read_limit(&self) -> Option<usize> {
        self.scenarios.iter().find_map(|s| match s {
            FaultScenario::ShortRead { max_len } => Some(*max_len),
            _ => None,
        })
    }

    /// Reset fault state (clear counters, lost communication)
    pub fn reset(&self) {
        *self.state.lock() = FaultState::default();
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_faults() {
        let config = FaultConfig::none();
        for _ in 0..100 {
            assert!(config.check_operation(BusKind::I2c, ops::I2C_READ).is_ok());
        }
        assert!(config.check_open(BusKind::I2c, 0).is_ok());
        assert_eq!(config.short_read_limit(), None);
    }

    #[test]
    fn test_fail_after_n() {
        let config = FaultConfig::scenario(FaultScenario::FailAfterN {
            operation: ops::I2C_WRITE,
            count: 3,
        });
        for _ in 0..3 {
            assert!(config.check_operation(BusKind::I2c, ops::I2C_WRITE).is_ok());
        }
        assert!(config.check_operation(BusKind::I2c, ops::I2C_WRITE).is_err());
        // Other operations unaffected
        assert!(config.check_operation(BusKind::I2c, ops::I2C_READ).is_ok());

        config.reset();
        assert!(config.check_operation(BusKind::I2c, ops::I2C_WRITE).is_ok());
    }

    #[test]
    fn test_timeout_scenario() {
        let config = FaultConfig::scenario(FaultScenario::Timeout {
            operation: ops::SPI_TRANSFER,
        });
        assert_eq!(
            config.check_operation(BusKind::Spi, ops::SPI_TRANSFER),
            Err(BusError::Timeout(BusKind::Spi))
        );
    }

    #[test]
    fn test_communication_loss_persists() {
        let config = FaultConfig::scenario(FaultScenario::CommunicationLoss);
        for _ in 0..5 {
            assert!(config.check_operation(BusKind::I2c, ops::I2C_READ).is_err());
        }
    }

    #[test]
    fn test_open_failure_targets_one_index() {
        let config = FaultConfig::scenario(FaultScenario::OpenFailure {
            kind: BusKind::Gpio,
            index: 9,
        });
        assert!(config.check_open(BusKind::Gpio, 9).is_err());
        assert!(config.check_open(BusKind::Gpio, 8).is_ok());
        assert!(config.check_open(BusKind::I2c, 9).is_ok());
    }

    #[test]
    fn test_random_failures_deterministic() {
        let a = FaultConfig::random_failures_seeded(0.5, Some(42));
        let b = FaultConfig::random_failures_seeded(0.5, Some(42));
        for _ in 0..50 {
            assert_eq!(
                a.check_operation(BusKind::I2c, ops::I2C_READ).is_ok(),
                b.check_operation(BusKind::I2c, ops::I2C_READ).is_ok()
            );
        }
    }
}
