//! Seeded RNG wrapper for reproducible behavior.
//!
//! Drives random fault injection and random register images so that a
//! failing test can be replayed from its seed.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded RNG wrapper for reproducible random behavior
pub struct MockRng {
    inner: Mutex<ChaCha8Rng>,
}

impl MockRng {
    /// Create a new RNG with optional seed.
    /// If seed is None, uses a random seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    /// Whether an operation should fail at the given rate (0.0 to 1.0).
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.inner.lock().gen::<f64>() < rate
    }

    /// Fill `buf` with random bytes.
    pub fn fill_bytes(&self, buf: &mut [u8]) {
        self.inner.lock().fill(buf);
    }

    /// Generate a random u8 value
    pub fn next_u8(&self) -> u8 {
        self.inner.lock().gen()
    }
}

impl Default for MockRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng")
            .field("inner", &"<Mutex<ChaCha8Rng>>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_deterministic() {
        let rng1 = MockRng::new(Some(42));
        let rng2 = MockRng::new(Some(42));
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        rng1.fill_bytes(&mut a);
        rng2.fill_bytes(&mut b);
        assert_eq!(a, b, "Same seed should produce same bytes");
    }

    #[test]
    fn test_should_fail_bounds() {
        let rng = MockRng::new(Some(7));
        for _ in 0..100 {
            assert!(!rng.should_fail(0.0));
            assert!(rng.should_fail(1.0));
        }
    }

    #[test]
    fn test_should_fail_probability() {
        let rng = MockRng::new(Some(42));
        let samples = 10000;
        let failures = (0..samples).filter(|_| rng.should_fail(0.3)).count();
        // Expect roughly 3000, allow 10% deviation
        assert!(
            failures > 2700 && failures < 3300,
            "Expected ~3000 failures, got {}",
            failures
        );
    }
}
