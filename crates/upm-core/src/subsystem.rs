//! One-time bus subsystem initialization.
//!
//! The application initializes the bus platform once, at startup, and hands
//! the resulting [`BusSubsystem`] to every driver constructor. Drivers never
//! initialize the platform themselves; they only check that it is live.
//!
//! ```rust,ignore
//! let subsystem = BusSubsystem::init(Arc::new(MyPlatform::open()?))?;
//! let sensor = Bmp280::init(&subsystem, BusSelector::i2c(1, 0x77), Bmp280Options::default())?;
//! ```

use crate::bus::Platform;
use crate::error::{UpmError, UpmResult};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, info};

static GLOBAL: OnceCell<BusSubsystem> = OnceCell::new();

/// Handle to an initialized (or not yet initialized) bus platform.
pub struct BusSubsystem {
    platform: Arc<dyn Platform>,
    ready: OnceCell<()>,
}

impl BusSubsystem {
    /// Wrap a platform without initializing it.
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            ready: OnceCell::new(),
        }
    }

    /// Wrap and initialize a platform in one step.
    pub fn init(platform: Arc<dyn Platform>) -> UpmResult<Self> {
        let subsystem = Self::new(platform);
        subsystem.initialize()?;
        Ok(subsystem)
    }

    /// Run [`Platform::init`] exactly once.
    ///
    /// Concurrent and repeated calls are safe: the first successful call
    /// wins, later calls return immediately. A failed attempt leaves the
    /// subsystem uninitialized so it can be retried.
    pub fn initialize(&self) -> UpmResult<()> {
        self.ready
            .get_or_try_init(|| {
                debug!(platform = self.platform.name(), "Initializing bus platform");
                self.platform.init()?;
                info!(platform = self.platform.name(), "Bus platform ready");
                Ok::<(), UpmError>(())
            })
            .map(|_| ())
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_initialized(&self) -> bool {
        self.ready.get().is_some()
    }

    /// The platform, provided the subsystem is live.
    pub fn platform(&self) -> UpmResult<&Arc<dyn Platform>> {
        if self.is_initialized() {
            Ok(&self.platform)
        } else {
            Err(UpmError::NotInitialized)
        }
    }

    /// Install an initialized subsystem as the process-wide instance.
    ///
    /// Fails if the subsystem is not initialized or if another instance has
    /// already been installed.
    pub fn install_global(subsystem: BusSubsystem) -> UpmResult<&'static BusSubsystem> {
        if !subsystem.is_initialized() {
            return Err(UpmError::NotInitialized);
        }
        let name = subsystem.platform.name().to_string();
        GLOBAL.set(subsystem).map_err(|_| {
            UpmError::OperationFailed("a global bus subsystem is already installed".into())
        })?;
        info!(platform = %name, "Installed global bus subsystem");
        GLOBAL.get().ok_or(UpmError::NotInitialized)
    }

    /// The process-wide instance, if one was installed.
    pub fn global() -> UpmResult<&'static BusSubsystem> {
        GLOBAL.get().ok_or(UpmError::NotInitialized)
    }
}

impl std::fmt::Debug for BusSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSubsystem")
            .field("platform", &self.platform.name())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{AnalogPin, BusError, BusKind, GpioPin, I2cHandle, PwmPin, SpiHandle};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPlatform {
        inits: AtomicUsize,
        fail_first: bool,
    }

    fn closed(kind: BusKind, index: u32) -> BusError {
        BusError::Open {
            kind,
            index,
            reason: "not available".into(),
        }
    }

    impl Platform for CountingPlatform {
        fn name(&self) -> &str {
            "counting"
        }

        fn init(&self) -> Result<(), BusError> {
            let n = self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(BusError::Init("firmware not loaded".into()));
            }
            Ok(())
        }

        fn open_i2c(&self, bus: u32) -> Result<Box<dyn I2cHandle>, BusError> {
            Err(closed(BusKind::I2c, bus))
        }

        fn open_spi(&self, bus: u32) -> Result<Box<dyn SpiHandle>, BusError> {
            Err(closed(BusKind::Spi, bus))
        }

        fn open_gpio(&self, pin: u32) -> Result<Box<dyn GpioPin>, BusError> {
            Err(closed(BusKind::Gpio, pin))
        }

        fn open_pwm(&self, pin: u32) -> Result<Box<dyn PwmPin>, BusError> {
            Err(closed(BusKind::Pwm, pin))
        }

        fn open_analog(&self, pin: u32) -> Result<Box<dyn AnalogPin>, BusError> {
            Err(closed(BusKind::Analog, pin))
        }
    }

    #[test]
    fn platform_unavailable_until_initialized() {
        let subsystem = BusSubsystem::new(Arc::new(CountingPlatform::default()));
        assert!(matches!(subsystem.platform(), Err(UpmError::NotInitialized)));
        subsystem.initialize().unwrap();
        assert!(subsystem.platform().is_ok());
    }

    #[test]
    #[tracing_test::traced_test]
    fn initialization_is_logged_once() {
        let subsystem = BusSubsystem::new(Arc::new(CountingPlatform::default()));
        subsystem.initialize().unwrap();
        subsystem.initialize().unwrap();
        assert!(logs_contain("Bus platform ready"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Bus platform ready")).count() {
                1 => Ok(()),
                n => Err(format!("logged {n} times")),
            }
        });
    }

    #[test]
    fn initialize_runs_once() {
        let platform = Arc::new(CountingPlatform::default());
        let subsystem = BusSubsystem::new(platform.clone());
        for _ in 0..5 {
            subsystem.initialize().unwrap();
        }
        assert_eq!(platform.inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn initialize_runs_once_across_threads() {
        let platform = Arc::new(CountingPlatform::default());
        let subsystem = Arc::new(BusSubsystem::new(platform.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = subsystem.clone();
                std::thread::spawn(move || s.initialize().unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(platform.inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_initialize_can_be_retried() {
        let platform = Arc::new(CountingPlatform {
            fail_first: true,
            ..Default::default()
        });
        let subsystem = BusSubsystem::new(platform.clone());
        let err = subsystem.initialize().unwrap_err();
        assert!(matches!(err, UpmError::Bus(BusError::Init(_))));
        assert!(!subsystem.is_initialized());
        subsystem.initialize().unwrap();
        assert!(subsystem.is_initialized());
        assert_eq!(platform.inits.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[serial_test::serial]
    fn global_install_is_single_shot() {
        let uninitialized = BusSubsystem::new(Arc::new(CountingPlatform::default()));
        assert!(matches!(
            BusSubsystem::install_global(uninitialized),
            Err(UpmError::NotInitialized)
        ));

        let first = BusSubsystem::init(Arc::new(CountingPlatform::default())).unwrap();
        let installed = BusSubsystem::install_global(first).unwrap();
        assert!(installed.is_initialized());
        assert!(BusSubsystem::global().is_ok());

        let second = BusSubsystem::init(Arc::new(CountingPlatform::default())).unwrap();
        assert!(BusSubsystem::install_global(second).is_err());
    }
}
