//! Error types and result codes.
//!
//! Every fallible driver operation returns [`UpmResult`]. The error enum is
//! structured (it carries the register, the chip id that was read, the bus
//! failure), while [`ResultCode`] is the flat, closed classification a
//! generic caller can switch on. [`UpmError::code`] maps one onto the other.
//!
//! ## Error Taxonomy
//!
//! - **Resource acquisition**: a bus handle could not be opened, or the bus
//!   subsystem was never initialized. Fatal to `init`.
//! - **Identity verification**: the chip-ID register did not hold an accepted
//!   value. Fatal to `init`, classified the same way as acquisition failures.
//! - **Transaction**: a register read/write failed or returned fewer bytes than
//!   requested. Surfaced to the caller, never retried.
//! - **Parameter**: an argument or configuration value was rejected before any
//!   bus access took place.

use crate::bus::BusError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type UpmResult<T> = std::result::Result<T, UpmError>;

// =============================================================================
// Result Codes
// =============================================================================

/// Closed set of result codes returned across the capability-table boundary.
///
/// The discriminants are stable so they can be passed through foreign
/// interfaces unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ResultCode {
    /// Operation completed.
    Success = 0,
    /// The driver does not implement this operation.
    NotImplemented = 1,
    /// The device does not support this operation or mode.
    NotSupported = 2,
    /// A bus handle or other resource could not be acquired.
    NoResources = 3,
    /// The device returned no (or too little) data.
    NoData = 4,
    /// An argument was rejected.
    InvalidParameter = 5,
    /// A buffer or length argument was rejected.
    InvalidSize = 6,
    /// A numeric argument was outside the accepted range.
    OutOfRange = 7,
    /// A bus transaction failed.
    OperationFailed = 8,
    /// A bounded wait expired.
    TimedOut = 9,
    /// Anything else.
    Unspecified = 99,
}

impl ResultCode {
    /// Stable numeric value of this code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Classify a result: `Success` for `Ok`, otherwise the error's code.
    pub fn from_result<T>(result: &UpmResult<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Success,
            Err(e) => e.code(),
        }
    }

    /// Whether this code represents success.
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ResultCode::Success => "success",
            ResultCode::NotImplemented => "not_implemented",
            ResultCode::NotSupported => "not_supported",
            ResultCode::NoResources => "no_resources",
            ResultCode::NoData => "no_data",
            ResultCode::InvalidParameter => "invalid_parameter",
            ResultCode::InvalidSize => "invalid_size",
            ResultCode::OutOfRange => "out_of_range",
            ResultCode::OperationFailed => "operation_failed",
            ResultCode::TimedOut => "timed_out",
            ResultCode::Unspecified => "unspecified",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Driver Errors
// =============================================================================

/// Primary error type for driver operations.
#[derive(Error, Debug)]
pub enum UpmError {
    /// A driver was constructed before the bus subsystem was initialized.
    #[error("Bus subsystem is not initialized")]
    NotInitialized,

    /// The underlying bus platform reported a failure.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// The chip-ID register held an unexpected value.
    #[error("{driver}: unexpected chip id {found:#04x} (expected one of {expected:02x?})")]
    ChipIdMismatch {
        /// Driver that performed the check
        driver: &'static str,
        /// Accepted chip ids
        expected: &'static [u8],
        /// Value read from the device
        found: u8,
    },

    /// A block read returned fewer bytes than requested.
    #[error("Short read at register {register:#04x}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// First register of the block
        register: u8,
        /// Requested length
        expected: usize,
        /// Bytes actually returned
        actual: usize,
    },

    /// The device produced no usable data.
    #[error("No data: {0}")]
    NoData(String),

    /// A required resource is unavailable.
    #[error("No resources: {0}")]
    NoResources(String),

    /// An argument was rejected before touching the bus.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A length or buffer size was rejected.
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    /// A numeric argument was outside the accepted range.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// The driver does not implement this operation.
    #[error("Operation '{0}' is not implemented by this driver")]
    NotImplemented(&'static str),

    /// The device cannot perform this operation in its current mode.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A bounded wait expired.
    #[error("Timed out: {0}")]
    TimedOut(String),

    /// A multi-step operation failed for a reason not covered above.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Driver configuration could not be parsed or was inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UpmError {
    /// Flat result code for this error.
    pub fn code(&self) -> ResultCode {
        match self {
            UpmError::NotInitialized => ResultCode::NoResources,
            UpmError::Bus(e) => e.code(),
            UpmError::ChipIdMismatch { .. } => ResultCode::NoResources,
            UpmError::ShortRead { .. } => ResultCode::NoData,
            UpmError::NoData(_) => ResultCode::NoData,
            UpmError::NoResources(_) => ResultCode::NoResources,
            UpmError::InvalidParameter(_) => ResultCode::InvalidParameter,
            UpmError::InvalidSize(_) => ResultCode::InvalidSize,
            UpmError::OutOfRange(_) => ResultCode::OutOfRange,
            UpmError::NotImplemented(_) => ResultCode::NotImplemented,
            UpmError::NotSupported(_) => ResultCode::NotSupported,
            UpmError::TimedOut(_) => ResultCode::TimedOut,
            UpmError::OperationFailed(_) => ResultCode::OperationFailed,
            UpmError::Config(_) => ResultCode::InvalidParameter,
        }
    }

    /// Whether this error happened while acquiring or identifying hardware.
    pub fn is_init_failure(&self) -> bool {
        matches!(
            self,
            UpmError::NotInitialized
                | UpmError::ChipIdMismatch { .. }
                | UpmError::Bus(BusError::Open { .. })
                | UpmError::Bus(BusError::Init(_))
        )
    }
}

impl From<toml::de::Error> for UpmError {
    fn from(err: toml::de::Error) -> Self {
        UpmError::Config(err.to_string())
    }
}
