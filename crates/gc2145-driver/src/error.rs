//! Driver Error Types

use crate::state::DriverState;
use frame_pool::PoolError;
use sensor_regmap::{FrameSize, PixelFormat, RegisterError};
use thiserror::Error;

/// Errors from the register bus collaborator (SCCB/I2C and reset GPIO)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Sensor did not acknowledge the transaction
    #[error("No acknowledge from sensor at register 0x{address:04X}")]
    Nack { address: u16 },

    /// Transaction did not finish in time
    #[error("Bus transaction timed out")]
    Timeout,

    /// Lower-level I/O failure
    #[error("Bus I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BusError {
    fn from(err: std::io::Error) -> Self {
        BusError::Io(err.to_string())
    }
}

/// Errors from the pixel data path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// No frame arrived in time (usually an unstable XCLK or a stalled sensor)
    #[error("Timed out waiting for a frame")]
    Timeout,

    /// Bus failure while reading the frame
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Errors surfaced by the driver lifecycle and capture calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Reset-complete was not observed within the bounded wait
    #[error("Sensor did not complete reset within {timeout_ms}ms")]
    ResetTimeout { timeout_ms: u64 },

    /// A register write failed on the bus
    #[error("Configuration write to register 0x{address:04X} failed: {source}")]
    ConfigurationFailed { address: u16, source: BusError },

    /// Pixel format the sensor cannot produce
    #[error("Pixel format {0} is not supported by the sensor")]
    UnsupportedFormat(PixelFormat),

    /// Frame size the sensor cannot produce
    #[error("Frame size {0} is not supported by the sensor")]
    UnsupportedFrameSize(FrameSize),

    /// Pixel format or frame size change requested without re-init
    #[error("Pixel format and frame size can only change through a full re-init")]
    UnsupportedLiveReconfiguration,

    /// Every buffer is held by a consumer
    #[error("All {capacity} frame buffers are held")]
    PoolExhausted { capacity: usize },

    /// Released a buffer the pool did not hold
    #[error("Frame buffer {index} is not held by the pool")]
    DoubleRelease { index: usize },

    /// Frame pool could not be set up
    #[error("Frame pool setup failed: {0}")]
    PoolSetup(PoolError),

    /// Write addressed a register outside the register map
    #[error("Register 0x{0:04X} is not in the register map")]
    InvalidRegister(u16),

    /// Write value not legal for its register
    #[error("Value 0x{value:02X} is not legal for register 0x{address:04X}")]
    ValueOutOfRange { address: u16, value: u8 },

    /// Operation not allowed in the current state
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        state: DriverState,
        operation: &'static str,
    },

    /// Probed chip id does not match the sensor model
    #[error("Unexpected chip id 0x{found:04X} (expected 0x{expected:04X})")]
    ChipIdMismatch { expected: u16, found: u16 },

    /// No frame arrived in time
    #[error("Timed out waiting for a frame")]
    CaptureTimeout,

    /// Unrecoverable bus failure
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl DriverError {
    /// Whether this error forces the driver into `Faulted`
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::ResetTimeout { .. }
                | DriverError::ConfigurationFailed { .. }
                | DriverError::InvalidRegister(_)
                | DriverError::ValueOutOfRange { .. }
                | DriverError::ChipIdMismatch { .. }
                | DriverError::Bus(_)
        )
    }
}

impl From<RegisterError> for DriverError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::InvalidRegister(address) => DriverError::InvalidRegister(address),
            RegisterError::ValueOutOfRange { address, value } => {
                DriverError::ValueOutOfRange { address, value }
            }
            RegisterError::UnsupportedFormat(format) => DriverError::UnsupportedFormat(format),
            RegisterError::UnsupportedFrameSize(size) => DriverError::UnsupportedFrameSize(size),
            RegisterError::DuplicateRegister(address) => DriverError::InvalidRegister(address),
        }
    }
}

impl From<PoolError> for DriverError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::PoolExhausted { capacity } => DriverError::PoolExhausted { capacity },
            PoolError::DoubleRelease { index } => DriverError::DoubleRelease { index },
            other => DriverError::PoolSetup(other),
        }
    }
}

impl From<CaptureError> for DriverError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Timeout => DriverError::CaptureTimeout,
            CaptureError::Bus(e) => DriverError::Bus(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DriverError::ResetTimeout { timeout_ms: 100 }.is_fatal());
        assert!(DriverError::Bus(BusError::Timeout).is_fatal());
        assert!(!DriverError::PoolExhausted { capacity: 2 }.is_fatal());
        assert!(!DriverError::DoubleRelease { index: 0 }.is_fatal());
        assert!(!DriverError::UnsupportedLiveReconfiguration.is_fatal());
    }

    #[test]
    fn test_register_error_mapping() {
        let err: DriverError = RegisterError::UnsupportedFormat(PixelFormat::Jpeg).into();
        assert_eq!(err, DriverError::UnsupportedFormat(PixelFormat::Jpeg));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = DriverError::InvalidState {
            state: DriverState::Faulted,
            operation: "stop",
        };
        assert_eq!(err.to_string(), "stop is not allowed while Faulted");
    }
}
