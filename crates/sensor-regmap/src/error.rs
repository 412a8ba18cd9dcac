//! Register Map Error Types

use crate::config::{FrameSize, PixelFormat};
use thiserror::Error;

/// Errors raised while checking or sequencing register writes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Address is not described by the register map
    #[error("Register 0x{0:04X} is not in the register map")]
    InvalidRegister(u16),

    /// Value is not legal for the addressed register
    #[error("Value 0x{value:02X} is not legal for register 0x{address:04X}")]
    ValueOutOfRange { address: u16, value: u8 },

    /// Pixel format the sensor cannot produce
    #[error("Pixel format {0} is not supported by the sensor")]
    UnsupportedFormat(PixelFormat),

    /// Frame size the sensor cannot produce
    #[error("Frame size {0} is not supported by the sensor")]
    UnsupportedFrameSize(FrameSize),

    /// Two descriptors share one address
    #[error("Register 0x{0:04X} is described more than once")]
    DuplicateRegister(u16),
}
