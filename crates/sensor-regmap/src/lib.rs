//! GC2145 Register Map
//!
//! Static description of the GC2145 control registers and the pure
//! configuration-to-register-write sequencer.
//!
//! Addresses are page-qualified: the high byte selects the register page and
//! the low byte is the offset inside that page. Page selection itself is the
//! bus driver's job.

mod config;
mod error;
pub mod gc2145;
mod map;
mod sequence;

pub use config::{FrameSize, PixelFormat, SensorCapabilities, SensorConfig};
pub use error::RegisterError;
pub use map::{LegalValues, RegisterDescriptor, RegisterFile, RegisterMap, RegisterWrite};
pub use sequence::{delta, validate};
