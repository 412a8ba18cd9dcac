//! GC2145 Sensor Driver
//!
//! Drives a GC2145 image sensor through its lifecycle:
//! - power-up and bounded reset wait
//! - register programming (frame size, pixel format, orientation)
//! - streaming into a fixed pool of frame buffers
//! - stop, live reconfiguration, fault handling and teardown
//!
//! Bus access is delegated to a `SensorBus` implementation and pixel data to a
//! `FrameSource`, so the same driver runs against real hardware or the mocks.

pub mod bus;
pub mod capture;
pub mod controller;
pub mod diagnostics;
pub mod driver;
pub mod encode;
mod error;
pub mod mock;
pub mod state;

pub use bus::{FrameSource, SensorBus};
pub use capture::{CaptureConfig, CaptureService, Requester};
pub use diagnostics::Diagnostics;
pub use driver::{DriverOptions, Gc2145Driver};
pub use encode::{encode_jpeg, to_rgb888, EncodeError};
pub use error::{BusError, CaptureError, DriverError};
pub use mock::{MockBus, MockFrameSource};
pub use state::DriverState;

pub use frame_pool::{FrameBuffer, FrameMeta, FramePool};
pub use sensor_regmap::{FrameSize, PixelFormat, SensorConfig};
