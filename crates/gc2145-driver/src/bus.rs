//! Hardware collaborators
//!
//! Both traits are synchronous with bounded latency; the driver never waits on
//! them indefinitely.

use crate::error::{BusError, CaptureError};
use frame_pool::FrameBuffer;

/// Register bus (SCCB) plus the reset line
pub trait SensorBus {
    /// Write one register. Page selection for the high address byte is the
    /// implementation's job.
    fn write_register(&mut self, address: u16, value: u8) -> Result<(), BusError>;

    /// Read one register
    fn read_register(&mut self, address: u16) -> Result<u8, BusError>;

    /// Drive the reset pulse
    fn pulse_reset(&mut self) -> Result<(), BusError>;

    /// Whether the sensor has come out of reset
    fn reset_complete(&mut self) -> Result<bool, BusError>;
}

/// Pixel data path (DVP/DMA)
pub trait FrameSource {
    /// Fill `frame` with the next frame and return the number of bytes written
    fn read_frame(&mut self, frame: &mut FrameBuffer) -> Result<usize, CaptureError>;
}
