//! Frame Buffer Pool
//!
//! Owns a small, fixed set of frame buffers shared between the capture path
//! and a consumer. Buffers are handed out round-robin and move by value: the
//! holder owns the bytes until it releases them, so the capture path can never
//! write into a frame a consumer is still reading.

mod error;
mod pool;

pub use error::PoolError;
pub use pool::{FrameBuffer, FrameGeometry, FrameMeta, FramePool, DEFAULT_BUFFER_COUNT};
