//! Frame Pool Error Types

use sensor_regmap::PixelFormat;
use thiserror::Error;

/// Errors raised by the frame pool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every buffer is held; capture must stall until one is released
    #[error("All {capacity} frame buffers are held")]
    PoolExhausted { capacity: usize },

    /// Released buffer was not held by this pool
    #[error("Frame buffer {index} is not held by this pool")]
    DoubleRelease { index: usize },

    /// Pool sized with zero buffers
    #[error("Frame pool needs at least one buffer")]
    EmptyPool,

    /// Format has no fixed frame size
    #[error("Cannot size frame buffers for {0} output")]
    UnsizedFormat(PixelFormat),
}
