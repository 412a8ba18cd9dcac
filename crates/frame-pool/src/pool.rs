//! Frame Pool Implementation

use crate::error::PoolError;
use sensor_regmap::{PixelFormat, SensorConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

/// Default buffer count (double buffering)
pub const DEFAULT_BUFFER_COUNT: usize = 2;

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

/// Shape of every frame in a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Geometry of the frames a sensor config produces
    pub fn from_config(config: &SensorConfig) -> Self {
        let (width, height) = config.frame_size.dimensions();
        Self::new(width, height, config.pixel_format)
    }

    /// Bytes in one frame, `None` for compressed formats
    pub fn frame_bytes(&self) -> Option<usize> {
        self.format
            .bytes_per_pixel()
            .map(|bpp| self.width as usize * self.height as usize * bpp)
    }
}

/// Metadata attached to a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Frame sequence number
    pub sequence: u32,
    /// Capture timestamp (nanoseconds since driver init)
    pub timestamp_ns: u64,
    /// Bytes of valid pixel data
    pub len: usize,
}

impl FrameMeta {
    fn blank(geometry: &FrameGeometry) -> Self {
        Self {
            width: geometry.width,
            height: geometry.height,
            format: geometry.format,
            sequence: 0,
            timestamp_ns: 0,
            len: 0,
        }
    }
}

struct Slot {
    /// Storage, `None` while the buffer is out
    data: Option<Box<[u8]>>,
    held: bool,
}

struct PoolState {
    slots: Vec<Slot>,
    /// Next slot to try (round-robin)
    cursor: usize,
    held: usize,
}

struct PoolInner {
    id: usize,
    geometry: FrameGeometry,
    frame_bytes: usize,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn give_back(&self, index: usize, data: Box<[u8]>) -> Result<(), PoolError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let slot = match state.slots.get_mut(index) {
            Some(slot) if slot.held => slot,
            _ => {
                warn!("Frame buffer {} released but not held", index);
                return Err(PoolError::DoubleRelease { index });
            }
        };
        slot.data = Some(data);
        slot.held = false;
        state.held -= 1;
        debug!("Frame buffer {} released ({} held)", index, state.held);
        Ok(())
    }
}

/// Fixed-size pool of frame buffers
///
/// Cheap to clone; clones share the same buffers. Pool size never changes
/// after construction.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Allocate `count` buffers sized for `geometry`
    pub fn new(count: usize, geometry: FrameGeometry) -> Result<Self, PoolError> {
        if count == 0 {
            return Err(PoolError::EmptyPool);
        }
        let frame_bytes = geometry
            .frame_bytes()
            .ok_or(PoolError::UnsizedFormat(geometry.format))?;

        let slots = (0..count)
            .map(|_| Slot {
                data: Some(vec![0u8; frame_bytes].into_boxed_slice()),
                held: false,
            })
            .collect();

        debug!(
            "Frame pool allocated: {} x {} bytes ({}x{} {})",
            count, frame_bytes, geometry.width, geometry.height, geometry.format
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                geometry,
                frame_bytes,
                state: Mutex::new(PoolState {
                    slots,
                    cursor: 0,
                    held: 0,
                }),
            }),
        })
    }

    /// Take the next free buffer in round-robin order
    pub fn acquire_for_capture(&self) -> Result<FrameBuffer, PoolError> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let capacity = state.slots.len();

        for step in 0..capacity {
            let index = (state.cursor + step) % capacity;
            let slot = &mut state.slots[index];
            if slot.held {
                continue;
            }
            if let Some(data) = slot.data.take() {
                slot.held = true;
                state.held += 1;
                state.cursor = (index + 1) % capacity;
                return Ok(FrameBuffer {
                    pool: Arc::downgrade(&self.inner),
                    pool_id: self.inner.id,
                    index,
                    data: Some(data),
                    meta: FrameMeta::blank(&self.inner.geometry),
                });
            }
        }

        Err(PoolError::PoolExhausted { capacity })
    }

    /// Return a buffer to the free set
    ///
    /// Releasing a buffer this pool does not hold is a no-op reported as
    /// `DoubleRelease`.
    pub fn release(&self, mut buffer: FrameBuffer) -> Result<(), PoolError> {
        if buffer.pool_id != self.inner.id {
            warn!("Frame buffer {} belongs to another pool", buffer.index);
            return Err(PoolError::DoubleRelease {
                index: buffer.index,
            });
        }
        match buffer.data.take() {
            Some(data) => self.inner.give_back(buffer.index, data),
            None => Err(PoolError::DoubleRelease {
                index: buffer.index,
            }),
        }
    }

    /// Total number of buffers
    pub fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Buffers currently held by the capture path or a consumer
    pub fn held_count(&self) -> usize {
        self.inner.lock().held
    }

    /// Buffers available for capture
    pub fn free_count(&self) -> usize {
        let state = self.inner.lock();
        state.slots.len() - state.held
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.inner.geometry
    }

    /// Size of each buffer in bytes
    pub fn frame_bytes(&self) -> usize {
        self.inner.frame_bytes
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("FramePool")
            .field("id", &self.inner.id)
            .field("geometry", &self.inner.geometry)
            .field("capacity", &state.slots.len())
            .field("held", &state.held)
            .finish()
    }
}

/// A frame buffer taken from a pool
///
/// Returns itself to the pool when dropped.
pub struct FrameBuffer {
    pool: Weak<PoolInner>,
    pool_id: usize,
    index: usize,
    data: Option<Box<[u8]>>,
    meta: FrameMeta,
}

impl FrameBuffer {
    /// Slot index inside the owning pool
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    /// Valid pixel data
    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..self.meta.len.min(data.len())],
            None => &[],
        }
    }

    /// Whole buffer, for the capture path to fill
    pub fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.data {
            Some(data) => &mut data[..],
            None => &mut [],
        }
    }

    /// Whether the pool this buffer came from has been dropped
    pub fn is_orphaned(&self) -> bool {
        self.pool.strong_count() == 0
    }

    /// Buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    /// Record capture metadata after the buffer was filled
    pub fn stamp(&mut self, sequence: u32, timestamp_ns: u64, len: usize) {
        self.meta.sequence = sequence;
        self.meta.timestamp_ns = timestamp_ns;
        self.meta.len = len.min(self.capacity());
    }

    /// Hand the buffer back to its pool
    pub fn release(mut self) -> Result<(), PoolError> {
        let data = match self.data.take() {
            Some(data) => data,
            None => return Err(PoolError::DoubleRelease { index: self.index }),
        };
        match self.pool.upgrade() {
            Some(pool) => pool.give_back(self.index, data),
            // Pool already torn down, the memory goes with this buffer
            None => Ok(()),
        }
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            if let Some(pool) = self.pool.upgrade() {
                let _ = pool.give_back(self.index, data);
            }
        }
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("index", &self.index)
            .field("meta", &self.meta)
            .field("capacity", &self.capacity())
            .finish()
    }
}
