//! Mock hardware for development and testing
//!
//! `MockBus` records every register write and can be told to misbehave.
//! `MockFrameSource` fills buffers with color bars in the buffer's pixel format.

use crate::bus::{FrameSource, SensorBus};
use crate::error::{BusError, CaptureError};
use frame_pool::FrameBuffer;
use sensor_regmap::gc2145::{CHIP_ID, REG_CHIP_ID_HIGH, REG_CHIP_ID_LOW};
use sensor_regmap::{PixelFormat, RegisterWrite};
use std::collections::BTreeMap;
use tracing::trace;

/// Simulated SCCB bus and reset line
#[derive(Debug, Clone)]
pub struct MockBus {
    chip_id: u16,
    registers: BTreeMap<u16, u8>,
    writes: Vec<RegisterWrite>,
    /// Polls that report "still in reset"; `None` never completes
    reset_polls: Option<usize>,
    polls_seen: usize,
    resets: usize,
    fail_write_at: Option<u16>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    /// Healthy GC2145 that leaves reset on the second poll
    pub fn new() -> Self {
        Self {
            chip_id: CHIP_ID,
            registers: BTreeMap::new(),
            writes: Vec::new(),
            reset_polls: Some(1),
            polls_seen: 0,
            resets: 0,
            fail_write_at: None,
        }
    }

    /// Report a different chip id
    pub fn with_chip_id(mut self, chip_id: u16) -> Self {
        self.chip_id = chip_id;
        self
    }

    /// Never report reset-complete
    pub fn stuck_in_reset(mut self) -> Self {
        self.reset_polls = None;
        self
    }

    /// NACK every write to `address`
    pub fn failing_write(mut self, address: u16) -> Self {
        self.fail_write_at = Some(address);
        self
    }

    /// Every accepted write, oldest first
    pub fn writes(&self) -> &[RegisterWrite] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Current value of a register as the sensor sees it
    pub fn register(&self, address: u16) -> Option<u8> {
        self.registers.get(&address).copied()
    }

    /// Number of reset pulses issued
    pub fn reset_count(&self) -> usize {
        self.resets
    }
}

impl SensorBus for MockBus {
    fn write_register(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        if self.fail_write_at == Some(address) {
            return Err(BusError::Nack { address });
        }
        trace!("mock write 0x{:04X} = 0x{:02X}", address, value);
        self.registers.insert(address, value);
        self.writes.push(RegisterWrite::new(address, value));
        Ok(())
    }

    fn read_register(&mut self, address: u16) -> Result<u8, BusError> {
        let value = match address {
            REG_CHIP_ID_HIGH => (self.chip_id >> 8) as u8,
            REG_CHIP_ID_LOW => (self.chip_id & 0xFF) as u8,
            _ => self.registers.get(&address).copied().unwrap_or(0),
        };
        Ok(value)
    }

    fn pulse_reset(&mut self) -> Result<(), BusError> {
        self.resets += 1;
        self.polls_seen = 0;
        self.registers.clear();
        Ok(())
    }

    fn reset_complete(&mut self) -> Result<bool, BusError> {
        self.polls_seen += 1;
        Ok(match self.reset_polls {
            Some(polls) => self.polls_seen > polls,
            None => false,
        })
    }
}

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Simulated DVP frame source producing eight vertical color bars
#[derive(Debug, Clone, Default)]
pub struct MockFrameSource {
    frames: u64,
    pending_timeouts: usize,
    bus_failure: bool,
}

impl MockFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time out on the next `count` reads
    pub fn with_timeouts(mut self, count: usize) -> Self {
        self.pending_timeouts = count;
        self
    }

    /// Fail every read with a bus error
    pub fn failing(mut self) -> Self {
        self.bus_failure = true;
        self
    }

    /// Frames produced so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSource for MockFrameSource {
    fn read_frame(&mut self, frame: &mut FrameBuffer) -> Result<usize, CaptureError> {
        if self.bus_failure {
            return Err(CaptureError::Bus(BusError::Io("DMA descriptor error".into())));
        }
        if self.pending_timeouts > 0 {
            self.pending_timeouts -= 1;
            return Err(CaptureError::Timeout);
        }

        let meta = *frame.meta();
        let width = meta.width as usize;
        let data = frame.data_mut();
        let len = fill_bars(data, width, meta.format);
        self.frames += 1;
        Ok(len)
    }
}

fn bar_color(x: usize, width: usize) -> [u8; 3] {
    BARS[(x * BARS.len() / width.max(1)).min(BARS.len() - 1)]
}

fn fill_bars(data: &mut [u8], width: usize, format: PixelFormat) -> usize {
    if width == 0 {
        return 0;
    }
    match format {
        PixelFormat::Rgb565 => {
            for (i, px) in data.chunks_exact_mut(2).enumerate() {
                let [r, g, b] = bar_color(i % width, width);
                let v = (((r as u16) >> 3) << 11) | (((g as u16) >> 2) << 5) | ((b as u16) >> 3);
                px.copy_from_slice(&v.to_be_bytes());
            }
            data.len() & !1
        }
        PixelFormat::Yuv422 => {
            for (i, pair) in data.chunks_exact_mut(4).enumerate() {
                let x = (i * 2) % width;
                let (y0, u, v) = rgb_to_yuv(bar_color(x, width));
                let (y1, _, _) = rgb_to_yuv(bar_color(x + 1, width));
                pair.copy_from_slice(&[y0, u, y1, v]);
            }
            data.len() & !3
        }
        PixelFormat::Grayscale => {
            for (i, px) in data.iter_mut().enumerate() {
                *px = rgb_to_yuv(bar_color(i % width, width)).0;
            }
            data.len()
        }
        PixelFormat::Jpeg => 0,
    }
}

/// BT.601 full-range RGB to YCbCr
fn rgb_to_yuv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = (77 * r + 150 * g + 29 * b) >> 8;
    let u = ((-43 * r - 85 * g + 128 * b) >> 8) + 128;
    let v = ((128 * r - 107 * g - 21 * b) >> 8) + 128;
    (
        y.clamp(0, 255) as u8,
        u.clamp(0, 255) as u8,
        v.clamp(0, 255) as u8,
    )
}
