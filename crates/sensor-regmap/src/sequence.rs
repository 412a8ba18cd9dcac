//! Configuration to register-write sequencing
//!
//! The write order is fixed: window and size, output format, test pattern,
//! orientation, then output enable. A fault part way through therefore leaves
//! the sensor in one of a few well-defined intermediate states, never with
//! orientation applied to a stale format or output running before setup is
//! complete.

use crate::config::SensorConfig;
use crate::error::RegisterError;
use crate::gc2145::{self, CAPABILITIES};
use crate::map::{RegisterFile, RegisterWrite};
use tracing::trace;

/// Produce the writes that realize `config` on a GC2145
///
/// Pure: the capability check happens before any write is produced, so a
/// rejected config never yields a partial sequence.
pub fn validate(config: &SensorConfig) -> Result<Vec<RegisterWrite>, RegisterError> {
    if !CAPABILITIES.supports_format(config.pixel_format) {
        return Err(RegisterError::UnsupportedFormat(config.pixel_format));
    }
    if !CAPABILITIES.supports_frame_size(config.frame_size) {
        return Err(RegisterError::UnsupportedFrameSize(config.frame_size));
    }
    let format = gc2145::format_bits(config.pixel_format)
        .ok_or(RegisterError::UnsupportedFormat(config.pixel_format))?;

    let (width, height) = config.frame_size.dimensions();

    let writes = vec![
        RegisterWrite::new(gc2145::REG_CROP_ENABLE, 0x01),
        RegisterWrite::new(gc2145::REG_SUBSAMPLE, gc2145::subsample_ratio(config.frame_size)),
        RegisterWrite::new(gc2145::REG_OUT_HEIGHT_HIGH, (height >> 8) as u8),
        RegisterWrite::new(gc2145::REG_OUT_HEIGHT_LOW, (height & 0xFF) as u8),
        RegisterWrite::new(gc2145::REG_OUT_WIDTH_HIGH, (width >> 8) as u8),
        RegisterWrite::new(gc2145::REG_OUT_WIDTH_LOW, (width & 0xFF) as u8),
        RegisterWrite::new(gc2145::REG_OUTPUT_FORMAT, format),
        RegisterWrite::new(gc2145::REG_TEST_PATTERN, config.test_pattern as u8),
        RegisterWrite::new(
            gc2145::REG_ANALOG_MODE1,
            gc2145::orientation_bits(config.vertical_flip, config.horizontal_mirror),
        ),
        RegisterWrite::new(gc2145::REG_OUTPUT_ENABLE, gc2145::OUTPUT_ENABLED),
    ];

    trace!("Sequenced {} writes for {:?}", writes.len(), config);
    Ok(writes)
}

/// Writes from `writes` whose value differs from the shadow in `file`
///
/// Order is preserved, so the delta keeps the format/orientation/enable
/// ordering of the full sequence.
pub fn delta(file: &RegisterFile, writes: &[RegisterWrite]) -> Vec<RegisterWrite> {
    writes
        .iter()
        .filter(|w| file.read(w.address) != Some(w.value))
        .copied()
        .collect()
}
