//! GC2145 register definitions
//!
//! Galaxycore GC2145, 2MP CMOS sensor with a DVP output and an SCCB control
//! bus. Registers live in pages selected through 0xFE; every address below is
//! `(page << 8) | offset`. All control registers used here sit in page 0.

use crate::config::{FrameSize, PixelFormat, SensorCapabilities};
use crate::map::{LegalValues, RegisterDescriptor, RegisterMap};

/// Value read back from 0xF0/0xF1
pub const CHIP_ID: u16 = 0x2145;

/// Chip id, high byte (read only)
pub const REG_CHIP_ID_HIGH: u16 = 0x00F0;
/// Chip id, low byte (read only)
pub const REG_CHIP_ID_LOW: u16 = 0x00F1;

/// Analog mode 1: bit 0 mirror, bit 1 upside down
pub const REG_ANALOG_MODE1: u16 = 0x0017;
/// ISP output format select
pub const REG_OUTPUT_FORMAT: u16 = 0x0084;
/// Debug mode: bit 0 selects the internal test image
pub const REG_TEST_PATTERN: u16 = 0x008C;
/// Output crop window enable
pub const REG_CROP_ENABLE: u16 = 0x0090;
pub const REG_OUT_HEIGHT_HIGH: u16 = 0x0095;
pub const REG_OUT_HEIGHT_LOW: u16 = 0x0096;
pub const REG_OUT_WIDTH_HIGH: u16 = 0x0097;
pub const REG_OUT_WIDTH_LOW: u16 = 0x0098;
/// Subsample ratio, row factor in the high nibble, column factor in the low
pub const REG_SUBSAMPLE: u16 = 0x0099;
/// Pad I/O output enable (VSYNC, HREF, PCLK, data)
pub const REG_OUTPUT_ENABLE: u16 = 0x00F2;

pub const ANALOG_MODE1_BASE: u8 = 0x14;
pub const ANALOG_MODE1_MIRROR: u8 = 0x01;
pub const ANALOG_MODE1_FLIP: u8 = 0x02;

pub const FORMAT_YUV422: u8 = 0x02;
pub const FORMAT_RGB565: u8 = 0x06;

pub const OUTPUT_DISABLED: u8 = 0x00;
pub const OUTPUT_ENABLED: u8 = 0x0F;

const FORMATS: &[u8] = &[FORMAT_YUV422, FORMAT_RGB565];
const ANALOG_MODES: &[u8] = &[0x14, 0x15, 0x16, 0x17];
const SUBSAMPLE_RATIOS: &[u8] = &[0x11, 0x22, 0x44, 0x88];
const ON_OFF: &[u8] = &[0x00, 0x01];
const OUTPUT_MODES: &[u8] = &[OUTPUT_DISABLED, OUTPUT_ENABLED];

const TABLE: &[RegisterDescriptor] = &[
    RegisterDescriptor::new(REG_ANALOG_MODE1, "ANALOG_MODE1", LegalValues::OneOf(ANALOG_MODES)),
    RegisterDescriptor::new(REG_OUTPUT_FORMAT, "OUTPUT_FORMAT", LegalValues::OneOf(FORMATS)),
    RegisterDescriptor::new(REG_TEST_PATTERN, "DEBUG_MODE2", LegalValues::OneOf(ON_OFF)),
    RegisterDescriptor::new(REG_CROP_ENABLE, "CROP_WIN_MODE", LegalValues::OneOf(ON_OFF)),
    RegisterDescriptor::new(REG_OUT_HEIGHT_HIGH, "OUT_WIN_HEIGHT_H", LegalValues::Range { min: 0x00, max: 0x07 }),
    RegisterDescriptor::new(REG_OUT_HEIGHT_LOW, "OUT_WIN_HEIGHT_L", LegalValues::Range { min: 0x00, max: 0xFF }),
    RegisterDescriptor::new(REG_OUT_WIDTH_HIGH, "OUT_WIN_WIDTH_H", LegalValues::Range { min: 0x00, max: 0x07 }),
    RegisterDescriptor::new(REG_OUT_WIDTH_LOW, "OUT_WIN_WIDTH_L", LegalValues::Range { min: 0x00, max: 0xFF }),
    RegisterDescriptor::new(REG_SUBSAMPLE, "SUBSAMPLE", LegalValues::OneOf(SUBSAMPLE_RATIOS)),
    RegisterDescriptor::new(REG_OUTPUT_ENABLE, "PAD_IO", LegalValues::OneOf(OUTPUT_MODES)),
];

/// What the GC2145 can produce. There is no JPEG engine on this part.
pub const CAPABILITIES: SensorCapabilities = SensorCapabilities {
    name: "GC2145",
    chip_id: CHIP_ID,
    formats: &[PixelFormat::Rgb565, PixelFormat::Yuv422],
    frame_sizes: &[
        FrameSize::Qqvga,
        FrameSize::Qvga,
        FrameSize::Vga,
        FrameSize::Svga,
        FrameSize::Uxga,
    ],
};

impl RegisterMap {
    /// Register map of the GC2145
    pub fn gc2145() -> Self {
        RegisterMap::from_table(TABLE)
    }
}

/// Output format encoding, `None` if the sensor cannot produce `format`
pub fn format_bits(format: PixelFormat) -> Option<u8> {
    match format {
        PixelFormat::Rgb565 => Some(FORMAT_RGB565),
        PixelFormat::Yuv422 => Some(FORMAT_YUV422),
        PixelFormat::Grayscale | PixelFormat::Jpeg => None,
    }
}

/// Analog mode 1 value for an orientation
pub fn orientation_bits(vertical_flip: bool, horizontal_mirror: bool) -> u8 {
    let mut value = ANALOG_MODE1_BASE;
    if horizontal_mirror {
        value |= ANALOG_MODE1_MIRROR;
    }
    if vertical_flip {
        value |= ANALOG_MODE1_FLIP;
    }
    value
}

/// Subsample ratio that brings the 1600x1200 array down to at least `size`
///
/// The crop window then trims the subsampled image to the exact size.
pub fn subsample_ratio(size: FrameSize) -> u8 {
    match size {
        FrameSize::Uxga => 0x11,
        FrameSize::Svga | FrameSize::Vga => 0x22,
        FrameSize::Qvga => 0x44,
        FrameSize::Qqvga => 0x88,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_no_duplicates() {
        assert!(RegisterMap::new(TABLE.to_vec()).is_ok());
        assert_eq!(RegisterMap::gc2145().len(), TABLE.len());
    }

    #[test]
    fn test_chip_id_registers_not_writable() {
        let map = RegisterMap::gc2145();
        assert!(map.descriptor(REG_CHIP_ID_HIGH).is_none());
        assert!(map.descriptor(REG_CHIP_ID_LOW).is_none());
    }

    #[test]
    fn test_orientation_bits() {
        assert_eq!(orientation_bits(false, false), 0x14);
        assert_eq!(orientation_bits(false, true), 0x15);
        assert_eq!(orientation_bits(true, false), 0x16);
        assert_eq!(orientation_bits(true, true), 0x17);
    }

    #[test]
    fn test_no_jpeg_path() {
        assert!(!CAPABILITIES.supports_format(PixelFormat::Jpeg));
        assert_eq!(format_bits(PixelFormat::Jpeg), None);
        assert_eq!(format_bits(PixelFormat::Rgb565), Some(FORMAT_RGB565));
    }

    #[test]
    fn test_subsampled_array_covers_frame() {
        for &size in CAPABILITIES.frame_sizes {
            let ratio = subsample_ratio(size);
            let factor = (ratio & 0x0F) as u32;
            assert!(1600 / factor >= size.width(), "{} too small", size);
            assert!(1200 / factor >= size.height(), "{} too small", size);
        }
    }
}
