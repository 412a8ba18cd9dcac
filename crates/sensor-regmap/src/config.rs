//! Sensor configuration and capability types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel format requested from the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// 2 bytes per pixel, 5-6-5 packed RGB
    #[default]
    Rgb565,
    /// 2 bytes per pixel, YCbYCr ordering
    Yuv422,
    /// 1 byte per pixel luma only
    Grayscale,
    /// Compressed; not produced by every sensor
    Jpeg,
}

impl PixelFormat {
    /// Bytes per pixel for raw formats, `None` for compressed ones
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => Some(2),
            PixelFormat::Grayscale => Some(1),
            PixelFormat::Jpeg => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Yuv422 => "YUV422",
            PixelFormat::Grayscale => "GRAYSCALE",
            PixelFormat::Jpeg => "JPEG",
        };
        f.write_str(name)
    }
}

/// Output frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameSize {
    /// 160x120
    #[serde(rename = "160x120")]
    Qqvga,
    /// 320x240
    #[default]
    #[serde(rename = "320x240")]
    Qvga,
    /// 640x480
    #[serde(rename = "640x480")]
    Vga,
    /// 800x600
    #[serde(rename = "800x600")]
    Svga,
    /// 1600x1200 (full sensor array)
    #[serde(rename = "1600x1200")]
    Uxga,
}

impl FrameSize {
    /// Width and height in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qvga => (320, 240),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Uxga => (1600, 1200),
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{}x{}", w, h)
    }
}

/// Sensor configuration handed over by the firmware framework
///
/// Fixed once applied: a pixel format or frame size change needs a full
/// re-init because buffer sizing depends on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Output pixel format
    pub pixel_format: PixelFormat,
    /// Flip the image upside down
    pub vertical_flip: bool,
    /// Mirror the image left to right
    pub horizontal_mirror: bool,
    /// Output frame size
    pub frame_size: FrameSize,
    /// Replace sensor output with the built-in test image
    pub test_pattern: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb565,
            vertical_flip: true,
            horizontal_mirror: true,
            frame_size: FrameSize::Qvga,
            test_pattern: false,
        }
    }
}

impl SensorConfig {
    /// Create a config with the given orientation and format, defaults elsewhere
    pub fn new(pixel_format: PixelFormat, vertical_flip: bool, horizontal_mirror: bool) -> Self {
        Self {
            pixel_format,
            vertical_flip,
            horizontal_mirror,
            ..Default::default()
        }
    }

    /// Whether moving from `self` to `other` changes buffer geometry
    pub fn requires_reinit(&self, other: &SensorConfig) -> bool {
        self.pixel_format != other.pixel_format || self.frame_size != other.frame_size
    }

    /// Size in bytes of one raw frame, `None` for compressed formats
    pub fn frame_bytes(&self) -> Option<usize> {
        let (w, h) = self.frame_size.dimensions();
        self.pixel_format
            .bytes_per_pixel()
            .map(|bpp| w as usize * h as usize * bpp)
    }
}

/// What a sensor model can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorCapabilities {
    /// Model name
    pub name: &'static str,
    /// Expected value of the chip id registers
    pub chip_id: u16,
    /// Supported pixel formats
    pub formats: &'static [PixelFormat],
    /// Supported frame sizes
    pub frame_sizes: &'static [FrameSize],
}

impl SensorCapabilities {
    pub fn supports_format(&self, format: PixelFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn supports_frame_size(&self, size: FrameSize) -> bool {
        self.frame_sizes.contains(&size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_component_schema() {
        let config = SensorConfig::default();
        assert_eq!(config.pixel_format, PixelFormat::Rgb565);
        assert!(config.vertical_flip);
        assert!(config.horizontal_mirror);
        assert_eq!(config.frame_size, FrameSize::Qvga);
    }

    #[test]
    fn test_frame_bytes() {
        let config = SensorConfig::new(PixelFormat::Yuv422, false, false);
        assert_eq!(config.frame_bytes(), Some(320 * 240 * 2));

        let jpeg = SensorConfig::new(PixelFormat::Jpeg, false, false);
        assert_eq!(jpeg.frame_bytes(), None);
    }

    #[test]
    fn test_requires_reinit() {
        let base = SensorConfig::default();
        let flipped = SensorConfig {
            vertical_flip: false,
            ..base
        };
        let yuv = SensorConfig {
            pixel_format: PixelFormat::Yuv422,
            ..base
        };
        let vga = SensorConfig {
            frame_size: FrameSize::Vga,
            ..base
        };

        assert!(!base.requires_reinit(&flipped));
        assert!(base.requires_reinit(&yuv));
        assert!(base.requires_reinit(&vga));
    }

    #[test]
    fn test_format_display() {
        assert_eq!(PixelFormat::Yuv422.to_string(), "YUV422");
        assert_eq!(FrameSize::Uxga.to_string(), "1600x1200");
    }
}
