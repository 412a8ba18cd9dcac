//! Software JPEG export
//!
//! The GC2145 has no JPEG engine, so snapshots are converted to RGB888 and
//! compressed on the host.

use frame_pool::{FrameBuffer, FrameMeta};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use sensor_regmap::PixelFormat;
use thiserror::Error;
use tracing::debug;

/// Default JPEG quality for snapshots
pub const DEFAULT_JPEG_QUALITY: u8 = 12;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Cannot convert {0} frames to RGB")]
    UnsupportedFormat(PixelFormat),

    #[error("Frame holds {actual} bytes, expected {expected}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("JPEG encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Convert a raw frame to packed RGB888
///
/// RGB565 is read big-endian (high byte first, as the DVP delivers it) and
/// YUV422 as Y0 Cb Y1 Cr.
pub fn to_rgb888(frame: &FrameBuffer) -> Result<Vec<u8>, EncodeError> {
    convert(frame.meta(), frame.data())
}

fn convert(meta: &FrameMeta, data: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let pixels = meta.width as usize * meta.height as usize;
    let bpp = meta
        .format
        .bytes_per_pixel()
        .ok_or(EncodeError::UnsupportedFormat(meta.format))?;
    if data.len() < pixels * bpp {
        return Err(EncodeError::ShortFrame {
            expected: pixels * bpp,
            actual: data.len(),
        });
    }

    let data = &data[..pixels * bpp];
    let mut rgb = Vec::with_capacity(pixels * 3);

    match meta.format {
        PixelFormat::Rgb565 => {
            for px in data.chunks_exact(2) {
                let v = u16::from_be_bytes([px[0], px[1]]);
                let r = ((v >> 11) & 0x1F) as u8;
                let g = ((v >> 5) & 0x3F) as u8;
                let b = (v & 0x1F) as u8;
                rgb.extend_from_slice(&[(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]);
            }
        }
        PixelFormat::Yuv422 => {
            for pair in data.chunks_exact(4) {
                let (y0, u, y1, v) = (pair[0], pair[1], pair[2], pair[3]);
                rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
                rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
            }
        }
        PixelFormat::Grayscale => {
            for &y in data {
                rgb.extend_from_slice(&[y, y, y]);
            }
        }
        PixelFormat::Jpeg => return Err(EncodeError::UnsupportedFormat(PixelFormat::Jpeg)),
    }

    Ok(rgb)
}

/// BT.601 full-range YCbCr to RGB
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let r = y + ((359 * v) >> 8);
    let g = y - ((88 * u + 183 * v) >> 8);
    let b = y + ((454 * u) >> 8);
    [r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8]
}

/// Compress a captured frame to JPEG
///
/// `quality` is clamped to 1..=100.
pub fn encode_jpeg(frame: &FrameBuffer, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let meta = frame.meta();
    let rgb = to_rgb888(frame)?;
    let expected = rgb.len();
    let image = RgbImage::from_raw(meta.width, meta.height, rgb).ok_or(EncodeError::ShortFrame {
        expected: meta.width as usize * meta.height as usize * 3,
        actual: expected,
    })?;

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(&image)?;

    debug!(
        "Encoded frame {} ({}x{}) to {} byte JPEG",
        meta.sequence,
        meta.width,
        meta.height,
        out.len()
    );
    Ok(out)
}
