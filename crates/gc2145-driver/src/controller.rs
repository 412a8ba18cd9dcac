//! Orientation and format control
//!
//! Turns a requested `SensorConfig` into the register writes the driver sends.
//! Nothing here touches the bus; every rejection happens before the first write.

use crate::error::DriverError;
use sensor_regmap::{delta, validate, RegisterFile, RegisterWrite, SensorConfig};
use tracing::debug;

/// Full write sequence for `config`
///
/// Pixel format and frame size are checked against the sensor capabilities
/// before any write is produced.
pub fn apply(config: &SensorConfig) -> Result<Vec<RegisterWrite>, DriverError> {
    Ok(validate(config)?)
}

/// Writes needed to move a configured sensor from `current` to `next`
///
/// Only orientation and test pattern may change in place. Anything that changes
/// buffer geometry is rejected and the caller must go through a full re-init.
/// The result skips registers whose shadow value already matches.
pub fn plan_reconfigure(
    current: &SensorConfig,
    next: &SensorConfig,
    shadow: &RegisterFile,
) -> Result<Vec<RegisterWrite>, DriverError> {
    let writes = apply(next)?;

    if current.requires_reinit(next) {
        return Err(DriverError::UnsupportedLiveReconfiguration);
    }

    let changed = delta(shadow, &writes);
    debug!(
        "Reconfigure needs {} of {} writes",
        changed.len(),
        writes.len()
    );
    Ok(changed)
}

/// Human-readable orientation for logs
pub fn orientation_label(config: &SensorConfig) -> &'static str {
    match (config.vertical_flip, config.horizontal_mirror) {
        (false, false) => "normal",
        (true, false) => "flipped",
        (false, true) => "mirrored",
        (true, true) => "rotated 180",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_regmap::gc2145::{orientation_bits, REG_ANALOG_MODE1};
    use sensor_regmap::{FrameSize, PixelFormat, RegisterMap};

    fn programmed(config: &SensorConfig) -> RegisterFile {
        let mut file = RegisterFile::new(RegisterMap::gc2145());
        let writes = apply(config).unwrap();
        file.apply(&writes).unwrap();
        file
    }

    #[test]
    fn test_apply_rejects_jpeg() {
        let config = SensorConfig::new(PixelFormat::Jpeg, false, false);
        assert_eq!(
            apply(&config),
            Err(DriverError::UnsupportedFormat(PixelFormat::Jpeg))
        );
    }

    #[test]
    fn test_orientation_change_is_single_write() {
        let current = SensorConfig::new(PixelFormat::Rgb565, false, false);
        let next = SensorConfig::new(PixelFormat::Rgb565, true, true);
        let file = programmed(&current);

        let writes = plan_reconfigure(&current, &next, &file).unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].address, REG_ANALOG_MODE1);
        assert_eq!(writes[0].value, orientation_bits(true, true));
    }

    #[test]
    fn test_format_change_needs_reinit() {
        let current = SensorConfig::new(PixelFormat::Rgb565, false, false);
        let next = SensorConfig::new(PixelFormat::Yuv422, false, false);
        let file = programmed(&current);

        assert_eq!(
            plan_reconfigure(&current, &next, &file),
            Err(DriverError::UnsupportedLiveReconfiguration)
        );
    }

    #[test]
    fn test_frame_size_change_needs_reinit() {
        let current = SensorConfig::default();
        let next = SensorConfig {
            frame_size: FrameSize::Vga,
            ..current
        };
        let file = programmed(&current);

        assert_eq!(
            plan_reconfigure(&current, &next, &file),
            Err(DriverError::UnsupportedLiveReconfiguration)
        );
    }

    #[test]
    fn test_unsupported_target_reported_first() {
        let current = SensorConfig::default();
        let next = SensorConfig::new(PixelFormat::Grayscale, false, false);
        let file = programmed(&current);

        assert_eq!(
            plan_reconfigure(&current, &next, &file),
            Err(DriverError::UnsupportedFormat(PixelFormat::Grayscale))
        );
    }

    #[test]
    fn test_same_config_is_empty_delta() {
        let config = SensorConfig::default();
        let file = programmed(&config);
        assert!(plan_reconfigure(&config, &config, &file).unwrap().is_empty());
    }

    #[test]
    fn test_orientation_label() {
        assert_eq!(orientation_label(&SensorConfig::default()), "rotated 180");
        assert_eq!(
            orientation_label(&SensorConfig::new(PixelFormat::Yuv422, true, false)),
            "flipped"
        );
    }
}
