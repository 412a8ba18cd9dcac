//! GC2145 Camera Node
//!
//! Loads configuration, brings the sensor up, streams a number of frames
//! through the capture service and reports driver diagnostics.

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use gc2145_driver::encode::DEFAULT_JPEG_QUALITY;
use gc2145_driver::{
    encode_jpeg, CaptureConfig, CaptureService, Diagnostics, DriverOptions, Gc2145Driver, MockBus,
    MockFrameSource, Requester, SensorConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Prefix for environment overrides, e.g. `GC2145__SENSOR__VERTICAL_FLIP=false`
pub const ENV_PREFIX: &str = "GC2145";

/// Snapshot export settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub sensor: SensorConfig,
    pub driver: DriverOptions,
    pub capture: CaptureConfig,
    pub export: ExportConfig,
}

/// Load configuration from an optional TOML file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let settings = builder
        .add_source(env_source())
        .build()
        .context("failed to read configuration")?;

    settings
        .try_deserialize()
        .context("invalid configuration")
}

/// Parse configuration from TOML text plus environment overrides
pub fn parse_config(toml: &str) -> Result<NodeConfig> {
    let settings = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .add_source(env_source())
        .build()
        .context("failed to parse configuration")?;

    settings
        .try_deserialize()
        .context("invalid configuration")
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Parse a log level name, falling back to INFO
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging
pub fn init_logging(level: Level, json: bool) -> Result<()> {
    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Run one capture session and return the final diagnostics
///
/// A sensor that fails to come up is reported through the diagnostics rather
/// than as an error.
pub async fn run(config: NodeConfig, frames: usize, snapshot: Option<PathBuf>) -> Result<Diagnostics> {
    let mut driver = Gc2145Driver::new(MockBus::new(), config.driver);

    if let Err(e) = driver.init(config.sensor) {
        error!("Sensor init failed: {}", e);
        return Ok(driver.diagnostics());
    }
    driver.log_config();

    let mut service = CaptureService::spawn(driver, MockFrameSource::new(), config.capture);
    service.start_stream(Requester::Api);

    // Each frame goes back to the pool before waiting on the next one
    let mut jpeg = None;
    for n in 0..frames {
        let Some(frame) = service.next().await else {
            error!("Capture stopped early");
            break;
        };
        info!(
            sequence = frame.meta().sequence,
            bytes = frame.meta().len,
            buffer = frame.index(),
            "Frame captured"
        );
        if n + 1 == frames && snapshot.is_some() {
            jpeg = Some(encode_jpeg(&frame, config.export.jpeg_quality)?);
        }
    }
    service.stop_stream(Requester::Api);

    if let (Some(path), Some(jpeg)) = (snapshot, jpeg) {
        tokio::fs::write(&path, &jpeg)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Snapshot written to {} ({} bytes)", path.display(), jpeg.len());
    }

    let mut driver = service
        .shutdown()
        .ok_or_else(|| anyhow!("capture thread panicked"))?;
    let diagnostics = driver.diagnostics();
    driver.teardown()?;

    Ok(diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc2145_driver::{DriverState, FrameSize, PixelFormat};
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.sensor.frame_size, FrameSize::Qvga);
        assert_eq!(config.driver.buffer_count, 2);
        assert_eq!(config.driver.reset_timeout_ms, 100);
        assert_eq!(config.capture.max_update_interval_ms, 100);
        assert_eq!(config.export.jpeg_quality, 12);
    }

    #[test]
    fn test_parse_sensor_table() {
        let config = parse_config(
            r#"
            [sensor]
            pixel_format = "YUV422"
            vertical_flip = true
            horizontal_mirror = false
            frame_size = "640x480"

            [driver]
            buffer_count = 4

            [export]
            jpeg_quality = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.sensor.pixel_format, PixelFormat::Yuv422);
        assert!(config.sensor.vertical_flip);
        assert!(!config.sensor.horizontal_mirror);
        assert_eq!(config.sensor.frame_size, FrameSize::Vga);
        assert_eq!(config.driver.buffer_count, 4);
        assert_eq!(config.export.jpeg_quality, 12);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(parse_config("[sensor]\npixel_format = \"BAYER\"\n").is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }

    #[tokio::test]
    async fn test_run_captures_frames() {
        let diagnostics = run(NodeConfig::default(), 4, None).await.unwrap();
        assert!(diagnostics.frames_captured >= 4);
        assert_eq!(diagnostics.state, DriverState::Stopped);
        assert_eq!(diagnostics.last_fault, None);
    }

    #[tokio::test]
    async fn test_run_completes_on_single_buffer() {
        let mut config = NodeConfig::default();
        config.driver.buffer_count = 1;
        config.capture.max_update_interval_ms = 0;

        let diagnostics = tokio::time::timeout(Duration::from_secs(5), run(config, 3, None))
            .await
            .expect("run stalled with one buffer")
            .unwrap();
        assert!(diagnostics.frames_captured >= 3);
        assert_eq!(diagnostics.state, DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_run_writes_snapshot() {
        let path = std::env::temp_dir().join(format!("gc2145-snapshot-{}.jpg", std::process::id()));
        let mut config = NodeConfig::default();
        config.capture.max_update_interval_ms = 0;

        run(config, 2, Some(path.clone())).await.unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_run_reports_unsupported_format() {
        let mut config = NodeConfig::default();
        config.sensor.pixel_format = PixelFormat::Jpeg;

        let diagnostics = run(config, 1, None).await.unwrap();
        assert_eq!(diagnostics.state, DriverState::Uninitialized);
        assert_eq!(diagnostics.frames_captured, 0);
    }
}
