//! GC2145 Camera Node - Main Entry Point

use anyhow::Result;
use camera_node::{init_logging, load_config, parse_level, run};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "camera-node")]
#[command(about = "GC2145 sensor bring-up and capture node")]
#[command(version)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to capture before shutting down
    #[arg(short, long, default_value_t = 10)]
    frames: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Write the last captured frame to this path as JPEG
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(parse_level(&args.log_level), args.json_logs)?;

    info!("=== GC2145 Camera Node v{} ===", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config.as_deref())?;
    info!(
        format = %config.sensor.pixel_format,
        size = %config.sensor.frame_size,
        buffers = config.driver.buffer_count,
        "Configuration loaded"
    );

    let diagnostics = run(config, args.frames, args.snapshot).await?;
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);

    Ok(())
}
