//! Driver diagnostics snapshot

use crate::state::DriverState;
use sensor_regmap::SensorConfig;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the driver, safe to serialize and ship off-device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub sensor: String,
    pub state: DriverState,
    /// Applied configuration, if any
    pub config: Option<SensorConfig>,
    /// Most recent error that faulted the driver
    pub last_fault: Option<String>,
    pub frames_captured: u64,
    /// Capture attempts that found every buffer held
    pub pool_stalls: u64,
    pub capture_timeouts: u64,
    /// Releases of buffers the pool did not hold
    pub double_releases: u64,
    pub buffers_total: usize,
    pub buffers_free: usize,
}

/// Running counters kept by the driver
#[derive(Debug, Clone, Default)]
pub(crate) struct Counters {
    pub frames_captured: u64,
    pub pool_stalls: u64,
    pub capture_timeouts: u64,
    pub double_releases: u64,
    pub last_fault: Option<String>,
}
