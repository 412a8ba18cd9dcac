//! Driver lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of past states kept for diagnostics
pub const HISTORY_LEN: usize = 32;

/// Lifecycle state of the sensor driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DriverState {
    /// Not powered up, no buffers allocated
    #[default]
    Uninitialized,
    /// Reset pulse issued, waiting for the sensor
    Resetting,
    /// Register sequence in flight
    Configuring,
    /// Output enabled, frames may be captured
    Streaming,
    /// Configured but output disabled
    Stopped,
    /// Unrecoverable error; only reset or teardown leave this state
    Faulted,
}

impl DriverState {
    /// Whether the sensor holds a configuration (buffers allocated, registers programmed)
    pub fn is_configured(&self) -> bool {
        matches!(self, DriverState::Streaming | DriverState::Stopped)
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Uninitialized => "Uninitialized",
            DriverState::Resetting => "Resetting",
            DriverState::Configuring => "Configuring",
            DriverState::Streaming => "Streaming",
            DriverState::Stopped => "Stopped",
            DriverState::Faulted => "Faulted",
        };
        f.write_str(name)
    }
}

/// Bounded record of the states the driver passed through
#[derive(Debug, Clone)]
pub struct StateHistory {
    entries: Vec<DriverState>,
}

impl Default for StateHistory {
    fn default() -> Self {
        Self {
            entries: vec![DriverState::Uninitialized],
        }
    }
}

impl StateHistory {
    pub fn push(&mut self, state: DriverState) {
        self.entries.push(state);

        if self.entries.len() > HISTORY_LEN {
            self.entries.remove(0);
        }
    }

    /// Oldest first
    pub fn as_slice(&self) -> &[DriverState] {
        &self.entries
    }
}
