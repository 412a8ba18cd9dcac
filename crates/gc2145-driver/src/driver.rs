//! GC2145 Driver State Machine
//!
//! Owns the bus, the shadow register file and the frame pool. Every operation
//! checks the current state before touching hardware, so a rejected call has
//! no side effects. Fatal errors move the driver to `Faulted`, which only
//! `reset` or `teardown` can leave.

use crate::bus::{FrameSource, SensorBus};
use crate::controller;
use crate::diagnostics::{Counters, Diagnostics};
use crate::error::{CaptureError, DriverError};
use crate::state::{DriverState, StateHistory};
use frame_pool::{FrameBuffer, FrameGeometry, FramePool, DEFAULT_BUFFER_COUNT};
use sensor_regmap::gc2145::{
    CAPABILITIES, OUTPUT_DISABLED, REG_CHIP_ID_HIGH, REG_CHIP_ID_LOW, REG_OUTPUT_ENABLE,
};
use sensor_regmap::{RegisterFile, RegisterMap, RegisterWrite, SensorConfig};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use DriverState::*;

/// Driver tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    /// Frame buffers to allocate (2 = double buffering)
    pub buffer_count: usize,
    /// Upper bound on the wait for reset-complete
    pub reset_timeout_ms: u64,
    /// Delay between reset-complete polls
    pub reset_poll_interval_ms: u64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            reset_timeout_ms: 100,
            reset_poll_interval_ms: 1,
        }
    }
}

impl DriverOptions {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.reset_poll_interval_ms)
    }
}

/// GC2145 sensor driver
pub struct Gc2145Driver<B: SensorBus> {
    bus: B,
    options: DriverOptions,
    registers: RegisterFile,
    state: DriverState,
    history: StateHistory,
    config: Option<SensorConfig>,
    pool: Option<FramePool>,
    sequence: u32,
    epoch: Instant,
    counters: Counters,
}

impl<B: SensorBus> Gc2145Driver<B> {
    /// Create a driver over `bus` with the GC2145 register map
    pub fn new(bus: B, options: DriverOptions) -> Self {
        Self::with_register_map(bus, options, RegisterMap::gc2145())
    }

    /// Create a driver that validates writes against a custom register map
    pub fn with_register_map(bus: B, options: DriverOptions, map: RegisterMap) -> Self {
        Self {
            bus,
            options,
            registers: RegisterFile::new(map),
            state: Uninitialized,
            history: StateHistory::default(),
            config: None,
            pool: None,
            sequence: 0,
            epoch: Instant::now(),
            counters: Counters::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Recent states, oldest first
    pub fn state_history(&self) -> &[DriverState] {
        self.history.as_slice()
    }

    /// Applied configuration
    pub fn config(&self) -> Option<&SensorConfig> {
        self.config.as_ref()
    }

    /// Frame pool, present from init until reset
    pub fn pool(&self) -> Option<&FramePool> {
        self.pool.as_ref()
    }

    /// Shadow register file
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Power up and configure the sensor, ending in `Streaming`
    ///
    /// The config is checked and the pool allocated before the reset pulse, so
    /// an unsupported config leaves the driver untouched in `Uninitialized`.
    pub fn init(&mut self, config: SensorConfig) -> Result<(), DriverError> {
        self.require(&[Uninitialized], "init")?;

        let writes = controller::apply(&config)?;
        let pool = FramePool::new(self.options.buffer_count, FrameGeometry::from_config(&config))?;

        info!(
            "Initializing {} ({} {}, {} buffers)",
            CAPABILITIES.name,
            config.frame_size,
            config.pixel_format,
            pool.capacity()
        );

        self.pool = Some(pool);
        self.config = Some(config);
        self.registers.clear();
        self.sequence = 0;
        self.epoch = Instant::now();

        self.enter(Resetting);
        if let Err(e) = self.bus.pulse_reset() {
            return Err(self.fault(e.into()));
        }
        self.wait_for_reset()?;
        self.probe_chip_id()?;

        self.enter(Configuring);
        self.write_sequence(&writes)?;
        self.enter(Streaming);

        info!("{} streaming", CAPABILITIES.name);
        Ok(())
    }

    /// Disable sensor output, keeping configuration and buffers
    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.require(&[Streaming], "stop")?;
        self.write_sequence(&[RegisterWrite::new(REG_OUTPUT_ENABLE, OUTPUT_DISABLED)])?;
        self.enter(Stopped);
        info!("{} stopped", CAPABILITIES.name);
        Ok(())
    }

    /// Change orientation or test pattern on a configured sensor
    ///
    /// Only registers whose value changes are written. Ends in `Streaming`.
    /// A pixel format or frame size change is rejected with the state unchanged.
    pub fn reconfigure(&mut self, next: SensorConfig) -> Result<(), DriverError> {
        self.require(&[Streaming, Stopped], "reconfigure")?;
        let current = self.config.ok_or(DriverError::InvalidState {
            state: self.state,
            operation: "reconfigure",
        })?;

        let writes = controller::plan_reconfigure(&current, &next, &self.registers)?;

        info!(
            "Reconfiguring {}: {} -> {}",
            CAPABILITIES.name,
            controller::orientation_label(&current),
            controller::orientation_label(&next)
        );

        self.enter(Configuring);
        self.write_sequence(&writes)?;
        self.config = Some(next);
        self.enter(Streaming);
        Ok(())
    }

    /// Return to `Uninitialized` from any state, dropping buffers and shadow
    ///
    /// Buffers still held by consumers stay valid and are freed when dropped.
    pub fn reset(&mut self) {
        info!("Resetting driver from {}", self.state);
        self.pool = None;
        self.config = None;
        self.registers.clear();
        self.sequence = 0;
        self.enter(Uninitialized);
    }

    /// Disable output if running and release every resource
    ///
    /// A bus error while disabling output faults the driver and is returned.
    /// From `Faulted` no hardware access is attempted.
    pub fn teardown(&mut self) -> Result<(), DriverError> {
        if self.state == Streaming {
            debug!("Disabling output before teardown");
            self.write_sequence(&[RegisterWrite::new(REG_OUTPUT_ENABLE, OUTPUT_DISABLED)])?;
        }
        self.reset();
        Ok(())
    }

    /// Capture one frame into a free pool buffer
    ///
    /// The returned buffer goes back to the pool when dropped or released.
    pub fn capture_frame<S: FrameSource>(&mut self, source: &mut S) -> Result<FrameBuffer, DriverError> {
        self.require(&[Streaming], "capture")?;
        let pool = self.pool.as_ref().ok_or(DriverError::InvalidState {
            state: self.state,
            operation: "capture",
        })?;

        let mut frame = match pool.acquire_for_capture() {
            Ok(frame) => frame,
            Err(e) => {
                self.counters.pool_stalls += 1;
                debug!("No free frame buffer: {}", e);
                return Err(e.into());
            }
        };

        match source.read_frame(&mut frame) {
            Ok(len) => {
                let timestamp_ns = self.epoch.elapsed().as_nanos() as u64;
                frame.stamp(self.sequence, timestamp_ns, len);
                self.sequence = self.sequence.wrapping_add(1);
                self.counters.frames_captured += 1;
                Ok(frame)
            }
            Err(CaptureError::Timeout) => {
                self.counters.capture_timeouts += 1;
                warn!("Frame capture timed out (check XCLK)");
                Err(DriverError::CaptureTimeout)
            }
            Err(e) => Err(self.fault(e.into())),
        }
    }

    /// Hand a frame back to the pool
    ///
    /// A buffer the pool does not hold is logged and counted, then dropped.
    /// Buffers from a pool discarded by `reset` are simply freed.
    pub fn release_frame(&mut self, frame: FrameBuffer) {
        let result = match &self.pool {
            Some(pool) if !frame.is_orphaned() => pool.release(frame),
            _ => frame.release(),
        };
        if let Err(e) = result {
            self.counters.double_releases += 1;
            warn!("Ignoring frame release: {}", e);
        }
    }

    /// Log the applied configuration and register state
    pub fn log_config(&self) {
        let Some(config) = &self.config else {
            info!("{} not configured ({})", CAPABILITIES.name, self.state);
            return;
        };
        info!("=== {} configuration ===", CAPABILITIES.name);
        info!("State: {}", self.state);
        info!("Frame size: {}", config.frame_size);
        info!("Pixel format: {}", config.pixel_format);
        info!(
            "Orientation: {} (vflip={}, hmirror={})",
            controller::orientation_label(config),
            config.vertical_flip,
            config.horizontal_mirror
        );
        info!("Test pattern: {}", config.test_pattern);
        if let Some(pool) = &self.pool {
            info!(
                "Buffers: {} x {} bytes ({} free)",
                pool.capacity(),
                pool.frame_bytes(),
                pool.free_count()
            );
        }
        for (address, value) in self.registers.snapshot() {
            let name = self
                .registers
                .map()
                .descriptor(address)
                .map_or("?", |d| d.name);
            debug!("  0x{:04X} {:<16} = 0x{:02X}", address, name, value);
        }
    }

    /// Snapshot of state, configuration and counters
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            sensor: CAPABILITIES.name.to_string(),
            state: self.state,
            config: self.config,
            last_fault: self.counters.last_fault.clone(),
            frames_captured: self.counters.frames_captured,
            pool_stalls: self.counters.pool_stalls,
            capture_timeouts: self.counters.capture_timeouts,
            double_releases: self.counters.double_releases,
            buffers_total: self.pool.as_ref().map_or(0, FramePool::capacity),
            buffers_free: self.pool.as_ref().map_or(0, FramePool::free_count),
        }
    }

    fn require(&self, allowed: &[DriverState], operation: &'static str) -> Result<(), DriverError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(DriverError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    fn enter(&mut self, state: DriverState) {
        if self.state != state {
            debug!("{} -> {}", self.state, state);
        }
        self.state = state;
        self.history.push(state);
    }

    fn fault(&mut self, err: DriverError) -> DriverError {
        error!("{} fault in {}: {}", CAPABILITIES.name, self.state, err);
        self.counters.last_fault = Some(err.to_string());
        self.enter(Faulted);
        err
    }

    fn wait_for_reset(&mut self) -> Result<(), DriverError> {
        let timeout = self.options.reset_timeout();
        let started = Instant::now();

        loop {
            match self.bus.reset_complete() {
                Ok(true) => {
                    debug!("Reset complete after {:?}", started.elapsed());
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => return Err(self.fault(e.into())),
            }

            if started.elapsed() >= timeout {
                return Err(self.fault(DriverError::ResetTimeout {
                    timeout_ms: self.options.reset_timeout_ms,
                }));
            }
            std::thread::sleep(self.options.poll_interval());
        }
    }

    fn probe_chip_id(&mut self) -> Result<(), DriverError> {
        let high = self.bus.read_register(REG_CHIP_ID_HIGH);
        let low = self.bus.read_register(REG_CHIP_ID_LOW);
        let found = match (high, low) {
            (Ok(high), Ok(low)) => u16::from_be_bytes([high, low]),
            (Err(e), _) | (_, Err(e)) => return Err(self.fault(e.into())),
        };

        if found != CAPABILITIES.chip_id {
            return Err(self.fault(DriverError::ChipIdMismatch {
                expected: CAPABILITIES.chip_id,
                found,
            }));
        }
        debug!("Chip id 0x{:04X}", found);
        Ok(())
    }

    /// Check, send and record each write in order, faulting on the first failure
    fn write_sequence(&mut self, writes: &[RegisterWrite]) -> Result<(), DriverError> {
        for w in writes {
            if let Err(e) = self.registers.map().check(w.address, w.value) {
                return Err(self.fault(e.into()));
            }
            if let Err(source) = self.bus.write_register(w.address, w.value) {
                return Err(self.fault(DriverError::ConfigurationFailed {
                    address: w.address,
                    source,
                }));
            }
            self.registers.record(w.address, w.value);
        }
        Ok(())
    }
}
