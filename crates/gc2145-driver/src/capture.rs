//! Async capture service for tokio
//!
//! Runs the capture loop on a dedicated thread and hands finished frames to
//! async consumers through a bounded channel. Frames waiting in the channel
//! still hold their pool slot, so a slow consumer stalls capture instead of
//! having its frames overwritten.
//!
//! Frames are only captured while someone asks for them: a requester either
//! starts a stream or asks for a single image, which is cleared once a frame
//! has been delivered.

use crate::bus::{FrameSource, SensorBus};
use crate::driver::Gc2145Driver;
use crate::error::DriverError;
use crate::state::DriverState;
use frame_pool::FrameBuffer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capture loop tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frames that may wait for the consumer
    pub channel_capacity: usize,
    /// Pause after a capture timeout before trying again
    pub retry_delay_ms: u64,
    /// Pause while every buffer is held or nobody wants frames
    pub stall_delay_ms: u64,
    /// Minimum spacing between delivered frames (100 ms = 10 fps)
    pub max_update_interval_ms: u64,
    /// Deliver a frame this often even without requesters, 0 disables
    pub idle_update_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 2,
            retry_delay_ms: 100,
            stall_delay_ms: 5,
            max_update_interval_ms: 100,
            idle_update_interval_ms: 0,
        }
    }
}

/// Consumer asking for frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Requester {
    /// Native API client
    Api,
    /// Web server / MJPEG stream
    Web,
}

impl Requester {
    fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// Pending frame requests, one bit per requester
#[derive(Debug, Default)]
struct Requests {
    stream: AtomicU32,
    single: AtomicU32,
}

impl Requests {
    fn any(&self) -> bool {
        self.stream.load(Ordering::SeqCst) != 0 || self.single.load(Ordering::SeqCst) != 0
    }
}

/// Streams frames from a driver running on its own thread
pub struct CaptureService<B: SensorBus + Send + 'static> {
    receiver: mpsc::Receiver<FrameBuffer>,
    shutdown: Arc<AtomicBool>,
    requests: Arc<Requests>,
    handle: JoinHandle<Gc2145Driver<B>>,
}

impl<B: SensorBus + Send + 'static> CaptureService<B> {
    /// Move a streaming driver onto a capture thread
    ///
    /// Nothing is captured until a requester calls `start_stream` or
    /// `request_image`. Capture timeouts and an exhausted pool are retried;
    /// any other error ends the loop. The driver is handed back by `shutdown`.
    pub fn spawn<S>(driver: Gc2145Driver<B>, source: S, config: CaptureConfig) -> Self
    where
        S: FrameSource + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<FrameBuffer>(config.channel_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(Requests::default());
        let shutdown_clone = shutdown.clone();
        let requests_clone = requests.clone();

        let handle = std::thread::spawn(move || {
            capture_loop(driver, source, config, tx, shutdown_clone, requests_clone)
        });

        Self {
            receiver: rx,
            shutdown,
            requests,
            handle,
        }
    }

    /// Deliver frames to `requester` until `stop_stream`
    pub fn start_stream(&self, requester: Requester) {
        debug!("Stream started for {:?}", requester);
        self.requests.stream.fetch_or(requester.bit(), Ordering::SeqCst);
    }

    pub fn stop_stream(&self, requester: Requester) {
        debug!("Stream stopped for {:?}", requester);
        self.requests
            .stream
            .fetch_and(!requester.bit(), Ordering::SeqCst);
    }

    /// Deliver one frame to `requester`
    pub fn request_image(&self, requester: Requester) {
        self.requests.single.fetch_or(requester.bit(), Ordering::SeqCst);
    }

    /// Whether any stream or single-image request is pending
    pub fn has_requests(&self) -> bool {
        self.requests.any()
    }

    /// Receive the next frame, `None` once the capture loop has ended
    pub async fn next(&mut self) -> Option<FrameBuffer> {
        self.receiver.recv().await
    }

    /// Stop the capture thread and take the driver back
    ///
    /// Frames still queued are dropped and return to the pool. Returns `None`
    /// if the capture thread panicked.
    pub fn shutdown(self) -> Option<Gc2145Driver<B>> {
        let CaptureService {
            receiver,
            shutdown,
            handle,
            ..
        } = self;

        shutdown.store(true, Ordering::SeqCst);
        drop(receiver);

        match handle.join() {
            Ok(driver) => Some(driver),
            Err(_) => {
                error!("Capture thread panicked");
                None
            }
        }
    }
}

fn capture_loop<B, S>(
    mut driver: Gc2145Driver<B>,
    mut source: S,
    config: CaptureConfig,
    tx: mpsc::Sender<FrameBuffer>,
    shutdown: Arc<AtomicBool>,
    requests: Arc<Requests>,
) -> Gc2145Driver<B>
where
    B: SensorBus,
    S: FrameSource,
{
    if driver.state() != DriverState::Streaming {
        error!("Capture needs a streaming driver, got {}", driver.state());
        return driver;
    }

    let retry_delay = Duration::from_millis(config.retry_delay_ms);
    let stall_delay = Duration::from_millis(config.stall_delay_ms);
    let min_interval = Duration::from_millis(config.max_update_interval_ms);
    let idle_interval = Duration::from_millis(config.idle_update_interval_ms);
    let started = Instant::now();
    let mut last_delivery: Option<Instant> = None;
    info!("Capture loop started");

    while !shutdown.load(Ordering::SeqCst) {
        let idle_due = !idle_interval.is_zero()
            && last_delivery.unwrap_or(started).elapsed() >= idle_interval;
        if !requests.any() && !idle_due {
            std::thread::sleep(stall_delay);
            continue;
        }

        if let Some(last) = last_delivery {
            let since = last.elapsed();
            if since < min_interval {
                std::thread::sleep(min_interval - since);
                continue;
            }
        }

        match driver.capture_frame(&mut source) {
            Ok(frame) => {
                let single = requests.single.swap(0, Ordering::SeqCst);
                if single != 0 {
                    debug!("Single image request served (mask {:#b})", single);
                }
                last_delivery = Some(Instant::now());
                if tx.blocking_send(frame).is_err() {
                    debug!("Frame receiver dropped");
                    break;
                }
            }
            Err(DriverError::PoolExhausted { .. }) => std::thread::sleep(stall_delay),
            Err(DriverError::CaptureTimeout) => std::thread::sleep(retry_delay),
            Err(e) => {
                error!("Capture loop stopped: {}", e);
                break;
            }
        }
    }

    if driver.state() == DriverState::Streaming {
        if let Err(e) = driver.stop() {
            warn!("Failed to stop sensor output: {}", e);
        }
    }
    info!("Capture loop finished");
    driver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverOptions;
    use crate::mock::{MockBus, MockFrameSource};
    use sensor_regmap::SensorConfig;
    use tokio::time::timeout;

    fn streaming() -> Gc2145Driver<MockBus> {
        let mut driver = Gc2145Driver::new(MockBus::new(), DriverOptions::default());
        driver.init(SensorConfig::default()).unwrap();
        driver
    }

    fn unthrottled() -> CaptureConfig {
        CaptureConfig {
            max_update_interval_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_service_delivers_frames_in_order() {
        let mut service = CaptureService::spawn(streaming(), MockFrameSource::new(), unthrottled());
        service.start_stream(Requester::Api);

        let mut sequences = Vec::new();
        for _ in 0..5 {
            let frame = service.next().await.unwrap();
            sequences.push(frame.meta().sequence);
        }
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

        let driver = service.shutdown().unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.pool().unwrap().free_count(), 2);
    }

    #[tokio::test]
    async fn test_nothing_captured_without_requests() {
        let mut service = CaptureService::spawn(streaming(), MockFrameSource::new(), unthrottled());

        assert!(!service.has_requests());
        assert!(timeout(Duration::from_millis(100), service.next()).await.is_err());

        let driver = service.shutdown().unwrap();
        assert_eq!(driver.diagnostics().frames_captured, 0);
    }

    #[tokio::test]
    async fn test_single_request_delivers_one_frame() {
        let mut service = CaptureService::spawn(streaming(), MockFrameSource::new(), unthrottled());
        service.request_image(Requester::Web);

        let frame = service.next().await.unwrap();
        assert_eq!(frame.meta().sequence, 0);
        drop(frame);

        assert!(timeout(Duration::from_millis(100), service.next()).await.is_err());
        assert!(!service.has_requests());

        let driver = service.shutdown().unwrap();
        assert_eq!(driver.diagnostics().frames_captured, 1);
    }

    #[tokio::test]
    async fn test_max_update_interval_spaces_frames() {
        let config = CaptureConfig {
            max_update_interval_ms: 50,
            ..Default::default()
        };
        let mut service = CaptureService::spawn(streaming(), MockFrameSource::new(), config);
        service.start_stream(Requester::Api);

        let first = service.next().await.unwrap().meta().timestamp_ns;
        let second = service.next().await.unwrap().meta().timestamp_ns;
        assert!(second - first >= 50_000_000, "frames {}ns apart", second - first);

        service.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_idle_interval_delivers_without_requests() {
        let config = CaptureConfig {
            max_update_interval_ms: 0,
            idle_update_interval_ms: 20,
            ..Default::default()
        };
        let mut service = CaptureService::spawn(streaming(), MockFrameSource::new(), config);

        let frame = timeout(Duration::from_secs(2), service.next()).await.unwrap();
        assert!(frame.is_some());
        drop(frame);

        service.shutdown().unwrap();
    }

    #[test]
    fn test_stream_requests_per_requester() {
        let service = CaptureService::spawn(streaming(), MockFrameSource::new(), unthrottled());

        service.start_stream(Requester::Api);
        service.start_stream(Requester::Web);
        service.stop_stream(Requester::Api);
        assert!(service.has_requests());
        service.stop_stream(Requester::Web);
        assert!(!service.has_requests());

        service.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_service_retries_after_timeout() {
        let config = CaptureConfig {
            retry_delay_ms: 1,
            ..unthrottled()
        };
        let source = MockFrameSource::new().with_timeouts(2);
        let mut service = CaptureService::spawn(streaming(), source, config);
        service.start_stream(Requester::Api);

        let frame = service.next().await.unwrap();
        assert_eq!(frame.meta().sequence, 0);
        drop(frame);

        let driver = service.shutdown().unwrap();
        assert_eq!(driver.diagnostics().capture_timeouts, 2);
    }

    #[tokio::test]
    async fn test_service_ends_on_fault() {
        let mut service =
            CaptureService::spawn(streaming(), MockFrameSource::new().failing(), unthrottled());
        service.start_stream(Requester::Api);

        assert!(service.next().await.is_none());
        let driver = service.shutdown().unwrap();
        assert_eq!(driver.state(), DriverState::Faulted);
    }

    #[tokio::test]
    async fn test_service_without_streaming_driver_ends() {
        let driver = Gc2145Driver::new(MockBus::new(), DriverOptions::default());
        let mut service = CaptureService::spawn(driver, MockFrameSource::new(), unthrottled());
        service.start_stream(Requester::Api);

        assert!(service.next().await.is_none());
        let driver = service.shutdown().unwrap();
        assert_eq!(driver.state(), DriverState::Uninitialized);
    }
}
