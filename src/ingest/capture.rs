use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{FrameFeed, FrameSource};
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Back-off after a failed capture before trying again.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Minimum spacing between reconnect attempts on an unhealthy source.
const RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    closed: bool,
}

/// Single-slot buffer holding only the newest frame.
///
/// Publishing overwrites an unread frame; taking empties the slot, so a reader
/// never sees the same frame twice.
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) {
        let mut slot = self.lock();
        if let Some(stale) = slot.frame.replace(frame) {
            log::trace!("frame {} overwritten before it was read", stale.sequence);
        }
        drop(slot);
        self.ready.notify_one();
    }

    /// Take the newest frame without waiting.
    pub fn try_take(&self) -> Option<Frame> {
        self.lock().frame.take()
    }

    /// Take the newest frame, waiting at most `wait` for one to arrive.
    pub fn take_within(&self, wait: Duration) -> Option<Frame> {
        let deadline = Instant::now() + wait;
        let mut slot = self.lock();
        loop {
            if let Some(frame) = slot.frame.take() {
                return Some(frame);
            }
            if slot.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = match self.ready.wait_timeout(slot, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Wake readers; no more frames will be published.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking publisher cannot leave the slot half-written.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Background thread pulling frames from a source into a [`LatestFrame`].
pub struct CaptureThread {
    latest: Arc<LatestFrame>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    /// Connect the source on the calling thread, then start capturing.
    ///
    /// Connection failure is returned here so the caller can abort startup.
    pub fn start(mut source: Box<dyn FrameSource>) -> Result<Self> {
        source.connect()?;
        let latest = Arc::new(LatestFrame::new());
        let stop = Arc::new(AtomicBool::new(false));

        let thread_latest = latest.clone();
        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || capture_loop(source, &thread_latest, &thread_stop))
            .map_err(|e| Error::CameraFrameUnavailable(format!("spawn capture thread: {}", e)))?;

        Ok(Self {
            latest,
            stop,
            handle: Some(handle),
        })
    }
}

fn capture_loop(mut source: Box<dyn FrameSource>, latest: &LatestFrame, stop: &AtomicBool) {
    let mut failures = 0u64;
    let mut last_reconnect: Option<Instant> = None;
    while !stop.load(Ordering::Relaxed) {
        match source.next_frame() {
            Ok(frame) => {
                failures = 0;
                latest.publish(frame);
            }
            Err(err) => {
                failures += 1;
                if failures == 1 || failures % 100 == 0 {
                    log::warn!("capture failed ({} in a row): {}", failures, err);
                }
                let due = last_reconnect.map_or(true, |at| at.elapsed() >= RECONNECT_INTERVAL);
                if due && !source.is_healthy() {
                    last_reconnect = Some(Instant::now());
                    match source.connect() {
                        Ok(()) => log::info!("capture source reconnected"),
                        Err(err) => log::warn!("capture source reconnect failed: {}", err),
                    }
                }
                std::thread::sleep(CAPTURE_RETRY_DELAY);
            }
        }
    }
    let stats = source.stats();
    log::info!(
        "capture stopped: {} frames from {}",
        stats.frames_captured,
        stats.source
    );
    latest.close();
}

impl FrameFeed for CaptureThread {
    fn next_frame(&mut self, wait: Duration) -> Option<Frame> {
        let frame = self.latest.take_within(wait)?;
        log::trace!(
            "frame {} age {:?}",
            frame.sequence,
            frame.captured_instant.elapsed()
        );
        Some(frame)
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop();
    }
}
