//! Frame acquisition.
//!
//! Sources produce RGB [`Frame`]s:
//! - `stub://<name>`: synthetic scene, for machines without a camera
//! - a directory (or single file) of still images, replayed in a loop
//! - V4L2 devices such as `/dev/video0` (feature: ingest-v4l2)
//!
//! A source runs on a background [`CaptureThread`] that keeps only the newest
//! frame. The pipeline reads through the [`FrameFeed`] trait with a bounded
//! wait and gets an explicit "no new frame" answer instead of blocking.

mod capture;
mod file;
pub mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::path::Path;
use std::time::Duration;

pub use capture::{CaptureThread, LatestFrame};
pub use file::StillImageSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use crate::error::{Error, Result};
use crate::frame::Frame;

/// A camera-like producer of frames. Runs on the capture thread.
pub trait FrameSource: Send {
    /// Open the device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. May block for roughly one frame interval.
    fn next_frame(&mut self) -> Result<Frame>;

    /// `false` once the source needs a fresh `connect()`. The capture thread
    /// checks this after a failed capture.
    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// What the pipeline reads frames from.
pub trait FrameFeed {
    /// Newest frame not yet handed out, waiting at most `wait`.
    /// `None` means no new frame arrived in time.
    fn next_frame(&mut self, wait: Duration) -> Option<Frame>;

    /// Stop producing frames. Idempotent.
    fn stop(&mut self);
}

/// Camera settings shared by all sources.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSettings {
    /// `stub://<name>`, an image directory/file, or a V4L2 device path.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 15,
        }
    }
}

/// Build the source named by `settings.source`.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let location = settings.source.trim();
    if location.is_empty() {
        return Err(Error::config("camera source must not be empty"));
    }
    if location.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    if location.contains("://") {
        return Err(Error::config(format!(
            "unsupported camera source {:?} (local devices and files only)",
            location
        )));
    }
    let path = Path::new(location);
    if path.is_dir() || path.is_file() {
        return Ok(Box::new(StillImageSource::new(settings.clone())));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(settings.clone())))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(Error::config(format!(
            "camera {} requires the ingest-v4l2 feature",
            location
        )))
    }
}

/// Delay between frames for a target rate; zero means unpaced.
pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(1000 / target_fps as u64)
    }
}
