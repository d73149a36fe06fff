//! V4L2 frame source.
//!
//! Captures from a local device node (e.g. `/dev/video0`) through memory-mapped
//! buffers and normalizes RGB3, BGR3, YUYV or NV12 captures to RGB.

use std::time::{Duration, Instant};

use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CameraSettings, FrameSource, SourceStats};
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Formats tried in order of preference.
const PREFERRED_FOURCC: [&[u8; 4]; 3] = [b"RGB3", b"YUYV", b"NV12"];

pub struct V4l2Source {
    settings: CameraSettings,
    state: Option<V4l2State>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            active_format: PixelFormat::Rgb24,
            settings,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.settings.target_fps == 0 {
            2_000
        } else {
            (1000 / self.settings.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn unavailable(&self, what: &str, err: impl std::fmt::Display) -> Error {
        Error::Config(format!("{} {}: {}", what, self.settings.source, err))
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        // Reconnect: close the old stream before reopening the device.
        self.state = None;
        let mut device = v4l::Device::with_path(&self.settings.source)
            .map_err(|e| self.unavailable("open v4l2 device", e))?;

        let mut negotiated = None;
        for fourcc in PREFERRED_FOURCC {
            let mut format = device
                .format()
                .map_err(|e| self.unavailable("read v4l2 format of", e))?;
            format.width = self.settings.width;
            format.height = self.settings.height;
            format.fourcc = v4l::FourCC::new(fourcc);
            match device.set_format(&format) {
                Ok(applied) => {
                    if let Some(pixel_format) = PixelFormat::from_fourcc(&applied.fourcc.repr) {
                        negotiated = Some((applied, pixel_format));
                        break;
                    }
                }
                Err(err) => {
                    log::warn!(
                        "V4l2Source: {} rejected {}: {}",
                        self.settings.source,
                        String::from_utf8_lossy(fourcc),
                        err
                    );
                }
            }
        }
        let (format, pixel_format) = negotiated.ok_or_else(|| {
            self.unavailable("no supported pixel format (RGB3/YUYV/NV12) on", "negotiation failed")
        })?;

        if self.settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.settings.source,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.active_format = pixel_format;
        self.last_error = None;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|err| {
            let reason = err.to_string();
            self.last_error = Some(reason.clone());
            Error::Config(format!(
                "create v4l2 buffer stream for {}: {}",
                self.settings.source, reason
            ))
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.settings.source,
            self.active_width,
            self.active_height,
            self.active_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().ok_or_else(|| {
            Error::CameraFrameUnavailable("v4l2 device not connected".into())
        })?;
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                Error::CameraFrameUnavailable(format!("capture v4l2 frame: {}", err))
            })?;

        let image = normalize_to_rgb(
            &pixels,
            self.active_width,
            self.active_height,
            self.active_format,
        )?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        self.last_error = None;
        Ok(Frame::new(self.frame_count, image))
    }

    fn is_healthy(&self) -> bool {
        if self.state.is_none() || self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.settings.source.clone(),
        }
    }
}
