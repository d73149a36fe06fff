use std::time::Instant;

use image::{Rgb, RgbImage};

use super::{frame_interval, CameraSettings, FrameSource, SourceStats};
use crate::error::Result;
use crate::frame::Frame;

/// Synthetic `stub://` camera.
///
/// Draws a gradient background with a bright block that moves across the scene,
/// paced to the configured frame rate.
pub struct SyntheticSource {
    settings: CameraSettings,
    frame_count: u64,
    /// Simulated "scene" state, changes every 50 frames.
    scene_state: u8,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
        }
    }

    fn pace(&mut self) {
        let interval = frame_interval(self.settings.target_fps);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn generate_synthetic_image(&mut self) -> RgbImage {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let width = self.settings.width.max(1);
        let height = self.settings.height.max(1);
        let block = (width / 8).max(1);
        let block_x = ((self.frame_count * 4) % width as u64) as u32;
        let block_y = height / 3;
        let shade = self.scene_state.wrapping_mul(16);

        RgbImage::from_fn(width, height, |x, y| {
            let in_block =
                x >= block_x && x < block_x + block && y >= block_y && y < block_y + block * 2;
            if in_block {
                Rgb([250, 250, 250])
            } else {
                Rgb([
                    (x * 255 / width) as u8,
                    (y * 255 / height) as u8,
                    shade,
                ])
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{} @ {} fps)",
            self.settings.source,
            self.settings.width,
            self.settings.height,
            self.settings.target_fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.pace();
        self.frame_count += 1;
        let image = self.generate_synthetic_image();
        Ok(Frame::new(self.frame_count, image))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.settings.source.clone(),
        }
    }
}
