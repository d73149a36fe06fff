//! Frames and per-frame bookkeeping.
//!
//! - `Frame`: one decoded RGB capture with its sequence number and timestamp.
//! - `FrameContext`: transient record of one pipeline iteration.
//! - `InferenceInput`: the downscaled, channel-ordered copy handed to the detector.

use std::time::{Instant, SystemTime};

use image::{imageops, imageops::FilterType, RgbImage};

use crate::detect::ChannelOrder;

/// Default inference width, matching the reference SSD input.
pub const DEFAULT_INFERENCE_WIDTH: u32 = 300;

/// One captured frame, RGB ordered.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Capture counter assigned by the source.
    pub sequence: u64,
    pub captured_at: SystemTime,
    /// Monotonic capture instant (for freshness checks, not exported).
    pub(crate) captured_instant: Instant,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self {
            sequence,
            captured_at: SystemTime::now(),
            captured_instant: Instant::now(),
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Rotate by 180 degrees in place (camera mounted upside down).
    pub fn rotate_180(&mut self) {
        imageops::rotate180_in_place(&mut self.image);
    }
}

/// Transient record of one pipeline iteration.
#[derive(Clone, Debug)]
pub struct FrameContext {
    /// Starts at 1 and increases by one per acquired frame.
    pub frame_id: u64,
    pub captured_at: SystemTime,
    /// `inference_width / original_width`.
    pub scale_factor: f32,
    pub person_count: usize,
}

/// Downscaled copy of a frame prepared for the detector.
#[derive(Debug)]
pub struct InferenceInput {
    pub image: RgbImage,
    pub scale_factor: f32,
}

/// Downscale `image` to `target_width` keeping its aspect ratio, then reorder
/// channels for the backend.
///
/// Frames narrower than `target_width` are used as-is (scale factor 1.0).
pub fn prepare_inference_input(
    image: &RgbImage,
    target_width: u32,
    order: ChannelOrder,
) -> InferenceInput {
    let (width, height) = image.dimensions();
    let mut scaled = if target_width == 0 || width <= target_width || width == 0 {
        image.clone()
    } else {
        let target_height = ((height as u64 * target_width as u64) as f64 / width as f64)
            .round()
            .max(1.0) as u32;
        imageops::resize(image, target_width, target_height, FilterType::Triangle)
    };
    let scale_factor = if width == 0 {
        1.0
    } else {
        scaled.width() as f32 / width as f32
    };
    if order == ChannelOrder::Bgr {
        swap_red_blue(&mut scaled);
    }
    InferenceInput {
        image: scaled,
        scale_factor,
    }
}

fn swap_red_blue(image: &mut RgbImage) {
    for pixel in image.pixels_mut() {
        pixel.0.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let image = RgbImage::new(1280, 720);
        let input = prepare_inference_input(&image, 300, ChannelOrder::Rgb);
        assert_eq!(input.image.dimensions(), (300, 169));
        assert!((input.scale_factor - 300.0 / 1280.0).abs() < 1e-6);
    }

    #[test]
    fn narrow_frames_are_not_upscaled() {
        let image = RgbImage::new(200, 100);
        let input = prepare_inference_input(&image, 300, ChannelOrder::Rgb);
        assert_eq!(input.image.dimensions(), (200, 100));
        assert_eq!(input.scale_factor, 1.0);
    }

    #[test]
    fn bgr_backends_get_swapped_channels() {
        let image = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let input = prepare_inference_input(&image, 300, ChannelOrder::Bgr);
        assert_eq!(input.image.get_pixel(0, 0), &Rgb([30, 20, 10]));
        // The original stays RGB for overlay and snapshots.
        assert_eq!(image.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn rotate_180_flips_both_axes() {
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        let mut frame = Frame::new(1, image);
        frame.rotate_180();
        assert_eq!(frame.image.get_pixel(1, 1), &Rgb([255, 0, 0]));
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
