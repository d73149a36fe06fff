use image::RgbImage;

use crate::detect::result::Detection;
use crate::error::Result;

/// Channel order a backend expects in the three bytes of each pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Detector backend trait.
///
/// A backend is an opaque model behind a fixed call contract: one decoded raster
/// in, a list of scored boxes out. Boxes are in pixel coordinates of the image
/// passed in. Result ordering carries no meaning.
///
/// Backends signal model or hardware failure with
/// [`Error::InferenceUnavailable`](crate::Error::InferenceUnavailable).
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Pixel layout the backend wants. The pipeline converts before calling.
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    /// Run detection on one image.
    ///
    /// Implementations should drop candidates scoring below
    /// `confidence_threshold`; the inference worker filters again regardless.
    fn detect(&mut self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn channel_order(&self) -> ChannelOrder {
        (**self).channel_order()
    }

    fn detect(&mut self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<Detection>> {
        (**self).detect(image, confidence_threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
