#![cfg(feature = "backend-tract")]

use std::path::Path;

use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::{Error, Result};

/// Tract-based backend for SSD-style ONNX detectors.
///
/// The model takes one `u8` NHWC image and emits the usual post-processed SSD
/// outputs, in order: boxes `[1, N, 4]` as normalized `(ymin, xmin, ymax, xmax)`,
/// classes `[1, N]`, scores `[1, N]`, count `[1]`.
///
/// Input images are letterboxed into the model resolution keeping their aspect
/// ratio; returned boxes are in pixel coordinates of the image passed to
/// [`DetectorBackend::detect`].
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    class_offset: i64,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let unavailable = |stage: &str, err: TractError| {
            Error::InferenceUnavailable(format!(
                "{} ({}): {}",
                stage,
                model_path.display(),
                err
            ))
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| unavailable("failed to load ONNX model", e))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .map_err(|e| unavailable("failed to set input fact", e))?
            .into_optimized()
            .map_err(|e| unavailable("failed to optimize ONNX model", e))?
            .into_runnable()
            .map_err(|e| unavailable("failed to build runnable ONNX model", e))?;

        log::info!(
            "tract model {} ready ({}x{} input)",
            model_path.display(),
            width,
            height
        );

        Ok(Self {
            model,
            width,
            height,
            class_offset: 0,
        })
    }

    /// Shift emitted class ids, e.g. `-1` for models that count from 1 with
    /// 0 reserved for background.
    pub fn with_class_offset(mut self, offset: i64) -> Self {
        self.class_offset = offset;
        self
    }

    /// Letterbox `image` into the model input. Returns the tensor and the
    /// scale applied to the source image.
    fn build_input(&self, image: &RgbImage) -> Result<(Tensor, f32)> {
        let (src_w, src_h) = image.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(Error::InferenceUnavailable("empty input image".into()));
        }
        let scale = (self.width as f32 / src_w as f32).min(self.height as f32 / src_h as f32);
        let fit_w = ((src_w as f32 * scale).round() as u32).clamp(1, self.width);
        let fit_h = ((src_h as f32 * scale).round() as u32).clamp(1, self.height);
        let fitted = image::imageops::resize(image, fit_w, fit_h, FilterType::Triangle);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, self.height as usize, self.width as usize, 3),
            |(_, y, x, channel)| {
                if (x as u32) < fit_w && (y as u32) < fit_h {
                    fitted.get_pixel(x as u32, y as u32)[channel]
                } else {
                    0u8
                }
            },
        );
        Ok((input.into_tensor(), scale))
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        scale: f32,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(Error::InferenceUnavailable(format!(
                "expected SSD outputs (boxes, classes, scores), model produced {}",
                outputs.len()
            )));
        }
        let view = |idx: usize| {
            outputs[idx].to_array_view::<f32>().map_err(|e| {
                Error::InferenceUnavailable(format!("output {} was not f32: {}", idx, e))
            })
        };
        let boxes = view(0)?;
        let classes = view(1)?;
        let scores = view(2)?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        let mut count = scores.len().min(classes.len()).min(boxes.len() / 4);
        if let Some(reported) = outputs.get(3) {
            if let Ok(reported) = reported.to_array_view::<f32>() {
                if let Some(n) = reported.iter().next() {
                    count = count.min(n.max(0.0) as usize);
                }
            }
        }

        let model_w = self.width as f32 / scale;
        let model_h = self.height as f32 / scale;
        let mut detections = Vec::new();
        for i in 0..count {
            let score = scores[i];
            if !(score >= confidence_threshold) {
                continue;
            }
            let class_id = classes[i].round() as i64 + self.class_offset;
            if class_id < 0 {
                continue;
            }
            let (ymin, xmin, ymax, xmax) = (
                boxes[i * 4],
                boxes[i * 4 + 1],
                boxes[i * 4 + 2],
                boxes[i * 4 + 3],
            );
            detections.push(Detection::new(
                class_id as u32,
                score,
                BoundingBox::new(xmin * model_w, ymin * model_h, xmax * model_w, ymax * model_h),
            ));
        }
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage, confidence_threshold: f32) -> Result<Vec<Detection>> {
        let (input, scale) = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| Error::InferenceUnavailable(format!("ONNX inference failed: {}", e)))?;
        self.decode(outputs, scale, confidence_threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.width, self.height);
        self.detect(&blank, 1.0).map(|_| ())
    }
}
