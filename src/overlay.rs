//! Debug overlay: boxes, labels and a frame-rate counter drawn onto the
//! full-resolution frame. Never consulted by the decision logic.

use std::convert::Infallible;

use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use image::{Rgb, RgbImage};

use crate::detect::BoundingBox;

/// Gap between a label and the box edge it belongs to.
pub const LABEL_MARGIN: i32 = 15;

/// Where the frame-rate counter goes.
const FPS_ORIGIN: Point = Point::new(10, 10);

#[derive(Clone, Copy, Debug)]
pub struct OverlayRenderer {
    pub box_color: Rgb<u8>,
    pub label_color: Rgb<u8>,
    pub fps_color: Rgb<u8>,
    pub stroke_width: u32,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self {
            box_color: Rgb([0, 255, 0]),
            label_color: Rgb([0, 255, 0]),
            fps_color: Rgb([255, 255, 0]),
            stroke_width: 2,
        }
    }
}

impl OverlayRenderer {
    /// Draw one box with its label, plus the frame-rate counter.
    ///
    /// Boxes outside the frame are clamped to it; nothing here can fail.
    pub fn draw(&self, frame: &mut RgbImage, bbox: BoundingBox, label_text: &str, fps_text: &str) {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let Some((x1, y1, x2, y2)) = clamp_box(bbox, width, height) else {
            self.draw_fps(frame, fps_text);
            return;
        };

        let mut canvas = Canvas(frame);
        let rect = Rectangle::with_corners(Point::new(x1, y1), Point::new(x2, y2));
        infallible(
            rect.into_styled(PrimitiveStyle::with_stroke(
                to_rgb888(self.box_color),
                self.stroke_width,
            ))
            .draw(&mut canvas),
        );

        let label_style = MonoTextStyle::new(&FONT_6X10, to_rgb888(self.label_color));
        let anchor = Point::new(x1, label_anchor_y(y1));
        infallible(
            Text::with_baseline(label_text, anchor, label_style, Baseline::Alphabetic)
                .draw(&mut canvas)
                .map(|_| ()),
        );

        self.draw_fps(frame, fps_text);
    }

    /// Draw only the frame-rate counter.
    pub fn draw_fps(&self, frame: &mut RgbImage, fps_text: &str) {
        let style = MonoTextStyle::new(&FONT_6X10, to_rgb888(self.fps_color));
        infallible(
            Text::with_baseline(fps_text, FPS_ORIGIN, style, Baseline::Alphabetic)
                .draw(&mut Canvas(frame))
                .map(|_| ()),
        );
    }
}

/// `"<name>: 87.50%"`
pub fn label_text(name: &str, confidence: f32) -> String {
    format!("{}: {:.2}%", name, confidence * 100.0)
}

/// `"FPS: 12.34"`
pub fn fps_text(fps: f64) -> String {
    format!("FPS: {:.2}", fps)
}

/// Label baseline for a box whose top edge is at `top`: above the box, or
/// below the top edge when above would leave the frame.
pub fn label_anchor_y(top: i32) -> i32 {
    if top - LABEL_MARGIN > LABEL_MARGIN {
        top - LABEL_MARGIN
    } else {
        top + LABEL_MARGIN
    }
}

/// Integer corners inside the frame, or `None` for non-finite boxes.
fn clamp_box(bbox: BoundingBox, width: u32, height: u32) -> Option<(i32, i32, i32, i32)> {
    // Check before normalizing: `f32::min`/`max` would drop a NaN corner.
    if ![bbox.x1, bbox.y1, bbox.x2, bbox.y2].iter().all(|v| v.is_finite()) {
        return None;
    }
    let b = bbox.normalized();
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    Some((
        b.x1.clamp(0.0, max_x).round() as i32,
        b.y1.clamp(0.0, max_y).round() as i32,
        b.x2.clamp(0.0, max_x).round() as i32,
        b.y2.clamp(0.0, max_y).round() as i32,
    ))
}

fn to_rgb888(color: Rgb<u8>) -> Rgb888 {
    Rgb888::new(color[0], color[1], color[2])
}

fn infallible(result: Result<(), Infallible>) {
    match result {
        Ok(()) => {}
        Err(infallible) => match infallible {},
    }
}

/// `DrawTarget` over an RGB image; pixels outside the image are dropped.
struct Canvas<'a>(&'a mut RgbImage);

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as u32, point.y as u32);
            if x < width && y < height {
                self.0.put_pixel(x, y, Rgb([color.r(), color.g(), color.b()]));
            }
        }
        Ok(())
    }
}
