use image::RgbImage;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"BGR3" => Some(Self::Bgr24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

/// Convert a raw capture buffer into an RGB image.
pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbImage> {
    let w = width as usize;
    let h = height as usize;
    let plane = w
        .checked_mul(h)
        .ok_or_else(|| frame_error("frame dimensions overflow".into()))?;
    let rgb = match format {
        PixelFormat::Rgb24 => {
            expect_len(pixels, plane * 3, "RGB")?;
            pixels[..plane * 3].to_vec()
        }
        PixelFormat::Bgr24 => {
            expect_len(pixels, plane * 3, "BGR")?;
            pixels[..plane * 3]
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect()
        }
        PixelFormat::Yuyv => {
            if w % 2 != 0 {
                return Err(frame_error("YUYV frames need an even width".into()));
            }
            expect_len(pixels, plane * 2, "YUYV")?;
            yuyv_to_rgb(&pixels[..plane * 2])
        }
        PixelFormat::Nv12 => {
            expect_len(pixels, plane + plane / 2, "NV12")?;
            nv12_to_rgb(pixels, w, h)
        }
    };
    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| frame_error("RGB buffer does not match frame size".into()))
}

fn expect_len(pixels: &[u8], expected: usize, label: &str) -> Result<()> {
    // Some drivers pad the final buffer; short buffers are corrupt.
    if pixels.len() < expected {
        return Err(frame_error(format!(
            "{} frame length mismatch: expected {}, got {}",
            label,
            expected,
            pixels.len()
        )));
    }
    Ok(())
}

fn frame_error(reason: String) -> Error {
    Error::CameraFrameUnavailable(reason)
}

fn yuyv_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / 2 * 3);
    for chunk in pixels.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let px = yuv_to_rgb(pixels[j * w + i], pixels[uv_index], pixels[uv_index + 1]);
            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&px);
        }
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_to_u8(y + 1.402_f32 * v),
        clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v),
        clamp_to_u8(y + 1.772_f32 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
