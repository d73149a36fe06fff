//! Still-image frame source.
//!
//! Replays a directory of images (or one image) as a camera, in lexical file
//! order, looping at the end. Useful for bench tests of a model against
//! recorded scenes.

use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{frame_interval, CameraSettings, FrameSource, SourceStats};
use crate::error::{Error, Result};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct StillImageSource {
    settings: CameraSettings,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl StillImageSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
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
}

impl FrameSource for StillImageSource {
    fn connect(&mut self) -> Result<()> {
        let root = Path::new(&self.settings.source);
        self.files = list_images(root)?;
        if self.files.is_empty() {
            return Err(Error::config(format!(
                "no images ({}) found in {}",
                IMAGE_EXTENSIONS.join(", "),
                root.display()
            )));
        }
        log::info!(
            "StillImageSource: replaying {} images from {}",
            self.files.len(),
            root.display()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.files.is_empty() {
            return Err(Error::CameraFrameUnavailable(
                "still-image source not connected".into(),
            ));
        }
        self.pace();
        let path = &self.files[self.cursor % self.files.len()];
        self.cursor = self.cursor.wrapping_add(1);
        let image = image::open(path)
            .map_err(|e| Error::CameraFrameUnavailable(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        self.frame_count += 1;
        Ok(Frame::new(self.frame_count, image))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.settings.source.clone(),
        }
    }
}

fn list_images(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let entries = std::fs::read_dir(root).map_err(|e| Error::io(root, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(root, e))?.path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn settings(source: &Path) -> CameraSettings {
        CameraSettings {
            source: source.display().to_string(),
            width: 0,
            height: 0,
            target_fps: 0,
        }
    }

    #[test]
    fn replays_images_in_lexical_order() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| Error::io("tempdir", e))?;
        RgbImage::from_pixel(4, 4, Rgb([200, 0, 0])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(4, 4, Rgb([0, 200, 0])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "ignored").map_err(|e| Error::io("notes", e))?;

        let mut source = StillImageSource::new(settings(dir.path()));
        source.connect()?;
        assert_eq!(source.next_frame()?.image.get_pixel(0, 0), &Rgb([0, 200, 0]));
        assert_eq!(source.next_frame()?.image.get_pixel(0, 0), &Rgb([200, 0, 0]));
        // Loops back to the start.
        let third = source.next_frame()?;
        assert_eq!(third.image.get_pixel(0, 0), &Rgb([0, 200, 0]));
        assert_eq!(third.sequence, 3);
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_connect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut source = StillImageSource::new(settings(dir.path()));
        assert!(matches!(source.connect(), Err(Error::Config(_))));
    }
}
