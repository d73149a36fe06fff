//! Snapshot persistence for crowded frames.

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{Error, Result};

pub const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

/// `<person_count>_persons_frame_<frame_id>.jpg`
pub fn snapshot_file_name(person_count: usize, frame_id: u64) -> String {
    format!("{}_persons_frame_{}.jpg", person_count, frame_id)
}

/// Writes JPEG snapshots into one directory, creating it on first use.
pub struct SnapshotWriter {
    dir: PathBuf,
    dir_ready: bool,
}

impl SnapshotWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            dir_ready: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `image`; the name is derived only from the count and frame id,
    /// so re-saving the same frame overwrites.
    pub fn save(&mut self, image: &RgbImage, person_count: usize, frame_id: u64) -> Result<PathBuf> {
        if !self.dir_ready {
            std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
            self.dir_ready = true;
        }
        let path = self.dir.join(snapshot_file_name(person_count, frame_id));
        image.save(&path)?;
        log::info!("snapshot written: {}", path.display());
        Ok(path)
    }
}
