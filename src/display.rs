//! Display collaborator and exit-request plumbing.
//!
//! The monitor runs headless on most devices, so the "display" is a sink the
//! annotated frame is handed to: nothing at all, a preview JPEG rewritten in
//! place (view it with any auto-reloading image viewer), or an in-memory
//! recorder for tests.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbImage;

use crate::error::{Error, Result};

/// Where rendered frames go.
pub trait DisplaySink {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Release display resources. Idempotent.
    fn close(&mut self) {}
}

/// Display disabled.
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, _frame: &RgbImage) -> Result<()> {
        Ok(())
    }
}

/// Rewrites one preview image per displayed frame.
pub struct PreviewDisplay {
    path: PathBuf,
    staging: PathBuf,
    closed: bool,
}

impl PreviewDisplay {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        // Same directory and extension so the rename is atomic and the
        // encoder still picks the format from the extension.
        let staging = match path.file_name() {
            Some(name) => path.with_file_name(format!(".{}.tmp.jpg", name.to_string_lossy())),
            None => PathBuf::from(".preview.tmp.jpg"),
        };
        Self {
            path,
            staging,
            closed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DisplaySink for PreviewDisplay {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        frame.save(&self.staging)?;
        std::fs::rename(&self.staging, &self.path).map_err(|e| Error::io(&self.path, e))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = std::fs::remove_file(&self.staging);
            log::info!("preview display closed ({})", self.path.display());
        }
    }
}

impl Drop for PreviewDisplay {
    fn drop(&mut self) {
        self.close();
    }
}

/// Keeps every shown frame in memory. Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    frames: Arc<Mutex<Vec<RgbImage>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<RgbImage> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn shown(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DisplaySink for RecordingDisplay {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(frame.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Exit requests
// ----------------------------------------------------------------------------

const ESC: u8 = 0x1b;

/// Shared "please stop" flag, raised by the key watcher or a signal handler
/// and polled once per pipeline iteration.
#[derive(Clone, Debug, Default)]
pub struct ExitSignal {
    requested: Arc<AtomicBool>,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Watch stdin for `q` or ESC on a detached thread.
    ///
    /// A cooked terminal delivers the key after Enter.
    pub fn watch_stdin(&self) -> Result<()> {
        self.watch_reader(std::io::stdin())
    }

    /// Watch any byte stream for an exit key. The thread ends at EOF.
    pub fn watch_reader<R: Read + Send + 'static>(&self, reader: R) -> Result<()> {
        let signal = self.clone();
        std::thread::Builder::new()
            .name("exit-keys".to_string())
            .spawn(move || {
                for byte in reader.bytes() {
                    match byte {
                        Ok(b) if is_exit_key(b) => {
                            log::info!("exit key pressed");
                            signal.request();
                            return;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            log::debug!("exit key watcher stopped: {}", err);
                            return;
                        }
                    }
                }
            })
            .map(|_detached| ())
            .map_err(|e| Error::io("stdin", e))
    }
}

pub fn is_exit_key(byte: u8) -> bool {
    matches!(byte, b'q' | b'Q' | ESC)
}
