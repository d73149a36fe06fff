//! Error taxonomy for the monitor.
//!
//! Startup and hardware-availability errors are fatal. Everything raised while a
//! single frame is processed is either recoverable (the frame is dropped) or
//! degrades rendering.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad CLI argument, unreadable config file, missing catalog file.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed catalog entry on line {line}: {content:?}")]
    MalformedCatalogEntry { line: usize, content: String },

    #[error("unknown class id {0}")]
    UnknownClassId(u32),

    /// Model or accelerator could not be initialized.
    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("inference exceeded {0:?}")]
    InferenceTimeout(Duration),

    /// Transient: no new frame within the bounded wait, or a single bad read.
    #[error("camera frame unavailable: {0}")]
    CameraFrameUnavailable(String),

    #[error("camera unavailable after {consecutive} consecutive dropped frames")]
    CameraUnavailable { consecutive: u32 },

    #[error("indicator pin {pin}: {reason}")]
    Indicator { pin: u32, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Errors that only cost the current frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InferenceTimeout(_) | Error::CameraFrameUnavailable(_) | Error::UnknownClassId(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
