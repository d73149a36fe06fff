use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use image::RgbImage;

use crate::detect::backend::{ChannelOrder, DetectorBackend};
use crate::detect::result::Detection;
use crate::error::{Error, Result};

struct Request {
    image: RgbImage,
    confidence_threshold: f32,
}

/// Runs a backend on its own thread and bounds how long a caller waits.
///
/// At most one request is in flight. A request that outlives the timeout stays
/// in flight; until its result arrives (and is discarded) every further call
/// fails fast with [`Error::InferenceTimeout`].
pub struct InferenceWorker {
    name: &'static str,
    channel_order: ChannelOrder,
    timeout: Duration,
    requests: Option<SyncSender<Request>>,
    responses: Receiver<Result<Vec<Detection>>>,
    in_flight: bool,
    handle: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    /// Warm the backend up and move it onto a worker thread.
    pub fn spawn(mut backend: Box<dyn DetectorBackend>, timeout: Duration) -> Result<Self> {
        backend.warm_up()?;
        let name = backend.name();
        let channel_order = backend.channel_order();
        let (request_tx, request_rx) = mpsc::sync_channel::<Request>(1);
        let (response_tx, response_rx) = mpsc::sync_channel(1);

        let handle = std::thread::Builder::new()
            .name(format!("inference-{}", name))
            .spawn(move || {
                while let Ok(request) = request_rx.recv() {
                    let result = backend.detect(&request.image, request.confidence_threshold);
                    if response_tx.send(result).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| Error::InferenceUnavailable(format!("spawn inference thread: {}", e)))?;

        log::info!("inference backend '{}' ready (timeout {:?})", name, timeout);
        Ok(Self {
            name,
            channel_order,
            timeout,
            requests: Some(request_tx),
            responses: response_rx,
            in_flight: false,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    /// Detect objects in `image`. Every returned detection scores at least
    /// `confidence_threshold`.
    pub fn detect(&mut self, image: RgbImage, confidence_threshold: f32) -> Result<Vec<Detection>> {
        if self.in_flight {
            match self.responses.try_recv() {
                Ok(late) => {
                    self.in_flight = false;
                    match late {
                        Err(err) if !err.is_recoverable() => return Err(err),
                        Err(err) => log::debug!("discarding late inference failure: {}", err),
                        Ok(_) => log::debug!("discarding late inference result"),
                    }
                }
                Err(TryRecvError::Empty) => return Err(Error::InferenceTimeout(self.timeout)),
                Err(TryRecvError::Disconnected) => return Err(self.worker_gone()),
            }
        }

        let requests = self.requests.as_ref().ok_or_else(|| self.worker_gone())?;
        requests
            .send(Request {
                image,
                confidence_threshold,
            })
            .map_err(|_| self.worker_gone())?;
        self.in_flight = true;

        match self.responses.recv_timeout(self.timeout) {
            Ok(result) => {
                self.in_flight = false;
                let mut detections = result?;
                detections.retain(|d| d.confidence() >= confidence_threshold);
                Ok(detections)
            }
            Err(RecvTimeoutError::Timeout) => Err(Error::InferenceTimeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(self.worker_gone()),
        }
    }

    fn worker_gone(&self) -> Error {
        Error::InferenceUnavailable(format!("inference worker '{}' exited", self.name))
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests = None;
        if self.in_flight {
            log::warn!("inference still running at shutdown; detaching worker");
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("inference worker panicked");
            }
        }
    }
}
