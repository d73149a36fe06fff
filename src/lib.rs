//! Person Watch
//!
//! An edge-device person monitor: frames from one camera go through a
//! pretrained object detector, and two indicator outputs show whether a person
//! is in view. A debug overlay and crowd snapshots are optional.
//!
//! # Architecture
//!
//! One decision loop, two helper threads:
//!
//! 1. **Capture**: a background thread keeps only the newest frame; the loop
//!    reads it with a bounded wait and drops the iteration when none arrives.
//! 2. **Inference**: the detector runs on its own thread with at most one
//!    request in flight and a per-call timeout.
//! 3. **Decision**: `Attention` if any detection is a person (class 0),
//!    `Clear` if there are detections but no person, `Idle` if none.
//! 4. **Indicators**: never both on, except during the startup self-test and
//!    the fault fallback.
//!
//! # Module Structure
//!
//! - `catalog`: class id → display name
//! - `detect`: detection value types, backends, the inference worker
//! - `frame`: frames and inference preparation
//! - `ingest`: frame sources and the capture thread
//! - `indicator`: indicator driver over output pins
//! - `overlay`, `display`, `snapshot`: debug rendering and persistence
//! - `pipeline`: the per-frame state machine
//! - `config`, `ui`: startup plumbing for the binaries

pub mod catalog;
pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod indicator;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod snapshot;
pub mod ui;

pub use catalog::LabelCatalog;
pub use config::{CliArgs, MonitorConfig};
pub use detect::{
    open_backend, person_count, BoundingBox, ChannelOrder, Detection, DetectorBackend,
    InferenceWorker, ModelSpec, StubBackend, PERSON_CLASS_ID,
};
pub use display::{DisplaySink, ExitSignal, NullDisplay, PreviewDisplay, RecordingDisplay};
pub use error::{Error, Result};
pub use frame::{prepare_inference_input, Frame, FrameContext, InferenceInput};
pub use indicator::{
    open_driver, IndicatorBackend, IndicatorDriver, IndicatorEvent, IndicatorLog, IndicatorState,
    IndicatorTiming, MemoryPin, OutputPin, RecordedPause,
};
pub use ingest::{open_source, CameraSettings, CaptureThread, FrameFeed, FrameSource};
pub use overlay::OverlayRenderer;
pub use pipeline::{
    decide, light_up, Decision, FramePipeline, FrameReport, Phase, PipelineSettings,
    RunStatistics, Step,
};
pub use snapshot::{snapshot_file_name, SnapshotWriter};
