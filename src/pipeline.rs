//! Frame pipeline.
//!
//! One linear loop: acquire → flip → downscale → detect → count → drive
//! indicators → overlay → snapshot → display → poll exit.
//!
//! `Warmup → Running → (Running | FrameDropped)* → Shutdown`. Per-frame
//! failures become dropped frames; only hardware loss and too many
//! consecutive missing frames end the loop with an error. Shutdown runs on
//! every path, explicitly from [`FramePipeline::run`] and again (as a no-op or
//! a last resort) from `Drop`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::catalog::LabelCatalog;
use crate::detect::{person_count, Detection, InferenceWorker};
use crate::display::{DisplaySink, ExitSignal, NullDisplay};
use crate::error::{Error, Result};
use crate::frame::{prepare_inference_input, FrameContext, DEFAULT_INFERENCE_WIDTH};
use crate::indicator::{IndicatorDriver, IndicatorState};
use crate::ingest::FrameFeed;
use crate::overlay::{fps_text, label_text, OverlayRenderer};
use crate::snapshot::SnapshotWriter;

pub const DEFAULT_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_SNAPSHOT_MIN_PERSONS: usize = 3;
pub const DEFAULT_MAX_CONSECUTIVE_DROPS: u32 = 10;
pub const DEFAULT_FRAME_WAIT: Duration = Duration::from_millis(500);
pub const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Minimum detection score, in [0, 1].
    pub confidence: f32,
    /// Rotate frames 180° before anything else.
    pub flip: bool,
    pub inference_width: u32,
    /// Longest wait for a new frame before the iteration counts as dropped.
    pub frame_wait: Duration,
    /// Consecutive missing frames tolerated before `CameraUnavailable`.
    pub max_consecutive_drops: u32,
    /// Snapshot when at least this many persons are in view.
    pub snapshot_min_persons: usize,
    /// Render the overlay and hand frames to the display sink.
    pub display: bool,
    pub health_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            flip: false,
            inference_width: DEFAULT_INFERENCE_WIDTH,
            frame_wait: DEFAULT_FRAME_WAIT,
            max_consecutive_drops: DEFAULT_MAX_CONSECUTIVE_DROPS,
            snapshot_min_persons: DEFAULT_SNAPSHOT_MIN_PERSONS,
            display: true,
            health_interval: HEALTH_LOG_INTERVAL,
        }
    }
}

// ----------------------------------------------------------------------------
// Decision rule
// ----------------------------------------------------------------------------

/// Indicator state for a detection list.
pub fn light_up(detections: &[Detection]) -> IndicatorState {
    if person_count(detections) > 0 {
        IndicatorState::Attention
    } else if !detections.is_empty() {
        IndicatorState::Clear
    } else {
        IndicatorState::Idle
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Indicate(IndicatorState),
    /// Count and detection list disagree.
    Fault(String),
}

/// Decide with a separately computed person count, checking the two agree.
pub fn decide(detections: &[Detection], persons: usize) -> Decision {
    if persons > detections.len() {
        return Decision::Fault(format!(
            "{} persons counted in {} detections",
            persons,
            detections.len()
        ));
    }
    if persons > 0 {
        Decision::Indicate(IndicatorState::Attention)
    } else if !detections.is_empty() {
        Decision::Indicate(IndicatorState::Clear)
    } else {
        Decision::Indicate(IndicatorState::Idle)
    }
}

// ----------------------------------------------------------------------------
// Run statistics
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct RunStatistics {
    pub start_time: Instant,
    /// Frames acquired so far; also the id of the latest frame.
    pub frame_id: u64,
    pub processed: u64,
    pub dropped: u64,
    pub consecutive_camera_drops: u32,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frame_id: 0,
            processed: 0,
            dropped: 0,
            consecutive_camera_drops: 0,
        }
    }

    /// Acquired frames per second since start.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.frame_id as f64 / elapsed
        }
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Warmup,
    Running,
    Shutdown,
}

/// What one iteration did.
#[derive(Debug)]
pub enum Step {
    Processed(FrameReport),
    /// The iteration was skipped; the error says why.
    Dropped(Error),
    /// An exit was requested; nothing was acquired.
    Exit,
}

#[derive(Clone, Debug)]
pub struct FrameReport {
    pub frame_id: u64,
    pub person_count: usize,
    pub detections: usize,
    pub indicator: IndicatorState,
    pub fault: bool,
    pub snapshot: Option<PathBuf>,
}

pub struct FramePipeline {
    settings: PipelineSettings,
    feed: Box<dyn FrameFeed>,
    detector: InferenceWorker,
    indicators: IndicatorDriver,
    catalog: LabelCatalog,
    overlay: OverlayRenderer,
    display: Box<dyn DisplaySink>,
    snapshots: Option<SnapshotWriter>,
    exit: ExitSignal,
    stats: RunStatistics,
    phase: Phase,
    last_health_log: Instant,
}

impl FramePipeline {
    pub fn new(
        settings: PipelineSettings,
        feed: Box<dyn FrameFeed>,
        detector: InferenceWorker,
        indicators: IndicatorDriver,
        catalog: LabelCatalog,
    ) -> Self {
        Self {
            settings,
            feed,
            detector,
            indicators,
            catalog,
            overlay: OverlayRenderer::default(),
            display: Box::new(NullDisplay),
            snapshots: None,
            exit: ExitSignal::new(),
            stats: RunStatistics::new(),
            phase: Phase::Warmup,
            last_health_log: Instant::now(),
        }
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.display = display;
        self
    }

    pub fn with_snapshots(mut self, writer: SnapshotWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    pub fn with_exit_signal(mut self, exit: ExitSignal) -> Self {
        self.exit = exit;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn indicator_state(&self) -> IndicatorState {
        self.indicators.state()
    }

    /// Warm up in order: indicator self-test, open the camera through
    /// `open_feed`, reset the run statistics.
    ///
    /// If the camera cannot be opened the error is returned before the
    /// pipeline exists and the dropped driver switches the indicators off.
    pub fn start<F>(
        settings: PipelineSettings,
        detector: InferenceWorker,
        mut indicators: IndicatorDriver,
        catalog: LabelCatalog,
        open_feed: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn FrameFeed>>,
    {
        indicators.self_test()?;
        let feed = open_feed()?;
        let mut pipeline = Self::new(settings, feed, detector, indicators, catalog);
        pipeline.enter_running();
        Ok(pipeline)
    }

    /// Indicator self-test on an already opened feed, then reset the run
    /// statistics.
    pub fn warmup(&mut self) -> Result<()> {
        self.indicators.self_test()?;
        self.enter_running();
        Ok(())
    }

    fn enter_running(&mut self) {
        self.stats = RunStatistics::new();
        self.last_health_log = Instant::now();
        self.phase = Phase::Running;
        log::info!("pipeline running (confidence {:.2})", self.settings.confidence);
    }

    /// Warm up, loop until an exit request or a fatal error, shut down.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_loop();
        if let Err(err) = &result {
            log::error!("pipeline stopped: {}", err);
        }
        self.shutdown();
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        if self.phase == Phase::Warmup {
            self.warmup()?;
        }
        loop {
            if let Step::Exit = self.run_once()? {
                return Ok(());
            }
        }
    }

    /// One `Running` iteration.
    pub fn run_once(&mut self) -> Result<Step> {
        if self.phase == Phase::Shutdown || self.exit.is_requested() {
            return Ok(Step::Exit);
        }

        let Some(mut frame) = self.feed.next_frame(self.settings.frame_wait) else {
            return self.camera_drop();
        };
        self.stats.consecutive_camera_drops = 0;
        self.stats.frame_id += 1;
        let frame_id = self.stats.frame_id;

        if self.settings.flip {
            frame.rotate_180();
        }
        let input = prepare_inference_input(
            &frame.image,
            self.settings.inference_width,
            self.detector.channel_order(),
        );

        let detections = match self.detector.detect(input.image, self.settings.confidence) {
            Ok(detections) => detections,
            Err(err) if err.is_recoverable() => {
                self.stats.dropped += 1;
                log::warn!("frame {} dropped: {}", frame_id, err);
                self.log_health();
                return Ok(Step::Dropped(err));
            }
            Err(err) => return Err(err),
        };

        let context = FrameContext {
            frame_id,
            captured_at: frame.captured_at,
            scale_factor: input.scale_factor,
            person_count: person_count(&detections),
        };

        let mut fault = false;
        match decide(&detections, context.person_count) {
            Decision::Indicate(state) => self.indicators.apply(state)?,
            Decision::Fault(reason) => {
                fault = true;
                self.indicators.fault_fallback(&reason)?;
            }
        }
        if context.person_count > 0 {
            log::info!(
                "frame {}: {} person(s) detected",
                frame_id,
                context.person_count
            );
        } else if !detections.is_empty() {
            log::debug!(
                "frame {}: {} detection(s), no persons",
                frame_id,
                detections.len()
            );
        }

        let snapshot = self.maybe_snapshot(&frame.image, &context);

        if self.settings.display {
            let mut canvas = frame.image;
            self.annotate(&mut canvas, &detections, context.scale_factor);
            if let Err(err) = self.display.show(&canvas) {
                log::warn!("display failed for frame {}: {}", frame_id, err);
            }
        }

        self.stats.processed += 1;
        self.log_health();
        Ok(Step::Processed(FrameReport {
            frame_id,
            person_count: context.person_count,
            detections: detections.len(),
            indicator: self.indicators.state(),
            fault,
            snapshot,
        }))
    }

    /// Stop the camera, switch indicators off, release the display. Idempotent.
    pub fn shutdown(&mut self) {
        if self.phase == Phase::Shutdown {
            return;
        }
        self.phase = Phase::Shutdown;
        log::info!("shutting down: stopping camera");
        self.feed.stop();
        log::info!("shutting down: indicators off");
        if let Err(err) = self.indicators.shutdown() {
            log::error!("indicator shutdown failed: {}", err);
        }
        log::info!("shutting down: closing display");
        self.display.close();
        log::info!(
            "processed {} frames ({} dropped), {:.2} fps",
            self.stats.processed,
            self.stats.dropped,
            self.stats.fps()
        );
    }

    fn camera_drop(&mut self) -> Result<Step> {
        self.stats.dropped += 1;
        self.stats.consecutive_camera_drops += 1;
        let consecutive = self.stats.consecutive_camera_drops;
        let err = Error::CameraFrameUnavailable(format!(
            "no new frame within {:?}",
            self.settings.frame_wait
        ));
        log::warn!("frame dropped ({} in a row): {}", consecutive, err);
        if consecutive >= self.settings.max_consecutive_drops {
            return Err(Error::CameraUnavailable { consecutive });
        }
        self.log_health();
        Ok(Step::Dropped(err))
    }

    fn maybe_snapshot(
        &mut self,
        image: &image::RgbImage,
        context: &FrameContext,
    ) -> Option<PathBuf> {
        let writer = self.snapshots.as_mut()?;
        if context.person_count == 0 || context.person_count < self.settings.snapshot_min_persons {
            return None;
        }
        match writer.save(image, context.person_count, context.frame_id) {
            Ok(path) => Some(path),
            Err(err) => {
                log::warn!("snapshot of frame {} failed: {}", context.frame_id, err);
                None
            }
        }
    }

    fn annotate(&self, canvas: &mut image::RgbImage, detections: &[Detection], scale: f32) {
        let fps = fps_text(self.stats.fps());
        if detections.is_empty() {
            self.overlay.draw_fps(canvas, &fps);
            return;
        }
        for detection in detections {
            let name = self.catalog.display_name(detection.class_id());
            let label = label_text(&name, detection.confidence());
            self.overlay
                .draw(canvas, detection.bounding_box().project(scale), &label, &fps);
        }
    }

    fn log_health(&mut self) {
        if self.settings.display || self.last_health_log.elapsed() < self.settings.health_interval {
            return;
        }
        self.last_health_log = Instant::now();
        log::info!(
            "health: {} frames processed, {} dropped, {:.2} fps",
            self.stats.processed,
            self.stats.dropped,
            self.stats.fps()
        );
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
