//! personwatchd - person-detection monitor daemon
//!
//! 1. Loads the label catalog and the detection model
//! 2. Runs the indicator self-test
//! 3. Opens the camera on a background capture thread
//! 4. Loops: detect, drive the indicators, optionally annotate/snapshot
//! 5. Stops on `q`/ESC, SIGINT or SIGTERM and switches the indicators off

use anyhow::{Context, Result};
use clap::Parser;

use personwatch::{
    config::{CliArgs, MonitorConfig},
    ingest, open_backend, open_driver,
    ui::Ui,
    CaptureThread, DisplaySink, ExitSignal, FrameFeed, FramePipeline, InferenceWorker, LabelCatalog,
    NullDisplay, PreviewDisplay, SnapshotWriter,
};

fn main() -> Result<()> {
    let args = CliArgs::parse();
    let cfg = MonitorConfig::load(&args).context("invalid configuration")?;

    let default_filter = if cfg.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let ui = Ui::for_stderr(false);

    let stage = ui.stage("Loading labels");
    let catalog = LabelCatalog::load(&cfg.labels)
        .with_context(|| format!("load labels from {}", cfg.labels.display()))?;
    stage.done();

    let stage = ui.stage("Loading model");
    let backend = open_backend(&cfg.model_spec())
        .with_context(|| format!("load model {}", cfg.model))?;
    let detector = InferenceWorker::spawn(backend, cfg.inference.timeout)?;
    log::info!("model {} loaded ({})", cfg.model, detector.name());
    stage.done();

    let stage = ui.stage("Opening indicators");
    let indicators = open_driver(
        cfg.indicators.backend,
        cfg.indicators.attention_pin,
        cfg.indicators.clear_pin,
        &cfg.indicators.gpio_root,
    )
    .context("open indicator outputs")?;
    stage.done();

    let exit = ExitSignal::new();
    {
        let exit = exit.clone();
        ctrlc::set_handler(move || {
            log::info!("termination signal received");
            exit.request();
        })
        .context("install signal handler")?;
    }

    // Self-test first; the camera only opens once the outputs checked out.
    let stage = ui.stage("Indicator self-test");
    let camera = &cfg.camera.settings;
    let pipeline = FramePipeline::start(
        cfg.pipeline_settings(),
        detector,
        indicators,
        catalog,
        || {
            stage.done();
            let stage = ui.stage("Opening camera");
            let feed = CaptureThread::start(ingest::open_source(camera)?)?;
            log::info!(
                "camera {} connected ({}x{} @ {} fps)",
                camera.source,
                camera.width,
                camera.height,
                camera.target_fps
            );
            stage.done();
            Ok(Box::new(feed) as Box<dyn FrameFeed>)
        },
    )
    .with_context(|| format!("start pipeline on camera {}", camera.source))?;

    let display: Box<dyn DisplaySink> = if cfg.display {
        log::info!("preview frames go to {}", cfg.preview_path.display());
        Box::new(PreviewDisplay::new(&cfg.preview_path))
    } else {
        Box::new(NullDisplay)
    };

    let mut pipeline = pipeline
        .with_display(display)
        .with_snapshots(SnapshotWriter::new(&cfg.snapshot_dir))
        .with_exit_signal(exit.clone());
    exit.watch_stdin()?;

    log::info!("watching; press q or ESC (then Enter) to stop");
    pipeline.run()?;
    log::info!("clean shutdown");
    Ok(())
}
