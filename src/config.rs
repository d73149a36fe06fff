use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::ModelSpec;
use crate::error::{Error, Result};
use crate::frame::DEFAULT_INFERENCE_WIDTH;
use crate::indicator::IndicatorBackend;
use crate::ingest::CameraSettings;
use crate::pipeline::{
    PipelineSettings, DEFAULT_CONFIDENCE, DEFAULT_MAX_CONSECUTIVE_DROPS,
    DEFAULT_SNAPSHOT_MIN_PERSONS, HEALTH_LOG_INTERVAL,
};
use crate::snapshot::DEFAULT_SNAPSHOT_DIR;

const DEFAULT_MODEL: &str = "models/ssd_mobilenet_v2.onnx";
const DEFAULT_LABELS: &str = "coco_labels.txt";
const DEFAULT_CAMERA: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 15;
const DEFAULT_FRAME_WAIT_MS: u64 = 500;
const DEFAULT_INFERENCE_HEIGHT: u32 = 300;
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_ATTENTION_PIN: u32 = 8;
const DEFAULT_CLEAR_PIN: u32 = 10;
const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";
const DEFAULT_PREVIEW_PATH: &str = "preview.jpg";

/// Command line for `personwatchd`. Every option can also come from the
/// environment; unset options fall back to the config file, then defaults.
#[derive(Parser, Debug, Default)]
#[command(
    name = "personwatchd",
    version,
    about = "Watch a camera for people and drive two indicator outputs"
)]
pub struct CliArgs {
    /// TOML config file.
    #[arg(long, env = "PERSONWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Detection model path, or stub://<name> for the scripted detector.
    #[arg(short, long, env = "PERSONWATCH_MODEL")]
    pub model: Option<String>,

    /// Label catalog file ("<id> <name>" per line).
    #[arg(short, long, env = "PERSONWATCH_LABELS")]
    pub labels: Option<PathBuf>,

    /// Minimum detection confidence (0.0-1.0).
    #[arg(short, long, env = "PERSONWATCH_CONFIDENCE")]
    pub confidence: Option<f32>,

    /// Render the overlay and write preview frames.
    #[arg(long, env = "PERSONWATCH_DISPLAY", num_args = 0..=1, default_missing_value = "true")]
    pub display: Option<bool>,

    /// Rotate frames 180 degrees (camera mounted upside down).
    #[arg(long, env = "PERSONWATCH_FLIP", num_args = 0..=1, default_missing_value = "true")]
    pub flip: Option<bool>,

    /// Save a snapshot when at least this many persons are in view.
    #[arg(long, env = "PERSONWATCH_SNAPSHOT_MIN_PERSONS")]
    pub snapshot_min_persons: Option<usize>,

    /// Directory for snapshots.
    #[arg(long, env = "PERSONWATCH_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Camera: V4L2 device, image directory, or stub://<name>.
    #[arg(long, env = "PERSONWATCH_CAMERA")]
    pub camera: Option<String>,

    /// Indicator backend: 'sysfs' or 'dry-run'.
    #[arg(long, env = "PERSONWATCH_INDICATORS")]
    pub indicators: Option<String>,

    /// Channel of the "person in view" output.
    #[arg(long, env = "PERSONWATCH_ATTENTION_PIN")]
    pub attention_pin: Option<u32>,

    /// Channel of the "no person" output.
    #[arg(long, env = "PERSONWATCH_CLEAR_PIN")]
    pub clear_pin: Option<u32>,

    /// Where the annotated preview frame is written.
    #[arg(long, env = "PERSONWATCH_PREVIEW")]
    pub preview: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins).
    #[arg(short, long, env = "PERSONWATCH_VERBOSE", num_args = 0..=1, default_missing_value = "true")]
    pub verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    model: Option<String>,
    labels: Option<PathBuf>,
    confidence: Option<f32>,
    display: Option<bool>,
    flip: Option<bool>,
    snapshot_min_persons: Option<usize>,
    snapshot_dir: Option<PathBuf>,
    verbose: Option<bool>,
    camera: Option<CameraConfigFile>,
    inference: Option<InferenceConfigFile>,
    indicators: Option<IndicatorConfigFile>,
    preview: Option<PreviewConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    frame_wait_ms: Option<u64>,
    max_consecutive_drops: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InferenceConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    timeout_ms: Option<u64>,
    class_offset: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct IndicatorConfigFile {
    backend: Option<String>,
    attention_pin: Option<u32>,
    clear_pin: Option<u32>,
    gpio_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreviewConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub model: String,
    pub labels: PathBuf,
    pub confidence: f32,
    pub display: bool,
    pub flip: bool,
    pub snapshot_min_persons: usize,
    pub snapshot_dir: PathBuf,
    pub verbose: bool,
    pub camera: CameraConfig,
    pub inference: InferenceConfig,
    pub indicators: IndicatorConfig,
    pub preview_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub settings: CameraSettings,
    pub frame_wait: Duration,
    pub max_consecutive_drops: u32,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Width frames are downscaled to before detection.
    pub width: u32,
    /// Model input height (the model input width equals `width`).
    pub height: u32,
    pub timeout: Duration,
    pub class_offset: i64,
}

#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub backend: IndicatorBackend,
    pub attention_pin: u32,
    pub clear_pin: u32,
    pub gpio_root: PathBuf,
}

impl MonitorConfig {
    /// Resolve file, environment and flags into one validated config.
    pub fn load(args: &CliArgs) -> Result<Self> {
        let file_cfg = match args.config.as_deref() {
            Some(path) => read_config_file(path)?,
            None => MonitorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_args(args)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let camera = file.camera.unwrap_or_default();
        let inference = file.inference.unwrap_or_default();
        let indicators = file.indicators.unwrap_or_default();
        let backend = match indicators.backend.as_deref() {
            Some(name) => name.parse()?,
            None => IndicatorBackend::default(),
        };
        Ok(Self {
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            labels: file.labels.unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS)),
            confidence: file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            display: file.display.unwrap_or(true),
            flip: file.flip.unwrap_or(false),
            snapshot_min_persons: file
                .snapshot_min_persons
                .unwrap_or(DEFAULT_SNAPSHOT_MIN_PERSONS),
            snapshot_dir: file
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            verbose: file.verbose.unwrap_or(false),
            camera: CameraConfig {
                settings: CameraSettings {
                    source: camera.source.unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
                    width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                    height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                    target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                },
                frame_wait: Duration::from_millis(
                    camera.frame_wait_ms.unwrap_or(DEFAULT_FRAME_WAIT_MS),
                ),
                max_consecutive_drops: camera
                    .max_consecutive_drops
                    .unwrap_or(DEFAULT_MAX_CONSECUTIVE_DROPS),
            },
            inference: InferenceConfig {
                width: inference.width.unwrap_or(DEFAULT_INFERENCE_WIDTH),
                height: inference.height.unwrap_or(DEFAULT_INFERENCE_HEIGHT),
                timeout: Duration::from_millis(
                    inference.timeout_ms.unwrap_or(DEFAULT_INFERENCE_TIMEOUT_MS),
                ),
                class_offset: inference.class_offset.unwrap_or(0),
            },
            indicators: IndicatorConfig {
                backend,
                attention_pin: indicators.attention_pin.unwrap_or(DEFAULT_ATTENTION_PIN),
                clear_pin: indicators.clear_pin.unwrap_or(DEFAULT_CLEAR_PIN),
                gpio_root: indicators
                    .gpio_root
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_GPIO_ROOT)),
            },
            preview_path: file
                .preview
                .and_then(|preview| preview.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PREVIEW_PATH)),
        })
    }

    fn apply_args(&mut self, args: &CliArgs) -> Result<()> {
        if let Some(model) = non_empty(args.model.as_deref()) {
            self.model = model.to_string();
        }
        if let Some(labels) = &args.labels {
            self.labels = labels.clone();
        }
        if let Some(confidence) = args.confidence {
            self.confidence = confidence;
        }
        if let Some(display) = args.display {
            self.display = display;
        }
        if let Some(flip) = args.flip {
            self.flip = flip;
        }
        if let Some(min_persons) = args.snapshot_min_persons {
            self.snapshot_min_persons = min_persons;
        }
        if let Some(dir) = &args.snapshot_dir {
            self.snapshot_dir = dir.clone();
        }
        if let Some(camera) = non_empty(args.camera.as_deref()) {
            self.camera.settings.source = camera.to_string();
        }
        if let Some(backend) = non_empty(args.indicators.as_deref()) {
            self.indicators.backend = backend.parse()?;
        }
        if let Some(pin) = args.attention_pin {
            self.indicators.attention_pin = pin;
        }
        if let Some(pin) = args.clear_pin {
            self.indicators.clear_pin = pin;
        }
        if let Some(preview) = &args.preview {
            self.preview_path = preview.clone();
        }
        if let Some(verbose) = args.verbose {
            self.verbose = verbose;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::config(format!(
                "confidence must be between 0 and 1 (got {})",
                self.confidence
            )));
        }
        if self.inference.width == 0 || self.inference.height == 0 {
            return Err(Error::config("inference width and height must be greater than zero"));
        }
        if self.inference.timeout.is_zero() {
            return Err(Error::config("inference timeout must be greater than zero"));
        }
        if self.camera.frame_wait.is_zero() {
            return Err(Error::config("camera frame wait must be greater than zero"));
        }
        if self.camera.max_consecutive_drops == 0 {
            return Err(Error::config("max_consecutive_drops must be greater than zero"));
        }
        if self.indicators.attention_pin == self.indicators.clear_pin {
            return Err(Error::config(format!(
                "attention and clear outputs must use different pins (both {})",
                self.indicators.attention_pin
            )));
        }
        if !self.labels.is_file() {
            return Err(Error::config(format!(
                "label catalog {} not found",
                self.labels.display()
            )));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            confidence: self.confidence,
            flip: self.flip,
            inference_width: self.inference.width,
            frame_wait: self.camera.frame_wait,
            max_consecutive_drops: self.camera.max_consecutive_drops,
            snapshot_min_persons: self.snapshot_min_persons,
            display: self.display,
            health_interval: HEALTH_LOG_INTERVAL,
        }
    }

    pub fn model_spec(&self) -> ModelSpec {
        ModelSpec {
            location: self.model.clone(),
            input_width: self.inference.width,
            input_height: self.inference.height,
            class_offset: self.inference.class_offset,
        }
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&raw)
        .map_err(|e| Error::config(format!("invalid config file {}: {}", path.display(), e)))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().expect("temp labels");
        std::fs::write(file.path(), "0 person\n").expect("write labels");
        file
    }

    fn args_with_labels(labels: &Path) -> CliArgs {
        CliArgs {
            labels: Some(labels.to_path_buf()),
            ..CliArgs::default()
        }
    }

    #[test]
    fn defaults_match_reference_deployment() -> Result<()> {
        let labels = labels_file();
        let cfg = MonitorConfig::load(&args_with_labels(labels.path()))?;
        assert_eq!(cfg.confidence, 0.3);
        assert!(cfg.display);
        assert!(!cfg.flip);
        assert_eq!(cfg.snapshot_min_persons, 3);
        assert_eq!(cfg.indicators.attention_pin, 8);
        assert_eq!(cfg.indicators.clear_pin, 10);
        assert_eq!(cfg.inference.width, 300);
        assert_eq!(cfg.camera.max_consecutive_drops, 10);
        assert_eq!(cfg.snapshot_dir, PathBuf::from("snapshots"));
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let labels = labels_file();
        let args = CliArgs {
            confidence: Some(1.5),
            ..args_with_labels(labels.path())
        };
        assert!(matches!(MonitorConfig::load(&args), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_shared_pins() {
        let labels = labels_file();
        let args = CliArgs {
            attention_pin: Some(10),
            ..args_with_labels(labels.path())
        };
        assert!(matches!(MonitorConfig::load(&args), Err(Error::Config(_))));
    }

    #[test]
    fn missing_labels_file_is_a_config_error() {
        let args = args_with_labels(Path::new("/nonexistent/labels.txt"));
        assert!(matches!(MonitorConfig::load(&args), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let err = toml::from_str::<MonitorConfigFile>("colour = \"red\"").unwrap_err();
        assert!(err.to_string().contains("colour"));
    }
}
