use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tempfile::NamedTempFile;

use personwatch::config::{CliArgs, MonitorConfig};
use personwatch::{Error, IndicatorBackend};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PERSONWATCH_CONFIG",
        "PERSONWATCH_MODEL",
        "PERSONWATCH_LABELS",
        "PERSONWATCH_CONFIDENCE",
        "PERSONWATCH_DISPLAY",
        "PERSONWATCH_FLIP",
        "PERSONWATCH_SNAPSHOT_MIN_PERSONS",
        "PERSONWATCH_SNAPSHOT_DIR",
        "PERSONWATCH_CAMERA",
        "PERSONWATCH_INDICATORS",
        "PERSONWATCH_ATTENTION_PIN",
        "PERSONWATCH_CLEAR_PIN",
        "PERSONWATCH_PREVIEW",
        "PERSONWATCH_VERBOSE",
    ] {
        std::env::remove_var(key);
    }
}

fn labels_file() -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp labels");
    std::fs::write(file.path(), "0 person\n1 bicycle\n").expect("write labels");
    file
}

fn config_file(body: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp config");
    std::fs::write(file.path(), body).expect("write config");
    file
}

#[test]
fn file_then_env_then_flags() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let labels = labels_file();
    let file = config_file(&format!(
        r#"
            model = "stub://demo"
            labels = "{}"
            confidence = 0.45
            display = false
            snapshot_min_persons = 5
            snapshot_dir = "crowds"

            [camera]
            source = "stub://front"
            width = 800
            height = 600
            target_fps = 12
            frame_wait_ms = 250
            max_consecutive_drops = 4

            [inference]
            width = 320
            height = 320
            timeout_ms = 900

            [indicators]
            backend = "dry-run"
            attention_pin = 14
            clear_pin = 15
            gpio_root = "/tmp/gpio"

            [preview]
            path = "/tmp/watch.jpg"
        "#,
        labels.path().display()
    ));

    std::env::set_var("PERSONWATCH_CONFIG", file.path());
    std::env::set_var("PERSONWATCH_CONFIDENCE", "0.6");
    std::env::set_var("PERSONWATCH_CLEAR_PIN", "18");
    std::env::set_var("PERSONWATCH_FLIP", "true");

    let args = CliArgs::try_parse_from(["personwatchd", "--confidence", "0.7", "--display"])
        .expect("parse args");
    let cfg = MonitorConfig::load(&args).expect("load config");

    // Flags beat env, env beats file.
    assert_eq!(cfg.confidence, 0.7);
    assert!(cfg.display);
    assert!(cfg.flip);
    assert_eq!(cfg.indicators.clear_pin, 18);
    // File values where nothing overrides them.
    assert_eq!(cfg.model, "stub://demo");
    assert_eq!(cfg.labels, labels.path());
    assert_eq!(cfg.snapshot_min_persons, 5);
    assert_eq!(cfg.snapshot_dir, PathBuf::from("crowds"));
    assert_eq!(cfg.camera.settings.source, "stub://front");
    assert_eq!(cfg.camera.settings.width, 800);
    assert_eq!(cfg.camera.settings.height, 600);
    assert_eq!(cfg.camera.settings.target_fps, 12);
    assert_eq!(cfg.camera.frame_wait, Duration::from_millis(250));
    assert_eq!(cfg.camera.max_consecutive_drops, 4);
    assert_eq!(cfg.inference.width, 320);
    assert_eq!(cfg.inference.timeout, Duration::from_millis(900));
    assert_eq!(cfg.indicators.backend, IndicatorBackend::DryRun);
    assert_eq!(cfg.indicators.attention_pin, 14);
    assert_eq!(cfg.indicators.gpio_root, PathBuf::from("/tmp/gpio"));
    assert_eq!(cfg.preview_path, PathBuf::from("/tmp/watch.jpg"));

    let settings = cfg.pipeline_settings();
    assert_eq!(settings.inference_width, 320);
    assert_eq!(settings.max_consecutive_drops, 4);
    let spec = cfg.model_spec();
    assert_eq!(spec.location, "stub://demo");
    assert_eq!((spec.input_width, spec.input_height), (320, 320));

    clear_env();
}

#[test]
fn invalid_toml_is_a_config_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file("confidence = \"high\"\n");
    let args = CliArgs {
        config: Some(file.path().to_path_buf()),
        ..CliArgs::default()
    };
    assert!(matches!(MonitorConfig::load(&args), Err(Error::Config(_))));

    clear_env();
}

#[test]
fn env_pins_must_stay_distinct() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let labels = labels_file();
    std::env::set_var("PERSONWATCH_LABELS", labels.path());
    std::env::set_var("PERSONWATCH_ATTENTION_PIN", "10");
    let args = CliArgs::try_parse_from(["personwatchd"]).expect("parse args");
    let err = MonitorConfig::load(&args).unwrap_err();
    assert!(err.to_string().contains("different pins"));

    clear_env();
}

#[test]
fn unknown_indicator_backend_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let labels = labels_file();
    let args = CliArgs::try_parse_from([
        "personwatchd",
        "--labels",
        labels.path().to_str().expect("utf-8 path"),
        "--indicators",
        "pwm",
    ])
    .expect("parse args");
    assert!(matches!(MonitorConfig::load(&args), Err(Error::Config(_))));

    clear_env();
}
