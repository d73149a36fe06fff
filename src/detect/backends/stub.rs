use std::path::Path;

use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::{Error, Result};

/// Stub backend for development and tests. Replays a fixed script of
/// per-frame detections, cycling when it runs out.
///
/// Model paths of the form `stub://<name>` select it:
/// - `stub://empty` never detects anything
/// - `stub://demo` cycles through an empty scene, a car, one person, four people
/// - `stub://<file>.json` replays a JSON array of per-frame detection arrays
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl StubBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn demo() -> Self {
        let boxed = |class_id, confidence, x: f32| {
            Detection::new(
                class_id,
                confidence,
                BoundingBox::new(x, 60.0, x + 50.0, 180.0),
            )
        };
        Self::new(vec![
            vec![],
            vec![boxed(2, 0.71, 40.0)],
            vec![boxed(0, 0.88, 120.0)],
            vec![
                boxed(0, 0.93, 10.0),
                boxed(0, 0.81, 70.0),
                boxed(0, 0.64, 130.0),
                boxed(0, 0.52, 190.0),
            ],
        ])
    }

    /// Load a replay script written as JSON.
    pub fn from_script_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let script: Vec<Vec<Detection>> = serde_json::from_str(&raw).map_err(|e| {
            Error::InferenceUnavailable(format!("invalid stub script {}: {}", path.display(), e))
        })?;
        Ok(Self::new(script))
    }

    /// Resolve a `stub://` model location.
    pub fn from_location(location: &str) -> Result<Self> {
        let name = location.strip_prefix("stub://").unwrap_or(location);
        match name {
            "" | "empty" => Ok(Self::empty()),
            "demo" => Ok(Self::demo()),
            path if path.ends_with(".json") => Self::from_script_file(path),
            other => Err(Error::InferenceUnavailable(format!(
                "unknown stub model {:?}",
                other
            ))),
        }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage, confidence_threshold: f32) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let frame = &self.script[self.cursor % self.script.len()];
        self.cursor = self.cursor.wrapping_add(1);
        Ok(frame
            .iter()
            .filter(|d| d.confidence() >= confidence_threshold)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::person_count;

    #[test]
    fn demo_script_cycles() -> Result<()> {
        let mut backend = StubBackend::demo();
        let image = RgbImage::new(300, 225);

        assert!(backend.detect(&image, 0.3)?.is_empty());
        let cars = backend.detect(&image, 0.3)?;
        assert_eq!(cars.len(), 1);
        assert_eq!(person_count(&cars), 0);
        assert_eq!(person_count(&backend.detect(&image, 0.3)?), 1);
        assert_eq!(person_count(&backend.detect(&image, 0.3)?), 4);
        assert!(backend.detect(&image, 0.3)?.is_empty());
        Ok(())
    }

    #[test]
    fn threshold_filters_scripted_detections() -> Result<()> {
        let mut backend = StubBackend::demo();
        let image = RgbImage::new(300, 225);
        for _ in 0..3 {
            backend.detect(&image, 0.3)?;
        }
        let strong = backend.detect(&image, 0.8)?;
        assert_eq!(strong.len(), 2);
        Ok(())
    }

    #[test]
    fn script_file_round_trips_through_json() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| Error::io("tempdir", e))?;
        let path = dir.path().join("script.json");
        std::fs::write(
            &path,
            r#"[[{"class_id":0,"confidence":0.9,"bounding_box":{"x1":10,"y1":10,"x2":50,"y2":50}}],[]]"#,
        )
        .map_err(|e| Error::io(&path, e))?;

        let mut backend = StubBackend::from_location(&format!("stub://{}", path.display()))?;
        let image = RgbImage::new(4, 4);
        let first = backend.detect(&image, 0.3)?;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].bounding_box(), BoundingBox::new(10.0, 10.0, 50.0, 50.0));
        assert!(backend.detect(&image, 0.3)?.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_stub_name_is_unavailable() {
        assert!(matches!(
            StubBackend::from_location("stub://nope"),
            Err(Error::InferenceUnavailable(_))
        ));
    }
}
