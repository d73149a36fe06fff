pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use crate::detect::backend::DetectorBackend;
use crate::error::Result;

/// Model settings needed to open a backend.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    /// Model path, or `stub://<name>` for the scripted backend.
    pub location: String,
    /// Model input resolution.
    pub input_width: u32,
    pub input_height: u32,
    /// Added to every emitted class id.
    pub class_offset: i64,
}

/// Open the backend for a model location.
pub fn open_backend(spec: &ModelSpec) -> Result<Box<dyn DetectorBackend>> {
    if spec.location.starts_with("stub://") {
        return Ok(Box::new(StubBackend::from_location(&spec.location)?));
    }
    #[cfg(feature = "backend-tract")]
    {
        let backend = TractBackend::new(&spec.location, spec.input_width, spec.input_height)?
            .with_class_offset(spec.class_offset);
        Ok(Box::new(backend))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(crate::Error::InferenceUnavailable(format!(
            "model {} requires the backend-tract feature",
            spec.location
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn spec(location: &str) -> ModelSpec {
        ModelSpec {
            location: location.to_string(),
            input_width: 300,
            input_height: 300,
            class_offset: 0,
        }
    }

    #[test]
    fn stub_locations_open_the_stub_backend() -> Result<()> {
        let backend = open_backend(&spec("stub://demo"))?;
        assert_eq!(backend.name(), "stub");
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn real_models_need_the_tract_feature() {
        assert!(matches!(
            open_backend(&spec("model.onnx")),
            Err(Error::InferenceUnavailable(_))
        ));
    }
}
