mod backend;
pub mod backends;
mod result;
mod worker;

pub use backend::{ChannelOrder, DetectorBackend};
pub use backends::{open_backend, ModelSpec, StubBackend};
pub use result::{person_count, BoundingBox, Detection, PERSON_CLASS_ID};
pub use worker::InferenceWorker;
