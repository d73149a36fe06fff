use serde::{Deserialize, Serialize};

/// Class id the wrapped model reserves for people.
pub const PERSON_CLASS_ID: u32 = 0;

/// Axis-aligned box in pixel coordinates of the image it was measured on.
///
/// Backends are not required to order the corners, so `x1 <= x2` and `y1 <= y2`
/// must not be assumed. Use [`BoundingBox::normalized`] where it matters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Same box with min corner first.
    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    /// Project from a downscaled image back to the original resolution.
    ///
    /// `scale_factor` is `inference_width / original_width`.
    pub fn project(self, scale_factor: f32) -> Self {
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            return self;
        }
        Self {
            x1: self.x1 / scale_factor,
            y1: self.y1 / scale_factor,
            x2: self.x2 / scale_factor,
            y2: self.y2 / scale_factor,
        }
    }
}

/// One scored object instance in a frame. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    class_id: u32,
    confidence: f32,
    bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bounding_box,
        }
    }

    pub fn class_id(&self) -> u32 {
        self.class_id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS_ID
    }
}

pub fn person_count(detections: &[Detection]) -> usize {
    detections.iter().filter(|d| d.is_person()).count()
}
