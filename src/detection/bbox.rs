use serde::{Deserialize, Serialize};

/// One detection, coordinates normalized to 0..1 of the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Presentation timestamp of the source frame (seconds)
    pub pts_s: f64,
    /// Detector confidence
    pub conf: f32,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Box centre, normalized
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}
