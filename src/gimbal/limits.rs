//! Mechanical axis bounds

use serde::{Deserialize, Serialize};

/// Clamp bounds for both axes, in degrees
///
/// Defaults match the gimbal firmware: tilt 0..90, pan -45..45.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisLimits {
    /// Lowest tilt (elevation)
    pub tilt_min: f32,
    /// Highest tilt (elevation)
    pub tilt_max: f32,
    /// Leftmost pan (azimuth)
    pub pan_min: f32,
    /// Rightmost pan (azimuth)
    pub pan_max: f32,
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            tilt_min: 0.0,
            tilt_max: 90.0,
            pan_min: -45.0,
            pan_max: 45.0,
        }
    }
}

impl AxisLimits {
    /// Clamp a (tilt, pan) request into bounds
    #[inline]
    pub fn clamp(&self, tilt: f32, pan: f32) -> (f32, f32) {
        (
            tilt.max(self.tilt_min).min(self.tilt_max),
            pan.max(self.pan_min).min(self.pan_max),
        )
    }

    /// True if both ranges are finite and non-empty
    pub fn is_valid(&self) -> bool {
        [self.tilt_min, self.tilt_max, self.pan_min, self.pan_max]
            .iter()
            .all(|v| v.is_finite())
            && self.tilt_min <= self.tilt_max
            && self.pan_min <= self.pan_max
    }

    /// True if (tilt, pan) is inside the bounds
    pub fn contains(&self, tilt: f32, pan: f32) -> bool {
        (self.tilt_min..=self.tilt_max).contains(&tilt)
            && (self.pan_min..=self.pan_max).contains(&pan)
    }
}
