use serde::{Deserialize, Serialize};

use crate::sensors::RawSample;

/// Heading snapshot returned to the application.
///
/// No declination correction is applied, so `true_heading` always equals
/// `magnetic_heading`. Accuracy estimation is not implemented and reads 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    #[serde(rename = "magneticHeading")]
    pub magnetic_heading: f32,
    #[serde(rename = "trueHeading")]
    pub true_heading: f32,
    #[serde(rename = "headingAccuracy")]
    pub accuracy: f32,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

impl Heading {
    /// Build a snapshot from the latest channel reading.
    ///
    /// A freshly opened channel may not have delivered anything yet; the
    /// snapshot then reads 0 degrees stamped with `read_at_ms`.
    pub fn from_sample(sample: Option<RawSample>, read_at_ms: u64) -> Self {
        let (degrees, timestamp_ms) = match sample {
            Some(s) => (normalize_degrees(s.heading_deg), s.timestamp_ms),
            None => (0.0, read_at_ms),
        };

        Self {
            magnetic_heading: degrees,
            true_heading: degrees,
            accuracy: 0.0,
            timestamp_ms,
        }
    }
}

/// Wrap an angle into `[0, 360)`.
pub fn normalize_degrees(degrees: f32) -> f32 {
    let wrapped = degrees % 360.0;
    let wrapped = if wrapped < 0.0 { wrapped + 360.0 } else { wrapped };
    // Tiny negative inputs round up to exactly 360 after the shift
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}
