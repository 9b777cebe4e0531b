//! Observation types found in a sensor log.
//!
//! The rectifier only understands [`StereoImageObservation`]. Every other
//! sensor kind is carried as an [`OtherObservation`] whose payload is kept
//! verbatim so it can be written back unchanged.

use serde::{Deserialize, Serialize};

use crate::{CameraCalibration, ImageField, Iso3};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Acquisition time, in nanoseconds since the UNIX epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Round a floating point number of seconds to the nearest nanosecond.
    /// Negative values clamp to the epoch.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs.max(0.0) * NANOS_PER_SEC as f64).round() as u64)
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// `<secs>.<nanos>` with exactly nine fractional digits.
    ///
    /// Distinct timestamps always produce distinct strings.
    pub fn fixed_precision(&self) -> String {
        format!("{}.{:09}", self.0 / NANOS_PER_SEC, self.0 % NANOS_PER_SEC)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fixed_precision())
    }
}

/// One side of a stereo pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoSide {
    Left,
    Right,
}

impl StereoSide {
    pub const BOTH: [StereoSide; 2] = [StereoSide::Left, StereoSide::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            StereoSide::Left => "left",
            StereoSide::Right => "right",
        }
    }
}

impl std::fmt::Display for StereoSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn identity_pose() -> Iso3 {
    Iso3::identity()
}

/// Synchronized left/right image pair with its calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoImageObservation {
    pub sensor_label: String,
    pub timestamp: Timestamp,
    /// Pose of the left camera on the vehicle.
    #[serde(default = "identity_pose")]
    pub camera_pose: Iso3,
    pub left_camera: CameraCalibration,
    pub right_camera: CameraCalibration,
    /// Pose of the right camera expressed in the left camera frame
    /// (maps right-camera coordinates to left-camera coordinates).
    pub left_se3_right: Iso3,
    pub image_left: ImageField,
    pub image_right: ImageField,
}

impl StereoImageObservation {
    pub fn image(&self, side: StereoSide) -> &ImageField {
        match side {
            StereoSide::Left => &self.image_left,
            StereoSide::Right => &self.image_right,
        }
    }

    pub fn image_mut(&mut self, side: StereoSide) -> &mut ImageField {
        match side {
            StereoSide::Left => &mut self.image_left,
            StereoSide::Right => &mut self.image_right,
        }
    }

    pub fn camera(&self, side: StereoSide) -> &CameraCalibration {
        match side {
            StereoSide::Left => &self.left_camera,
            StereoSide::Right => &self.right_camera,
        }
    }
}

/// Any observation the rectifier does not interpret.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtherObservation {
    /// Sensor kind, e.g. `battery_state` or `gps`.
    pub kind: String,
    pub sensor_label: String,
    pub timestamp: Timestamp,
    /// Remaining fields, kept as-is.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// A single sensor observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    StereoImages(StereoImageObservation),
    Other(OtherObservation),
}

impl Observation {
    pub fn sensor_label(&self) -> &str {
        match self {
            Observation::StereoImages(o) => &o.sensor_label,
            Observation::Other(o) => &o.sensor_label,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Observation::StereoImages(o) => o.timestamp,
            Observation::Other(o) => o.timestamp,
        }
    }

    /// Sensor kind name.
    pub fn kind(&self) -> &str {
        match self {
            Observation::StereoImages(_) => "stereo_images",
            Observation::Other(o) => &o.kind,
        }
    }

    pub fn as_stereo(&self) -> Option<&StereoImageObservation> {
        match self {
            Observation::StereoImages(o) => Some(o),
            Observation::Other(_) => None,
        }
    }

    pub fn as_stereo_mut(&mut self) -> Option<&mut StereoImageObservation> {
        match self {
            Observation::StereoImages(o) => Some(o),
            Observation::Other(_) => None,
        }
    }
}
