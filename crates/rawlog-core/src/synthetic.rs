//! Deterministic synthetic stereo data.
//!
//! Used by tests across the workspace and handy for smoke-testing the
//! command-line tool without a recorded log.

use nalgebra::{Translation3, UnitQuaternion};

use crate::{
    BrownConrady5, CameraCalibration, FxFyCxCySkew, ImageField, ImageSize, Iso3, PixelFormat,
    RawImage, StereoImageObservation, Timestamp, Vec3,
};

/// Default baseline of the synthetic rig, in meters.
pub const BASELINE_M: f64 = 0.12;

/// Checkerboard with a horizontal gradient; `phase` shifts the pattern.
pub fn textured_image(size: ImageSize, format: PixelFormat, phase: u32) -> RawImage {
    let channels = format.channels();
    let mut data = Vec::with_capacity(size.area() * channels);
    for y in 0..size.height {
        for x in 0..size.width {
            let square = ((x + phase) / 8 + y / 8) % 2 == 0;
            let ramp = (x * 96 / size.width.max(1)) as u8;
            let base = if square { 40 } else { 140 };
            for c in 0..channels {
                data.push(base + ramp + c as u8 * 10);
            }
        }
    }
    // Buffer length matches by construction.
    RawImage::from_parts(size.width, size.height, format, data)
        .unwrap_or_else(|_| RawImage::zeros(size, format))
}

/// Uniform image, useful to detect padding after remapping.
pub fn uniform_image(size: ImageSize, format: PixelFormat, value: u8) -> RawImage {
    RawImage::from_parts(
        size.width,
        size.height,
        format,
        vec![value; size.area() * format.channels()],
    )
    .unwrap_or_else(|_| RawImage::zeros(size, format))
}

/// Distortion-free calibration with the principal point at the image center.
pub fn ideal_calibration(size: ImageSize, focal: f64) -> CameraCalibration {
    CameraCalibration {
        ncols: size.width,
        nrows: size.height,
        intrinsics: FxFyCxCySkew {
            fx: focal,
            fy: focal,
            cx: size.width as f64 / 2.0,
            cy: size.height as f64 / 2.0,
            skew: 0.0,
        },
        distortion: BrownConrady5::none(),
    }
}

/// Right-camera pose for a horizontal rig with a relative rotation given as
/// a rotation vector.
pub fn rig_pose(baseline: f64, rotation: Vec3) -> Iso3 {
    Iso3::from_parts(
        Translation3::new(baseline, 0.0, 0.0),
        UnitQuaternion::from_scaled_axis(rotation),
    )
}

/// Horizontal stereo pair with ideal cameras and the given relative rotation.
pub fn stereo_observation(
    label: &str,
    timestamp: Timestamp,
    size: ImageSize,
    rotation: Vec3,
) -> StereoImageObservation {
    let calib = ideal_calibration(size, size.width as f64);
    StereoImageObservation {
        sensor_label: label.to_string(),
        timestamp,
        camera_pose: Iso3::identity(),
        left_camera: calib,
        right_camera: calib,
        left_se3_right: rig_pose(BASELINE_M, rotation),
        image_left: ImageField::Inline(textured_image(size, PixelFormat::Luma8, 0)),
        image_right: ImageField::Inline(textured_image(size, PixelFormat::Luma8, 3)),
    }
}
