//! Pinhole camera model with Brown-Conrady distortion.
//!
//! The mapping from a camera-frame direction to pixels is:
//! `pixel = K(distortion(projection(dir)))`
//!
//! [`CameraCalibration`] is the serialized form carried by stereo
//! observations: image size plus intrinsics and distortion.

mod camera;
mod distortion;
mod intrinsics;

pub use camera::*;
pub use distortion::*;
pub use intrinsics::*;
