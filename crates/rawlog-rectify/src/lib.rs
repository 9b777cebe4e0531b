//! Stereo rectification for `rawlog-rectify`.
//!
//! - [`stereo_rectify`] computes rectifying rotations and projections for a
//!   calibrated rig, with `alpha` free scaling and optional output resizing.
//! - [`RemapTable`] turns them into per-pixel lookup tables and resamples
//!   images.
//! - [`RectificationMap`] wraps both behind a build-once state machine that is
//!   applied to every stereo pair of a log.
//!
//! ```no_run
//! use rawlog_rectify::{Alpha, RectificationMap};
//! # fn demo(obs: &mut rawlog_core::StereoImageObservation) -> Result<(), rawlog_rectify::RectifyMapError> {
//! let mut map = RectificationMap::new();
//! map.set_alpha(Alpha::Fixed(0.0))?;
//! map.set_from_camera_params(obs)?;
//! map.rectify(obs)?;
//! # Ok(())
//! # }
//! ```

mod error;
mod map;
mod remap;
mod stereo;

pub use error::RectifyMapError;
pub use map::RectificationMap;
pub use remap::{Interpolation, RemapTable};
pub use stereo::{
    stereo_rectify, Alpha, RectifiedProjection, RigAxis, StereoRectification,
    StereoRectifyOptions,
};
