//! Core types for `rawlog-rectify`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt2`, `Iso3`, ...),
//! - a pinhole camera model with Brown-Conrady distortion,
//! - the log record model: [`LogRecord`], [`Observation`],
//!   [`StereoImageObservation`] and their image slots ([`ImageField`]).
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ projection(dir)`

/// Linear algebra type aliases and helpers.
mod math;
/// Camera models and calibration records.
mod models;

mod observation;
mod raster;
mod record;

/// Deterministic synthetic stereo data for tests and demos.
pub mod synthetic;

pub use math::*;
pub use models::*;
pub use observation::*;
pub use raster::*;
pub use record::*;
