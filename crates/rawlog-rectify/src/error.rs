use rawlog_core::{ImageSize, RawImageError, Real, StereoSide};
use thiserror::Error;

/// Errors raised while building or applying a rectification map.
#[derive(Debug, Error)]
pub enum RectifyMapError {
    #[error("alpha must be -1 (auto) or within [0, 1], got {0}")]
    InvalidAlpha(Real),
    #[error("invalid image size {0} (need at least 2x2 pixels)")]
    InvalidImageSize(ImageSize),
    #[error("left and right cameras have different image sizes ({left} vs {right})")]
    CalibrationSizeMismatch { left: ImageSize, right: ImageSize },
    #[error("stereo baseline is zero")]
    ZeroBaseline,
    #[error("rectifying rotation maps the image border behind the camera")]
    DegenerateGeometry,
    #[error("rectification map is already built")]
    AlreadySet,
    #[error("rectification map has not been built yet")]
    NotSet,
    #[error("{0} image is not loaded in memory")]
    ImageNotLoaded(StereoSide),
    #[error("{side} image is {actual}, calibration expects {expected}")]
    ImageSizeMismatch {
        side: StereoSide,
        expected: ImageSize,
        actual: ImageSize,
    },
    #[error(transparent)]
    Image(#[from] RawImageError),
}
