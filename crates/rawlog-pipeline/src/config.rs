//! Configuration of the stereo-rectify operation.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rawlog_core::ImageSize;
use rawlog_rectify::{Alpha, Interpolation, RectificationMap, RectifyMapError};

/// Errors found while parsing or validating a [`StereoRectifyConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("expected LABEL,ALPHA, got '{0}'")]
    MalformedLabelAlpha(String),
    #[error("sensor label must not be empty")]
    EmptyLabel,
    #[error("sensor label '{0}' cannot be used in an image file name")]
    InvalidLabel(String),
    #[error("cannot parse alpha '{0}' as a number")]
    MalformedAlpha(String),
    #[error("expected NCOLSxNROWS, got '{0}'")]
    MalformedImageSize(String),
    #[error("image format '{0}' is not a writable image extension")]
    UnsupportedImageFormat(String),
    #[error(transparent)]
    Map(#[from] RectifyMapError),
}

/// True when `format` encodes both 8-bit gray and 8-bit RGB buffers.
fn encodes_8bit(format: ImageFormat) -> bool {
    if !format.writing_enabled() {
        return false;
    }
    [
        DynamicImage::ImageLuma8(GrayImage::new(1, 1)),
        DynamicImage::ImageRgb8(RgbImage::new(1, 1)),
    ]
    .iter()
    .all(|img| img.write_to(&mut Cursor::new(Vec::new()), format).is_ok())
}

fn default_image_format() -> String {
    "png".to_string()
}

/// Settings for [`StereoRectifyProcessor`](crate::StereoRectifyProcessor).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoRectifyConfig {
    /// Sensor label of the stereo camera (compared case-insensitively).
    pub target_label: String,
    /// `-1` for automatic scaling, otherwise `[0, 1]`.
    #[serde(default)]
    pub alpha: Alpha,
    /// Fixed output size; `None` keeps the calibrated size.
    #[serde(default)]
    pub output_size: Option<ImageSize>,
    /// Extension of the written images, which also selects the encoder.
    #[serde(default = "default_image_format")]
    pub image_format: String,
    #[serde(default)]
    pub interpolation: Interpolation,
    /// Make both rectified principal points coincide.
    #[serde(default)]
    pub zero_disparity: bool,
}

impl StereoRectifyConfig {
    pub fn new(target_label: impl Into<String>, alpha: Alpha) -> Self {
        Self {
            target_label: target_label.into(),
            alpha,
            output_size: None,
            image_format: default_image_format(),
            interpolation: Interpolation::default(),
            zero_disparity: false,
        }
    }

    /// Build from the `LABEL,ALPHA` argument form.
    pub fn from_arg(arg: &str) -> Result<Self, ConfigError> {
        let (label, alpha) = parse_label_alpha(arg)?;
        Ok(Self::new(label, alpha))
    }

    /// Encoder picked by `image_format`. Only formats that can write the
    /// 8-bit gray and RGB images produced by rectification are accepted.
    pub fn encoder(&self) -> Result<ImageFormat, ConfigError> {
        let ext = self.image_format.trim_start_matches('.');
        ImageFormat::from_extension(ext)
            .filter(|f| encodes_8bit(*f))
            .ok_or_else(|| ConfigError::UnsupportedImageFormat(self.image_format.clone()))
    }

    /// Check every field. Nothing touches the filesystem before this passes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_label.trim().is_empty() {
            return Err(ConfigError::EmptyLabel);
        }
        if self.target_label.contains(['/', '\\', '\0']) {
            return Err(ConfigError::InvalidLabel(self.target_label.clone()));
        }
        Alpha::from_value(self.alpha.value())?;
        if let Some(size) = self.output_size {
            if size.width < 2 || size.height < 2 {
                return Err(RectifyMapError::InvalidImageSize(size).into());
            }
        }
        self.encoder()?;
        Ok(())
    }

    /// Unbuilt rectification map carrying these settings.
    pub fn build_map(&self) -> Result<RectificationMap, ConfigError> {
        let mut map = RectificationMap::new();
        map.set_alpha(self.alpha)?;
        match self.output_size {
            Some(size) => map.enable_resize_output(true, size.width, size.height)?,
            None => map.enable_resize_output(false, 0, 0)?,
        }
        map.set_interpolation(self.interpolation);
        map.enable_both_centers_coincide(self.zero_disparity)?;
        Ok(map)
    }
}

/// Parse `LABEL,ALPHA`, e.g. `"BUMBLEBEE,0.5"` or `"CAM,-1"`.
pub fn parse_label_alpha(arg: &str) -> Result<(String, Alpha), ConfigError> {
    let (label, alpha) = arg
        .split_once(',')
        .ok_or_else(|| ConfigError::MalformedLabelAlpha(arg.to_string()))?;
    let label = label.trim();
    if label.is_empty() {
        return Err(ConfigError::EmptyLabel);
    }
    let alpha = alpha.trim();
    let value: f64 = alpha
        .parse()
        .map_err(|_| ConfigError::MalformedAlpha(alpha.to_string()))?;
    Ok((label.to_string(), Alpha::from_value(value)?))
}

/// Parse `NCOLSxNROWS`, e.g. `"640x480"`.
pub fn parse_image_size(arg: &str) -> Result<ImageSize, ConfigError> {
    let malformed = || ConfigError::MalformedImageSize(arg.to_string());
    let (w, h) = arg
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(malformed)?;
    let width: u32 = w.trim().parse().map_err(|_| malformed())?;
    let height: u32 = h.trim().parse().map_err(|_| malformed())?;
    let size = ImageSize::new(width, height);
    if width < 2 || height < 2 {
        return Err(RectifyMapError::InvalidImageSize(size).into());
    }
    Ok(size)
}
