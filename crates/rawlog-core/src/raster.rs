//! Pixel buffers carried inside observations.
//!
//! An [`ImageField`] either owns its pixels ([`RawImage`]) or refers to an
//! image file stored next to the log. Converting between the two is an
//! ownership transfer: [`ImageField::take_inline`] moves the buffer out and
//! leaves the field empty until [`ImageField::set_external`] is called.

use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width and height of an image, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout of a [`RawImage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit grayscale.
    Luma8,
    /// 8-bit RGB, interleaved.
    Rgb8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb8 => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum RawImageError {
    #[error("pixel buffer has {actual} bytes, expected {expected} for {size} {format:?}")]
    LengthMismatch {
        size: ImageSize,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("image is {actual}, expected {expected}")]
    SizeMismatch {
        expected: ImageSize,
        actual: ImageSize,
    },
}

/// Row-major 8-bit image owned by an observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawImageRepr")]
pub struct RawImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

#[derive(Deserialize)]
struct RawImageRepr {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl TryFrom<RawImageRepr> for RawImage {
    type Error = RawImageError;

    fn try_from(r: RawImageRepr) -> Result<Self, Self::Error> {
        RawImage::from_parts(r.width, r.height, r.format, r.data)
    }
}

impl RawImage {
    /// Wrap an existing buffer, checking its length.
    pub fn from_parts(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, RawImageError> {
        let size = ImageSize::new(width, height);
        let expected = size.area() * format.channels();
        if data.len() != expected {
            return Err(RawImageError::LengthMismatch {
                size,
                format,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Black image of the given size.
    pub fn zeros(size: ImageSize, format: PixelFormat) -> Self {
        Self {
            width: size.width,
            height: size.height,
            format,
            data: vec![0; size.area() * format.channels()],
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Channel values of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.format.channels();
        let offset = (y as usize * self.width as usize + x as usize) * c;
        &self.data[offset..offset + c]
    }

    /// Convert into an `image` crate buffer for encoding.
    pub fn into_dynamic(self) -> Result<DynamicImage, RawImageError> {
        let size = self.size();
        let format = self.format;
        let actual = self.data.len();
        match format {
            PixelFormat::Luma8 => GrayImage::from_raw(size.width, size.height, self.data)
                .map(DynamicImage::ImageLuma8),
            PixelFormat::Rgb8 => RgbImage::from_raw(size.width, size.height, self.data)
                .map(DynamicImage::ImageRgb8),
        }
        .ok_or(RawImageError::LengthMismatch {
            size,
            format,
            expected: size.area() * format.channels(),
            actual,
        })
    }

    /// Build from a decoded image. Anything that is not 8-bit gray is
    /// converted to 8-bit RGB.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(buf) => Self {
                width: buf.width(),
                height: buf.height(),
                format: PixelFormat::Luma8,
                data: buf.into_raw(),
            },
            other => {
                let buf = other.to_rgb8();
                Self {
                    width: buf.width(),
                    height: buf.height(),
                    format: PixelFormat::Rgb8,
                    data: buf.into_raw(),
                }
            }
        }
    }
}

/// Image slot of an observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum ImageField {
    /// Pixels embedded in the record.
    Inline(RawImage),
    /// Pixels stored in a file next to the log; only its name is kept.
    External { file: String },
    /// Transient state while the buffer is being moved out.
    Empty,
}

impl ImageField {
    pub fn is_external(&self) -> bool {
        matches!(self, ImageField::External { .. })
    }

    pub fn as_inline(&self) -> Option<&RawImage> {
        match self {
            ImageField::Inline(img) => Some(img),
            _ => None,
        }
    }

    /// File name of an externally stored image.
    pub fn external_file(&self) -> Option<&str> {
        match self {
            ImageField::External { file } => Some(file),
            _ => None,
        }
    }

    /// Move the inline buffer out, leaving [`ImageField::Empty`] behind.
    ///
    /// Non-inline fields are left untouched and `None` is returned.
    pub fn take_inline(&mut self) -> Option<RawImage> {
        match std::mem::replace(self, ImageField::Empty) {
            ImageField::Inline(img) => Some(img),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Replace the field contents by an external file reference.
    pub fn set_external(&mut self, file: impl Into<String>) {
        *self = ImageField::External { file: file.into() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_checks_length() {
        let err = RawImage::from_parts(4, 3, PixelFormat::Rgb8, vec![0; 12]).unwrap_err();
        assert!(matches!(
            err,
            RawImageError::LengthMismatch {
                expected: 36,
                actual: 12,
                ..
            }
        ));
    }

    #[test]
    fn take_inline_moves_buffer_out() {
        let img = RawImage::zeros(ImageSize::new(2, 2), PixelFormat::Luma8);
        let mut field = ImageField::Inline(img.clone());
        assert_eq!(field.take_inline(), Some(img));
        assert_eq!(field, ImageField::Empty);

        field.set_external("img_a.png");
        assert_eq!(field.take_inline(), None);
        assert_eq!(field.external_file(), Some("img_a.png"));
    }

    #[test]
    fn dynamic_roundtrip_keeps_gray() {
        let img = RawImage::from_parts(3, 2, PixelFormat::Luma8, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let back = RawImage::from_dynamic(img.clone().into_dynamic().unwrap());
        assert_eq!(back, img);
        assert_eq!(back.pixel(2, 1), &[6]);
    }

    #[test]
    fn deserialize_rejects_short_buffer() {
        let json = r#"{"storage":"inline","width":2,"height":2,"format":"luma8","data":[1,2,3]}"#;
        assert!(serde_json::from_str::<ImageField>(json).is_err());
    }

    #[test]
    fn field_serde_shape() {
        let json = r#"{"storage":"external","file":"img_CAM_1.000000000_left.png"}"#;
        let field: ImageField = serde_json::from_str(json).unwrap();
        assert_eq!(field.external_file(), Some("img_CAM_1.000000000_left.png"));
        assert_eq!(serde_json::to_string(&field).unwrap(), json);
    }
}
