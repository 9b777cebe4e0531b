//! Per-pixel lookup tables and image resampling.

use serde::{Deserialize, Serialize};

use crate::stereo::RectifiedProjection;
use rawlog_core::{ImageSize, Mat3, PinholeCamera, Pt2, RawImage, RawImageError, Real};

/// Sampling used when reading the source image at fractional coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

/// For every output pixel, the source pixel it is sampled from.
///
/// Pixels with no valid source (the ray falls behind the raw camera) hold
/// `NaN` and render black.
#[derive(Clone, Debug, PartialEq)]
pub struct RemapTable {
    size: ImageSize,
    source_size: ImageSize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RemapTable {
    /// Table that undistorts a raw camera and rotates it into the rectified
    /// frame described by `rotation` and `projection`.
    pub fn undistort_rectify(
        camera: &PinholeCamera,
        rotation: &Mat3,
        projection: &RectifiedProjection,
        source_size: ImageSize,
        size: ImageSize,
    ) -> Self {
        let r_inv = rotation.transpose();
        let n = size.area();
        let mut map_x = Vec::with_capacity(n);
        let mut map_y = Vec::with_capacity(n);

        for v in 0..size.height {
            for u in 0..size.width {
                let ray = r_inv * projection.unproject(&Pt2::new(u as Real, v as Real));
                match camera.project_point_c(&ray) {
                    Some(src) => {
                        map_x.push(src.x as f32);
                        map_y.push(src.y as f32);
                    }
                    None => {
                        map_x.push(f32::NAN);
                        map_y.push(f32::NAN);
                    }
                }
            }
        }

        Self {
            size,
            source_size,
            map_x,
            map_y,
        }
    }

    /// Output size.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Size of the images this table reads from.
    pub fn source_size(&self) -> ImageSize {
        self.source_size
    }

    /// Source coordinates for output pixel `(u, v)`.
    pub fn lookup(&self, u: u32, v: u32) -> Option<(f32, f32)> {
        if u >= self.size.width || v >= self.size.height {
            return None;
        }
        let i = v as usize * self.size.width as usize + u as usize;
        let (x, y) = (self.map_x[i], self.map_y[i]);
        if x.is_nan() || y.is_nan() {
            None
        } else {
            Some((x, y))
        }
    }

    /// Resample `src` through the table. `src` must have
    /// [`source_size`](Self::source_size).
    pub fn remap(
        &self,
        src: &RawImage,
        interpolation: Interpolation,
    ) -> Result<RawImage, RawImageError> {
        if src.size() != self.source_size {
            return Err(RawImageError::SizeMismatch {
                expected: self.source_size,
                actual: src.size(),
            });
        }
        let channels = src.format().channels();
        let mut out = Vec::with_capacity(self.size.area() * channels);
        let mut px = vec![0u8; channels];

        for (&x, &y) in self.map_x.iter().zip(&self.map_y) {
            px.fill(0);
            sample(src, x, y, interpolation, &mut px);
            out.extend_from_slice(&px);
        }

        RawImage::from_parts(self.size.width, self.size.height, src.format(), out)
    }
}

/// Write the sample at `(x, y)` into `px`. Leaves `px` untouched (black)
/// outside `[-0.5, w - 0.5] × [-0.5, h - 0.5]`.
fn sample(src: &RawImage, x: f32, y: f32, interpolation: Interpolation, px: &mut [u8]) {
    let size = src.size();
    let (w, h) = (size.width as f32, size.height as f32);
    if !(x >= -0.5 && x <= w - 0.5 && y >= -0.5 && y <= h - 0.5) {
        return;
    }
    let x = x.clamp(0.0, w - 1.0);
    let y = y.clamp(0.0, h - 1.0);

    match interpolation {
        Interpolation::Nearest => {
            let xi = (x.round() as u32).min(size.width - 1);
            let yi = (y.round() as u32).min(size.height - 1);
            px.copy_from_slice(src.pixel(xi, yi));
        }
        Interpolation::Bilinear => {
            let x0 = x.floor() as u32;
            let y0 = y.floor() as u32;
            let x1 = (x0 + 1).min(size.width - 1);
            let y1 = (y0 + 1).min(size.height - 1);
            let ax = x - x0 as f32;
            let ay = y - y0 as f32;

            let (p00, p10) = (src.pixel(x0, y0), src.pixel(x1, y0));
            let (p01, p11) = (src.pixel(x0, y1), src.pixel(x1, y1));
            for c in 0..px.len() {
                let top = p00[c] as f32 * (1.0 - ax) + p10[c] as f32 * ax;
                let bottom = p01[c] as f32 * (1.0 - ax) + p11[c] as f32 * ax;
                let value = top * (1.0 - ay) + bottom * ay;
                px[c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}
