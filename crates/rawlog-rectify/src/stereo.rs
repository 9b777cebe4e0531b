//! Stereo rectification (Bouguet's method).
//!
//! Both cameras are rotated half-way towards each other, then a common
//! rotation aligns the baseline with the image x axis (or y for vertical
//! rigs). The rectified cameras share one focal length and have no
//! distortion, so epipolar lines become image rows.
//!
//! The free-scaling parameter `alpha` picks a scale between two extremes:
//! - `0`: only valid pixels are visible (the inscribed rectangle of the
//!   undistorted image border fills the output),
//! - `1`: every source pixel is visible (the bounding rectangle of the
//!   border fits inside the output), possibly with black padding.
//!
//! [`Alpha::Auto`] keeps the natural scale.
//!
//! Image extents follow the pixel-center convention: a `w`-pixel row spans
//! `[0, w - 1]`.

use nalgebra::{Matrix3x4, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::RectifyMapError;
use rawlog_core::{
    rotation_from_vector, rotation_vector, CameraCalibration, FxFyCxCySkew, ImageSize, Iso3, Mat3,
    PinholeCamera, Pt2, Real, Vec2, Vec3,
};

/// Samples per border side when bounding the undistorted image.
const BORDER_SAMPLES: usize = 9;

/// Free-scaling parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Alpha {
    /// Let the algorithm keep its natural scale (`-1` on the wire).
    #[default]
    Auto,
    /// Fixed value in `[0, 1]`.
    Fixed(Real),
}

impl Alpha {
    /// Parse the numeric form: `-1` means auto, otherwise `[0, 1]`.
    pub fn from_value(value: Real) -> Result<Self, RectifyMapError> {
        if value == -1.0 {
            Ok(Alpha::Auto)
        } else if (0.0..=1.0).contains(&value) {
            Ok(Alpha::Fixed(value))
        } else {
            Err(RectifyMapError::InvalidAlpha(value))
        }
    }

    pub fn value(&self) -> Real {
        match self {
            Alpha::Auto => -1.0,
            Alpha::Fixed(a) => *a,
        }
    }
}

impl TryFrom<f64> for Alpha {
    type Error = RectifyMapError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Alpha::from_value(value)
    }
}

impl From<Alpha> for f64 {
    fn from(alpha: Alpha) -> Self {
        alpha.value()
    }
}

/// Options for [`stereo_rectify`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoRectifyOptions {
    pub alpha: Alpha,
    /// Output size; `None` keeps the calibrated size.
    pub output_size: Option<ImageSize>,
    /// Give both rectified cameras the same principal point.
    pub zero_disparity: bool,
}

/// Direction of the baseline after rectification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RigAxis {
    Horizontal,
    Vertical,
}

impl RigAxis {
    fn index(&self) -> usize {
        match self {
            RigAxis::Horizontal => 0,
            RigAxis::Vertical => 1,
        }
    }
}

/// Distortion-free pinhole projection of a rectified camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectifiedProjection {
    pub f: Real,
    pub cx: Real,
    pub cy: Real,
}

impl RectifiedProjection {
    pub fn project(&self, p: &Vec3) -> Option<Pt2> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Pt2::new(
            self.f * p.x / p.z + self.cx,
            self.f * p.y / p.z + self.cy,
        ))
    }

    /// Point on the z = 1 plane seen at pixel `px`.
    pub fn unproject(&self, px: &Pt2) -> Vec3 {
        Vec3::new((px.x - self.cx) / self.f, (px.y - self.cy) / self.f, 1.0)
    }

    pub fn intrinsics(&self) -> FxFyCxCySkew {
        FxFyCxCySkew {
            fx: self.f,
            fy: self.f,
            cx: self.cx,
            cy: self.cy,
            skew: 0.0,
        }
    }
}

/// Result of [`stereo_rectify`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoRectification {
    pub axis: RigAxis,
    pub source_size: ImageSize,
    pub output_size: ImageSize,
    /// Rotation from the raw left camera frame to the rectified frame.
    pub r1: Mat3,
    /// Rotation from the raw right camera frame to the rectified frame.
    pub r2: Mat3,
    pub left: RectifiedProjection,
    pub right: RectifiedProjection,
    /// Translation between rectified frames: `X_right = X_left + t`.
    pub t: Vec3,
    /// Scale applied by `alpha` (1 for [`Alpha::Auto`]).
    pub scale: Real,
}

impl StereoRectification {
    /// 3×4 projection matrix of the rectified left camera.
    pub fn p1(&self) -> Matrix3x4<Real> {
        projection_matrix(&self.left, None)
    }

    /// 3×4 projection matrix of the rectified right camera, with the
    /// baseline term in the last column.
    pub fn p2(&self) -> Matrix3x4<Real> {
        projection_matrix(&self.right, Some((self.axis.index(), self.t[self.axis.index()])))
    }

    pub fn baseline(&self) -> Real {
        self.t.norm()
    }

    /// Pose of the rectified right camera in the rectified left frame.
    pub fn left_se3_right(&self) -> Iso3 {
        Iso3::from_parts(Translation3::from(-self.t), UnitQuaternion::identity())
    }
}

fn projection_matrix(p: &RectifiedProjection, shift: Option<(usize, Real)>) -> Matrix3x4<Real> {
    let mut m = Matrix3x4::zeros();
    m.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&p.intrinsics().k_matrix());
    if let Some((row, t)) = shift {
        m[(row, 3)] = t * p.f;
    }
    m
}

/// Map a raw (distorted) pixel into rectified pixel coordinates.
pub(crate) fn undistort_rectify(
    camera: &PinholeCamera,
    rotation: &Mat3,
    projection: &RectifiedProjection,
    px: &Pt2,
) -> Option<Pt2> {
    let ray = camera.backproject_pixel(px);
    projection.project(&(rotation * ray))
}

/// Axis-aligned rectangle `[x0, x1] × [y0, y1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Rect {
    x0: Real,
    y0: Real,
    x1: Real,
    y1: Real,
}

/// Inscribed and bounding rectangles of the rectified image border.
fn border_rectangles(
    camera: &PinholeCamera,
    rotation: &Mat3,
    projection: &RectifiedProjection,
    size: ImageSize,
) -> Result<(Rect, Rect), RectifyMapError> {
    let n = BORDER_SAMPLES;
    let w = (size.width - 1) as Real;
    let h = (size.height - 1) as Real;

    let mut inner = Rect {
        x0: Real::MIN,
        y0: Real::MIN,
        x1: Real::MAX,
        y1: Real::MAX,
    };
    let mut outer = Rect {
        x0: Real::MAX,
        y0: Real::MAX,
        x1: Real::MIN,
        y1: Real::MIN,
    };

    for j in 0..n {
        for i in 0..n {
            let px = Pt2::new(
                i as Real * w / (n - 1) as Real,
                j as Real * h / (n - 1) as Real,
            );
            let p = undistort_rectify(camera, rotation, projection, &px)
                .ok_or(RectifyMapError::DegenerateGeometry)?;

            outer.x0 = outer.x0.min(p.x);
            outer.x1 = outer.x1.max(p.x);
            outer.y0 = outer.y0.min(p.y);
            outer.y1 = outer.y1.max(p.y);

            if i == 0 {
                inner.x0 = inner.x0.max(p.x);
            }
            if i == n - 1 {
                inner.x1 = inner.x1.min(p.x);
            }
            if j == 0 {
                inner.y0 = inner.y0.max(p.y);
            }
            if j == n - 1 {
                inner.y1 = inner.y1.min(p.y);
            }
        }
    }
    Ok((inner, outer))
}

/// Scale factors that push each edge of `rect` onto the matching edge of the
/// output image, when scaling about `c0` and recentring on `c`.
fn edge_scales(rect: &Rect, c0: &Vec2, c: &Vec2, extent: &Vec2) -> [Real; 4] {
    [
        c.x / (c0.x - rect.x0),
        c.y / (c0.y - rect.y0),
        (extent.x - c.x) / (rect.x1 - c0.x),
        (extent.y - c.y) / (rect.y1 - c0.y),
    ]
}

fn validate_size(size: ImageSize) -> Result<(), RectifyMapError> {
    if size.width < 2 || size.height < 2 {
        return Err(RectifyMapError::InvalidImageSize(size));
    }
    Ok(())
}

/// Compute rectifying rotations and projections for a calibrated rig.
///
/// `left_se3_right` is the pose of the right camera in the left camera frame.
/// Both cameras must share one image size.
pub fn stereo_rectify(
    left: &CameraCalibration,
    right: &CameraCalibration,
    left_se3_right: &Iso3,
    opts: &StereoRectifyOptions,
) -> Result<StereoRectification, RectifyMapError> {
    let size = left.image_size();
    if size != right.image_size() {
        return Err(RectifyMapError::CalibrationSizeMismatch {
            left: size,
            right: right.image_size(),
        });
    }
    validate_size(size)?;
    let output_size = opts.output_size.unwrap_or(size);
    validate_size(output_size)?;

    // X_right = r * X_left + t
    let right_se3_left = left_se3_right.inverse();
    let r = *right_se3_left.rotation.to_rotation_matrix().matrix();
    let t = right_se3_left.translation.vector;
    if t.norm() <= 1e-12 {
        return Err(RectifyMapError::ZeroBaseline);
    }

    // Split the relative rotation evenly between both cameras.
    let r_half = rotation_from_vector(&(rotation_vector(&r) * -0.5));
    let t_half = r_half * t;

    let axis = if t_half.x.abs() > t_half.y.abs() {
        RigAxis::Horizontal
    } else {
        RigAxis::Vertical
    };
    let idx = axis.index();

    // Rotate the baseline onto the rig axis.
    let c = t_half[idx];
    let mut uu = Vec3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };
    let mut ww = t_half.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / t_half.norm()).clamp(-1.0, 1.0).acos() / nw;
    }
    let w_r = rotation_from_vector(&ww);

    let r1 = w_r * r_half.transpose();
    let r2 = w_r * r_half;
    let t_rect = r2 * t;

    let src_extent = Vec2::new((size.width - 1) as Real, (size.height - 1) as Real);
    let out_extent = Vec2::new(
        (output_size.width - 1) as Real,
        (output_size.height - 1) as Real,
    );

    // Shared focal length, taken across the baseline and scaled to the
    // output size.
    let (focal_sum, ratio) = match axis {
        RigAxis::Horizontal => (
            left.intrinsics.fy + right.intrinsics.fy,
            out_extent.y / src_extent.y / 2.0,
        ),
        RigAxis::Vertical => (
            left.intrinsics.fx + right.intrinsics.fx,
            out_extent.x / src_extent.x / 2.0,
        ),
    };
    let mut f = focal_sum * ratio;

    let cameras = [left.camera(), right.camera()];
    let rotations = [r1, r2];

    // Principal points that center the undistorted image corners.
    let mut centers = [Vec2::zeros(); 2];
    for k in 0..2 {
        let unit = RectifiedProjection { f, cx: 0.0, cy: 0.0 };
        let mut sum = Vec2::zeros();
        for corner in [
            Pt2::new(0.0, 0.0),
            Pt2::new(src_extent.x, 0.0),
            Pt2::new(0.0, src_extent.y),
            Pt2::new(src_extent.x, src_extent.y),
        ] {
            let p = undistort_rectify(&cameras[k], &rotations[k], &unit, &corner)
                .ok_or(RectifyMapError::DegenerateGeometry)?;
            sum += p.coords;
        }
        centers[k] = src_extent / 2.0 - sum / 4.0;
    }

    if opts.zero_disparity {
        let mean = (centers[0] + centers[1]) / 2.0;
        centers = [mean, mean];
    } else {
        let mean = (centers[0][1 - idx] + centers[1][1 - idx]) / 2.0;
        centers[0][1 - idx] = mean;
        centers[1][1 - idx] = mean;
    }

    let mut inner = Vec::with_capacity(2);
    let mut outer = Vec::with_capacity(2);
    for k in 0..2 {
        let proj = RectifiedProjection {
            f,
            cx: centers[k].x,
            cy: centers[k].y,
        };
        let (i, o) = border_rectangles(&cameras[k], &rotations[k], &proj, size)?;
        inner.push(i);
        outer.push(o);
    }

    let scaled: Vec<Vec2> = centers
        .iter()
        .map(|c0| c0.component_mul(&out_extent).component_div(&src_extent))
        .collect();

    let scale = match opts.alpha {
        Alpha::Auto => 1.0,
        Alpha::Fixed(alpha) => {
            let mut s0 = Real::MIN;
            let mut s1 = Real::MAX;
            for k in 0..2 {
                for s in edge_scales(&inner[k], &centers[k], &scaled[k], &out_extent) {
                    s0 = s0.max(s);
                }
                for s in edge_scales(&outer[k], &centers[k], &scaled[k], &out_extent) {
                    s1 = s1.min(s);
                }
            }
            s0 * (1.0 - alpha) + s1 * alpha
        }
    };
    if !(scale.is_finite() && scale > 0.0) {
        return Err(RectifyMapError::DegenerateGeometry);
    }
    f *= scale;

    Ok(StereoRectification {
        axis,
        source_size: size,
        output_size,
        r1,
        r2,
        left: RectifiedProjection {
            f,
            cx: scaled[0].x,
            cy: scaled[0].y,
        },
        right: RectifiedProjection {
            f,
            cx: scaled[1].x,
            cy: scaled[1].y,
        },
        t: t_rect,
        scale,
    })
}
