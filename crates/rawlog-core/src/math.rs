//! Linear algebra type aliases and small geometric helpers.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};

/// Scalar type used throughout the workspace (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Rotation vector (axis * angle) of a rotation matrix.
///
/// The input is re-orthonormalised first, so slightly noisy matrices coming
/// from serialized calibration files are accepted.
pub fn rotation_vector(r: &Mat3) -> Vec3 {
    Rotation3::from_matrix(r).scaled_axis()
}

/// Rotation matrix for a rotation vector (axis * angle).
pub fn rotation_from_vector(v: &Vec3) -> Mat3 {
    *Rotation3::new(*v).matrix()
}
