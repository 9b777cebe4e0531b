use serde::{Deserialize, Serialize};

use super::{BrownConrady5, FxFyCxCySkew};
use crate::{ImageSize, Pt2, Vec2, Vec3};

/// Pinhole camera with Brown-Conrady distortion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinholeCamera {
    /// Intrinsics (K).
    pub k: FxFyCxCySkew,
    /// Lens distortion.
    pub dist: BrownConrady5,
}

impl PinholeCamera {
    pub fn new(k: FxFyCxCySkew, dist: BrownConrady5) -> Self {
        Self { k, dist }
    }

    /// Project a 3D point in camera coordinates into pixel coordinates.
    ///
    /// Returns `None` if the point is on or behind the image plane.
    pub fn project_point_c(&self, p_c: &Vec3) -> Option<Pt2> {
        if p_c.z <= 0.0 {
            return None;
        }
        let n_u = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        let n_d = self.dist.distort(&n_u);
        Some(self.k.to_pixel(&n_d))
    }

    /// Backproject a pixel to a point on the z = 1 plane in camera coordinates.
    pub fn backproject_pixel(&self, px: &Pt2) -> Vec3 {
        let n_d = self.k.from_pixel(px);
        let n_u = self.dist.undistort(&n_d);
        Vec3::new(n_u.x, n_u.y, 1.0)
    }
}

/// Calibration of one camera as stored in a stereo observation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    /// Image width in pixels.
    pub ncols: u32,
    /// Image height in pixels.
    pub nrows: u32,
    pub intrinsics: FxFyCxCySkew,
    pub distortion: BrownConrady5,
}

impl CameraCalibration {
    pub fn image_size(&self) -> ImageSize {
        ImageSize::new(self.ncols, self.nrows)
    }

    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera::new(self.intrinsics, self.distortion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backproject_project_roundtrip_with_distortion() {
        let cam = PinholeCamera::new(
            FxFyCxCySkew {
                fx: 800.0,
                fy: 810.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            BrownConrady5 {
                iters: 20,
                ..BrownConrady5::from_coeffs([-0.05, 0.01, 0.0005, 0.0002, 0.0])
            },
        );
        let px = Pt2::new(1000.0, 200.0);
        let ray = cam.backproject_pixel(&px);
        let px2 = cam.project_point_c(&(ray * 2.5)).unwrap();
        assert!((px2 - px).norm() < 1e-6, "px2={px2:?}");
    }

    #[test]
    fn behind_camera_is_not_projectable() {
        let cam = PinholeCamera::new(
            FxFyCxCySkew {
                fx: 100.0,
                fy: 100.0,
                cx: 50.0,
                cy: 50.0,
                skew: 0.0,
            },
            BrownConrady5::none(),
        );
        assert!(cam.project_point_c(&Vec3::new(0.0, 0.0, -1.0)).is_none());
    }
}
