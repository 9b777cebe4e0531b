use serde::{Deserialize, Serialize};

use crate::{Mat3, Pt2, Real, Vec2};

/// Standard pinhole intrinsics with optional skew.
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxFyCxCySkew {
    /// Focal length in pixels along X.
    pub fx: Real,
    /// Focal length in pixels along Y.
    pub fy: Real,
    /// Principal point X coordinate in pixels.
    pub cx: Real,
    /// Principal point Y coordinate in pixels.
    pub cy: Real,
    /// Skew term (typically 0).
    #[serde(default)]
    pub skew: Real,
}

impl FxFyCxCySkew {
    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Map normalized (distorted) coordinates to pixels.
    pub fn to_pixel(&self, n: &Vec2) -> Pt2 {
        Pt2::new(self.fx * n.x + self.skew * n.y + self.cx, self.fy * n.y + self.cy)
    }

    /// Map pixels to normalized (distorted) coordinates.
    pub fn from_pixel(&self, px: &Pt2) -> Vec2 {
        let y = (px.y - self.cy) / self.fy;
        let x = (px.x - self.cx - self.skew * y) / self.fx;
        Vec2::new(x, y)
    }
}
