use serde::{Deserialize, Serialize};

use crate::{Real, Vec2};

fn default_iters() -> u32 {
    8
}

/// Brown-Conrady 5-parameter radial-tangential distortion.
///
/// Coefficient order on the wire follows the usual `k1, k2, p1, p2, k3`
/// convention when built with [`BrownConrady5::from_coeffs`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
    /// Fixed-point iterations used by [`BrownConrady5::undistort`].
    #[serde(default = "default_iters")]
    pub iters: u32,
}

impl BrownConrady5 {
    /// Build from `[k1, k2, p1, p2, k3]`.
    pub fn from_coeffs(d: [Real; 5]) -> Self {
        Self {
            k1: d[0],
            k2: d[1],
            p1: d[2],
            p2: d[3],
            k3: d[4],
            iters: default_iters(),
        }
    }

    /// Distortion-free model.
    pub fn none() -> Self {
        Self {
            iters: default_iters(),
            ..Self::default()
        }
    }

    /// True when every coefficient is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.k3 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0
    }

    /// Apply distortion to undistorted normalized coordinates.
    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vec2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Invert [`BrownConrady5::distort`] by fixed-point iteration.
    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        if self.is_zero() {
            return *n_dist;
        }
        let iters = if self.iters == 0 { default_iters() } else { self.iters };
        let mut n = *n_dist;
        for _ in 0..iters {
            let err = self.distort(&n) - n_dist;
            n -= err;
        }
        n
    }
}
