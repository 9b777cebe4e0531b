//! Lazily built rectification state for one stereo rig.

use log::debug;
use nalgebra::{Rotation3, Translation3, UnitQuaternion};

use crate::remap::{Interpolation, RemapTable};
use crate::stereo::{
    stereo_rectify, undistort_rectify, Alpha, StereoRectification, StereoRectifyOptions,
};
use crate::RectifyMapError;
use rawlog_core::{
    BrownConrady5, CameraCalibration, ImageField, ImageSize, Iso3, Mat3, PinholeCamera, Pt2,
    RawImage, StereoImageObservation, StereoSide,
};

/// Everything derived from the first calibration seen.
#[derive(Clone, Debug)]
struct RectifiedRig {
    rectification: StereoRectification,
    raw: [PinholeCamera; 2],
    tables: [RemapTable; 2],
}

impl RectifiedRig {
    fn index(side: StereoSide) -> usize {
        match side {
            StereoSide::Left => 0,
            StereoSide::Right => 1,
        }
    }

    fn rotation(&self, side: StereoSide) -> &Mat3 {
        match side {
            StereoSide::Left => &self.rectification.r1,
            StereoSide::Right => &self.rectification.r2,
        }
    }

    fn calibration(&self, side: StereoSide) -> CameraCalibration {
        let r = &self.rectification;
        let projection = match side {
            StereoSide::Left => &r.left,
            StereoSide::Right => &r.right,
        };
        CameraCalibration {
            ncols: r.output_size.width,
            nrows: r.output_size.height,
            intrinsics: projection.intrinsics(),
            distortion: BrownConrady5::none(),
        }
    }
}

#[derive(Clone, Debug)]
enum MapState {
    Uninitialized,
    Ready(Box<RectifiedRig>),
}

/// Stereo rectification map.
///
/// Configure it with the setters, build it once with
/// [`set_from_camera_params`](Self::set_from_camera_params), then apply it to
/// any number of observations of the same rig with [`rectify`](Self::rectify).
/// Once built it is never rebuilt.
#[derive(Clone, Debug)]
pub struct RectificationMap {
    alpha: Alpha,
    output_size: Option<ImageSize>,
    interpolation: Interpolation,
    zero_disparity: bool,
    state: MapState,
}

impl Default for RectificationMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RectificationMap {
    pub fn new() -> Self {
        Self {
            alpha: Alpha::Auto,
            output_size: None,
            interpolation: Interpolation::default(),
            zero_disparity: false,
            state: MapState::Uninitialized,
        }
    }

    fn ensure_unset(&self) -> Result<(), RectifyMapError> {
        match self.state {
            MapState::Uninitialized => Ok(()),
            MapState::Ready(_) => Err(RectifyMapError::AlreadySet),
        }
    }

    fn rig(&self) -> Result<&RectifiedRig, RectifyMapError> {
        match &self.state {
            MapState::Ready(rig) => Ok(rig),
            MapState::Uninitialized => Err(RectifyMapError::NotSet),
        }
    }

    pub fn set_alpha(&mut self, alpha: Alpha) -> Result<(), RectifyMapError> {
        self.ensure_unset()?;
        self.alpha = alpha;
        Ok(())
    }

    pub fn alpha(&self) -> Alpha {
        self.alpha
    }

    /// Force the rectified images to `width x height` pixels, or keep the
    /// calibrated size when `enabled` is false.
    pub fn enable_resize_output(
        &mut self,
        enabled: bool,
        width: u32,
        height: u32,
    ) -> Result<(), RectifyMapError> {
        self.ensure_unset()?;
        if !enabled {
            self.output_size = None;
            return Ok(());
        }
        let size = ImageSize::new(width, height);
        if width < 2 || height < 2 {
            return Err(RectifyMapError::InvalidImageSize(size));
        }
        self.output_size = Some(size);
        Ok(())
    }

    pub fn output_size(&self) -> Option<ImageSize> {
        self.output_size
    }

    /// Sampling mode. May be changed at any time.
    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }

    /// Give both rectified cameras the same principal point.
    pub fn enable_both_centers_coincide(&mut self, enabled: bool) -> Result<(), RectifyMapError> {
        self.ensure_unset()?;
        self.zero_disparity = enabled;
        Ok(())
    }

    pub fn is_set(&self) -> bool {
        matches!(self.state, MapState::Ready(_))
    }

    /// Build the map from the calibration carried by `obs`.
    pub fn set_from_camera_params(
        &mut self,
        obs: &StereoImageObservation,
    ) -> Result<(), RectifyMapError> {
        self.ensure_unset()?;

        let opts = StereoRectifyOptions {
            alpha: self.alpha,
            output_size: self.output_size,
            zero_disparity: self.zero_disparity,
        };
        let rectification =
            stereo_rectify(&obs.left_camera, &obs.right_camera, &obs.left_se3_right, &opts)?;

        let raw = [obs.left_camera.camera(), obs.right_camera.camera()];
        let tables = [
            RemapTable::undistort_rectify(
                &raw[0],
                &rectification.r1,
                &rectification.left,
                rectification.source_size,
                rectification.output_size,
            ),
            RemapTable::undistort_rectify(
                &raw[1],
                &rectification.r2,
                &rectification.right,
                rectification.source_size,
                rectification.output_size,
            ),
        ];

        debug!(
            "rectification map for '{}': {} -> {}, f={:.3}, baseline={:.4}, scale={:.4}, {:?}",
            obs.sensor_label,
            rectification.source_size,
            rectification.output_size,
            rectification.left.f,
            rectification.baseline(),
            rectification.scale,
            rectification.axis,
        );

        self.state = MapState::Ready(Box::new(RectifiedRig {
            rectification,
            raw,
            tables,
        }));
        Ok(())
    }

    pub fn rectification(&self) -> Result<&StereoRectification, RectifyMapError> {
        Ok(&self.rig()?.rectification)
    }

    /// Calibrations of the rectified (left, right) cameras.
    pub fn rectified_cameras(
        &self,
    ) -> Result<(CameraCalibration, CameraCalibration), RectifyMapError> {
        let rig = self.rig()?;
        Ok((
            rig.calibration(StereoSide::Left),
            rig.calibration(StereoSide::Right),
        ))
    }

    /// Map a raw pixel of one camera into rectified pixel coordinates.
    ///
    /// `Ok(None)` when the pixel does not project in front of the rectified
    /// camera.
    pub fn rectify_point(
        &self,
        side: StereoSide,
        px: &Pt2,
    ) -> Result<Option<Pt2>, RectifyMapError> {
        let rig = self.rig()?;
        let i = RectifiedRig::index(side);
        let projection = match side {
            StereoSide::Left => &rig.rectification.left,
            StereoSide::Right => &rig.rectification.right,
        };
        Ok(undistort_rectify(&rig.raw[i], rig.rotation(side), projection, px))
    }

    /// Rectify a single raw image of one camera.
    pub fn rectify_image(
        &self,
        side: StereoSide,
        image: &RawImage,
    ) -> Result<RawImage, RectifyMapError> {
        let rig = self.rig()?;
        let table = &rig.tables[RectifiedRig::index(side)];
        if image.size() != table.source_size() {
            return Err(RectifyMapError::ImageSizeMismatch {
                side,
                expected: table.source_size(),
                actual: image.size(),
            });
        }
        Ok(table.remap(image, self.interpolation)?)
    }

    /// Rectify both images of `obs` in place and rewrite its calibration.
    ///
    /// Afterwards both cameras carry the rectified intrinsics with zero
    /// distortion, `left_se3_right` is a pure translation and `camera_pose`
    /// is the pose of the rectified left camera. On error `obs` is left
    /// unchanged.
    pub fn rectify(&self, obs: &mut StereoImageObservation) -> Result<(), RectifyMapError> {
        let rig = self.rig()?;

        let mut rectified = Vec::with_capacity(2);
        for side in StereoSide::BOTH {
            let image = obs
                .image(side)
                .as_inline()
                .ok_or(RectifyMapError::ImageNotLoaded(side))?;
            rectified.push(self.rectify_image(side, image)?);
        }
        for (side, image) in StereoSide::BOTH.into_iter().zip(rectified) {
            *obs.image_mut(side) = ImageField::Inline(image);
        }

        obs.left_camera = rig.calibration(StereoSide::Left);
        obs.right_camera = rig.calibration(StereoSide::Right);
        obs.left_se3_right = rig.rectification.left_se3_right();

        let r1_inv = Rotation3::from_matrix(&rig.rectification.r1.transpose());
        obs.camera_pose *= Iso3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_rotation_matrix(&r1_inv),
        );
        Ok(())
    }
}
