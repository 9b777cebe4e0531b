//! The stereo-rectify stream operator.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;

use crate::io::{RecordSink, RecordSource};
use crate::{ExternalImageStore, RectifyError, StereoRectifyConfig};
use rawlog_core::{ImageField, LogRecord, Observation, RawImage, StereoImageObservation, StereoSide};
use rawlog_rectify::{RectificationMap, RectifyMapError};

/// Statistics of a finished run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProcessReport {
    pub elapsed: Duration,
    /// Records read and forwarded.
    pub records: u64,
    /// Observations inspected, including those inside sensory frames.
    pub observations: u64,
    /// Stereo pairs rectified and externalized.
    pub rectified: u64,
}

/// Directory that receives the images of `output_log`:
/// `<dir>/<stem>_Images`.
pub fn images_dir_for_log(output_log: &Path) -> Result<PathBuf, RectifyError> {
    let stem = output_log
        .file_stem()
        .ok_or_else(|| RectifyError::InvalidOutputPath(output_log.to_path_buf()))?;
    let parent = output_log.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(format!("{}_Images", stem.to_string_lossy())))
}

/// Rectifies every stereo pair of one sensor and externalizes the result.
///
/// Records are handled one at a time and forwarded in their original order.
/// The rectification map is built from the first matching observation and
/// reused for the rest of the run.
pub struct StereoRectifyProcessor {
    config: StereoRectifyConfig,
    map: RectificationMap,
    store: ExternalImageStore,
    input_images_dir: Option<PathBuf>,
    cancel: Option<Arc<AtomicBool>>,
    observations: u64,
    rectified: u64,
}

impl StereoRectifyProcessor {
    /// Validate `config` and create the image directory for `output_log`.
    ///
    /// Fails without touching the filesystem on invalid configuration, and
    /// refuses to reuse an existing image directory.
    pub fn new(config: StereoRectifyConfig, output_log: &Path) -> Result<Self, RectifyError> {
        config.validate()?;
        let map = config.build_map()?;
        let format = config.encoder()?;

        let dir = images_dir_for_log(output_log)?;
        if dir.exists() {
            return Err(RectifyError::OutputDirExists(dir));
        }
        fs::create_dir(&dir).map_err(|source| RectifyError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        info!("writing rectified images to {}", dir.display());

        let store = ExternalImageStore::new(dir, &config.image_format, format);
        Ok(Self {
            config,
            map,
            store,
            input_images_dir: None,
            cancel: None,
            observations: 0,
            rectified: 0,
        })
    }

    /// Directory to load externally stored input images from.
    pub fn with_input_images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_images_dir = Some(dir.into());
        self
    }

    /// Abort the run with [`RectifyError::Cancelled`] once `flag` is raised.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &StereoRectifyConfig {
        &self.config
    }

    pub fn map(&self) -> &RectificationMap {
        &self.map
    }

    pub fn images_dir(&self) -> &Path {
        self.store.dir()
    }

    /// Number of stereo pairs rectified so far.
    pub fn rectified_count(&self) -> u64 {
        self.rectified
    }

    fn is_target(&self, obs: &Observation) -> bool {
        obs.sensor_label()
            .eq_ignore_ascii_case(&self.config.target_label)
    }

    /// Handle one observation. Returns `true` if it was rectified.
    pub fn process_observation(&mut self, obs: &mut Observation) -> Result<bool, RectifyError> {
        self.observations += 1;
        if !self.is_target(obs) {
            return Ok(false);
        }
        let Some(stereo) = obs.as_stereo_mut() else {
            return Ok(false);
        };

        self.load_input_images(stereo)?;
        let label = stereo.sensor_label.clone();
        let timestamp = stereo.timestamp;
        let map_err = |source: RectifyMapError| RectifyError::Rectify {
            label: label.clone(),
            timestamp,
            source,
        };

        if !self.map.is_set() {
            self.map.set_from_camera_params(stereo).map_err(map_err)?;
            info!("built rectification map from '{label}' at {timestamp}");
        }
        self.map.rectify(stereo).map_err(map_err)?;

        for side in StereoSide::BOTH {
            let file = self
                .store
                .externalize(stereo.image_mut(side), &label, timestamp, side)?;
            debug!("{label} {timestamp}: {side} -> {file}");
        }
        self.rectified += 1;
        Ok(true)
    }

    /// Handle every observation of `record`. Returns how many were rectified.
    pub fn process_record(&mut self, record: &mut LogRecord) -> Result<usize, RectifyError> {
        let mut changed = 0;
        for obs in record.observations_mut() {
            if self.process_observation(obs)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn load_input_images(&self, stereo: &mut StereoImageObservation) -> Result<(), RectifyError> {
        let Some(dir) = &self.input_images_dir else {
            return Ok(());
        };
        for side in StereoSide::BOTH {
            let Some(file) = stereo.image(side).external_file() else {
                continue;
            };
            let path = dir.join(file);
            let decoded = image::ImageReader::open(&path)
                .map_err(image::ImageError::IoError)
                .and_then(|reader| reader.decode())
                .map_err(|source| RectifyError::LoadImage {
                    path: path.clone(),
                    source,
                })?;
            *stereo.image_mut(side) = ImageField::Inline(RawImage::from_dynamic(decoded));
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Stream every record from `source` through the operator into `sink`.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<ProcessReport, RectifyError>
    where
        S: RecordSource + ?Sized,
        K: RecordSink + ?Sized,
    {
        let start = Instant::now();
        let mut records = 0u64;

        loop {
            if self.is_cancelled() {
                warn!("cancelled after {records} records");
                return Err(RectifyError::Cancelled { records });
            }
            let Some(mut record) = source.next_record()? else {
                break;
            };
            self.process_record(&mut record)?;
            sink.write_record(&record)?;
            records += 1;
        }

        let report = ProcessReport {
            elapsed: start.elapsed(),
            records,
            observations: self.observations,
            rectified: self.rectified,
        };
        info!(
            "stereo-rectify done in {:.3} s: {} records, {} observations, {} pairs rectified",
            report.elapsed.as_secs_f64(),
            report.records,
            report.observations,
            report.rectified
        );
        Ok(report)
    }
}
