//! Writes rectified images next to the output log.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;

use rawlog_core::{ImageField, RawImage, RawImageError, StereoSide, Timestamp};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refusing to overwrite existing image {0}")]
    FileExists(PathBuf),
    #[error("cannot write image {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot encode image {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{0} image has no pixels in memory to write")]
    NotInline(StereoSide),
    #[error(transparent)]
    Image(#[from] RawImageError),
}

/// Directory of externally stored images.
#[derive(Debug)]
pub struct ExternalImageStore {
    dir: PathBuf,
    extension: String,
    format: ImageFormat,
    files_written: usize,
}

impl ExternalImageStore {
    /// Store writing `*.extension` files encoded as `format` into `dir`.
    /// The directory must already exist.
    pub fn new(dir: impl Into<PathBuf>, extension: &str, format: ImageFormat) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
            format,
            files_written: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files_written(&self) -> usize {
        self.files_written
    }

    /// `img_<label>_<secs>.<nanos>_<side>.<ext>`
    pub fn file_name(&self, label: &str, timestamp: Timestamp, side: StereoSide) -> String {
        format!(
            "img_{label}_{}_{side}.{}",
            timestamp.fixed_precision(),
            self.extension
        )
    }

    /// Encode `image` into a new file and return its name relative to the
    /// store directory.
    pub fn save(
        &mut self,
        image: RawImage,
        label: &str,
        timestamp: Timestamp,
        side: StereoSide,
    ) -> Result<String, StoreError> {
        let name = self.file_name(label, timestamp, side);
        let path = self.dir.join(&name);

        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => StoreError::FileExists(path.clone()),
                _ => StoreError::Io {
                    path: path.clone(),
                    source: e,
                },
            })?;
        let mut writer = BufWriter::new(file);
        image
            .into_dynamic()?
            .write_to(&mut writer, self.format)
            .map_err(|source| StoreError::Encode {
                path: path.clone(),
                source,
            })?;
        writer.flush().map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        self.files_written += 1;
        Ok(name)
    }

    /// Move the pixels of `field` into a file and leave only the reference.
    pub fn externalize(
        &mut self,
        field: &mut ImageField,
        label: &str,
        timestamp: Timestamp,
        side: StereoSide,
    ) -> Result<String, StoreError> {
        let image = field.take_inline().ok_or(StoreError::NotInline(side))?;
        let name = self.save(image, label, timestamp, side)?;
        field.set_external(name.clone());
        Ok(name)
    }
}
