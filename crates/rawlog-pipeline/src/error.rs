use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{ConfigError, LogIoError, StoreError};
use rawlog_core::Timestamp;
use rawlog_rectify::RectifyMapError;

/// Errors that abort a stereo-rectify run.
#[derive(Debug, Error)]
pub enum RectifyError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("output log path {0} has no file name")]
    InvalidOutputPath(PathBuf),
    #[error("output image directory {0} already exists")]
    OutputDirExists(PathBuf),
    #[error("cannot create output image directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot load input image {path}")]
    LoadImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot rectify '{label}' at {timestamp}")]
    Rectify {
        label: String,
        timestamp: Timestamp,
        #[source]
        source: RectifyMapError,
    },
    #[error("cannot store rectified image")]
    Store(#[from] StoreError),
    #[error("cannot read or write log")]
    Log(#[from] LogIoError),
    #[error("cancelled after {records} records")]
    Cancelled { records: u64 },
}
