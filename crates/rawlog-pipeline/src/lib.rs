//! Streaming stereo-rectify operator over sensor logs.
//!
//! [`StereoRectifyProcessor`] reads records from a [`RecordSource`], rectifies
//! the stereo pairs of one sensor with a
//! [`RectificationMap`](rawlog_rectify::RectificationMap), writes the rectified
//! images through an [`ExternalImageStore`] and forwards every record to a
//! [`RecordSink`].
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{BufReader, BufWriter};
//! use std::path::Path;
//! use rawlog_pipeline::{RawlogReader, RawlogWriter, StereoRectifyConfig, StereoRectifyProcessor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StereoRectifyConfig::from_arg("BUMBLEBEE,0")?;
//! let output = Path::new("out.jsonl");
//! let mut processor = StereoRectifyProcessor::new(config, output)?;
//! let mut reader = RawlogReader::new(BufReader::new(File::open("in.jsonl")?));
//! let mut writer = RawlogWriter::new(BufWriter::new(File::create(output)?));
//! let report = processor.run(&mut reader, &mut writer)?;
//! writer.finish()?;
//! println!("{} pairs rectified", report.rectified);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod io;
mod processor;
mod store;

pub use config::{parse_image_size, parse_label_alpha, ConfigError, StereoRectifyConfig};
pub use error::RectifyError;
pub use io::{LogIoError, RawlogReader, RawlogWriter, RecordSink, RecordSource};
pub use processor::{images_dir_for_log, ProcessReport, StereoRectifyProcessor};
pub use store::{ExternalImageStore, StoreError};
