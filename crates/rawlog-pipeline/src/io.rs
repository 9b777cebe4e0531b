//! Line-delimited JSON log codec.
//!
//! One [`LogRecord`] per line. [`RawlogReader`] and [`RawlogWriter`] are
//! generic over `BufRead`/`Write` so tests can use in-memory buffers and
//! production code can use files.

use std::io::{self, BufRead, Write};

use thiserror::Error;

use rawlog_core::LogRecord;

#[derive(Debug, Error)]
pub enum LogIoError {
    #[error("log I/O error")]
    Io(#[from] io::Error),
    #[error("malformed record on line {line}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode record")]
    Encode(#[source] serde_json::Error),
}

/// Pull side of the record-exchange contract.
pub trait RecordSource {
    /// Next record in log order, or `None` at the end.
    fn next_record(&mut self) -> Result<Option<LogRecord>, LogIoError>;
}

/// Push side of the record-exchange contract.
pub trait RecordSink {
    fn write_record(&mut self, record: &LogRecord) -> Result<(), LogIoError>;
}

impl RecordSource for std::vec::IntoIter<LogRecord> {
    fn next_record(&mut self) -> Result<Option<LogRecord>, LogIoError> {
        Ok(self.next())
    }
}

impl RecordSink for Vec<LogRecord> {
    fn write_record(&mut self, record: &LogRecord) -> Result<(), LogIoError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Reads records from a line-delimited JSON stream.
pub struct RawlogReader<R: BufRead> {
    reader: R,
    buf: String,
    line: usize,
    records_read: u64,
}

impl<R: BufRead> RawlogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line: 0,
            records_read: 0,
        }
    }

    /// Number of records read so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }
}

impl<R: BufRead> RecordSource for RawlogReader<R> {
    fn next_record(&mut self) -> Result<Option<LogRecord>, LogIoError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            let record = serde_json::from_str(text).map_err(|source| LogIoError::Parse {
                line: self.line,
                source,
            })?;
            self.records_read += 1;
            return Ok(Some(record));
        }
    }
}

impl<R: BufRead> Iterator for RawlogReader<R> {
    type Item = Result<LogRecord, LogIoError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Writes records as line-delimited JSON, in the order they are given.
pub struct RawlogWriter<W: Write> {
    writer: W,
    records_written: u64,
}

impl<W: Write> RawlogWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records_written: 0,
        }
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, LogIoError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for RawlogWriter<W> {
    fn write_record(&mut self, record: &LogRecord) -> Result<(), LogIoError> {
        serde_json::to_writer(&mut self.writer, record).map_err(LogIoError::Encode)?;
        self.writer.write_all(b"\n")?;
        self.records_written += 1;
        Ok(())
    }
}
