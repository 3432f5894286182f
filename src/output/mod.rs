//! Record output writers

use crate::ResultRecord;
use std::path::Path;

pub mod csv;

pub use self::csv::CsvRecordWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Generic output writer trait
pub trait OutputWriter {
    /// Flush any buffered data
    fn flush(&mut self) -> OutputResult<()>;

    /// Close the writer and finalize output
    fn close(self) -> OutputResult<()>;
}

/// Trait for writing sampling records
pub trait RecordWriter: OutputWriter {
    /// Write a single record
    fn write_record(&mut self, record: &ResultRecord) -> OutputResult<()>;

    /// Write multiple records at once
    fn write_records(&mut self, records: &[ResultRecord]) -> OutputResult<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }
}

/// Write `records` to `path` as CSV, replacing any existing file.
///
/// Returns the number of records written.
pub fn export_records(path: &Path, records: &[ResultRecord]) -> OutputResult<u64> {
    let mut writer = CsvRecordWriter::create(path)?;
    writer.write_records(records)?;
    let written = writer.records_written();
    writer.close()?;
    Ok(written)
}
