//! CSV output writer
//!
//! Layout is a header line followed by one line per record, fields separated
//! by `", "`:
//!
//! ```text
//! id, seed, angle_sharpness, base_difficulty, new_difficulty
//! 75, -1029384756, 4.2, 5.31, 5.87
//! ```
//!
//! Rows go to a temporary file next to the destination, which is renamed into
//! place on [`OutputWriter::close`]. Dropping the writer without closing it
//! leaves the destination untouched.

use csv::{QuoteStyle, Writer, WriterBuilder};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{OutputError, OutputResult, OutputWriter, RecordWriter};
use crate::ResultRecord;

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Column names in output order
pub const HEADER: [&str; 5] = ["id", "seed", "angle_sharpness", "base_difficulty", "new_difficulty"];

/// CSV writer for sampling records
pub struct CsvRecordWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    destination: PathBuf,
    records_written: u64,
}

impl CsvRecordWriter {
    /// Create a writer for `path` and write the header.
    ///
    /// Missing parent directories are created.
    pub fn create<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        Self::create_with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Create a writer with a custom write buffer size
    pub fn create_with_buffer_size<P: AsRef<Path>>(
        path: P,
        buffer_size: usize,
    ) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating CSV writer: path={}", path.display());

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;

        let temp = NamedTempFile::new_in(&parent)
            .map_err(|e| OutputError::IoError(format!("Failed to create temporary file: {e}")))?;

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Never)
            .from_writer(BufWriter::with_capacity(buffer_size, temp));

        writer
            .write_record(spaced(HEADER.iter().map(|name| (*name).to_string())))
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;

        debug!("CSV header written");

        Ok(Self {
            writer,
            destination: path.to_path_buf(),
            records_written: 0,
        })
    }

    /// Get number of records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Final location of the file
    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// Prefix every field but the first with a space, giving `", "` separators.
fn spaced<I: IntoIterator<Item = String>>(fields: I) -> Vec<String> {
    fields
        .into_iter()
        .enumerate()
        .map(|(index, field)| if index == 0 { field } else { format!(" {field}") })
        .collect()
}

impl RecordWriter for CsvRecordWriter {
    fn write_record(&mut self, record: &ResultRecord) -> OutputResult<()> {
        let fields = [
            record.id.to_string(),
            record.seed.to_string(),
            record.angle_sharpness.to_string(),
            record.base_difficulty.to_string(),
            record.new_difficulty.to_string(),
        ];

        self.writer
            .write_record(spaced(fields))
            .map_err(|e| OutputError::CsvError(format!("Failed to write record: {e}")))?;

        self.records_written += 1;
        Ok(())
    }
}

impl OutputWriter for CsvRecordWriter {
    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush CSV writer: {e}")))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;

        let buffered = self
            .writer
            .into_inner()
            .map_err(|e| OutputError::FlushError(format!("Failed to finalize CSV writer: {e}")))?;
        let temp = buffered
            .into_inner()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush buffer: {e}")))?;

        temp.as_file()
            .sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;
        temp.persist(&self.destination)
            .map_err(|e| OutputError::IoError(format!("Failed to move file into place: {e}")))?;

        info!(
            "CSV writer closed: {} records written to {}",
            self.records_written,
            self.destination.display()
        );
        Ok(())
    }
}
