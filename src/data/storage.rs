//! CSV log with daily rollover.
//!
//! Files are laid out as `<directory>/<YYYY-MM-DD>/<prefix>_<YYYYmmdd_HHMMSS>.csv`. A new
//! file, with its own header row, is started on the first row and on the first row after
//! the synchronizer reports a new date. Earlier files are never reopened.
use chrono::{DateTime, Local, NaiveDate};
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::OutputConfig;
use crate::data::sink::RowSink;
use crate::error::SinkError;
use crate::record::SyncRow;

/// Appends synchronized rows to the day's CSV file.
pub struct CsvSink {
    directory: PathBuf,
    prefix: String,
    missing_marker: String,
    header: Vec<String>,
    day: Option<NaiveDate>,
    rollover: bool,
    path: Option<PathBuf>,
    writer: Option<csv::Writer<File>>,
    rows: u64,
}

impl std::fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink")
            .field("directory", &self.directory)
            .field("path", &self.path)
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl CsvSink {
    /// `header` is every channel's field list, concatenated in channel order.
    pub fn new(output: &OutputConfig, header: Vec<String>) -> Self {
        Self {
            directory: output.directory.clone(),
            prefix: output.file_prefix.clone(),
            missing_marker: output.missing_marker.clone(),
            header,
            day: None,
            rollover: true,
            path: None,
            writer: None,
            rows: 0,
        }
    }

    /// File currently being written, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rows written to the current file.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn file_path(&self, day: NaiveDate, at: DateTime<Local>) -> PathBuf {
        let dir = self.directory.join(day.format("%Y-%m-%d").to_string());
        let stem = format!("{}_{}", self.prefix, at.format("%Y%m%d_%H%M%S"));
        let mut path = dir.join(format!("{stem}.csv"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{stem}_{n}.csv"));
            n += 1;
        }
        path
    }

    fn open(&mut self, at: DateTime<Local>) -> Result<(), SinkError> {
        if let Some(mut previous) = self.writer.take() {
            previous.flush()?;
        }
        let day = self.day.unwrap_or_else(|| at.date_naive());
        let path = self.file_path(day, at);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_writer(File::create(&path)?);
        writer.write_record(&self.header)?;
        writer.flush()?;
        info!("CSV log opened at '{}'", path.display());

        self.writer = Some(writer);
        self.path = Some(path);
        self.rows = 0;
        self.rollover = false;
        Ok(())
    }
}

impl RowSink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn on_day(&mut self, day: NaiveDate) -> Result<(), SinkError> {
        if self.day != Some(day) {
            self.day = Some(day);
            self.rollover = true;
        }
        Ok(())
    }

    fn on_row(&mut self, row: &SyncRow) -> Result<(), SinkError> {
        if self.rollover || self.writer.is_none() {
            self.open(row.at())?;
        }
        let marker = self.missing_marker.as_str();
        let values: Vec<Cow<'_, str>> = row.values().map(|v| v.render(marker)).collect();
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(values.iter().map(|v| v.as_bytes()))?;
            writer.flush()?;
            self.rows += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            info!("CSV log closed after {} row(s)", self.rows);
        }
        Ok(())
    }
}
