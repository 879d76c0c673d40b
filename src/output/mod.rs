//! Local artifacts
//!
//! Two artifacts per worker: a per-record CSV under `activities/` written once
//! per extraction (the durable unit of progress), and a cumulative master CSV
//! whose column set is the running union of every key seen so far. Earlier
//! rows are re-padded when a later record introduces a new column, so the
//! master is rewritten rather than appended. Columns keep first-seen order and
//! are never dropped.

mod csv_sink;

pub use csv_sink::CsvSink;

use crate::extract::ActivityRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Output I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed artifact: {0}")]
    Format(String),
}

pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Destination for extracted records
pub trait RecordSink: Send {
    /// Persists one record; returns the path of the per-record artifact
    fn append(&mut self, record: &ActivityRecord) -> OutputResult<PathBuf>;

    /// The master's current column union, in first-seen order
    fn known_columns(&self) -> &[String];

    /// Path of the cumulative artifact
    fn master_path(&self) -> &Path;
}
