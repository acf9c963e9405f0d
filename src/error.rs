use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors raised by the aggregation pipeline.
///
/// `MalformedRecord` and `UnknownAlleleClass` are per-row / per-record and are
/// recoverable: callers count them and keep going. Everything else aborts the
/// run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{}:{row}: malformed record: {reason}", .file.display())]
    MalformedRecord {
        file: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("allele '{allele}' is neither Class I (HLA-A/B/C) nor Class II (HLA-DP/DQ/DR)")]
    UnknownAlleleClass { allele: String },

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "{}: {malformed} of {total} rows are malformed, above the allowed ratio of {threshold}",
        .file.display()
    )]
    ThresholdExceeded {
        file: PathBuf,
        malformed: usize,
        total: usize,
        threshold: f64,
    },

    #[error("{}: required column '{column}' not found in header", .file.display())]
    MissingColumn { file: PathBuf, column: String },

    #[error("{}: column '{column}' has type {data_type}, which cannot be read as text", .file.display())]
    UnsupportedColumnType {
        file: PathBuf,
        column: String,
        data_type: String,
    },

    #[error("{}:{row}: peptide '{peptide}' maps to both '{first}' and '{second}'", .file.display())]
    AmbiguousMapping {
        file: PathBuf,
        row: usize,
        peptide: String,
        first: String,
        second: String,
    },

    #[error("{}: invalid samplesheet: {reason}", .file.display())]
    InvalidSampleSheet { file: PathBuf, reason: String },

    #[error("external tool '{tool}' failed: {reason}")]
    Tool { tool: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: {source}", .path.display())]
    Parquet {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("{}: {source}", .path.display())]
    Arrow {
        path: PathBuf,
        #[source]
        source: arrow::error::ArrowError,
    },
}

impl PipelineError {
    /// Whether the error only affects a single row or record.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedRecord { .. } | PipelineError::UnknownAlleleClass { .. }
        )
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
