//! Error handling for measure processing operations.
//!
//! Distinguishes data-quality failures (which abort the affected measure),
//! fatal reference-data failures (which abort the run) and internal
//! invariant violations.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Input not found at path: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Missing column '{column}' in count table")]
    MissingColumn { column: String },

    #[error("Negative count in column '{column}' at row {row}: {value}")]
    NegativeCount {
        column: String,
        row: usize,
        value: f64,
    },

    #[error("Count in column '{column}' at row {row} is not a finite number")]
    NonFiniteCount { column: String, row: usize },

    #[error("Null grouping key in column '{column}' at row {row}")]
    MissingGroupKey { column: String, row: usize },

    #[error("Duplicate grouping key in count table: {key}")]
    DuplicateGroupKey { key: String },

    #[error("Invalid date '{value}' in column '{column}' at row {row}")]
    InvalidDate {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Age band '{band}' has no standard population weight")]
    UnknownAgeBand { band: String },

    #[error("Standard population file {path} could not be used - {reason}")]
    ReferencePopulation { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Measure '{measure}' failed in unit '{unit}': {source}")]
    MeasureFailed {
        measure: String,
        unit: String,
        #[source]
        source: Box<MeasureError>,
    },

    #[error("Internal invariant violated: {message}")]
    InvariantViolation { message: String },
}

impl MeasureError {
    /// Wrap an error with the measure and grouping unit it occurred in
    pub fn in_measure(self, measure: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::MeasureFailed {
            measure: measure.into(),
            unit: unit.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error should abort the whole run regardless of policy
    pub fn is_fatal(&self) -> bool {
        match self {
            MeasureError::ReferencePopulation { .. } | MeasureError::Configuration { .. } => true,
            MeasureError::MeasureFailed { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MeasureError>;
