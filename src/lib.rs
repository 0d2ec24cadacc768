//! Measures processor library
//!
//! Small-number disclosure control and rate computation for primary-care
//! activity measures.
//!
//! This library provides tools for:
//! - Suppressing small counts within suppression units so that no suppressed
//!   value can be recovered from published totals
//! - Rounding surviving counts and nulling rates derived from suppressed inputs
//! - Crude rates per population and direct age standardisation against a
//!   reference population
//! - Two-stage aggregation of practice-level rates, deciles and change
//!   classification
//! - Redacted event summaries and top codes tables
//! - Concurrent processing of a directory of measure count tables

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod models;
pub mod preprocess;
pub mod processor;
pub mod rates;
pub mod redaction;
pub mod table;

// Re-export commonly used types
pub use config::{AggregationConfig, PipelineConfig, RateConfig, RedactionConfig};
pub use error::{MeasureError, Result};
pub use models::{
    AggregateFn, FailurePolicy, MeasureColumns, MeasureOutcome, OutputFormat, PipelineOrder,
    ProcessingStats, SuppressionScope, ZeroTotalPolicy,
};
pub use processor::MeasurePipeline;
pub use rates::{AgeBandMapping, StandardPopulation};
pub use redaction::{RedactionReport, redact_small_numbers};
