//! Core data structures and types for measure processing.
//!
//! Defines the column layout of count tables, the policy enums used by the
//! redactor and rate calculator, and the per-run statistics objects.

use crate::constants::columns;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Names of the columns a count table carries
///
/// A count table is keyed by `practice`, `date` and optionally a demographic
/// `category` and/or an `age_group`; it carries one numerator and one
/// denominator count and receives the derived `rate` columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureColumns {
    pub practice: String,
    pub date: String,
    pub numerator: String,
    pub denominator: String,
    pub rate: String,
    pub rate_standardised: String,
    /// Demographic breakdown column (sex, region, ...) if any
    pub category: Option<String>,
    /// Clinical code column for code-level tables
    pub code: Option<String>,
    /// Age band column used for standardisation
    pub age_group: Option<String>,
}

impl Default for MeasureColumns {
    fn default() -> Self {
        Self {
            practice: columns::PRACTICE.to_string(),
            date: columns::DATE.to_string(),
            numerator: columns::NUMERATOR.to_string(),
            denominator: columns::DENOMINATOR.to_string(),
            rate: columns::RATE.to_string(),
            rate_standardised: columns::RATE_STANDARDISED.to_string(),
            category: None,
            code: None,
            age_group: None,
        }
    }
}

impl MeasureColumns {
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// Use a measure-specific numerator column (e.g. `systolic_bp`)
    pub fn with_numerator(mut self, numerator: impl Into<String>) -> Self {
        self.numerator = numerator.into();
        self
    }

    pub fn with_denominator(mut self, denominator: impl Into<String>) -> Self {
        self.denominator = denominator.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_age_group(mut self, age_group: impl Into<String>) -> Self {
        self.age_group = Some(age_group.into());
        self
    }

    /// The columns that together identify a row
    pub fn key_columns(&self) -> Vec<String> {
        let mut keys = vec![self.practice.clone(), self.date.clone()];
        keys.extend(self.category.iter().cloned());
        keys.extend(self.code.iter().cloned());
        keys.extend(self.age_group.iter().cloned());
        keys
    }

    /// The count columns that must be present and non-negative
    pub fn count_columns(&self) -> [&str; 2] {
        [&self.numerator, &self.denominator]
    }
}

/// Scope within which small counts are suppressed jointly
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuppressionScope {
    /// Every row of the table forms one suppression unit
    Global,
    /// One unit per period of the table's date column
    #[default]
    PerPeriod,
    /// One unit per distinct combination of the given key columns
    ByColumns(Vec<String>),
}

impl SuppressionScope {
    /// Key columns of a unit for a table with the given column layout
    pub fn key_columns(&self, columns: &MeasureColumns) -> Vec<String> {
        match self {
            SuppressionScope::Global => Vec::new(),
            SuppressionScope::PerPeriod => vec![columns.date.clone()],
            SuppressionScope::ByColumns(keys) => keys.clone(),
        }
    }
}

/// Handling of a unit whose values at or below the threshold are all zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZeroTotalPolicy {
    /// Zeros are not disclosive; nothing is suppressed
    #[default]
    KeepZeros,
    /// The whole unit is suppressed to null
    SuppressUnit,
}

/// Order in which redaction and rate computation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelineOrder {
    /// Suppress counts, then compute rates from surviving counts
    #[default]
    SuppressThenRate,
    /// Compute rates from raw counts, then suppress and null out rates
    RateThenSuppress,
}

/// What happens to the remaining measures after one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the failure and keep processing the other measures
    #[default]
    Continue,
    /// Abort the run at the first failure
    FailFast,
}

/// Aggregation function applied in one stage of rate aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFn {
    Sum,
    Mean,
    Median,
}

/// Output file format for published tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// Result of processing a single measure
#[derive(Debug, Clone, Default)]
pub struct MeasureOutcome {
    pub measure: String,
    pub rows: usize,
    pub suppressed_numerators: usize,
    pub suppressed_denominators: usize,
    pub null_rates: usize,
    pub outputs: Vec<PathBuf>,
}

/// Processing statistics for a pipeline run
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub measures_processed: usize,
    pub measures_failed: usize,
    pub total_rows: usize,
    pub outcomes: Vec<MeasureOutcome>,
    pub failures: Vec<(String, String)>,
    pub output_path: PathBuf,
    pub processing_time_ms: u128,
}

impl ProcessingStats {
    pub fn total_suppressed(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| o.suppressed_numerators + o.suppressed_denominators)
            .sum()
    }
}
