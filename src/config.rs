//! Configuration management and validation.
//!
//! Provides the configuration objects passed into the redactor, the rate
//! calculator and the measure pipeline. Configuration is built once per run
//! and handed down by reference; nothing is read from process-wide state.

use crate::constants::{
    DEFAULT_LOW_COUNT_THRESHOLD, DEFAULT_RATE_PER, DEFAULT_ROUNDING_BASE, DEFAULT_TOP_CODES_ROWS,
    columns,
};
use crate::error::{MeasureError, Result};
use crate::models::{
    AggregateFn, FailurePolicy, MeasureColumns, OutputFormat, PipelineOrder, SuppressionScope,
    ZeroTotalPolicy,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Small-number disclosure control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Counts at or below this value are suppressed
    pub threshold: u32,

    /// Base that surviving counts are rounded to
    pub rounding_base: u32,

    /// Round surviving numerator and denominator counts before publishing
    pub round_counts: bool,

    /// Handling of units whose small values are all zero
    pub zero_policy: ZeroTotalPolicy,

    /// Scope of one suppression unit
    pub scope: SuppressionScope,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LOW_COUNT_THRESHOLD,
            rounding_base: DEFAULT_ROUNDING_BASE,
            round_counts: false,
            zero_policy: ZeroTotalPolicy::default(),
            scope: SuppressionScope::default(),
        }
    }
}

impl RedactionConfig {
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_rounding_base(mut self, rounding_base: u32) -> Self {
        self.rounding_base = rounding_base;
        self
    }

    pub fn with_zero_policy(mut self, zero_policy: ZeroTotalPolicy) -> Self {
        self.zero_policy = zero_policy;
        self
    }

    pub fn with_scope(mut self, scope: SuppressionScope) -> Self {
        self.scope = scope;
        self
    }

    /// Enable rounding of surviving counts
    pub fn with_rounded_counts(mut self) -> Self {
        self.round_counts = true;
        self
    }
}

/// Rate computation and standardisation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Rates are expressed per this many of the population
    pub rate_per: f64,

    /// Round rates to 2 decimal places
    pub round_rate: bool,

    /// Compute age-standardised rates
    pub standardise: bool,

    /// Age band column used for the weight lookup
    pub age_group_column: String,

    /// Reference population file, required when `standardise` is set
    pub standard_population_path: Option<PathBuf>,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            rate_per: DEFAULT_RATE_PER,
            round_rate: false,
            standardise: false,
            age_group_column: columns::AGE_BAND.to_string(),
            standard_population_path: None,
        }
    }
}

impl RateConfig {
    pub fn with_rate_per(mut self, rate_per: f64) -> Self {
        self.rate_per = rate_per;
        self
    }

    pub fn with_rounded_rate(mut self) -> Self {
        self.round_rate = true;
        self
    }

    /// Enable standardisation against the given reference population file
    pub fn with_standardisation(mut self, path: impl Into<PathBuf>) -> Self {
        self.standardise = true;
        self.standard_population_path = Some(path.into());
        self
    }

    pub fn with_age_group_column(mut self, column: impl Into<String>) -> Self {
        self.age_group_column = column.into();
        self
    }
}

/// Two-stage aggregation to the published granularity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Applied within each (category, date, practice) group
    pub within: AggregateFn,

    /// Applied across practices within each (category, date) group
    pub across: AggregateFn,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            within: AggregateFn::Sum,
            across: AggregateFn::Mean,
        }
    }
}

/// Global configuration for a measure processing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of measures processed concurrently
    pub workers: usize,

    /// Column layout of the input count tables
    pub columns: MeasureColumns,

    /// Disclosure control settings
    pub redaction: RedactionConfig,

    /// Rate settings
    pub rates: RateConfig,

    /// Aggregation settings
    pub aggregation: AggregationConfig,

    /// Order of redaction and rate computation
    pub order: PipelineOrder,

    /// Behaviour after a measure fails
    pub failure_policy: FailurePolicy,

    /// Drop practices without any event before processing
    pub drop_irrelevant_practices: bool,

    /// Also write per-period decile tables
    pub write_deciles: bool,

    /// Number of codes in published top code tables
    pub top_codes_rows: usize,

    /// Format of written tables
    pub output_format: OutputFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            columns: MeasureColumns::default(),
            redaction: RedactionConfig::default(),
            rates: RateConfig::default(),
            aggregation: AggregationConfig::default(),
            order: PipelineOrder::default(),
            failure_policy: FailurePolicy::default(),
            drop_irrelevant_practices: true,
            write_deciles: true,
            top_codes_rows: DEFAULT_TOP_CODES_ROWS,
            output_format: OutputFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Create configuration with custom worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_columns(mut self, columns: MeasureColumns) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_redaction(mut self, redaction: RedactionConfig) -> Self {
        self.redaction = redaction;
        self
    }

    pub fn with_rates(mut self, rates: RateConfig) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_order(mut self, order: PipelineOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Number of codes listed in top codes tables before "Other"
    pub fn with_top_codes_rows(mut self, rows: usize) -> Self {
        self.top_codes_rows = rows;
        self
    }

    /// Keep practices that never record an event
    pub fn keep_irrelevant_practices(mut self) -> Self {
        self.drop_irrelevant_practices = false;
        self
    }

    /// Skip decile table output
    pub fn without_deciles(mut self) -> Self {
        self.write_deciles = false;
        self
    }

    /// Column layout with the configured age band column attached when
    /// standardising
    pub fn effective_columns(&self) -> MeasureColumns {
        let mut columns = self.columns.clone();
        if self.rates.standardise && columns.age_group.is_none() {
            columns.age_group = Some(self.rates.age_group_column.clone());
        }
        columns
    }

    /// Reject configurations that cannot produce a valid run
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(MeasureError::Configuration {
                message: "workers must be at least 1".to_string(),
            });
        }

        if self.redaction.rounding_base == 0 {
            return Err(MeasureError::Configuration {
                message: "rounding base must be at least 1".to_string(),
            });
        }

        if !(self.rates.rate_per.is_finite() && self.rates.rate_per > 0.0) {
            return Err(MeasureError::Configuration {
                message: format!("rate_per must be positive, got {}", self.rates.rate_per),
            });
        }

        if self.rates.standardise && self.rates.standard_population_path.is_none() {
            return Err(MeasureError::Configuration {
                message: "standardisation requires a standard population file".to_string(),
            });
        }

        if self.top_codes_rows == 0 {
            return Err(MeasureError::Configuration {
                message: "top_codes_rows must be at least 1".to_string(),
            });
        }

        debug!(
            "Configuration valid: threshold={}, rounding_base={}, rate_per={}, standardise={}",
            self.redaction.threshold,
            self.redaction.rounding_base,
            self.rates.rate_per,
            self.rates.standardise
        );

        Ok(())
    }
}
