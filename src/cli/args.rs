//! Command-line argument definitions for the measures processor
//!
//! Every option maps onto a field of `PipelineConfig`; the binary builds the
//! configuration once and hands it to the pipeline.

use crate::config::{PipelineConfig, RateConfig, RedactionConfig};
use crate::constants::{
    DEFAULT_LOW_COUNT_THRESHOLD, DEFAULT_RATE_PER, DEFAULT_ROUNDING_BASE, DEFAULT_TOP_CODES_ROWS,
};
use crate::models::{
    FailurePolicy, MeasureColumns, OutputFormat, PipelineOrder, SuppressionScope, ZeroTotalPolicy,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Redact and standardise primary-care activity measures
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sro-measures",
    version,
    about = "Small-number disclosure control and rate standardisation for primary-care measures",
    long_about = "Reads measure count tables (measure_<id>.csv) from an input directory, suppresses \
                  small counts, computes crude and age-standardised rates, and writes redacted \
                  practice-level, aggregated and decile tables for publication. Measures with \
                  counts_per_code_<id>.csv and codelist_<id>.csv also get a top codes table."
)]
pub struct Args {
    /// Directory holding measure_<id>.csv count tables
    #[arg(value_name = "INPUT_DIR")]
    pub input_dir: PathBuf,

    /// Output directory for published tables (defaults to INPUT_DIR/published)
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Counts at or below this value are suppressed
    #[arg(short = 't', long, default_value_t = DEFAULT_LOW_COUNT_THRESHOLD)]
    pub threshold: u32,

    /// Base surviving counts are rounded to
    #[arg(long = "rounding-base", default_value_t = DEFAULT_ROUNDING_BASE)]
    pub rounding_base: u32,

    /// Round surviving numerator and denominator counts
    #[arg(long = "round-counts")]
    pub round_counts: bool,

    /// Handling of a unit whose small values are all zero
    #[arg(long = "zero-policy", value_enum, default_value_t = ZeroPolicyArg::Keep)]
    pub zero_policy: ZeroPolicyArg,

    /// Suppress over the whole table instead of per key
    #[arg(long = "global-scope", conflicts_with = "scope_columns")]
    pub global_scope: bool,

    /// Key columns defining a suppression unit
    #[arg(long = "scope", value_name = "COLUMNS", value_delimiter = ',')]
    pub scope_columns: Vec<String>,

    /// Order of suppression and rate computation
    #[arg(long, value_enum, default_value_t = OrderArg::SuppressFirst)]
    pub order: OrderArg,

    /// Rates are expressed per this many of the population
    #[arg(long = "rate-per", default_value_t = DEFAULT_RATE_PER)]
    pub rate_per: f64,

    /// Round rates to 2 decimal places
    #[arg(long = "round-rate")]
    pub round_rate: bool,

    /// Standard population CSV; enables age standardisation
    #[arg(long = "standardise", value_name = "FILE")]
    pub standard_population: Option<PathBuf>,

    /// Age band column used for standardisation
    #[arg(long = "age-group", value_name = "COLUMN")]
    pub age_group_column: Option<String>,

    /// Demographic breakdown column
    #[arg(long, value_name = "COLUMN")]
    pub category: Option<String>,

    /// Numerator count column
    #[arg(long, value_name = "COLUMN")]
    pub numerator: Option<String>,

    /// Denominator count column
    #[arg(long, value_name = "COLUMN")]
    pub denominator: Option<String>,

    /// Period column; also the default suppression unit
    #[arg(long, value_name = "COLUMN")]
    pub date: Option<String>,

    /// Clinical code column of code-level tables and codelists
    #[arg(long, value_name = "COLUMN")]
    pub code: Option<String>,

    /// Codes listed in top codes tables before "Other"
    #[arg(long = "top-codes", value_name = "COUNT", default_value_t = DEFAULT_TOP_CODES_ROWS)]
    pub top_codes: usize,

    /// Keep practices that never record an event
    #[arg(long = "keep-irrelevant")]
    pub keep_irrelevant: bool,

    /// Skip decile tables
    #[arg(long = "no-deciles")]
    pub no_deciles: bool,

    /// Write Parquet instead of CSV
    #[arg(long)]
    pub parquet: bool,

    /// Number of measures processed concurrently
    #[arg(short = 'j', long, value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Abort the run at the first failed measure
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ZeroPolicyArg {
    /// Zeros are not disclosive
    Keep,
    /// Suppress the whole unit
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    SuppressFirst,
    RateFirst,
}

impl Args {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.input_dir.join("published"))
    }

    /// Build the pipeline configuration these arguments describe
    pub fn to_config(&self) -> PipelineConfig {
        let mut columns = MeasureColumns::default();
        if let Some(numerator) = &self.numerator {
            columns = columns.with_numerator(numerator);
        }
        if let Some(denominator) = &self.denominator {
            columns = columns.with_denominator(denominator);
        }
        if let Some(category) = &self.category {
            columns = columns.with_category(category);
        }
        if let Some(date) = &self.date {
            columns = columns.with_date(date);
        }
        if let Some(code) = &self.code {
            columns = columns.with_code(code);
        }

        let scope = if self.global_scope {
            SuppressionScope::Global
        } else if self.scope_columns.is_empty() {
            SuppressionScope::PerPeriod
        } else {
            SuppressionScope::ByColumns(self.scope_columns.clone())
        };

        let zero_policy = match self.zero_policy {
            ZeroPolicyArg::Keep => ZeroTotalPolicy::KeepZeros,
            ZeroPolicyArg::Suppress => ZeroTotalPolicy::SuppressUnit,
        };

        let mut redaction = RedactionConfig::default()
            .with_threshold(self.threshold)
            .with_rounding_base(self.rounding_base)
            .with_zero_policy(zero_policy)
            .with_scope(scope);
        if self.round_counts {
            redaction = redaction.with_rounded_counts();
        }

        let mut rates = RateConfig::default().with_rate_per(self.rate_per);
        if self.round_rate {
            rates = rates.with_rounded_rate();
        }
        if let Some(path) = &self.standard_population {
            rates = rates.with_standardisation(path);
        }
        if let Some(column) = &self.age_group_column {
            rates = rates.with_age_group_column(column);
        }

        let mut config = PipelineConfig::default()
            .with_columns(columns)
            .with_redaction(redaction)
            .with_rates(rates)
            .with_top_codes_rows(self.top_codes)
            .with_order(match self.order {
                OrderArg::SuppressFirst => PipelineOrder::SuppressThenRate,
                OrderArg::RateFirst => PipelineOrder::RateThenSuppress,
            });

        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if self.fail_fast {
            config = config.with_failure_policy(FailurePolicy::FailFast);
        }
        if self.parquet {
            config = config.with_output_format(OutputFormat::Parquet);
        }
        if self.keep_irrelevant {
            config = config.keep_irrelevant_practices();
        }
        if self.no_deciles {
            config = config.without_deciles();
        }
        config
    }

    /// Get the log level based on verbosity settings
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Check if we should show progress bars (not in quiet mode)
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_defaults() {
        let args = Args::try_parse_from(["sro-measures", "output"]).unwrap();
        let config = args.to_config();

        assert_eq!(config.redaction.threshold, DEFAULT_LOW_COUNT_THRESHOLD);
        assert_eq!(config.redaction.rounding_base, DEFAULT_ROUNDING_BASE);
        assert_eq!(config.redaction.scope, SuppressionScope::PerPeriod);
        assert_eq!(config.order, PipelineOrder::SuppressThenRate);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert!(!config.rates.standardise);
        assert_eq!(config.top_codes_rows, DEFAULT_TOP_CODES_ROWS);
        assert_eq!(args.output_dir(), PathBuf::from("output").join("published"));
    }

    #[test]
    fn test_options_map_onto_config() {
        let args = Args::try_parse_from([
            "sro-measures",
            "output",
            "--threshold",
            "7",
            "--rounding-base",
            "5",
            "--zero-policy",
            "suppress",
            "--scope",
            "date,sex",
            "--order",
            "rate-first",
            "--standardise",
            "esp.csv",
            "--category",
            "sex",
            "--numerator",
            "systolic_bp",
            "--date",
            "week",
            "--code",
            "snomed_code",
            "--top-codes",
            "10",
            "--fail-fast",
            "--parquet",
            "-j",
            "2",
        ])
        .unwrap();
        let config = args.to_config();

        assert_eq!(config.redaction.threshold, 7);
        assert_eq!(config.redaction.rounding_base, 5);
        assert_eq!(config.redaction.zero_policy, ZeroTotalPolicy::SuppressUnit);
        assert_eq!(
            config.redaction.scope,
            SuppressionScope::ByColumns(vec!["date".to_string(), "sex".to_string()])
        );
        assert_eq!(config.order, PipelineOrder::RateThenSuppress);
        assert!(config.rates.standardise);
        assert_eq!(
            config.rates.standard_population_path,
            Some(PathBuf::from("esp.csv"))
        );
        assert_eq!(config.columns.category.as_deref(), Some("sex"));
        assert_eq!(config.columns.numerator, "systolic_bp");
        assert_eq!(config.columns.date, "week");
        assert_eq!(config.columns.code.as_deref(), Some("snomed_code"));
        assert_eq!(config.top_codes_rows, 10);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.output_format, OutputFormat::Parquet);
        assert_eq!(config.workers, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_global_scope_conflicts_with_columns() {
        let result = Args::try_parse_from([
            "sro-measures",
            "output",
            "--global-scope",
            "--scope",
            "date",
        ]);
        assert!(result.is_err());

        let args = Args::try_parse_from(["sro-measures", "output", "--global-scope"]).unwrap();
        assert_eq!(args.to_config().redaction.scope, SuppressionScope::Global);
    }

    #[test]
    fn test_log_level() {
        let args = Args::try_parse_from(["sro-measures", "output", "-vv"]).unwrap();
        assert_eq!(args.get_log_level(), "debug");

        let args = Args::try_parse_from(["sro-measures", "output", "-q"]).unwrap();
        assert_eq!(args.get_log_level(), "error");
        assert!(!args.show_progress());
    }
}
