//! Processing of a single measure.
//!
//! Runs validation, redaction, rate computation and aggregation over one
//! count table entirely in memory, builds the top codes table when the
//! measure has code-level inputs, then writes every output table. Nothing
//! is written until all tables of the measure have been computed, and the
//! outputs of a measure whose write fails part-way are removed again.

use super::discovery::MeasureInput;
use crate::config::PipelineConfig;
use crate::constants::{
    CODE_COUNT_COLUMN, CODELIST_FILE_PREFIX, CODELIST_TERM_COLUMN, DEFAULT_CODE_COLUMN,
};
use crate::error::{MeasureError, Result};
use crate::io::{read_csv, write_table};
use crate::models::{MeasureColumns, MeasureOutcome, PipelineOrder};
use crate::preprocess::drop_irrelevant_practices;
use crate::rates::{
    StandardPopulation, aggregate_rates, calculate_rate_standardise, compute_deciles,
    practice_rates,
};
use crate::redaction::{
    EventSummary, RedactionReport, create_top_codes_table, null_out_rates, redact_events_table,
    redact_small_numbers, round_column,
};
use crate::table::{null_count, validate_count_table};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Every table published for one measure
#[derive(Debug, Clone)]
pub struct MeasureTables {
    /// Redacted practice-level table with rates
    pub rates: DataFrame,
    /// Two-stage aggregate per (category, date)
    pub aggregated: DataFrame,
    /// Practice-level deciles per date, when produced
    pub deciles: Option<DataFrame>,
    /// Redacted event summary
    pub events: DataFrame,
    /// Published top codes, for measures with code-level inputs
    pub top_codes: Option<DataFrame>,
    pub report: RedactionReport,
}

/// Processing stage, reported as the failing unit of a measure
#[derive(Debug, Clone, Copy)]
enum Stage {
    Read,
    Validate,
    Redact,
    Rates,
    Aggregate,
    TopCodes,
    Write,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Validate => "validate",
            Stage::Redact => "redact",
            Stage::Rates => "rates",
            Stage::Aggregate => "aggregate",
            Stage::TopCodes => "top_codes",
            Stage::Write => "write",
        }
    }
}

/// Read, process and write one measure
pub fn process_measure(
    input: &MeasureInput,
    config: &PipelineConfig,
    population: Option<&StandardPopulation>,
    output_dir: &Path,
) -> Result<MeasureOutcome> {
    let fail = |stage: Stage| {
        let measure = input.id.clone();
        move |e: MeasureError| e.in_measure(measure, stage.name())
    };

    debug!("Processing measure '{}' from {}", input.id, input.path.display());

    let df = read_csv(&input.path).map_err(fail(Stage::Read))?;
    let mut tables = build_tables(&input.id, &df, config, population)?;
    tables.top_codes = read_top_codes(input, config).map_err(fail(Stage::TopCodes))?;
    let columns = config.effective_columns();

    let outputs = write_tables(&input.id, &tables, config, output_dir).map_err(fail(Stage::Write))?;

    let null_rates = null_count(&tables.rates, &columns.rate).map_err(fail(Stage::Write))?;

    info!(
        "Measure '{}': {} rows, {} numerators and {} denominators suppressed",
        input.id,
        tables.rates.height(),
        tables.report.suppressed_numerators,
        tables.report.suppressed_denominators
    );

    Ok(MeasureOutcome {
        measure: input.id.clone(),
        rows: tables.rates.height(),
        suppressed_numerators: tables.report.suppressed_numerators,
        suppressed_denominators: tables.report.suppressed_denominators,
        null_rates,
        outputs,
    })
}

/// Compute every published table of a measure without touching the disk
pub fn build_tables(
    measure: &str,
    df: &DataFrame,
    config: &PipelineConfig,
    population: Option<&StandardPopulation>,
) -> Result<MeasureTables> {
    let fail = |stage: Stage| move |e: MeasureError| e.in_measure(measure, stage.name());

    let columns = config.effective_columns();
    validate_count_table(df, &columns).map_err(fail(Stage::Validate))?;

    let events = EventSummary::from_counts(df, &columns.numerator, &columns.date)
        .and_then(|summary| {
            redact_events_table(
                &summary,
                config.redaction.threshold,
                config.redaction.rounding_base,
            )
        })
        .map_err(fail(Stage::Redact))?;

    let df = if config.drop_irrelevant_practices {
        drop_irrelevant_practices(df, &columns).map_err(fail(Stage::Validate))?
    } else {
        df.clone()
    };

    let rate_columns = rate_columns(&columns, config);
    let numerator = columns.numerator.as_str();
    let denominator = columns.denominator.as_str();

    let (mut table, report) = match config.order {
        PipelineOrder::SuppressThenRate => {
            let redacted = redact_small_numbers(&df, &columns, &[], &config.redaction)
                .map_err(fail(Stage::Redact))?;
            let table = calculate_rate_standardise(&redacted.table, &columns, &config.rates, population)
                .map_err(fail(Stage::Rates))?;
            // Every rate column must be null where an input was suppressed
            let (table, nulled) = null_out_rates(&table, numerator, denominator, &rate_columns)
                .map_err(fail(Stage::Redact))?;
            if nulled > 0 {
                warn!("Measure '{}': {} rates survived suppression and were nulled", measure, nulled);
            }
            (table, redacted.report)
        }
        PipelineOrder::RateThenSuppress => {
            let table = calculate_rate_standardise(&df, &columns, &config.rates, population)
                .map_err(fail(Stage::Rates))?;
            let redacted = redact_small_numbers(&table, &columns, &rate_columns, &config.redaction)
                .map_err(fail(Stage::Redact))?;
            (redacted.table, redacted.report)
        }
    };

    if config.redaction.round_counts {
        for column in [numerator, denominator] {
            table = round_column(&table, column, config.redaction.rounding_base)
                .map_err(fail(Stage::Redact))?;
        }
    }

    let value = published_value(&columns, config);
    let aggregated = aggregate_rates(&table, &columns, value, &config.aggregation)
        .map_err(fail(Stage::Aggregate))?;

    let deciles = if config.write_deciles && columns.category.is_none() {
        let practices = practice_rates(&table, &columns, value, config.aggregation.within)
            .map_err(fail(Stage::Aggregate))?;
        Some(compute_deciles(&practices, &columns.date, value, false).map_err(fail(Stage::Aggregate))?)
    } else {
        if config.write_deciles {
            debug!("Measure '{}': deciles skipped for a categorised table", measure);
        }
        None
    };

    Ok(MeasureTables {
        rates: table,
        aggregated,
        deciles,
        events,
        top_codes: None,
        report,
    })
}

/// Read the code-level inputs of a measure and build its top codes table
///
/// Returns `None` for a measure without per-code counts. Per-code counts
/// without a codelist are an error: codes cannot be published undescribed.
fn read_top_codes(input: &MeasureInput, config: &PipelineConfig) -> Result<Option<DataFrame>> {
    let Some(counts_path) = &input.code_counts else {
        return Ok(None);
    };
    let Some(codelist_path) = &input.codelist else {
        return Err(MeasureError::InputNotFound {
            path: counts_path.with_file_name(format!("{CODELIST_FILE_PREFIX}{}.csv", input.id)),
        });
    };

    let counts = read_csv(counts_path)?;
    let codelist = read_csv(codelist_path)?;
    build_top_codes(&counts, &codelist, config).map(Some)
}

/// Publishable top codes table from per-code counts and a codelist
///
/// Codes are matched on the configured code column, or `code` when none is
/// set. Suppression and rounding follow the redaction settings and the
/// table lists at most `top_codes_rows` codes before the "Other" row.
pub fn build_top_codes(
    counts: &DataFrame,
    codelist: &DataFrame,
    config: &PipelineConfig,
) -> Result<DataFrame> {
    let code_column = config.columns.code.as_deref().unwrap_or(DEFAULT_CODE_COLUMN);
    let top = create_top_codes_table(
        counts,
        CODE_COUNT_COLUMN,
        codelist,
        code_column,
        CODELIST_TERM_COLUMN,
        config.redaction.threshold,
        config.redaction.rounding_base,
        config.top_codes_rows,
    )?;
    Ok(top.published)
}

/// Rate columns present after rate computation
fn rate_columns<'a>(columns: &'a MeasureColumns, config: &PipelineConfig) -> Vec<&'a str> {
    let mut rates = vec![columns.rate.as_str()];
    if config.rates.standardise {
        rates.push(columns.rate_standardised.as_str());
    }
    rates
}

/// The rate that is aggregated and summarised
fn published_value<'a>(columns: &'a MeasureColumns, config: &PipelineConfig) -> &'a str {
    if config.rates.standardise {
        &columns.rate_standardised
    } else {
        &columns.rate
    }
}

fn write_tables(
    measure: &str,
    tables: &MeasureTables,
    config: &PipelineConfig,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let extension = config.output_format.extension();
    let mut pending: Vec<(PathBuf, &DataFrame)> = vec![
        (output_dir.join(format!("{measure}_rates.{extension}")), &tables.rates),
        (output_dir.join(format!("{measure}_aggregated.{extension}")), &tables.aggregated),
        (output_dir.join(format!("{measure}_events.{extension}")), &tables.events),
    ];
    if let Some(deciles) = &tables.deciles {
        pending.push((output_dir.join(format!("{measure}_deciles.{extension}")), deciles));
    }
    if let Some(top_codes) = &tables.top_codes {
        pending.push((output_dir.join(format!("{measure}_top_codes.{extension}")), top_codes));
    }

    let mut written = Vec::with_capacity(pending.len());
    for (path, df) in pending {
        match write_table(df, &path, config.output_format) {
            Ok(path) => written.push(path),
            Err(e) => {
                for path in &written {
                    let _ = fs::remove_file(path);
                }
                return Err(e);
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateConfig, RedactionConfig};
    use crate::table::{float_values, string_values};
    use tempfile::TempDir;

    fn count_table() -> DataFrame {
        df!(
            "practice" => [1i64, 2, 3, 4, 1, 2, 3, 4],
            "date" => [
                "2020-01-01", "2020-01-01", "2020-01-01", "2020-01-01",
                "2020-02-01", "2020-02-01", "2020-02-01", "2020-02-01",
            ],
            "numerator" => [2i64, 30, 40, 50, 0, 35, 45, 55],
            "population" => [100i64, 1000, 1000, 1000, 100, 1000, 1000, 1000],
        )
        .unwrap()
    }

    #[test]
    fn test_suppressed_rows_have_null_rates() {
        let config = PipelineConfig::default()
            .with_redaction(RedactionConfig::default().with_threshold(5));
        let tables = build_tables("alt", &count_table(), &config, None).unwrap();

        let numerators = float_values(&tables.rates, "numerator").unwrap();
        let rates = float_values(&tables.rates, "rate").unwrap();
        for (numerator, rate) in numerators.iter().zip(&rates) {
            if numerator.is_none() {
                assert!(rate.is_none());
            }
        }
        // January: 2 is suppressed together with 30
        assert_eq!(numerators[0], None);
        assert_eq!(numerators[1], None);
        assert_eq!(rates[2], Some(40.0));
        assert_eq!(tables.report.suppressed_numerators, 2);
    }

    #[test]
    fn test_rate_then_suppress_nulls_precomputed_rates() {
        let config = PipelineConfig::default()
            .with_redaction(RedactionConfig::default().with_threshold(5))
            .with_order(PipelineOrder::RateThenSuppress);
        let tables = build_tables("alt", &count_table(), &config, None).unwrap();

        let rates = float_values(&tables.rates, "rate").unwrap();
        assert_eq!(rates[0], None);
        assert_eq!(rates[1], None);
        assert_eq!(tables.report.nulled_rates, 2);
    }

    #[test]
    fn test_counts_rounded_after_suppression() {
        let config = PipelineConfig::default().with_redaction(
            RedactionConfig::default()
                .with_threshold(5)
                .with_rounding_base(10)
                .with_rounded_counts(),
        );
        let tables = build_tables("alt", &count_table(), &config, None).unwrap();

        let numerators = float_values(&tables.rates, "numerator").unwrap();
        assert_eq!(numerators[2], Some(40.0));
        assert_eq!(numerators[3], Some(50.0));
        assert_eq!(numerators[5], Some(40.0));
        // Rates are computed from the unrounded surviving counts
        let rates = float_values(&tables.rates, "rate").unwrap();
        assert_eq!(rates[5], Some(35.0));
    }

    #[test]
    fn test_aggregate_and_deciles_produced() {
        let config = PipelineConfig::default()
            .with_redaction(RedactionConfig::default().with_threshold(5))
            .keep_irrelevant_practices();
        let tables = build_tables("alt", &count_table(), &config, None).unwrap();

        assert_eq!(tables.aggregated.height(), 2);
        let means = float_values(&tables.aggregated, "rate").unwrap();
        // January: mean(40, 50) over surviving practices
        assert_eq!(means[0], Some(45.0));

        let deciles = tables.deciles.unwrap();
        assert_eq!(deciles.height(), 18);
        assert_eq!(tables.events.height(), 2);
    }

    #[test]
    fn test_standardised_measure() {
        let df = df!(
            "practice" => [1i64, 1, 2, 2],
            "date" => ["2020-01-01", "2020-01-01", "2020-01-01", "2020-01-01"],
            "age_band" => ["0-19", "20+", "0-19", "20+"],
            "numerator" => [20i64, 60, 40, 90],
            "population" => [1000i64, 1000, 1000, 1000],
        )
        .unwrap();

        let population =
            StandardPopulation::from_coarse_bands([("0-19", 1.0), ("20+", 1.0)]).unwrap();
        let config = PipelineConfig::default()
            .with_redaction(RedactionConfig::default().with_threshold(5))
            .with_rates(RateConfig::default().with_standardisation("esp.csv"));

        let tables = build_tables("bp", &df, &config, Some(&population)).unwrap();
        let standardised = float_values(&tables.aggregated, "rate_standardised").unwrap();
        // Practice 1: 10 + 30 = 40, practice 2: 20 + 45 = 65
        assert_eq!(standardised, vec![Some(52.5)]);
    }

    #[test]
    fn test_custom_date_column_is_the_default_unit() {
        let df = df!(
            "practice" => [1i64, 2, 3, 4, 1, 2, 3, 4],
            "week" => [
                "2020-01-06", "2020-01-06", "2020-01-06", "2020-01-06",
                "2020-01-13", "2020-01-13", "2020-01-13", "2020-01-13",
            ],
            "numerator" => [5i64, 40, 50, 60, 45, 55, 65, 75],
            "population" => [1000i64, 1000, 1000, 1000, 1000, 1000, 1000, 1000],
        )
        .unwrap();

        let config =
            PipelineConfig::default().with_columns(MeasureColumns::default().with_date("week"));
        let tables = build_tables("bp", &df, &config, None).unwrap();

        assert_eq!(tables.report.units, 2);
        let numerators = float_values(&tables.rates, "numerator").unwrap();
        assert_eq!(&numerators[..4], &[None, None, Some(50.0), Some(60.0)]);
        assert_eq!(tables.aggregated.height(), 2);
        assert!(tables.top_codes.is_none());
    }

    #[test]
    fn test_top_codes_use_configured_code_column() {
        let counts = df!(
            "snomed_code" => ["271649006", "72313002", "163030003", "198081000000101"],
            "num" => [500i64, 300, 8, 7],
        )
        .unwrap();
        let codelist = df!(
            "snomed_code" => ["271649006", "72313002", "163030003", "198081000000101"],
            "term" => [
                "Systolic blood pressure",
                "Systolic arterial pressure",
                "On examination - systolic BP reading",
                "Ambulatory systolic blood pressure",
            ],
        )
        .unwrap();

        let config = PipelineConfig::default()
            .with_columns(MeasureColumns::default().with_code("snomed_code"));
        let top = build_top_codes(&counts, &codelist, &config).unwrap();

        assert_eq!(
            string_values(&top, "Code").unwrap(),
            vec![
                Some("271649006".to_string()),
                Some("72313002".to_string()),
                Some("Other".to_string())
            ]
        );
        assert_eq!(
            string_values(&top, "Description").unwrap()[1].as_deref(),
            Some("Systolic arterial pressure")
        );
    }

    #[test]
    fn test_top_codes_absent_without_code_counts() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("measure_alt.csv");
        let input = MeasureInput::new("alt", path);

        let top = read_top_codes(&input, &PipelineConfig::default()).unwrap();
        assert!(top.is_none());
    }

    #[test]
    fn test_code_counts_require_codelist() {
        let temp_dir = TempDir::new().unwrap();
        let counts = temp_dir.path().join("counts_per_code_alt.csv");
        std::fs::write(&counts, "code,num\nA,50\n").unwrap();

        let mut input = MeasureInput::new("alt", temp_dir.path().join("measure_alt.csv"));
        input.code_counts = Some(counts);

        match read_top_codes(&input, &PipelineConfig::default()).unwrap_err() {
            MeasureError::InputNotFound { path } => {
                assert_eq!(path, temp_dir.path().join("codelist_alt.csv"));
            }
            other => panic!("Expected InputNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_names_measure_and_stage() {
        let df = df!(
            "practice" => [1i64, 1],
            "date" => ["2020-01-01", "2020-01-01"],
            "numerator" => [1i64, 2],
            "population" => [10i64, 10],
        )
        .unwrap();

        let err = build_tables("copd", &df, &PipelineConfig::default(), None).unwrap_err();
        match err {
            MeasureError::MeasureFailed { measure, unit, source } => {
                assert_eq!(measure, "copd");
                assert_eq!(unit, "validate");
                assert!(matches!(*source, MeasureError::DuplicateGroupKey { .. }));
            }
            other => panic!("Expected MeasureFailed, got {other:?}"),
        }
    }
}
