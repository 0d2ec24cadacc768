//! Table-level redaction.
//!
//! Applies unit suppression to the numerator and denominator columns of a
//! count table, one suppression unit at a time, and nulls out every derived
//! rate whose inputs were suppressed. All functions return a new table; the
//! input is never modified.

use super::suppress::{round_values, suppress_values};
use crate::config::RedactionConfig;
use crate::error::Result;
use crate::models::MeasureColumns;
use crate::table::{
    describe_key, float_values, group_rows, require_column, row_keys, set_float_column,
};
use polars::prelude::*;
use tracing::debug;

/// Counts of what a redaction pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionReport {
    pub units: usize,
    pub suppressed_numerators: usize,
    pub suppressed_denominators: usize,
    pub nulled_rates: usize,
}

/// A redacted table together with its report
#[derive(Debug, Clone)]
pub struct Redacted {
    pub table: DataFrame,
    pub report: RedactionReport,
}

/// Suppress small numerators and denominators per suppression unit
///
/// Units are formed from `config.scope` over the table's `columns`. After
/// suppression every column in `rate_columns` is nulled on rows whose
/// numerator or denominator is null, including rates that were computed
/// before suppression.
pub fn redact_small_numbers(
    df: &DataFrame,
    columns: &MeasureColumns,
    rate_columns: &[&str],
    config: &RedactionConfig,
) -> Result<Redacted> {
    let numerator = columns.numerator.as_str();
    let denominator = columns.denominator.as_str();
    require_column(df, numerator)?;
    require_column(df, denominator)?;

    let unit_columns = config.scope.key_columns(columns);
    let keys = row_keys(df, &unit_columns)?;
    let groups = group_rows(&keys);

    let mut table = df.clone();
    let mut report = RedactionReport {
        units: groups.len(),
        ..Default::default()
    };

    for (column, counter) in [
        (numerator, &mut report.suppressed_numerators),
        (denominator, &mut report.suppressed_denominators),
    ] {
        let mut values = float_values(df, column)?;

        for (unit, rows) in &groups {
            let unit_values: Vec<Option<f64>> = rows.iter().map(|&row| values[row]).collect();
            let suppression = suppress_values(&unit_values, config.threshold, config.zero_policy);

            if suppression.suppressed_count > 0 {
                debug!(
                    "Suppressed {} of {} '{}' values in unit [{}]",
                    suppression.suppressed_count,
                    rows.len(),
                    column,
                    describe_key(&unit_columns, unit)
                );
            }

            *counter += suppression.suppressed_count;
            for (&row, value) in rows.iter().zip(suppression.values) {
                values[row] = value;
            }
        }

        set_float_column(&mut table, column, values)?;
    }

    let (table, nulled_rates) = null_out_rates(&table, numerator, denominator, rate_columns)?;
    report.nulled_rates = nulled_rates;

    Ok(Redacted { table, report })
}

/// Null every rate on rows where the numerator or denominator is null
///
/// Returns the new table and the number of rate values that were nulled.
pub fn null_out_rates(
    df: &DataFrame,
    numerator: &str,
    denominator: &str,
    rate_columns: &[&str],
) -> Result<(DataFrame, usize)> {
    if rate_columns.is_empty() {
        return Ok((df.clone(), 0));
    }

    let numerators = float_values(df, numerator)?;
    let denominators = float_values(df, denominator)?;
    let suppressed: Vec<bool> = numerators
        .iter()
        .zip(&denominators)
        .map(|(n, d)| n.is_none() || d.is_none())
        .collect();

    let mut table = df.clone();
    let mut nulled = 0;

    for &rate_column in rate_columns {
        let mut rates = float_values(df, rate_column)?;
        for (rate, &is_suppressed) in rates.iter_mut().zip(&suppressed) {
            if is_suppressed && rate.is_some() {
                *rate = None;
                nulled += 1;
            }
        }
        set_float_column(&mut table, rate_column, rates)?;
    }

    Ok((table, nulled))
}

/// Round every value of a column to a multiple of `base`, nulls preserved
///
/// Rounding is a second disclosure-control layer and runs only on counts
/// that already went through suppression.
pub fn round_column(df: &DataFrame, column: &str, base: u32) -> Result<DataFrame> {
    let values = float_values(df, column)?
        .into_iter()
        .map(|v| round_values(v, base))
        .collect();

    let mut table = df.clone();
    set_float_column(&mut table, column, values)?;
    Ok(table)
}
