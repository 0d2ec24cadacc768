//! Count table access and validation.
//!
//! Count tables are polars `DataFrame`s keyed by grouping columns and
//! carrying a numerator and a denominator count. The helpers here extract
//! columns as plain vectors so the suppression and rate logic can run as
//! pure functions, and write results back as new columns.

use crate::error::{MeasureError, Result};
use crate::models::MeasureColumns;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Fail with `MissingColumn` unless `column` exists in `df`
pub fn require_column(df: &DataFrame, column: &str) -> Result<()> {
    if df.get_column_index(column).is_none() {
        return Err(MeasureError::MissingColumn {
            column: column.to_string(),
        });
    }
    Ok(())
}

/// Read a numeric column as `f64` values, nulls preserved
pub fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    require_column(df, column)?;
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Read any column rendered as strings, nulls preserved
pub fn string_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    require_column(df, column)?;
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}

/// Replace (or add) a `Float64` column
pub fn set_float_column(df: &mut DataFrame, column: &str, values: Vec<Option<f64>>) -> Result<()> {
    let series = Series::new(column.into(), values);
    df.with_column(series)?;
    Ok(())
}

/// Key values of one row, one entry per key column
pub type RowKey = Vec<String>;

/// Key of every row over `columns`, values in column order
///
/// An empty column list puts every row in the same unit. A null key value is
/// a data-quality error.
pub fn row_keys(df: &DataFrame, columns: &[String]) -> Result<Vec<RowKey>> {
    let mut keys = vec![Vec::with_capacity(columns.len()); df.height()];
    for column in columns {
        let values = string_values(df, column)?;
        for (row, value) in values.into_iter().enumerate() {
            let value = value.ok_or_else(|| MeasureError::MissingGroupKey {
                column: column.clone(),
                row,
            })?;
            keys[row].push(value);
        }
    }
    Ok(keys)
}

/// Readable form of a key, e.g. `date=2020-01-01, sex=F`
pub fn describe_key(columns: &[String], key: &[String]) -> String {
    columns
        .iter()
        .zip(key)
        .map(|(column, value)| format!("{column}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Group row indices by key, in order of first appearance
pub fn group_rows(keys: &[RowKey]) -> Vec<(RowKey, Vec<usize>)> {
    let mut position: HashMap<&[String], usize> = HashMap::new();
    let mut groups: Vec<(RowKey, Vec<usize>)> = Vec::new();

    for (row, key) in keys.iter().enumerate() {
        match position.get(key.as_slice()) {
            Some(&idx) => groups[idx].1.push(row),
            None => {
                position.insert(key.as_slice(), groups.len());
                groups.push((key.clone(), vec![row]));
            }
        }
    }

    groups
}

/// Check the count table invariants before any processing
///
/// Required columns must exist, key values must be non-null and unique per
/// row, and counts must be non-negative.
pub fn validate_count_table(df: &DataFrame, columns: &MeasureColumns) -> Result<()> {
    let key_columns = columns.key_columns();

    for column in key_columns.iter().map(String::as_str).chain(columns.count_columns()) {
        require_column(df, column)?;
    }

    for column in columns.count_columns() {
        for (row, value) in float_values(df, column)?.into_iter().enumerate() {
            if let Some(value) = value {
                if !value.is_finite() {
                    return Err(MeasureError::NonFiniteCount {
                        column: column.to_string(),
                        row,
                    });
                }
                if value < 0.0 {
                    return Err(MeasureError::NegativeCount {
                        column: column.to_string(),
                        row,
                        value,
                    });
                }
            }
        }
    }

    let keys = row_keys(df, &key_columns)?;
    let mut seen = HashSet::with_capacity(keys.len());
    for key in &keys {
        if !seen.insert(key.as_slice()) {
            return Err(MeasureError::DuplicateGroupKey {
                key: describe_key(&key_columns, key),
            });
        }
    }

    debug!(
        "Validated count table: {} rows, keys {:?}",
        df.height(),
        key_columns
    );
    Ok(())
}

/// Number of nulls in a column
pub fn null_count(df: &DataFrame, column: &str) -> Result<usize> {
    require_column(df, column)?;
    Ok(df.column(column)?.null_count())
}
