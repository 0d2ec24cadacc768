//! Two-stage aggregation to the published granularity.
//!
//! Stage one collapses each practice's rows (age bands, codes) within a
//! (category, date) cell. Stage two combines practices within the cell. The
//! two stages are not interchangeable with one flat aggregation.

use crate::config::AggregationConfig;
use crate::error::Result;
use crate::models::{AggregateFn, MeasureColumns};
use crate::table::require_column;
use polars::prelude::*;
use tracing::debug;

/// Aggregate `value` per (category, date) in two stages
///
/// A practice whose stage-one sum covers a null row is itself null, since a
/// partial sum of a suppressed table is not a rate. Stage two skips null
/// practices; a cell where every practice is null stays null. Output is
/// sorted by category then date.
pub fn aggregate_rates(
    df: &DataFrame,
    columns: &MeasureColumns,
    value: &str,
    config: &AggregationConfig,
) -> Result<DataFrame> {
    let cell = cell_keys(df, columns)?;

    let aggregated = practice_frame(df, columns, value, config.within)?
        .group_by_stable(cell.clone())
        .agg([across_practices(config.across, value)])
        .sort_by_exprs(cell, SortMultipleOptions::default())
        .collect()?;

    debug!(
        "Aggregated '{}' ({:?} within practice, {:?} across practices): {} rows -> {} cells",
        value,
        config.within,
        config.across,
        df.height(),
        aggregated.height()
    );

    Ok(aggregated)
}

/// Stage one only: one `value` per (category, date, practice)
pub fn practice_rates(
    df: &DataFrame,
    columns: &MeasureColumns,
    value: &str,
    within: AggregateFn,
) -> Result<DataFrame> {
    let mut keys = cell_keys(df, columns)?;
    keys.push(col(columns.practice.as_str()));

    let practices = practice_frame(df, columns, value, within)?
        .sort_by_exprs(keys, SortMultipleOptions::default())
        .collect()?;
    Ok(practices)
}

/// Category (if any) and date key expressions, columns checked
fn cell_keys(df: &DataFrame, columns: &MeasureColumns) -> Result<Vec<Expr>> {
    require_column(df, &columns.practice)?;
    require_column(df, &columns.date)?;

    let mut keys = Vec::new();
    if let Some(category) = columns.category.as_deref() {
        require_column(df, category)?;
        keys.push(col(category));
    }
    keys.push(col(columns.date.as_str()));
    Ok(keys)
}

fn practice_frame(
    df: &DataFrame,
    columns: &MeasureColumns,
    value: &str,
    within: AggregateFn,
) -> Result<LazyFrame> {
    require_column(df, value)?;
    let mut keys = cell_keys(df, columns)?;
    keys.push(col(columns.practice.as_str()));

    Ok(df
        .clone()
        .lazy()
        .with_column(col(value).cast(DataType::Float64))
        .group_by_stable(keys)
        .agg([within_practice(within, value)]))
}

fn within_practice(function: AggregateFn, value: &str) -> Expr {
    match function {
        AggregateFn::Sum => when(col(value).null_count().gt(lit(0)))
            .then(lit(NULL).cast(DataType::Float64))
            .otherwise(col(value).sum())
            .alias(value),
        AggregateFn::Mean => col(value).mean().alias(value),
        AggregateFn::Median => col(value).median().alias(value),
    }
}

fn across_practices(function: AggregateFn, value: &str) -> Expr {
    match function {
        // A sum over practices with no surviving value is null, not zero
        AggregateFn::Sum => when(col(value).count().gt(lit(0)))
            .then(col(value).sum())
            .otherwise(lit(NULL).cast(DataType::Float64))
            .alias(value),
        AggregateFn::Mean => col(value).mean().alias(value),
        AggregateFn::Median => col(value).median().alias(value),
    }
}
