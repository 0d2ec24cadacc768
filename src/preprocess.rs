//! Count table preparation ahead of redaction.

use crate::constants::WEEKS_PER_PERIOD;
use crate::error::{MeasureError, Result};
use crate::models::MeasureColumns;
use crate::table::{float_values, string_values};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Drop practices that never record an event
///
/// A practice is kept when its numerator is positive in at least one row.
pub fn drop_irrelevant_practices(df: &DataFrame, columns: &MeasureColumns) -> Result<DataFrame> {
    let practices = string_values(df, &columns.practice)?;
    let numerators = float_values(df, &columns.numerator)?;

    let relevant: HashSet<&str> = practices
        .iter()
        .zip(&numerators)
        .filter(|(_, n)| n.is_some_and(|n| n > 0.0))
        .filter_map(|(p, _)| p.as_deref())
        .collect();

    let mask: BooleanChunked = practices
        .iter()
        .map(|p| Some(p.as_deref().is_some_and(|p| relevant.contains(p))))
        .collect();

    let filtered = df.filter(&mask)?;
    if filtered.height() < df.height() {
        let total: HashSet<&str> = practices.iter().filter_map(|p| p.as_deref()).collect();
        info!(
            "Dropped {} of {} practices with no events",
            total.len() - relevant.len(),
            total.len()
        );
    }
    Ok(filtered)
}

/// Collapse weekly practice counts into 4-weekly periods
///
/// When the number of distinct weeks is not a multiple of four, the earliest
/// weeks are dropped. Each block is labelled with the first week of the next
/// block; the last block with its last week plus seven days. Numerators are
/// summed per (practice, period); other columns are not carried over.
pub fn convert_weekly_to_monthly(df: &DataFrame, columns: &MeasureColumns) -> Result<DataFrame> {
    let raw_dates = string_values(df, &columns.date)?;

    let mut parsed = Vec::with_capacity(raw_dates.len());
    for (row, value) in raw_dates.iter().enumerate() {
        let value = value.as_deref().ok_or_else(|| MeasureError::MissingGroupKey {
            column: columns.date.clone(),
            row,
        })?;
        let date = parse_date(value).ok_or_else(|| MeasureError::InvalidDate {
            column: columns.date.clone(),
            row,
            value: value.to_string(),
        })?;
        parsed.push(date);
    }

    let weeks: Vec<NaiveDate> = parsed.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let dropped = weeks.len() % WEEKS_PER_PERIOD;
    let labels = period_labels(&weeks[dropped..]);

    if dropped > 0 {
        debug!("Dropping {} earliest weeks to align 4-week periods", dropped);
    }

    let period: Vec<Option<String>> = parsed
        .iter()
        .map(|date| labels.get(date).map(|d| d.format(DATE_FORMAT).to_string()))
        .collect();

    let keep: BooleanChunked = period.iter().map(|p| Some(p.is_some())).collect();
    let mut table = df.filter(&keep)?;
    let period: Vec<String> = period.into_iter().flatten().collect();
    table.with_column(Series::new(columns.date.as_str().into(), period))?;

    let practice = columns.practice.as_str();
    let date = columns.date.as_str();
    let numerator = columns.numerator.as_str();

    let monthly = table
        .lazy()
        .group_by_stable([col(practice), col(date)])
        .agg([col(numerator).sum()])
        .sort_by_exprs(
            [col(date), col(practice)],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    info!(
        "Converted {} weekly rows into {} rows over {} periods",
        df.height(),
        monthly.height(),
        labels.values().collect::<BTreeSet<_>>().len()
    );
    Ok(monthly)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    // Timestamps written by other tools carry a time part after the date
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

/// Label of every week, weeks sorted and a multiple of four long
fn period_labels(weeks: &[NaiveDate]) -> HashMap<NaiveDate, NaiveDate> {
    let mut labels = HashMap::with_capacity(weeks.len());
    for (block, chunk) in weeks.chunks(WEEKS_PER_PERIOD).enumerate() {
        let label = match weeks.get((block + 1) * WEEKS_PER_PERIOD) {
            Some(next_start) => *next_start,
            None => chunk[chunk.len() - 1] + Duration::weeks(1),
        };
        for week in chunk {
            labels.insert(*week, label);
        }
    }
    labels
}
