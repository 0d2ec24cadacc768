//! Percentile summaries of practice-level rates per period.

use crate::constants::columns;
use crate::error::{MeasureError, Result};
use crate::table::{float_values, string_values};
use polars::prelude::*;
use std::collections::BTreeMap;

/// Deciles 10..=90
const DECILES: [u32; 9] = [10, 20, 30, 40, 50, 60, 70, 80, 90];

/// Quantile of sorted values, linear interpolation between order statistics
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Non-null values per period, each sorted ascending, periods in order
fn values_by_period(df: &DataFrame, period: &str, value: &str) -> Result<BTreeMap<String, Vec<f64>>> {
    let periods = string_values(df, period)?;
    let values = float_values(df, value)?;

    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (row, (p, v)) in periods.into_iter().zip(values).enumerate() {
        let p = p.ok_or_else(|| MeasureError::MissingGroupKey {
            column: period.to_string(),
            row,
        })?;
        let entry = grouped.entry(p).or_default();
        if let Some(v) = v.filter(|v| !v.is_nan()) {
            entry.push(v);
        }
    }

    for values in grouped.values_mut() {
        values.sort_by(f64::total_cmp);
    }
    Ok(grouped)
}

fn percentiles(outer: bool) -> Vec<u32> {
    if !outer {
        return DECILES.to_vec();
    }
    let mut all: Vec<u32> = (1..10).chain(DECILES).chain(91..100).collect();
    all.sort_unstable();
    all
}

/// Percentiles of `value` per period as a long table
///
/// Columns are the period column, `percentile` and `value`. With `outer`
/// the 1st-9th and 91st-99th percentiles are added to the deciles. A period
/// with no surviving value yields null percentiles.
pub fn compute_deciles(df: &DataFrame, period: &str, value: &str, outer: bool) -> Result<DataFrame> {
    let grouped = values_by_period(df, period, value)?;
    let wanted = percentiles(outer);

    let mut out_periods = Vec::new();
    let mut out_percentiles = Vec::new();
    let mut out_values = Vec::new();

    for (p, values) in &grouped {
        for &percentile in &wanted {
            out_periods.push(p.clone());
            out_percentiles.push(percentile);
            out_values.push(quantile(values, f64::from(percentile) / 100.0));
        }
    }

    let df = DataFrame::new(vec![
        Column::new(period.into(), out_periods),
        Column::new(columns::PERCENTILE.into(), out_percentiles),
        Column::new(columns::VALUE.into(), out_values),
    ])?;
    Ok(df)
}

/// Median of `value` per period
pub fn median_by_period(df: &DataFrame, period: &str, value: &str) -> Result<Vec<(String, Option<f64>)>> {
    Ok(values_by_period(df, period, value)?
        .into_iter()
        .map(|(p, values)| (p, quantile(&values, 0.5)))
        .collect())
}

/// Inter-decile range (90th minus 10th percentile) per period
pub fn idr_by_period(df: &DataFrame, period: &str, value: &str) -> Result<Vec<(String, Option<f64>)>> {
    Ok(values_by_period(df, period, value)?
        .into_iter()
        .map(|(p, values)| {
            let idr = quantile(&values, 0.9).zip(quantile(&values, 0.1)).map(|(hi, lo)| hi - lo);
            (p, idr)
        })
        .collect())
}

/// Percent change of every median after the first, relative to the first
pub fn change_in_median(medians: &[Option<f64>]) -> Vec<Option<f64>> {
    let Some((first, rest)) = medians.split_first() else {
        return Vec::new();
    };
    rest.iter()
        .map(|median| match (first, median) {
            (Some(first), Some(median)) if *first != 0.0 => Some((median / first - 1.0) * 100.0),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.5), Some(2.5));
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert!((quantile(&values, 0.1).unwrap() - 1.3).abs() < 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_deciles_per_period() {
        let df = df!(
            "date" => ["2020-02-01", "2020-01-01", "2020-01-01", "2020-01-01"],
            "rate" => [Some(7.0), Some(0.0), Some(10.0), None],
        )
        .unwrap();

        let deciles = compute_deciles(&df, "date", "rate", false).unwrap();
        assert_eq!(deciles.height(), 18);

        let periods = string_values(&deciles, "date").unwrap();
        assert_eq!(periods[0].as_deref(), Some("2020-01-01"));

        let values = float_values(&deciles, columns::VALUE).unwrap();
        // 0 and 10 interpolate linearly: the 10th percentile is 1
        assert!((values[0].unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(values[9], Some(7.0));
    }

    #[test]
    fn test_outer_percentiles() {
        let df = df!("date" => ["2020-01-01"], "rate" => [1.0]).unwrap();
        let deciles = compute_deciles(&df, "date", "rate", true).unwrap();
        assert_eq!(deciles.height(), 27);

        let percentiles = float_values(&deciles, columns::PERCENTILE).unwrap();
        assert_eq!(percentiles.first(), Some(&Some(1.0)));
        assert_eq!(percentiles.last(), Some(&Some(99.0)));
    }

    #[test]
    fn test_empty_period_has_null_deciles() {
        let df = df!("date" => ["2020-01-01"], "rate" => [None::<f64>]).unwrap();
        let deciles = compute_deciles(&df, "date", "rate", false).unwrap();
        assert_eq!(deciles.column(columns::VALUE).unwrap().null_count(), 9);
    }

    #[test]
    fn test_median_and_idr() {
        let df = df!(
            "date" => vec!["2020-01-01"; 11],
            "rate" => (0..11).map(f64::from).collect::<Vec<_>>(),
        )
        .unwrap();

        let medians = median_by_period(&df, "date", "rate").unwrap();
        assert_eq!(medians, vec![("2020-01-01".to_string(), Some(5.0))]);

        let idr = idr_by_period(&df, "date", "rate").unwrap();
        assert!((idr[0].1.unwrap() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_change_in_median() {
        let changes = change_in_median(&[Some(10.0), Some(5.0), Some(12.0), None]);
        assert_eq!(changes.len(), 3);
        assert!((changes[0].unwrap() + 50.0).abs() < 1e-12);
        assert!((changes[1].unwrap() - 20.0).abs() < 1e-12);
        assert_eq!(changes[2], None);

        assert_eq!(change_in_median(&[Some(0.0), Some(1.0)]), vec![None]);
        assert!(change_in_median(&[]).is_empty());
    }
}
