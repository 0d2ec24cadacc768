//! Top code tables.
//!
//! Event counts per clinical code are published with the same suppression
//! guarantee as count tables. Suppressed codes are folded into a synthetic
//! "Other" row when that row is itself safe to publish.

use super::suppress::{round_values, suppress_values};
use crate::constants::{
    HIGH_PROPORTION_LABEL, LOW_PROPORTION_LABEL, OTHER_CODE, OTHER_DESCRIPTION, columns,
};
use crate::error::Result;
use crate::models::ZeroTotalPolicy;
use crate::rates::round_2dp;
use crate::table::{float_values, string_values};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Published top codes, with and without event counts
#[derive(Debug, Clone)]
pub struct TopCodes {
    /// `Code`, `Description`, `Proportion of codes (%)` (labels as text)
    pub published: DataFrame,
    /// `Code`, `Description`, `Events`, `Proportion of codes (%)`
    pub with_counts: DataFrame,
}

/// Codes and counts after low-value grouping
#[derive(Debug, Clone, PartialEq)]
struct GroupedCodes {
    codes: Vec<String>,
    counts: Vec<f64>,
    other: Option<f64>,
}

/// Suppress low code counts and fold them into an "Other" row
///
/// Codes whose count is suppressed, or zero, are removed. The "Other" row
/// carries the suppressed total and is appended only when that total is
/// strictly above `threshold`; otherwise the suppressed codes are dropped
/// without trace. Output columns are `code_column` (String) and
/// `count_column` (Float64), in input order.
pub fn group_low_values(
    df: &DataFrame,
    count_column: &str,
    code_column: &str,
    threshold: u32,
) -> Result<DataFrame> {
    let codes = string_values(df, code_column)?;
    let counts = float_values(df, count_column)?;

    let grouped = group_codes(codes, counts, threshold);
    grouped_frame(&grouped, code_column, count_column)
}

fn group_codes(codes: Vec<Option<String>>, counts: Vec<Option<f64>>, threshold: u32) -> GroupedCodes {
    let suppression = suppress_values(&counts, threshold, ZeroTotalPolicy::KeepZeros);

    let mut grouped = GroupedCodes {
        codes: Vec::new(),
        counts: Vec::new(),
        other: None,
    };

    for (code, count) in codes.into_iter().zip(suppression.values) {
        match (code, count) {
            (Some(code), Some(count)) if count > 0.0 => {
                grouped.codes.push(code);
                grouped.counts.push(count);
            }
            _ => {}
        }
    }

    if suppression.suppressed_total > f64::from(threshold) {
        grouped.other = Some(suppression.suppressed_total);
    } else if suppression.suppressed_count > 0 {
        debug!(
            "Dropped {} suppressed codes without an Other row",
            suppression.suppressed_count
        );
    }

    grouped
}

fn grouped_frame(grouped: &GroupedCodes, code_column: &str, count_column: &str) -> Result<DataFrame> {
    let mut codes = grouped.codes.clone();
    let mut counts = grouped.counts.clone();
    if let Some(other) = grouped.other {
        codes.push(OTHER_CODE.to_string());
        counts.push(other);
    }

    let df = DataFrame::new(vec![
        Column::new(code_column.into(), codes),
        Column::new(count_column.into(), counts),
    ])?;
    Ok(df)
}

/// Build the top codes table for one measure
///
/// `counts` holds event counts per code (repeated codes are summed).
/// `codelist` maps `code_column` to a human-readable `term_column`. Counts
/// are suppressed, grouped and rounded before proportions are taken over
/// the rounded total. The first `nrows` codes by count are kept, followed
/// by the "Other" row when one is emitted.
#[allow(clippy::too_many_arguments)]
pub fn create_top_codes_table(
    counts: &DataFrame,
    count_column: &str,
    codelist: &DataFrame,
    code_column: &str,
    term_column: &str,
    threshold: u32,
    rounding_base: u32,
    nrows: usize,
) -> Result<TopCodes> {
    let (codes, totals) = sum_by_code(counts, code_column, count_column)?;
    let descriptions = code_descriptions(codelist, code_column, term_column)?;

    let mut order: Vec<usize> = (0..codes.len()).collect();
    // Stable sort keeps input order between equal counts
    order.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]));

    let sorted_codes = order.iter().map(|&i| Some(codes[i].clone())).collect();
    let sorted_counts = order.iter().map(|&i| Some(totals[i])).collect();
    let grouped = group_codes(sorted_codes, sorted_counts, threshold);

    let mut rows: Vec<(String, String, f64)> = grouped
        .codes
        .iter()
        .zip(&grouped.counts)
        .map(|(code, count)| {
            let description = descriptions.get(code).cloned().unwrap_or_default();
            (code.clone(), description, *count)
        })
        .collect();
    rows.truncate(nrows);
    if let Some(other) = grouped.other {
        rows.push((OTHER_CODE.to_string(), OTHER_DESCRIPTION.to_string(), other));
    }

    // Shares of the rounded total over every surviving code
    let rounded: Vec<f64> = rows
        .iter()
        .map(|(_, _, count)| round_values(Some(*count), rounding_base).unwrap_or_default())
        .collect();
    let total: f64 = grouped
        .counts
        .iter()
        .chain(grouped.other.iter())
        .map(|count| round_values(Some(*count), rounding_base).unwrap_or_default())
        .sum();

    let proportions: Vec<Option<f64>> = rounded
        .iter()
        .map(|count| (total > 0.0).then(|| round_2dp(count / total * 100.0)))
        .collect();

    let labels: Vec<Option<String>> = proportions
        .iter()
        .map(|proportion| proportion.map(|p| proportion_label(p, rows.len())))
        .collect();

    let codes: Vec<String> = rows.iter().map(|(code, _, _)| code.clone()).collect();
    let descriptions: Vec<String> = rows.iter().map(|(_, desc, _)| desc.clone()).collect();

    let published = DataFrame::new(vec![
        Column::new(columns::CODE.into(), codes.clone()),
        Column::new(columns::DESCRIPTION.into(), descriptions.clone()),
        Column::new(columns::PROPORTION.into(), labels),
    ])?;

    let with_counts = DataFrame::new(vec![
        Column::new(columns::CODE.into(), codes),
        Column::new(columns::DESCRIPTION.into(), descriptions),
        Column::new(columns::EVENTS.into(), rounded),
        Column::new(columns::PROPORTION.into(), proportions),
    ])?;

    debug!(
        "Top codes table: {} rows, rounded total {}",
        published.height(),
        total
    );

    Ok(TopCodes {
        published,
        with_counts,
    })
}

/// Proportion as published text, snapping 0 and 100 to boundary labels
fn proportion_label(proportion: f64, rows: usize) -> String {
    if rows > 1 && proportion == 0.0 {
        LOW_PROPORTION_LABEL.to_string()
    } else if rows > 1 && proportion == 100.0 {
        HIGH_PROPORTION_LABEL.to_string()
    } else {
        format!("{proportion}")
    }
}

/// Sum counts per code in order of first appearance; null codes are skipped
fn sum_by_code(df: &DataFrame, code_column: &str, count_column: &str) -> Result<(Vec<String>, Vec<f64>)> {
    let codes = string_values(df, code_column)?;
    let counts = float_values(df, count_column)?;

    let mut position: HashMap<String, usize> = HashMap::new();
    let mut out_codes = Vec::new();
    let mut out_counts = Vec::new();

    for (code, count) in codes.into_iter().zip(counts) {
        let Some(code) = code else { continue };
        let count = count.unwrap_or_default();
        match position.get(&code) {
            Some(&idx) => out_counts[idx] += count,
            None => {
                position.insert(code.clone(), out_codes.len());
                out_codes.push(code);
                out_counts.push(count);
            }
        }
    }

    Ok((out_codes, out_counts))
}

fn code_descriptions(
    codelist: &DataFrame,
    code_column: &str,
    term_column: &str,
) -> Result<HashMap<String, String>> {
    let codes = string_values(codelist, code_column)?;
    let terms = string_values(codelist, term_column)?;

    Ok(codes
        .into_iter()
        .zip(terms)
        .filter_map(|(code, term)| Some((code?, term?)))
        .collect())
}
