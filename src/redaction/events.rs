//! Event summary tables.

use super::suppress::round_values;
use crate::constants::{columns, event_labels};
use crate::error::Result;
use crate::table::{float_values, string_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Headline event counts of one measure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub total_events: f64,
    pub events_in_latest_period: f64,
    /// Only known when supplied by the extraction layer
    pub unique_patients: Option<f64>,
}

impl EventSummary {
    /// Totals over a count table
    ///
    /// The latest period is the greatest value of `date_column`; ISO dates
    /// order correctly as text. Null counts contribute nothing.
    pub fn from_counts(df: &DataFrame, numerator: &str, date_column: &str) -> Result<Self> {
        let counts = float_values(df, numerator)?;
        let dates = string_values(df, date_column)?;

        let latest = dates.iter().flatten().max().cloned();

        let mut summary = Self::default();
        for (count, date) in counts.iter().zip(&dates) {
            let count = count.unwrap_or_default();
            summary.total_events += count;
            if date.is_some() && *date == latest {
                summary.events_in_latest_period += count;
            }
        }
        Ok(summary)
    }

    pub fn with_unique_patients(mut self, unique_patients: f64) -> Self {
        self.unique_patients = Some(unique_patients);
        self
    }

    fn rows(&self) -> Vec<(&'static str, f64)> {
        let mut rows = vec![
            (event_labels::TOTAL_EVENTS, self.total_events),
            (event_labels::EVENTS_IN_LATEST_PERIOD, self.events_in_latest_period),
        ];
        if let Some(unique_patients) = self.unique_patients {
            rows.push((event_labels::UNIQUE_PATIENTS, unique_patients));
        }
        rows
    }
}

/// Publishable `label`/`count` table of an event summary
///
/// Counts at or below `threshold` are replaced by the text `<=N`; the rest
/// are rounded to `rounding_base`.
pub fn redact_events_table(
    summary: &EventSummary,
    threshold: u32,
    rounding_base: u32,
) -> Result<DataFrame> {
    let (labels, counts): (Vec<&str>, Vec<String>) = summary
        .rows()
        .into_iter()
        .map(|(label, count)| (label, redact_event_count(count, threshold, rounding_base)))
        .unzip();

    let df = DataFrame::new(vec![
        Column::new(columns::LABEL.into(), labels),
        Column::new(columns::COUNT.into(), counts),
    ])?;
    Ok(df)
}

fn redact_event_count(count: f64, threshold: u32, rounding_base: u32) -> String {
    if count <= f64::from(threshold) {
        return format!("<={threshold}");
    }
    let rounded = round_values(Some(count), rounding_base).unwrap_or(count);
    format!("{rounded:.0}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_from_counts() {
        let df = df!(
            "date" => ["2020-01-01", "2020-02-01", "2020-02-01", "2020-01-01"],
            "numerator" => [Some(10.0), Some(4.0), None, Some(7.0)],
        )
        .unwrap();

        let summary = EventSummary::from_counts(&df, "numerator", "date").unwrap();
        assert_eq!(summary.total_events, 21.0);
        assert_eq!(summary.events_in_latest_period, 4.0);
        assert_eq!(summary.unique_patients, None);
    }

    #[test]
    fn test_redact_events_table() {
        let summary = EventSummary {
            total_events: 1234.0,
            events_in_latest_period: 7.0,
            unique_patients: Some(456.0),
        };

        let table = redact_events_table(&summary, 10, 10).unwrap();
        let counts = string_values(&table, columns::COUNT).unwrap();
        assert_eq!(
            counts,
            vec![
                Some("1230".to_string()),
                Some("<=10".to_string()),
                Some("460".to_string())
            ]
        );

        let labels = string_values(&table, columns::LABEL).unwrap();
        assert_eq!(labels[1].as_deref(), Some(event_labels::EVENTS_IN_LATEST_PERIOD));
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(redact_event_count(5.0, 5, 5), "<=5");
        assert_eq!(redact_event_count(6.0, 5, 5), "5");
        assert_eq!(redact_event_count(0.0, 5, 5), "<=5");
    }

    #[test]
    fn test_unique_patients_row_is_optional() {
        let summary = EventSummary {
            total_events: 100.0,
            events_in_latest_period: 50.0,
            unique_patients: None,
        };
        let table = redact_events_table(&summary, 5, 5).unwrap();
        assert_eq!(table.height(), 2);
    }
}
