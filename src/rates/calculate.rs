//! Crude rates from numerator/denominator pairs.

use crate::config::RateConfig;
use crate::error::Result;
use crate::table::{float_values, set_float_column};
use polars::prelude::*;
use tracing::debug;

/// Events per `rate_per` of the population
///
/// A zero denominator, or a null on either side, gives `None`; a zero
/// population is a legitimate state and never an error.
pub fn calculate_rate(
    numerator: Option<f64>,
    denominator: Option<f64>,
    rate_per: f64,
    round_rate: bool,
) -> Option<f64> {
    let (numerator, denominator) = (numerator?, denominator?);
    if denominator == 0.0 {
        return None;
    }

    let rate = numerator / denominator * rate_per;
    Some(if round_rate { round_2dp(rate) } else { rate })
}

/// Round to 2 decimal places, halves away from zero
pub fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Add (or replace) a rate column computed row by row
pub fn calculate_rate_column(
    df: &DataFrame,
    numerator: &str,
    denominator: &str,
    output: &str,
    config: &RateConfig,
) -> Result<DataFrame> {
    let numerators = float_values(df, numerator)?;
    let denominators = float_values(df, denominator)?;

    let rates: Vec<Option<f64>> = numerators
        .into_iter()
        .zip(denominators)
        .map(|(n, d)| calculate_rate(n, d, config.rate_per, config.round_rate))
        .collect();

    let null_rates = rates.iter().filter(|r| r.is_none()).count();
    if null_rates > 0 {
        debug!(
            "{} of {} '{}' values are null (suppressed input or zero denominator)",
            null_rates,
            rates.len(),
            output
        );
    }

    let mut table = df.clone();
    set_float_column(&mut table, output, rates)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_per_thousand() {
        assert_eq!(calculate_rate(Some(5.0), Some(200.0), 1000.0, false), Some(25.0));
        assert_eq!(calculate_rate(Some(0.0), Some(200.0), 1000.0, false), Some(0.0));
    }

    #[test]
    fn test_zero_denominator_is_null() {
        assert_eq!(calculate_rate(Some(5.0), Some(0.0), 1000.0, false), None);
        assert_eq!(calculate_rate(Some(0.0), Some(0.0), 1000.0, true), None);
    }

    #[test]
    fn test_null_inputs_are_null() {
        assert_eq!(calculate_rate(None, Some(10.0), 1000.0, false), None);
        assert_eq!(calculate_rate(Some(1.0), None, 1000.0, false), None);
    }

    #[test]
    fn test_rounding_to_two_places() {
        assert_eq!(calculate_rate(Some(1.0), Some(3.0), 1000.0, true), Some(333.33));
        assert_eq!(calculate_rate(Some(2.0), Some(3.0), 100.0, true), Some(66.67));
    }

    #[test]
    fn test_rate_column() {
        let df = df!(
            "numerator" => [Some(5i64), None, Some(3)],
            "population" => [200i64, 100, 0],
        )
        .unwrap();

        let table = calculate_rate_column(
            &df,
            "numerator",
            "population",
            "rate",
            &RateConfig::default(),
        )
        .unwrap();

        assert_eq!(
            float_values(&table, "rate").unwrap(),
            vec![Some(25.0), None, None]
        );
        assert_eq!(table.width(), 3);
    }
}
