//! Small-number suppression within one suppression unit.
//!
//! Every value at or below the threshold is suppressed. If the suppressed
//! values add up to no more than the threshold, further values are
//! suppressed smallest-first until the suppressed total exceeds the
//! threshold or nothing is left, so no suppressed value can be recovered to
//! within the threshold by subtracting published values from a total.

use crate::models::ZeroTotalPolicy;
use tracing::{debug, trace};

/// Result of suppressing one unit
#[derive(Debug, Clone, PartialEq)]
pub struct Suppression {
    /// Values with suppressed entries set to `None`
    pub values: Vec<Option<f64>>,
    /// Sum of the values suppressed by this call
    pub suppressed_total: f64,
    /// Number of values suppressed by this call
    pub suppressed_count: usize,
}

impl Suppression {
    fn unchanged(values: &[Option<f64>]) -> Self {
        Self {
            values: values.to_vec(),
            suppressed_total: 0.0,
            suppressed_count: 0,
        }
    }

    /// True when no value of the unit survived
    pub fn is_fully_suppressed(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

/// Suppress one unit with the default zero-total policy
///
/// `None` entries are treated as already suppressed (or missing) and are
/// left untouched.
pub fn suppress_column(values: &[Option<f64>], threshold: u32) -> Vec<Option<f64>> {
    suppress_values(values, threshold, ZeroTotalPolicy::default()).values
}

/// Suppress one unit
///
/// Ties between equal smallest values are broken by position, lowest index
/// first, so the output is reproducible for a fixed input order.
pub fn suppress_values(
    values: &[Option<f64>],
    threshold: u32,
    zero_policy: ZeroTotalPolicy,
) -> Suppression {
    let limit = f64::from(threshold);

    let small: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(idx, v)| v.filter(|v| *v <= limit).map(|_| idx))
        .collect();

    if small.is_empty() {
        return Suppression::unchanged(values);
    }

    let mut suppressed_total: f64 = small.iter().filter_map(|&idx| values[idx]).sum();

    if suppressed_total == 0.0 {
        return match zero_policy {
            ZeroTotalPolicy::KeepZeros => {
                trace!("All small values are zero, nothing suppressed");
                Suppression::unchanged(values)
            }
            ZeroTotalPolicy::SuppressUnit => {
                let suppressed_count = values.iter().filter(|v| v.is_some()).count();
                let suppressed_total: f64 = values.iter().flatten().sum();
                debug!("Zero-total unit suppressed: {} values", suppressed_count);
                Suppression {
                    values: vec![None; values.len()],
                    suppressed_total,
                    suppressed_count,
                }
            }
        };
    }

    let mut out = values.to_vec();
    for &idx in &small {
        out[idx] = None;
    }
    let mut suppressed_count = small.len();

    while suppressed_total <= limit {
        let Some(idx) = smallest_remaining(&out) else {
            debug!(
                "Unit fully suppressed with total {} <= threshold {}",
                suppressed_total, threshold
            );
            break;
        };
        // Each pass removes one value, so the loop runs at most `out.len()` times.
        suppressed_total += out[idx].take().unwrap_or_default();
        suppressed_count += 1;
    }

    debug_assert!(suppressed_total > limit || out.iter().all(Option::is_none));

    Suppression {
        values: out,
        suppressed_total,
        suppressed_count,
    }
}

/// Index of the smallest non-null value, lowest index on ties
fn smallest_remaining(values: &[Option<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, value) in values.iter().enumerate() {
        if let Some(v) = *value {
            match best {
                Some((_, current)) if v >= current => {}
                _ => best = Some((idx, v)),
            }
        }
    }
    best.map(|(idx, _)| idx)
}

/// Round to the nearest multiple of `base`, halves away from zero
///
/// `None` passes through unchanged. A base of zero disables rounding.
pub fn round_values(x: Option<f64>, base: u32) -> Option<f64> {
    if base == 0 {
        return x;
    }
    let base = f64::from(base);
    x.map(|v| (v / base).round() * base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_cascade_until_total_exceeds_threshold() {
        let result = suppress_column(&some(&[2.0, 3.0, 4.0, 20.0]), 5);
        assert_eq!(result, vec![None, None, None, Some(20.0)]);
    }

    #[test]
    fn test_secondary_suppression_of_smallest_survivor() {
        // 3 alone could be recovered from the total, so 8 goes too
        let result = suppress_values(&some(&[3.0, 8.0, 50.0, 12.0]), 5, ZeroTotalPolicy::KeepZeros);
        assert_eq!(result.values, vec![None, None, Some(50.0), Some(12.0)]);
        assert_eq!(result.suppressed_total, 11.0);
        assert_eq!(result.suppressed_count, 2);
    }

    #[test]
    fn test_nothing_below_threshold() {
        let input = some(&[6.0, 7.0, 100.0]);
        let result = suppress_values(&input, 5, ZeroTotalPolicy::KeepZeros);
        assert_eq!(result.values, input);
        assert_eq!(result.suppressed_count, 0);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let result = suppress_column(&some(&[5.0, 6.0, 30.0]), 5);
        // 5 <= 5 is suppressed; 5 is not > 5 so 6 follows
        assert_eq!(result, vec![None, None, Some(30.0)]);
    }

    #[test]
    fn test_all_zero_unit_keep_zeros() {
        let result = suppress_column(&some(&[0.0, 0.0, 0.0]), 5);
        assert_eq!(result, some(&[0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_all_zero_unit_suppress_unit() {
        let result = suppress_values(&some(&[0.0, 0.0, 0.0]), 5, ZeroTotalPolicy::SuppressUnit);
        assert!(result.is_fully_suppressed());
        assert_eq!(result.suppressed_count, 3);
    }

    #[test]
    fn test_zeros_with_large_values_suppress_unit() {
        let result = suppress_values(&some(&[0.0, 40.0]), 5, ZeroTotalPolicy::SuppressUnit);
        assert_eq!(result.values, vec![None, None]);
    }

    #[test]
    fn test_zeros_with_large_values_keep_zeros() {
        let input = some(&[0.0, 40.0]);
        let result = suppress_values(&input, 5, ZeroTotalPolicy::KeepZeros);
        assert_eq!(result.values, input);
    }

    #[test]
    fn test_small_unit_fully_suppressed() {
        let result = suppress_values(&some(&[1.0, 2.0]), 10, ZeroTotalPolicy::KeepZeros);
        assert!(result.is_fully_suppressed());
        assert_eq!(result.suppressed_total, 3.0);
    }

    #[test]
    fn test_existing_nulls_untouched() {
        let input = vec![None, Some(2.0), Some(30.0), Some(40.0)];
        let result = suppress_column(&input, 5);
        assert_eq!(result, vec![None, None, None, Some(40.0)]);
    }

    #[test]
    fn test_ties_break_on_lowest_index() {
        let input = some(&[4.0, 9.0, 9.0, 100.0]);
        let result = suppress_column(&input, 5);
        assert_eq!(result, vec![None, None, Some(9.0), Some(100.0)]);
    }

    #[test]
    fn test_empty_unit() {
        let result = suppress_values(&[], 5, ZeroTotalPolicy::KeepZeros);
        assert!(result.values.is_empty());
        assert_eq!(result.suppressed_count, 0);
    }

    /// Units built from every combination of small values, to exercise the
    /// suppression guarantees without a property-testing framework.
    fn exhaustive_units() -> Vec<Vec<Option<f64>>> {
        let choices = [0.0, 1.0, 3.0, 5.0, 6.0, 11.0, 40.0];
        let mut units = Vec::new();
        for a in choices {
            for b in choices {
                for c in choices {
                    for d in choices {
                        units.push(some(&[a, b, c, d]));
                    }
                }
            }
        }
        units
    }

    #[test]
    fn test_suppressed_total_exceeds_threshold_or_unit_empty() {
        for threshold in [0, 1, 5, 10] {
            for unit in exhaustive_units() {
                let result = suppress_values(&unit, threshold, ZeroTotalPolicy::KeepZeros);
                let nothing = result.suppressed_count == 0;
                let all_null = result.is_fully_suppressed();
                let exceeds = result.suppressed_total > f64::from(threshold);
                assert!(
                    nothing || all_null || exceeds,
                    "unit {:?} threshold {} gave {:?}",
                    unit,
                    threshold,
                    result
                );

                // Nothing suppressed only when no positive value is small
                if nothing {
                    assert!(unit.iter().flatten().all(|v| *v == 0.0 || *v > f64::from(threshold)));
                }
            }
        }
    }

    #[test]
    fn test_no_published_value_at_or_below_threshold() {
        for threshold in [1, 5, 10] {
            for unit in exhaustive_units() {
                let result = suppress_column(&unit, threshold);
                for value in result.iter().flatten() {
                    assert!(*value == 0.0 || *value > f64::from(threshold));
                }
            }
        }
    }

    #[test]
    fn test_larger_threshold_never_suppresses_less() {
        for unit in exhaustive_units() {
            let mut previous = 0;
            for threshold in [0, 1, 3, 5, 6, 10, 20] {
                let count = suppress_column(&unit, threshold)
                    .iter()
                    .filter(|v| v.is_none())
                    .count();
                assert!(
                    count >= previous,
                    "unit {:?}: threshold {} suppressed {} < {}",
                    unit,
                    threshold,
                    count,
                    previous
                );
                previous = count;
            }
        }
    }

    #[test]
    fn test_round_values() {
        assert_eq!(round_values(Some(12.0), 5), Some(10.0));
        assert_eq!(round_values(Some(13.0), 5), Some(15.0));
        assert_eq!(round_values(Some(25.0), 10), Some(30.0));
        assert_eq!(round_values(None, 5), None);
        assert_eq!(round_values(Some(7.0), 0), Some(7.0));
    }

    #[test]
    fn test_round_values_idempotent() {
        for base in [1, 5, 7, 10] {
            for x in 0..200 {
                let once = round_values(Some(f64::from(x) * 0.9), base);
                assert_eq!(round_values(once, base), once);
            }
        }
    }
}
