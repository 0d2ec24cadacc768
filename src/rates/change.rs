//! Classification of demographic subgroup change against the population.

use super::calculate::round_2dp;
use crate::constants::CHANGE_BAND_PERCENT;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a subgroup moved relative to the whole population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeClass {
    NoChange,
    Increase,
    SustainedDrop,
    Recovery,
    Unclassified,
}

impl fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeClass::NoChange => "no change",
            ChangeClass::Increase => "increase",
            ChangeClass::SustainedDrop => "sustained drop",
            ChangeClass::Recovery => "recovery",
            ChangeClass::Unclassified => "none",
        };
        f.write_str(label)
    }
}

fn within_band(diff: f64) -> bool {
    (-CHANGE_BAND_PERCENT..CHANGE_BAND_PERCENT).contains(&diff)
}

/// Classify two percentage changes after subtracting `baseline`
///
/// Returns the class and the baseline-adjusted differences.
pub fn classify_change(changes: [f64; 2], baseline: f64) -> (ChangeClass, [f64; 2]) {
    let diffs = changes.map(|change| change - baseline);
    let [first, second] = diffs;

    let class = if within_band(first) && within_band(second) {
        ChangeClass::NoChange
    } else if first > CHANGE_BAND_PERCENT || second > CHANGE_BAND_PERCENT {
        ChangeClass::Increase
    } else if first <= -CHANGE_BAND_PERCENT && !within_band(second) {
        ChangeClass::SustainedDrop
    } else if first <= -CHANGE_BAND_PERCENT {
        ChangeClass::Recovery
    } else {
        ChangeClass::Unclassified
    };

    (class, diffs)
}

/// Percent difference of a subgroup value from the population value, 2 dp
///
/// A zero (or missing) population value has no defined difference.
pub fn percentage_difference(value: Option<f64>, population_value: Option<f64>) -> Option<f64> {
    let (value, population_value) = (value?, population_value?);
    if population_value == 0.0 {
        return None;
    }
    Some(round_2dp((value - population_value) / population_value * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_change_band_is_half_open() {
        assert_eq!(classify_change([-15.0, 14.9], 0.0).0, ChangeClass::NoChange);
        // 15 is outside the band but not an increase
        assert_eq!(classify_change([15.0, 0.0], 0.0).0, ChangeClass::Unclassified);
    }

    #[test]
    fn test_increase() {
        assert_eq!(classify_change([16.0, -40.0], 0.0).0, ChangeClass::Increase);
        assert_eq!(classify_change([-40.0, 30.0], 0.0).0, ChangeClass::Increase);
    }

    #[test]
    fn test_sustained_drop_and_recovery() {
        assert_eq!(classify_change([-30.0, -20.0], 0.0).0, ChangeClass::SustainedDrop);
        assert_eq!(classify_change([-30.0, -5.0], 0.0).0, ChangeClass::Recovery);
    }

    #[test]
    fn test_baseline_is_subtracted() {
        let (class, diffs) = classify_change([-30.0, -25.0], -20.0);
        assert_eq!(diffs, [-10.0, -5.0]);
        assert_eq!(class, ChangeClass::NoChange);
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(ChangeClass::SustainedDrop.to_string(), "sustained drop");
        assert_eq!(ChangeClass::Unclassified.to_string(), "none");
    }

    #[test]
    fn test_percentage_difference() {
        assert_eq!(percentage_difference(Some(12.0), Some(10.0)), Some(20.0));
        assert_eq!(percentage_difference(Some(1.0), Some(3.0)), Some(-66.67));
        assert_eq!(percentage_difference(Some(1.0), Some(0.0)), None);
        assert_eq!(percentage_difference(None, Some(3.0)), None);
    }
}
