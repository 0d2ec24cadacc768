//! Rate computation, age standardisation and rate summaries.

pub mod aggregate;
pub mod calculate;
pub mod change;
pub mod deciles;
pub mod standardise;

pub use aggregate::{aggregate_rates, practice_rates};
pub use calculate::{calculate_rate, calculate_rate_column, round_2dp};
pub use change::{ChangeClass, classify_change, percentage_difference};
pub use deciles::{change_in_median, compute_deciles, idr_by_period, median_by_period, quantile};
pub use standardise::{AgeBandMapping, StandardPopulation, calculate_rate_standardise};
