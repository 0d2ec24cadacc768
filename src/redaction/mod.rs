//! Small-number disclosure control.
//!
//! [`suppress`] holds the unit-level algorithm, [`table`] applies it to count
//! tables, and [`codes`] and [`events`] build the other published tables of a
//! measure.

pub mod codes;
pub mod events;
pub mod suppress;
pub mod table;

pub use codes::{TopCodes, create_top_codes_table, group_low_values};
pub use events::{EventSummary, redact_events_table};
pub use suppress::{Suppression, round_values, suppress_column, suppress_values};
pub use table::{Redacted, RedactionReport, null_out_rates, redact_small_numbers, round_column};
