//! Application constants for measure processing
//!
//! Column names, disclosure-control defaults, published labels and the
//! default age band mapping used for standardisation.

// =============================================================================
// Column Names
// =============================================================================

/// Default column names of count tables and published tables
pub mod columns {
    pub const PRACTICE: &str = "practice";
    pub const DATE: &str = "date";
    pub const NUMERATOR: &str = "numerator";
    pub const DENOMINATOR: &str = "population";
    pub const RATE: &str = "rate";
    pub const RATE_STANDARDISED: &str = "rate_standardised";
    pub const AGE_BAND: &str = "age_band";

    /// Code table columns
    pub const CODE: &str = "Code";
    pub const DESCRIPTION: &str = "Description";
    pub const EVENTS: &str = "Events";
    pub const PROPORTION: &str = "Proportion of codes (%)";

    /// Event summary table columns
    pub const LABEL: &str = "label";
    pub const COUNT: &str = "count";

    /// Decile table columns
    pub const PERCENTILE: &str = "percentile";
    pub const VALUE: &str = "value";

    /// Reference population file columns
    pub const ESP_AGE_GROUP: &str = "AgeGroup";
    pub const ESP_POPULATION: &str = "EuropeanStandardPopulation";
}

// =============================================================================
// Disclosure Control Defaults
// =============================================================================

/// Counts at or below this value are considered disclosive
pub const DEFAULT_LOW_COUNT_THRESHOLD: u32 = 10;

/// Surviving counts are rounded to a multiple of this base
pub const DEFAULT_ROUNDING_BASE: u32 = 10;

/// Rates are expressed per this many of the population
pub const DEFAULT_RATE_PER: f64 = 1000.0;

/// Number of codes shown in a top codes table
pub const DEFAULT_TOP_CODES_ROWS: usize = 5;

/// Code assigned to the row aggregating suppressed codes
pub const OTHER_CODE: &str = "Other";

/// Description assigned to the aggregated "Other" row
pub const OTHER_DESCRIPTION: &str = "-";

/// Published instead of a proportion that rounds to 0%
pub const LOW_PROPORTION_LABEL: &str = "< 0.005";

/// Published instead of a proportion that rounds to 100%
pub const HIGH_PROPORTION_LABEL: &str = "> 99.995";

/// Event summary row labels
pub mod event_labels {
    pub const TOTAL_EVENTS: &str = "total_events";
    pub const EVENTS_IN_LATEST_PERIOD: &str = "events_in_latest_period";
    pub const UNIQUE_PATIENTS: &str = "unique_patients";
}

// =============================================================================
// Change Classification
// =============================================================================

/// Width of the band (in percentage points) treated as "no change"
pub const CHANGE_BAND_PERCENT: f64 = 15.0;

// =============================================================================
// Input Discovery
// =============================================================================

/// Measure input file pattern; the capture group is the measure id
pub const MEASURE_FILE_PATTERN: &str = r"^measure_(?P<measure>\w+)\.csv$";

/// Per-code event counts accompanying a measure: `counts_per_code_<id>.csv`
pub const CODE_COUNTS_FILE_PREFIX: &str = "counts_per_code_";

/// Codelist accompanying a measure: `codelist_<id>.csv`
pub const CODELIST_FILE_PREFIX: &str = "codelist_";

/// Event count column of per-code count files
pub const CODE_COUNT_COLUMN: &str = "num";

/// Code column of per-code count files and codelists, unless configured
pub const DEFAULT_CODE_COLUMN: &str = "code";

/// Human-readable term column of codelists
pub const CODELIST_TERM_COLUMN: &str = "term";

/// Number of weeks collapsed into one period by the weekly to monthly conversion
pub const WEEKS_PER_PERIOD: usize = 4;

// =============================================================================
// Age Standardisation
// =============================================================================

/// Default mapping from 5-year reference population bands to the coarse
/// age bands used in count tables
pub const DEFAULT_AGE_BAND_MAPPING: &[(&str, &str)] = &[
    ("0-4", "0-19"),
    ("5-9", "0-19"),
    ("10-14", "0-19"),
    ("15-19", "0-19"),
    ("20-24", "20-29"),
    ("25-29", "20-29"),
    ("30-34", "30-39"),
    ("35-39", "30-39"),
    ("40-44", "40-49"),
    ("45-49", "40-49"),
    ("50-54", "50-59"),
    ("55-59", "50-59"),
    ("60-64", "60-69"),
    ("65-69", "60-69"),
    ("70-74", "70-79"),
    ("75-79", "70-79"),
    ("80-84", "80+"),
    ("85-89", "80+"),
    ("90plus", "80+"),
];

/// Tolerance when checking that standard population weights sum to one
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;
