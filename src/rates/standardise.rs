//! Direct age standardisation.
//!
//! A reference population given in fine (5-year) age bands is collapsed into
//! the coarse bands used by count tables, then normalised so the weights sum
//! to one. Each row's crude rate is multiplied by the weight of its age band.
//!
//! Weight lookup is strict: a band that is not in the reference population
//! is a data-quality error and never defaults to a zero weight.

use super::calculate::calculate_rate_column;
use crate::config::RateConfig;
use crate::constants::{DEFAULT_AGE_BAND_MAPPING, WEIGHT_SUM_TOLERANCE, columns};
use crate::error::{MeasureError, Result};
use crate::io::read_csv;
use crate::models::MeasureColumns;
use crate::table::{float_values, set_float_column, string_values};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Many-to-one mapping from fine reference bands to coarse table bands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeBandMapping {
    bands: HashMap<String, String>,
}

impl Default for AgeBandMapping {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_AGE_BAND_MAPPING.iter().copied())
    }
}

impl AgeBandMapping {
    pub fn from_pairs<I, F, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, C)>,
        F: Into<String>,
        C: Into<String>,
    {
        Self {
            bands: pairs
                .into_iter()
                .map(|(fine, coarse)| (fine.into(), coarse.into()))
                .collect(),
        }
    }

    /// Coarse band of a fine band, if mapped
    pub fn coarse(&self, fine: &str) -> Option<&str> {
        self.bands.get(fine.trim()).map(String::as_str)
    }
}

/// Normalised weights per coarse age band
#[derive(Debug, Clone, PartialEq)]
pub struct StandardPopulation {
    weights: BTreeMap<String, f64>,
}

impl StandardPopulation {
    /// Collapse fine-band population counts through `mapping` and normalise
    pub fn from_fine_bands<I, S>(populations: I, mapping: &AgeBandMapping) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut collapsed: BTreeMap<String, f64> = BTreeMap::new();

        for (fine, population) in populations {
            let fine = fine.as_ref();
            let coarse = mapping
                .coarse(fine)
                .ok_or_else(|| MeasureError::UnknownAgeBand {
                    band: fine.to_string(),
                })?;

            if !(population.is_finite() && population >= 0.0) {
                return Err(MeasureError::Configuration {
                    message: format!("invalid reference population {population} for band {fine}"),
                });
            }

            *collapsed.entry(coarse.to_string()).or_default() += population;
        }

        Self::normalised(collapsed)
    }

    /// Normalise population counts already given per coarse band
    pub fn from_coarse_bands<I, S>(populations: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut collapsed: BTreeMap<String, f64> = BTreeMap::new();
        for (band, population) in populations {
            *collapsed.entry(band.into()).or_default() += population;
        }
        Self::normalised(collapsed)
    }

    fn normalised(mut weights: BTreeMap<String, f64>) -> Result<Self> {
        let total: f64 = weights.values().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(MeasureError::Configuration {
                message: "reference population total must be positive".to_string(),
            });
        }

        for weight in weights.values_mut() {
            *weight /= total;
        }

        let population = Self { weights };
        population.check_weights()?;
        Ok(population)
    }

    /// Load a reference population CSV with `AgeGroup` and
    /// `EuropeanStandardPopulation` columns
    ///
    /// Any failure is reported as `ReferencePopulation`, which aborts the run.
    pub fn load(path: &Path, mapping: &AgeBandMapping) -> Result<Self> {
        let reference_error = |reason: String| MeasureError::ReferencePopulation {
            path: path.to_path_buf(),
            reason,
        };

        let df = read_csv(path).map_err(|e| reference_error(e.to_string()))?;
        let bands = string_values(&df, columns::ESP_AGE_GROUP)
            .map_err(|e| reference_error(e.to_string()))?;
        let populations = float_values(&df, columns::ESP_POPULATION)
            .map_err(|e| reference_error(e.to_string()))?;

        let mut rows = Vec::with_capacity(bands.len());
        for (row, (band, population)) in bands.into_iter().zip(populations).enumerate() {
            match (band, population) {
                (Some(band), Some(population)) => rows.push((band, population)),
                _ => return Err(reference_error(format!("row {row} is incomplete"))),
            }
        }

        let population =
            Self::from_fine_bands(rows, mapping).map_err(|e| reference_error(e.to_string()))?;

        info!(
            "Loaded standard population from {} ({} age bands)",
            path.display(),
            population.weights.len()
        );
        Ok(population)
    }

    /// Weight of a coarse age band
    pub fn weight(&self, band: &str) -> Result<f64> {
        self.weights
            .get(band.trim())
            .copied()
            .ok_or_else(|| MeasureError::UnknownAgeBand {
                band: band.to_string(),
            })
    }

    pub fn bands(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    fn check_weights(&self) -> Result<()> {
        let total = self.total_weight();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(MeasureError::InvariantViolation {
                message: format!("standard population weights sum to {total}"),
            });
        }
        Ok(())
    }
}

/// Compute `rate`, and `rate_standardised` when standardising
///
/// Without standardisation the table only gains the crude rate. With it,
/// every row's age band must have a weight; rows with a null rate keep a
/// null standardised rate.
pub fn calculate_rate_standardise(
    df: &DataFrame,
    columns: &MeasureColumns,
    config: &RateConfig,
    population: Option<&StandardPopulation>,
) -> Result<DataFrame> {
    let table = calculate_rate_column(
        df,
        &columns.numerator,
        &columns.denominator,
        &columns.rate,
        config,
    )?;

    if !config.standardise {
        return Ok(table);
    }

    let population = population.ok_or_else(|| MeasureError::Configuration {
        message: "standardisation requested without a standard population".to_string(),
    })?;

    let age_column = columns
        .age_group
        .as_deref()
        .unwrap_or(config.age_group_column.as_str());

    let rates = float_values(&table, &columns.rate)?;
    let bands = string_values(&table, age_column)?;

    let mut standardised = Vec::with_capacity(rates.len());
    for (row, (rate, band)) in rates.into_iter().zip(bands).enumerate() {
        let band = band.ok_or_else(|| MeasureError::MissingGroupKey {
            column: age_column.to_string(),
            row,
        })?;
        let weight = population.weight(&band)?;
        standardised.push(rate.map(|rate| rate * weight));
    }

    debug!(
        "Standardised {} rows on '{}' against {} bands",
        standardised.len(),
        age_column,
        population.weights.len()
    );

    let mut table = table;
    set_float_column(&mut table, &columns.rate_standardised, standardised)?;
    Ok(table)
}
