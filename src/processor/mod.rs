//! Measure processing pipeline.
//!
//! Discovers measure count tables, processes them concurrently and reports
//! per-measure outcomes. Each measure owns its table, so measures run with
//! no shared mutable state; outcomes are sorted by measure id afterwards to
//! keep reports reproducible.

pub mod discovery;
pub mod measure;

#[cfg(test)]
pub mod tests;

use self::discovery::{MeasureDiscovery, MeasureInput};
use self::measure::process_measure;

use crate::config::PipelineConfig;
use crate::error::{MeasureError, Result};
use crate::models::{FailurePolicy, MeasureOutcome, ProcessingStats};
use crate::rates::{AgeBandMapping, StandardPopulation};

use colored::*;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::task;
use tracing::{debug, error, info, warn};

/// Main pipeline over a directory of measure count tables
#[derive(Debug)]
pub struct MeasurePipeline {
    input_dir: PathBuf,
    output_dir: PathBuf,
    config: PipelineConfig,
    age_bands: AgeBandMapping,
    show_progress: bool,
}

impl MeasurePipeline {
    /// Create a pipeline reading from `input_dir` and writing to `output_dir`
    pub fn new(input_dir: PathBuf, output_dir: PathBuf) -> Result<Self> {
        if !input_dir.exists() {
            return Err(MeasureError::InputNotFound { path: input_dir });
        }

        Ok(Self {
            input_dir,
            output_dir,
            config: PipelineConfig::default(),
            age_bands: AgeBandMapping::default(),
            show_progress: true,
        })
    }

    /// Configure the pipeline
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom fine-to-coarse age band mapping for standardisation
    pub fn with_age_bands(mut self, age_bands: AgeBandMapping) -> Self {
        self.age_bands = age_bands;
        self
    }

    /// Suppress terminal progress and summary output
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Main processing entry point
    ///
    /// Configuration and reference-population errors abort the run before
    /// any measure is processed. Per-measure failures are recorded or abort
    /// the run according to the configured `FailurePolicy`.
    pub async fn run(&self) -> Result<ProcessingStats> {
        let start_time = Instant::now();
        self.config.validate()?;

        self.announce();

        let population = self.load_population().await?;

        let measures = {
            let input_dir = self.input_dir.clone();
            task::spawn_blocking(move || MeasureDiscovery::new(input_dir)?.discover())
                .await
                .map_err(|e| MeasureError::InvariantViolation {
                    message: format!("measure discovery task failed: {e}"),
                })??
        };

        if self.show_progress {
            println!(
                "  {} {} measure files",
                "Found".bright_green(),
                measures.len().to_string().bright_white().bold()
            );
        }

        if measures.is_empty() {
            warn!("No measure files found in {}", self.input_dir.display());
            return Ok(ProcessingStats {
                output_path: self.output_dir.clone(),
                processing_time_ms: start_time.elapsed().as_millis(),
                ..Default::default()
            });
        }

        fs::create_dir_all(&self.output_dir).await?;

        let mut stats = self.process_measures(measures, population).await?;
        stats.processing_time_ms = start_time.elapsed().as_millis();

        self.report(&stats);
        Ok(stats)
    }

    fn announce(&self) {
        if !self.show_progress {
            return;
        }
        println!("{}", "Starting measure processing".bright_green().bold());
        println!("  {} {}", "Input:".bright_cyan(), self.input_dir.display());
        println!("  {} {}", "Output:".bright_cyan(), self.output_dir.display());
        println!(
            "  {} {} (rounding base {})",
            "Threshold:".bright_cyan(),
            self.config.redaction.threshold,
            self.config.redaction.rounding_base
        );
    }

    async fn load_population(&self) -> Result<Option<Arc<StandardPopulation>>> {
        if !self.config.rates.standardise {
            return Ok(None);
        }

        let Some(path) = self.config.rates.standard_population_path.clone() else {
            return Err(MeasureError::Configuration {
                message: "standardisation requires a standard population file".to_string(),
            });
        };

        let mapping = self.age_bands.clone();
        let population = task::spawn_blocking(move || StandardPopulation::load(&path, &mapping))
            .await
            .map_err(|e| MeasureError::InvariantViolation {
                message: format!("standard population task failed: {e}"),
            })??;

        Ok(Some(Arc::new(population)))
    }

    async fn process_measures(
        &self,
        measures: Vec<MeasureInput>,
        population: Option<Arc<StandardPopulation>>,
    ) -> Result<ProcessingStats> {
        let pb = self.progress_bar(measures.len() as u64);
        let config = Arc::new(self.config.clone());
        let concurrent_limit = self.config.workers.min(measures.len()).max(1);
        debug!("Processing {} measures with {} workers", measures.len(), concurrent_limit);

        let mut results = stream::iter(measures)
            .map(|input| {
                let config = Arc::clone(&config);
                let population = population.clone();
                let output_dir = self.output_dir.clone();
                let pb = pb.clone();
                async move {
                    let measure = input.id.clone();
                    pb.set_message(format!("Processing: {measure}"));

                    let result = task::spawn_blocking(move || {
                        process_measure(&input, &config, population.as_deref(), &output_dir)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(MeasureError::InvariantViolation {
                            message: format!("measure task failed: {e}"),
                        }
                        .in_measure(measure.clone(), "task"))
                    });

                    pb.inc(1);
                    (measure, result)
                }
            })
            .buffer_unordered(concurrent_limit);

        let mut outcomes: Vec<MeasureOutcome> = Vec::new();
        let mut failures: Vec<(String, MeasureError)> = Vec::new();

        while let Some((measure, result)) = results.next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Failed to process measure '{}': {}", measure, e);
                    if e.is_fatal() || self.config.failure_policy == FailurePolicy::FailFast {
                        pb.abandon_with_message(format!("Aborted at measure: {measure}"));
                        return Err(e);
                    }
                    failures.push((measure, e));
                }
            }
        }

        pb.finish_with_message("All measures processed");

        outcomes.sort_by(|a, b| a.measure.cmp(&b.measure));
        failures.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            "Processed {} measures, {} failed",
            outcomes.len(),
            failures.len()
        );

        Ok(ProcessingStats {
            measures_processed: outcomes.len(),
            measures_failed: failures.len(),
            total_rows: outcomes.iter().map(|o| o.rows).sum(),
            outcomes,
            failures: failures
                .into_iter()
                .map(|(measure, e)| (measure, e.to_string()))
                .collect(),
            output_path: self.output_dir.clone(),
            processing_time_ms: 0,
        })
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message("Processing measures");
        pb
    }

    fn report(&self, stats: &ProcessingStats) {
        if !self.show_progress {
            return;
        }

        println!("\n{}", "Processing Summary".bright_green().bold());
        println!(
            "  {} {}ms",
            "Time elapsed:".bright_cyan(),
            stats.processing_time_ms.to_string().bright_white()
        );
        println!(
            "  {} {}",
            "Measures processed:".bright_cyan(),
            stats.measures_processed.to_string().bright_white()
        );
        if stats.measures_failed > 0 {
            println!(
                "  {} {}",
                "Measures failed:".bright_red(),
                stats.measures_failed.to_string().bright_red().bold()
            );
            for (measure, reason) in &stats.failures {
                println!("    {} {}", format!("{measure}:").bright_red(), reason);
            }
        }
        println!(
            "  {} {}",
            "Total rows:".bright_cyan(),
            stats.total_rows.to_string().bright_white().bold()
        );
        println!(
            "  {} {}",
            "Counts suppressed:".bright_cyan(),
            stats.total_suppressed().to_string().bright_white()
        );
    }
}
