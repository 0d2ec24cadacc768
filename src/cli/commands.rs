//! Command implementation for the measures processor CLI
//!
//! Sets up logging, builds the pipeline configuration from the arguments and
//! runs the pipeline.

use crate::cli::args::Args;
use crate::models::ProcessingStats;
use crate::processor::MeasurePipeline;
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Main command runner
pub async fn run(args: Args) -> Result<ProcessingStats> {
    setup_logging(&args)?;

    info!("Starting measures processor");
    debug!("Command line arguments: {:?}", args);

    let config = args.to_config();
    config
        .validate()
        .context("Invalid pipeline configuration")?;

    let output_dir = args.output_dir();
    let mut pipeline = MeasurePipeline::new(args.input_dir.clone(), output_dir.clone())
        .with_context(|| format!("Cannot read measures from {}", args.input_dir.display()))?
        .with_config(config);
    if !args.show_progress() {
        pipeline = pipeline.quiet();
    }

    let stats = pipeline
        .run()
        .await
        .with_context(|| format!("Processing measures into {} failed", output_dir.display()))?;

    info!(
        "Finished: {} measures processed, {} failed in {}ms",
        stats.measures_processed, stats.measures_failed, stats.processing_time_ms
    );
    Ok(stats)
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sro_measures={log_level}")));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}
