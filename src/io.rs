//! Table reading and writing.
//!
//! Count tables, codelists and reference populations are read from CSV with
//! polars. Outputs are written to a temporary sibling first and renamed into
//! place, so a failed write never leaves a truncated table behind.

use crate::error::{MeasureError, Result};
use crate::models::OutputFormat;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rows used to infer the schema of an input CSV
const INFER_SCHEMA_ROWS: usize = 10_000;

/// Read a CSV file with a header row
///
/// Dates are kept as text so that grouping keys compare exactly as written.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(MeasureError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(
        "Read {} rows x {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Write a table in the requested format, replacing any existing file
pub fn write_table(df: &DataFrame, path: &Path, format: OutputFormat) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path(path);
    let mut table = df.clone();

    let written = File::create(&staging).map_err(MeasureError::from).and_then(|mut file| {
        match format {
            OutputFormat::Csv => {
                CsvWriter::new(&mut file)
                    .include_header(true)
                    .finish(&mut table)?;
            }
            OutputFormat::Parquet => {
                ParquetWriter::new(&mut file).finish(&mut table)?;
            }
        }
        Ok(())
    });

    if let Err(e) = written {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }

    fs::rename(&staging, path)?;
    debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(path.to_path_buf())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
