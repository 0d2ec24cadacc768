//! Measure input discovery.
//!
//! Finds `measure_<id>.csv` count tables directly inside an input directory.
//! Subdirectories are not searched, so earlier outputs written below the
//! input directory are never picked up as inputs. A measure may come with
//! `counts_per_code_<id>.csv` and `codelist_<id>.csv` next to it, which feed
//! its top codes table.

use crate::constants::{CODE_COUNTS_FILE_PREFIX, CODELIST_FILE_PREFIX, MEASURE_FILE_PATTERN};
use crate::error::{MeasureError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// One discovered measure input
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MeasureInput {
    pub id: String,
    pub path: PathBuf,
    /// Per-code event counts, when present
    pub code_counts: Option<PathBuf>,
    /// Codelist describing the codes in `code_counts`, when present
    pub codelist: Option<PathBuf>,
}

impl MeasureInput {
    /// A measure with no code-level inputs
    pub fn new(id: impl Into<String>, path: PathBuf) -> Self {
        Self {
            id: id.into(),
            path,
            code_counts: None,
            codelist: None,
        }
    }
}

/// Discovery of measure count tables in an input directory
#[derive(Debug)]
pub struct MeasureDiscovery {
    input_dir: PathBuf,
    pattern: Regex,
}

impl MeasureDiscovery {
    pub fn new(input_dir: PathBuf) -> Result<Self> {
        let pattern = Regex::new(MEASURE_FILE_PATTERN).map_err(|e| MeasureError::Configuration {
            message: format!("invalid measure file pattern: {e}"),
        })?;
        Ok(Self { input_dir, pattern })
    }

    /// Measure id of a file name, if it is a measure input
    pub fn measure_id(&self, file_name: &str) -> Option<String> {
        self.pattern
            .captures(file_name)
            .and_then(|caps| caps.name("measure"))
            .map(|m| m.as_str().to_string())
    }

    /// Discover every measure input, sorted by measure id
    pub fn discover(&self) -> Result<Vec<MeasureInput>> {
        if !self.input_dir.is_dir() {
            return Err(MeasureError::InputNotFound {
                path: self.input_dir.clone(),
            });
        }

        debug!("Searching for measure files in: {}", self.input_dir.display());

        let mut measures = Vec::new();
        for entry in WalkDir::new(&self.input_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(id) = file_name(path).and_then(|name| self.measure_id(name)) else {
                continue;
            };
            let code_counts = self.companion(CODE_COUNTS_FILE_PREFIX, &id);
            let codelist = self.companion(CODELIST_FILE_PREFIX, &id);
            if code_counts.is_some() || codelist.is_some() {
                debug!("Measure '{}' has code-level inputs", id);
            }

            measures.push(MeasureInput {
                id,
                path: path.to_path_buf(),
                code_counts,
                codelist,
            });
        }

        measures.sort();
        debug!("Found {} measure files", measures.len());
        Ok(measures)
    }

    /// `<prefix><id>.csv` next to the measure file, if it exists
    fn companion(&self, prefix: &str, id: &str) -> Option<PathBuf> {
        let path = self.input_dir.join(format!("{prefix}{id}.csv"));
        path.is_file().then_some(path)
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
