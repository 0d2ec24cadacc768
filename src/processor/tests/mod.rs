//! Integration tests for the processor module
//!
//! Runs the complete pipeline over temporary directories of measure tables.


use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(crate) const MEASURE_CSV: &str = "practice,date,numerator,population
1,2020-01-01,20,100
2,2020-01-01,30,200
3,2020-01-01,0,50
1,2020-02-01,25,100
2,2020-02-01,35,200
3,2020-02-01,0,50
";

pub(crate) const CODE_COUNTS_CSV: &str = "code,num
1001,500
1002,300
1003,200
1004,8
1005,7
";

pub(crate) const CODELIST_CSV: &str = "code,term
1001,Systolic arterial pressure
1002,Average home systolic blood pressure
1003,Self measured systolic blood pressure
1004,Ambulatory systolic blood pressure
1005,Minimum systolic blood pressure
";

/// Create `output/` holding the given measure tables and return (input, output) dirs
pub(crate) fn create_measure_dir(temp_dir: &TempDir, measures: &[(&str, &str)]) -> (PathBuf, PathBuf) {
    let input = temp_dir.path().join("output");
    fs::create_dir_all(&input).unwrap();

    for (id, content) in measures {
        fs::write(input.join(format!("measure_{id}.csv")), content).unwrap();
    }

    (input.clone(), input.join("published"))
}

pub(crate) fn written_files(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
