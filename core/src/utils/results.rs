//! Result enrichment and persistence to JSON or CSV files.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::Local;
use log::info;
use serde_json::Value;

use crate::http::round_to;
use crate::probe::ProbeOutput;

/// Copies `output` and stamps it with the probe name, run time and duration.
pub fn enrich(test_name: &str, output: &ProbeOutput, started: Instant) -> ProbeOutput {
    let mut enriched = output.clone();
    enriched.insert("test_name".into(), Value::String(test_name.to_string()));
    enriched.insert(
        "run_timestamp".into(),
        Value::String(Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
    );
    enriched.insert(
        "duration_seconds".into(),
        Value::from(round_to(started.elapsed().as_secs_f64(), 3)),
    );
    enriched
}

/// Flattens a JSON value into a CSV cell.
fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

fn timestamped_name(test_name: &str, extension: &str) -> String {
    format!("{}-{}.{}", test_name, Local::now().format("%Y%m%d_%H%M%S"), extension)
}

/// Writes enriched results below a single directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create results directory '{}'", self.dir.display()))
    }

    /// Pretty JSON at `<dir>/<test_name>-<YYYYMMDD_HHMMSS>.json`.
    pub fn save_json(&self, test_name: &str, result: &ProbeOutput) -> anyhow::Result<PathBuf> {
        self.save_json_as(&timestamped_name(test_name, "json"), result)
    }

    pub fn save_json_as(&self, file_name: &str, result: &ProbeOutput) -> anyhow::Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json).with_context(|| format!("failed to write '{}'", path.display()))?;
        info!("Saved JSON result to {}", path.display());
        Ok(path)
    }

    /// One CSV row at `<dir>/<test_name>-<YYYYMMDD_HHMMSS>.csv`.
    pub fn save_csv(&self, test_name: &str, result: &ProbeOutput) -> anyhow::Result<PathBuf> {
        self.save_csv_as(&timestamped_name(test_name, "csv"), result)
    }

    /// Appends one row; a new file gets a header of the sorted result keys,
    /// an existing file keeps its own column order.
    pub fn save_csv_as(&self, file_name: &str, result: &ProbeOutput) -> anyhow::Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.dir.join(file_name);

        let existing_header = if path.exists() {
            let mut reader = csv::Reader::from_path(&path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            Some(reader.headers()?.iter().map(str::to_string).collect::<Vec<_>>())
        } else {
            None
        };

        let columns = match &existing_header {
            Some(header) => header.clone(),
            None => {
                let mut keys: Vec<String> = result.keys().cloned().collect();
                keys.sort();
                keys
            }
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open '{}'", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);

        if existing_header.is_none() {
            writer.write_record(&columns)?;
        }
        writer.write_record(columns.iter().map(|k| csv_cell(result.get(k))))?;
        writer.flush()?;

        info!("Saved CSV result to {}", path.display());
        Ok(path)
    }
}
