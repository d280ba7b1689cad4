//! JSON export and import of benchmark results

use crate::compare::ComparisonResult;
use crate::error::Result;
use crate::results::BenchmarkResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Anything `llm-bench` writes to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportRecord {
    Run(BenchmarkResult),
    Comparison(ComparisonResult),
}

impl From<BenchmarkResult> for ExportRecord {
    fn from(result: BenchmarkResult) -> Self {
        ExportRecord::Run(result)
    }
}

impl From<ComparisonResult> for ExportRecord {
    fn from(result: ComparisonResult) -> Self {
        ExportRecord::Comparison(result)
    }
}

pub fn save(record: &ExportRecord, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json)?;
    info!("Results saved to: {}", path.display());
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<ExportRecord> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// `<dir>/<label>_<timestamp>.json` with a filesystem-safe label.
pub fn default_output_path(label: &str, output_dir: impl AsRef<Path>) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let safe_label = label.replace([' ', '/', ':'], "_").to_lowercase();
    output_dir
        .as_ref()
        .join(format!("{}_{}.json", safe_label, timestamp))
}
