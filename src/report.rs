//! Metric reporting and run artifact persistence.

use crate::error::Result;
use crate::eval::{MetricsReport, PerQueryMetric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Everything needed to inspect or reproduce one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifact {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Retriever adapter name
    pub retriever: String,
    pub benchmark_sha256: String,
    /// Query ids whose retrieval failed and were scored as empty
    pub failed_queries: Vec<String>,
    /// Benchmark entries annotated with their `retrieved` predictions
    pub data: Value,
    pub metrics: BTreeMap<String, f64>,
    pub per_query_metrics: Vec<PerQueryMetric>,
    /// Run configuration
    pub flags: Value,
}

/// Log aggregate metrics (by name) and every per-query value.
pub fn log_report(report: &MetricsReport) {
    log::info!("Metrics:");
    for (name, value) in &report.aggregate {
        log::info!("{}: {}", name, value);
    }

    log::info!("Per-query metrics:");
    for metric in &report.per_query {
        log::info!("Query {}: {} - {}", metric.query_id, metric.measure, metric.value);
    }
}

/// `<unix secs>.<micros>` for `at`.
pub fn artifact_stem(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

/// Write `artifact` into `logs_dir`, creating the directory if needed.
///
/// Files are named by wall-clock timestamp. The file is created exclusively;
/// if the name is taken, `-1`, `-2`, ... is appended until a free one is found.
pub fn persist_artifact(logs_dir: &Path, artifact: &RunArtifact) -> Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)?;

    let stem = artifact_stem(Utc::now());
    let mut attempt = 0usize;
    loop {
        let file_name = if attempt == 0 {
            format!("{}.json", stem)
        } else {
            format!("{}-{}.json", stem, attempt)
        };
        let path = logs_dir.join(file_name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                serde_json::to_writer_pretty(&mut writer, artifact)?;
                writer.write_all(b"\n")?;
                writer.flush()?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                log::debug!("Artifact {} exists, trying next suffix", path.display());
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read a persisted artifact back.
pub fn load_artifact(path: &Path) -> Result<RunArtifact> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
