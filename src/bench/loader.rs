//! Benchmark loading: JSON, JSON Lines and YAML files of one object per query.

use crate::bench::{Benchmark, QueryItem};
use crate::error::{RagbenchError, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;

/// Which entry fields hold the question and the golden documents.
#[derive(Debug, Clone)]
pub struct BenchmarkFields {
    pub question_field: String,
    pub gold_field: String,
}

impl Default for BenchmarkFields {
    fn default() -> Self {
        Self {
            question_field: "question".to_string(),
            gold_field: "context_files".to_string(),
        }
    }
}

/// On-disk benchmark format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkFormat {
    Json,
    JsonLines,
    Yaml,
}

impl BenchmarkFormat {
    /// Pick the format from the file extension; anything unknown is JSON.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match extension.as_str() {
            "jsonl" | "ndjson" => BenchmarkFormat::JsonLines,
            "yaml" | "yml" => BenchmarkFormat::Yaml,
            _ => BenchmarkFormat::Json,
        }
    }
}

/// Load a benchmark file into query items.
///
/// Any syntax or schema problem is a `Parse` error: evaluation never runs on
/// a partially understood benchmark. `max_instances` keeps the first N
/// entries; entries past the cap are not validated.
pub fn load_benchmark(
    path: &Path,
    fields: &BenchmarkFields,
    max_instances: Option<usize>,
) -> Result<Benchmark> {
    let content = std::fs::read_to_string(path)?;
    let format = BenchmarkFormat::from_path(path);
    let items = parse_benchmark(&content, format, fields, max_instances)?;

    let sha256 = format!("{:x}", Sha256::digest(content.as_bytes()));
    log::debug!(
        "Loaded {} benchmark entries from {} ({:?})",
        items.len(),
        path.display(),
        format
    );

    Ok(Benchmark {
        source: path.to_path_buf(),
        sha256,
        items,
    })
}

/// Parse benchmark content that is already in memory.
pub fn parse_benchmark(
    content: &str,
    format: BenchmarkFormat,
    fields: &BenchmarkFields,
    max_instances: Option<usize>,
) -> Result<Vec<QueryItem>> {
    let mut entries = match format {
        BenchmarkFormat::Json => parse_json_array(content)?,
        BenchmarkFormat::JsonLines => parse_json_lines(content)?,
        BenchmarkFormat::Yaml => parse_yaml(content)?,
    };

    if let Some(cap) = max_instances {
        entries.truncate(cap);
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| to_query_item(index, entry, fields))
        .collect()
}

fn parse_json_array(content: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| RagbenchError::Parse(format!("Invalid benchmark JSON: {}", e)))?;
    into_entries(value)
}

fn parse_json_lines(content: &str) -> Result<Vec<Value>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str(line).map_err(|e| {
                RagbenchError::Parse(format!("Invalid JSON on line {}: {}", line_no + 1, e))
            })
        })
        .collect()
}

fn parse_yaml(content: &str) -> Result<Vec<Value>> {
    let value: Value = serde_yaml_ng::from_str(content)
        .map_err(|e| RagbenchError::Parse(format!("Invalid benchmark YAML: {}", e)))?;
    into_entries(value)
}

fn into_entries(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(entries) => Ok(entries),
        other => Err(RagbenchError::Parse(format!(
            "Benchmark must be a list of entries, found {}",
            kind_of(&other)
        ))),
    }
}

fn to_query_item(index: usize, entry: Value, fields: &BenchmarkFields) -> Result<QueryItem> {
    let raw: Map<String, Value> = match entry {
        Value::Object(map) => map,
        other => {
            return Err(RagbenchError::Parse(format!(
                "Entry {} must be an object, found {}",
                index,
                kind_of(&other)
            )))
        }
    };

    let question = match raw.get(&fields.question_field) {
        Some(Value::String(q)) => q.clone(),
        Some(other) => {
            return Err(RagbenchError::Parse(format!(
                "Entry {}: field '{}' must be a string, found {}",
                index,
                fields.question_field,
                kind_of(other)
            )))
        }
        None => {
            return Err(RagbenchError::Parse(format!(
                "Entry {}: missing question field '{}'",
                index, fields.question_field
            )))
        }
    };

    let golden = golden_ids(index, raw.get(&fields.gold_field), &fields.gold_field)?;

    Ok(QueryItem::new(index, question, golden, raw))
}

/// Absent and null both mean "no golden documents"; a bare string is a single one.
fn golden_ids(index: usize, value: Option<&Value>, field: &str) -> Result<BTreeSet<String>> {
    match value {
        None | Some(Value::Null) => Ok(BTreeSet::new()),
        Some(Value::String(id)) => Ok(BTreeSet::from([id.clone()])),
        Some(Value::Array(ids)) => ids
            .iter()
            .map(|id| match id {
                Value::String(s) => Ok(s.clone()),
                other => Err(RagbenchError::Parse(format!(
                    "Entry {}: '{}' must contain strings, found {}",
                    index,
                    field,
                    kind_of(other)
                ))),
            })
            .collect(),
        Some(other) => Err(RagbenchError::Parse(format!(
            "Entry {}: '{}' must be a list of document ids, found {}",
            index,
            field,
            kind_of(other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
