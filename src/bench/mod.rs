//! Benchmark data model: query items, golden sets, and retrieved predictions.

pub mod loader;

pub use loader::{load_benchmark, parse_benchmark, BenchmarkFields, BenchmarkFormat};

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Key under which predictions are attached to each persisted benchmark entry.
pub const RETRIEVED_KEY: &str = "retrieved";

/// One document the retriever returned for a query, after score resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub doc_id: String,
    pub score: f64,
}

/// Single benchmark entry.
#[derive(Debug, Clone)]
pub struct QueryItem {
    /// Stringified position in the benchmark; unique within a run.
    pub query_id: String,
    /// Position in the benchmark (0-based).
    pub index: usize,
    pub question: String,
    /// Golden document identifiers. Empty when the entry has none.
    pub golden: BTreeSet<String>,
    raw: Map<String, Value>,
    retrieved: Option<Vec<Prediction>>,
}

impl QueryItem {
    pub fn new(
        index: usize,
        question: String,
        golden: BTreeSet<String>,
        raw: Map<String, Value>,
    ) -> Self {
        Self {
            query_id: index.to_string(),
            index,
            question,
            golden,
            raw,
            retrieved: None,
        }
    }

    /// Attach the retriever's predictions after a successful retrieval. An
    /// empty list means the retriever answered with nothing; a failed
    /// retrieval leaves the item unannotated.
    pub fn attach_predictions(&mut self, predictions: Vec<Prediction>) {
        self.retrieved = Some(predictions);
    }

    /// Predictions attached so far; `None` until the query has been processed.
    pub fn retrieved(&self) -> Option<&[Prediction]> {
        self.retrieved.as_deref()
    }

    /// The source entry plus a `retrieved` list of `{<doc_id_field>, score}` objects.
    pub fn to_annotated(&self, doc_id_field: &str) -> Value {
        let mut entry = self.raw.clone();
        if let Some(predictions) = &self.retrieved {
            let retrieved = predictions
                .iter()
                .map(|p| {
                    let mut obj = Map::new();
                    obj.insert(doc_id_field.to_string(), Value::String(p.doc_id.clone()));
                    obj.insert("score".to_string(), Value::from(p.score));
                    Value::Object(obj)
                })
                .collect();
            entry.insert(RETRIEVED_KEY.to_string(), Value::Array(retrieved));
        }
        Value::Object(entry)
    }
}

/// Loaded benchmark, in source order.
#[derive(Debug, Clone)]
pub struct Benchmark {
    pub source: PathBuf,
    /// Hex SHA-256 of the benchmark file contents.
    pub sha256: String,
    pub items: Vec<QueryItem>,
}

impl Benchmark {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All entries with their predictions, as persisted under `data`.
    pub fn annotated_data(&self, doc_id_field: &str) -> Value {
        Value::Array(
            self.items
                .iter()
                .map(|item| item.to_annotated(doc_id_field))
                .collect(),
        )
    }
}
