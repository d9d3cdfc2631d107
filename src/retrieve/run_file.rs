//! Replay retriever: serves predictions recorded ahead of time.

use crate::bench::RETRIEVED_KEY;
use crate::error::{RagbenchError, Result};
use crate::retrieve::{documents_from_values, RetrievedDocument, Retriever};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Retriever that looks questions up in a predictions file.
///
/// Two layouts are accepted:
/// - an object mapping question text to a list of documents;
/// - a previous run artifact (`data` + `metrics`), whose entries carry the
///   question field and a `retrieved` list. This re-scores an old run under a
///   different metric suite or benchmark cap without calling the retriever.
pub struct RunFileRetriever {
    responses: HashMap<String, Vec<RetrievedDocument>>,
}

impl RunFileRetriever {
    pub fn from_path(path: &Path, question_field: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            RagbenchError::Parse(format!("Invalid predictions file {}: {}", path.display(), e))
        })?;
        let retriever = Self::from_value(value, question_field)?;
        log::info!(
            "Loaded predictions for {} questions from {}",
            retriever.len(),
            path.display()
        );
        Ok(retriever)
    }

    pub fn from_value(value: Value, question_field: &str) -> Result<Self> {
        let Value::Object(obj) = value else {
            return Err(RagbenchError::Parse(
                "Predictions file must be a JSON object".to_string(),
            ));
        };

        let responses = if is_artifact(&obj) {
            from_artifact(obj, question_field)?
        } else {
            from_mapping(obj)?
        };

        Ok(Self { responses })
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl Retriever for RunFileRetriever {
    fn name(&self) -> &str {
        "run_file"
    }

    fn retrieve<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<RetrievedDocument>>> {
        Box::pin(async move {
            self.responses.get(query).cloned().ok_or_else(|| {
                RagbenchError::Retrieval(format!("No recorded predictions for question: {}", query))
            })
        })
    }
}

fn is_artifact(obj: &Map<String, Value>) -> bool {
    matches!(obj.get("data"), Some(Value::Array(_))) && obj.contains_key("metrics")
}

fn from_mapping(obj: Map<String, Value>) -> Result<HashMap<String, Vec<RetrievedDocument>>> {
    obj.into_iter()
        .map(|(question, docs)| match docs {
            Value::Array(docs) => Ok((question, documents_from_values(docs)?)),
            other => Err(RagbenchError::Parse(format!(
                "Predictions for '{}' must be a list, found {}",
                question, other
            ))),
        })
        .collect()
}

/// Entries without a `retrieved` list failed in the recorded run; they stay
/// absent so they fail again on replay.
fn from_artifact(
    mut obj: Map<String, Value>,
    question_field: &str,
) -> Result<HashMap<String, Vec<RetrievedDocument>>> {
    let Some(Value::Array(entries)) = obj.remove("data") else {
        return Ok(HashMap::new());
    };

    let mut responses = HashMap::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let Value::Object(mut entry) = entry else {
            return Err(RagbenchError::Parse(format!("Artifact entry {} is not an object", index)));
        };
        let question = match entry.remove(question_field) {
            Some(Value::String(q)) => q,
            _ => {
                return Err(RagbenchError::Parse(format!(
                    "Artifact entry {} has no string '{}'",
                    index, question_field
                )))
            }
        };
        if let Some(Value::Array(docs)) = entry.remove(RETRIEVED_KEY) {
            responses
                .entry(question)
                .or_insert(documents_from_values(docs)?);
        }
    }
    Ok(responses)
}
