//! Retrieval adapter: drives an external retriever per query, resolves
//! document ids and scores, and keeps one failing query from sinking the run.

pub mod fts;
pub mod http;
pub mod run_file;

pub use fts::Fts5Retriever;
pub use http::HttpRetriever;
pub use run_file::RunFileRetriever;

use crate::bench::Prediction;
use crate::error::{RagbenchError, Result};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::time::Duration;

/// Metadata key checked first for an explicit score.
pub const SCORE_KEY: &str = "score";
/// Fallback metadata key for rerankers that report a relevance score.
pub const RELEVANCE_SCORE_KEY: &str = "relevance_score";

/// A document as returned by a retriever: an open metadata map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedDocument {
    pub metadata: Map<String, Value>,
}

impl RetrievedDocument {
    pub fn new(metadata: Map<String, Value>) -> Self {
        Self { metadata }
    }

    /// Convenience constructor for a document with an id and an optional score.
    pub fn with_id(id_field: &str, doc_id: &str, score: Option<f64>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(id_field.to_string(), Value::String(doc_id.to_string()));
        if let Some(score) = score {
            metadata.insert(SCORE_KEY.to_string(), Value::from(score));
        }
        Self { metadata }
    }
}

/// An external retriever: query text in, ranked documents out.
pub trait Retriever: Send + Sync {
    /// Short name recorded in run artifacts.
    fn name(&self) -> &str;

    fn retrieve<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<RetrievedDocument>>>;
}

/// Outcome of one query: the predictions, or the error that emptied them.
#[derive(Debug)]
pub struct RetrievalOutcome {
    pub predictions: Vec<Prediction>,
    pub error: Option<RagbenchError>,
}

impl RetrievalOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Wraps a retriever with score resolution, truncation and failure isolation.
pub struct RetrievalAdapter<'r> {
    retriever: &'r dyn Retriever,
    doc_id_field: String,
    top_k: Option<usize>,
    timeout: Option<Duration>,
}

impl<'r> RetrievalAdapter<'r> {
    pub fn new(retriever: &'r dyn Retriever, doc_id_field: impl Into<String>) -> Self {
        Self {
            retriever,
            doc_id_field: doc_id_field.into(),
            top_k: None,
            timeout: None,
        }
    }

    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retriever_name(&self) -> &str {
        self.retriever.name()
    }

    /// Retrieve and normalize, propagating any failure.
    pub async fn try_retrieve(&self, question: &str) -> Result<Vec<Prediction>> {
        let documents = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.retriever.retrieve(question))
                .await
                .map_err(|_| RagbenchError::Timeout(limit.as_millis() as u64))??,
            None => self.retriever.retrieve(question).await?,
        };

        let take = self.top_k.unwrap_or(documents.len());
        documents
            .iter()
            .take(take)
            .enumerate()
            .map(|(position, doc)| to_prediction(doc, position, &self.doc_id_field))
            .collect()
    }

    /// Retrieve for one query; any failure is logged and becomes an empty result set.
    pub async fn retrieve(&self, query_index: usize, question: &str) -> RetrievalOutcome {
        match self.try_retrieve(question).await {
            Ok(predictions) => {
                log::debug!(
                    "Question {}: {} documents retrieved",
                    query_index,
                    predictions.len()
                );
                RetrievalOutcome {
                    predictions,
                    error: None,
                }
            }
            Err(e) => {
                log::error!("Error during retrieval for question {}: {}", query_index, e);
                RetrievalOutcome {
                    predictions: Vec::new(),
                    error: Some(e),
                }
            }
        }
    }
}

/// Resolve id and score for the document at `position` (0-based).
///
/// Score precedence: `score`, then `relevance_score`, then `1/(position+1)`.
pub fn to_prediction(doc: &RetrievedDocument, position: usize, doc_id_field: &str) -> Result<Prediction> {
    let doc_id = match doc.metadata.get(doc_id_field) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(_) => {
            return Err(RagbenchError::MalformedResult(format!(
                "document {} has a non-string or empty '{}'",
                position, doc_id_field
            )))
        }
        None => {
            return Err(RagbenchError::MalformedResult(format!(
                "document {} has no '{}'",
                position, doc_id_field
            )))
        }
    };

    // A null score counts as absent and falls through to the next key
    let explicit = [SCORE_KEY, RELEVANCE_SCORE_KEY]
        .into_iter()
        .find_map(|key| match doc.metadata.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some((key, value)),
        });

    let score = match explicit {
        Some((key, value)) => match value.as_f64() {
            Some(score) if score.is_finite() => score,
            _ => {
                return Err(RagbenchError::MalformedResult(format!(
                    "document {} ({}) has a non-numeric '{}': {}",
                    position, doc_id, key, value
                )))
            }
        },
        None => reciprocal_rank_score(position),
    };

    Ok(Prediction { doc_id, score })
}

/// Synthetic score that keeps the retriever's own ordering.
pub fn reciprocal_rank_score(position: usize) -> f64 {
    1.0 / (position + 1) as f64
}

/// Parse a list of retriever documents: `{"metadata": {...}}` or a flat object.
pub(crate) fn documents_from_values(values: Vec<Value>) -> Result<Vec<RetrievedDocument>> {
    values
        .into_iter()
        .enumerate()
        .map(|(position, value)| match value {
            Value::Object(mut obj) => match obj.remove("metadata") {
                Some(Value::Object(metadata)) => Ok(RetrievedDocument::new(metadata)),
                Some(other) => {
                    obj.insert("metadata".to_string(), other);
                    Ok(RetrievedDocument::new(obj))
                }
                None => Ok(RetrievedDocument::new(obj)),
            },
            other => Err(RagbenchError::MalformedResult(format!(
                "document {} is not an object: {}",
                position, other
            ))),
        })
        .collect()
}
