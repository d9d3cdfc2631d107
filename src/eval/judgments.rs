//! Relevance judgments (qrels) and scored results (run), accumulated per query.

use crate::bench::{Prediction, QueryItem};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Grade given to every golden document. Relevance is binary.
pub const RELEVANT: i32 = 1;

/// A golden document for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qrel {
    pub query_id: String,
    pub doc_id: String,
    pub relevance: i32,
}

/// A retrieved document with its score for a query. Higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub query_id: String,
    pub doc_id: String,
    pub score: f64,
}

/// Append-only accumulator for qrels and the run, in query order.
#[derive(Debug, Default)]
pub struct JudgmentCollector {
    qrels: Vec<Qrel>,
    run: Vec<ScoredDoc>,
    query_ids: Vec<String>,
    seen: HashSet<String>,
}

impl JudgmentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// One qrel per golden document; registers the query even when it has none.
    pub fn record_golden(&mut self, item: &QueryItem) {
        self.register(&item.query_id);
        self.qrels.extend(item.golden.iter().map(|doc_id| Qrel {
            query_id: item.query_id.clone(),
            doc_id: doc_id.clone(),
            relevance: RELEVANT,
        }));
    }

    /// One scored doc per prediction, values untouched.
    pub fn record_predictions(&mut self, query_id: &str, predictions: &[Prediction]) {
        self.register(query_id);
        self.run.extend(predictions.iter().map(|p| ScoredDoc {
            query_id: query_id.to_string(),
            doc_id: p.doc_id.clone(),
            score: p.score,
        }));
    }

    fn register(&mut self, query_id: &str) {
        if self.seen.insert(query_id.to_string()) {
            self.query_ids.push(query_id.to_string());
        }
    }

    pub fn qrels(&self) -> &[Qrel] {
        &self.qrels
    }

    pub fn run(&self) -> &[ScoredDoc] {
        &self.run
    }

    /// Every query seen, in first-seen order.
    pub fn query_ids(&self) -> &[String] {
        &self.query_ids
    }
}
