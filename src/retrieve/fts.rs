use crate::db::IndexDb;
use crate::error::{Result, RagbenchError};
use crate::retrieve::{RetrievedDocument, Retriever, SCORE_KEY};
use futures_util::future::BoxFuture;
use rusqlite::params;
use serde_json::{Map, Value};
use std::path::Path;

/// Rows fetched per query when no top_k is configured.
const DEFAULT_LIMIT: usize = 20;

/// Sanitize and format FTS5 query string for optimal matching
///
/// Removes FTS5 special characters that cause syntax errors (? * etc.),
/// filters out common stop words and ORs the remaining terms for recall.
pub fn sanitize_fts5_query(query: &str) -> String {
    // FTS5: ? * ( ) { } - ' : ^ cause "syntax error near ..." in MATCH
    let cleaned: String = query
        .trim()
        .chars()
        .filter(|c| !matches!(c, '?' | '*' | '(' | ')' | '{' | '}' | '-' | '\'' | ':' | '^'))
        .collect();

    // Stop words add noise and match nearly every chunk
    let stop_words: std::collections::HashSet<&str> = [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with",
        "by", "from", "as", "is", "are", "was", "were", "be", "been", "being", "have",
        "has", "had", "do", "does", "did", "will", "would", "should", "could", "what",
        "which", "who", "where", "when", "why", "how", "this", "that", "these", "those"
    ].iter().cloned().collect();

    let terms: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|term| {
            // Keep terms that are not stop words and have at least 2 characters
            let lower = term.to_lowercase();
            !stop_words.contains(lower.as_str()) && term.len() >= 2
        })
        .collect();

    // All terms filtered: fall back to the cleaned query, quotes escaped
    if terms.is_empty() {
        return cleaned.replace('"', "\"\"");
    }

    // OR the terms for recall; any matching term is better than none.
    // FTS5 keywords (AND/OR/NOT/NEAR) are only operators when unquoted
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Map a BM25 score (negative, lower = better) into 0-1 where higher = better
pub fn normalize_bm25_score(raw_score: f64) -> f64 {
    if raw_score.is_nan() || raw_score.is_infinite() {
        return 0.0;
    }
    // Sigmoid over the raw score: good matches are negative, so exp(raw_score)
    // is small and the result approaches 1.0 (exp(-5.0) ~ 0.0067 -> ~0.993)
    1.0 / (1.0 + raw_score.exp())
}

/// BM25 retriever over an existing SQLite FTS5 index
///
/// Expects the `documents` / `chunks` / `chunks_fts` layout: one FTS row per
/// chunk, joined back to its document's `doc_path`. Each matching chunk is one
/// retrieved document with `file_path` set to that path, so a file can appear
/// several times in a ranking.
pub struct Fts5Retriever {
    db: IndexDb,
    limit: usize,
    doc_id_field: String,
}

impl Fts5Retriever {
    pub fn new<P: AsRef<Path>>(index_db: P, top_k: Option<usize>, doc_id_field: &str) -> Self {
        Self {
            db: IndexDb::new(index_db),
            limit: top_k.unwrap_or(DEFAULT_LIMIT),
            doc_id_field: doc_id_field.to_string(),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let start = std::time::Instant::now();

        // FTS5 rejects empty MATCH expressions
        let sanitized = sanitize_fts5_query(query);
        if sanitized.trim().is_empty() {
            return Ok(Vec::new());
        }

        let limit = self.limit as i64;
        let id_field = self.doc_id_field.clone();
        let documents = self
            .db
            .with_connection(move |conn| {
                // One row per matching chunk; bm25() is lower-is-better, so
                // ascending order puts the best match first
                let mut stmt = conn.prepare(
                    r#"
                    SELECT
                        c.chunk_id,
                        c.section_header,
                        d.doc_path,
                        bm25(chunks_fts) AS raw_score
                    FROM chunks_fts
                    JOIN chunks c ON chunks_fts.chunk_id = c.chunk_id
                    JOIN documents d ON c.doc_id = d.doc_id
                    WHERE chunks_fts MATCH ?1
                    ORDER BY raw_score
                    LIMIT ?2
                    "#,
                )?;

                let mut rows = stmt.query(params![sanitized, limit])?;
                let mut documents = Vec::new();
                while let Some(row) = rows.next()? {
                    let chunk_id: String = row.get(0)?;
                    let section: Option<String> = row.get(1)?;
                    let doc_path: String = row.get(2)?;
                    let raw_score: f64 = row.get(3)?;

                    // The document path is the id; several chunks of one file
                    // share it, chunk_id tells them apart
                    let mut metadata = Map::new();
                    metadata.insert(id_field.clone(), Value::String(doc_path));
                    metadata.insert(SCORE_KEY.to_string(), Value::from(normalize_bm25_score(raw_score)));
                    metadata.insert("chunk_id".to_string(), Value::String(chunk_id));
                    if let Some(section) = section {
                        metadata.insert("section".to_string(), Value::String(section));
                    }
                    documents.push(RetrievedDocument::new(metadata));
                }
                Ok::<_, RagbenchError>(documents)
            })
            .await?;

        log::debug!(
            "BM25 search took {:?}, returned {} results",
            start.elapsed(),
            documents.len()
        );
        Ok(documents)
    }
}

impl Retriever for Fts5Retriever {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn retrieve<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<RetrievedDocument>>> {
        Box::pin(self.search(query))
    }
}
