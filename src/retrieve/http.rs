use crate::error::{RagbenchError, Result};
use crate::retrieve::{documents_from_values, RetrievedDocument, Retriever};
use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Request body sent to the retrieval service
#[derive(Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
}

/// Retriever backed by a remote HTTP service
///
/// POSTs `{"query": ..., "top_k": ...}` as JSON and accepts either a bare
/// list of documents or `{"documents": [...]}`. Each document is a flat
/// metadata object or `{"metadata": {...}}`.
pub struct HttpRetriever {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    top_k: Option<usize>,
}

impl HttpRetriever {
    /// Create a new HTTP retriever
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Full URL of the retrieve endpoint
    /// * `api_key` - Optional bearer token
    /// * `top_k` - Forwarded to the service when set
    pub fn new(endpoint: String, api_key: Option<String>, top_k: Option<usize>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            top_k,
        })
    }

    async fn post(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let request = RetrieveRequest {
            query,
            top_k: self.top_k,
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RagbenchError::Retrieval(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(RagbenchError::Retrieval(format!(
                "Retriever returned {}: {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RagbenchError::Retrieval(format!("Failed to parse response: {}", e)))?;

        parse_response(body)
    }
}

impl Retriever for HttpRetriever {
    fn name(&self) -> &str {
        "http"
    }

    fn retrieve<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<Vec<RetrievedDocument>>> {
        Box::pin(self.post(query))
    }
}

/// Accept `[...]` or `{"documents": [...]}`.
fn parse_response(body: Value) -> Result<Vec<RetrievedDocument>> {
    match body {
        Value::Array(docs) => documents_from_values(docs),
        Value::Object(mut obj) => match obj.remove("documents") {
            Some(Value::Array(docs)) => documents_from_values(docs),
            _ => Err(RagbenchError::MalformedResult(
                "response object has no 'documents' list".to_string(),
            )),
        },
        other => Err(RagbenchError::MalformedResult(format!(
            "unexpected response body: {}",
            other
        ))),
    }
}
