//! Retriever backed by an external HTTP search service.

use super::{ContextRetriever, RetrievalRequest, RetrievalResult, RetrievalStrategy, RetrievedChunk};
use crate::config::RetrievalConfig;
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    min_similarity: f64,
    strategy: RetrievalStrategy,
    chunking: super::ChunkingStrategy,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    chunks: Vec<SearchHit>,
    #[serde(default)]
    strategy: Option<RetrievalStrategy>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(alias = "id")]
    chunk_id: String,
    #[serde(alias = "text")]
    content: String,
    #[serde(default, alias = "similarity")]
    score: f64,
}

/// Posts retrieval requests as JSON to a configured endpoint.
#[derive(Clone)]
pub struct HttpRetriever {
    client: Client,
    config: RetrievalConfig,
}

impl HttpRetriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn into_result(response: SearchResponse, request: &RetrievalRequest) -> RetrievalResult {
        let mut chunks: Vec<RetrievedChunk> = response
            .chunks
            .into_iter()
            .filter(|hit| hit.score >= request.min_similarity)
            .map(|hit| RetrievedChunk::new(hit.chunk_id, hit.content, hit.score))
            .collect();

        // Stable sort keeps the service's order among equal scores.
        chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        chunks.truncate(request.top_k);

        RetrievalResult {
            chunks,
            effective_strategy: response.strategy.unwrap_or(request.strategy),
        }
    }
}

#[async_trait]
impl ContextRetriever for HttpRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult> {
        let body = SearchRequest {
            query: &request.question,
            top_k: request.top_k,
            min_similarity: request.min_similarity,
            strategy: request.strategy,
            chunking: request.chunking,
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(EvalError::Retrieval(format!(
                "Request failed ({}): {}",
                status, text
            )));
        }

        let parsed: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| EvalError::Retrieval(format!("Malformed retrieval response: {}", e)))?;

        let result = Self::into_result(parsed, request);
        debug!(
            chunks = result.chunks.len(),
            strategy = %result.effective_strategy,
            "retrieved context"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ChunkingStrategy;

    fn request() -> RetrievalRequest {
        RetrievalRequest {
            question: "q".to_string(),
            top_k: 2,
            min_similarity: 0.3,
            strategy: RetrievalStrategy::Hybrid,
            chunking: ChunkingStrategy::Recursive,
        }
    }

    #[test]
    fn test_response_is_filtered_sorted_and_truncated() {
        let json = r#"{
            "chunks": [
                {"id": "a", "text": "low", "similarity": 0.1},
                {"chunk_id": "b", "content": "mid", "score": 0.5},
                {"chunk_id": "c", "content": "high", "score": 0.9},
                {"chunk_id": "d", "content": "also mid", "score": 0.4}
            ],
            "strategy": "keyword"
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let result = HttpRetriever::into_result(parsed, &request());

        assert_eq!(result.chunk_ids(), vec!["c", "b"]);
        assert_eq!(result.effective_strategy, RetrievalStrategy::Keyword);
    }

    #[test]
    fn test_empty_response_is_valid() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        let result = HttpRetriever::into_result(parsed, &request());
        assert!(result.chunks.is_empty());
        assert_eq!(result.effective_strategy, RetrievalStrategy::Hybrid);
    }

    #[test]
    fn test_request_serialization() {
        let req = request();
        let body = SearchRequest {
            query: &req.question,
            top_k: req.top_k,
            min_similarity: req.min_similarity,
            strategy: req.strategy,
            chunking: req.chunking,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["strategy"], "hybrid");
        assert_eq!(json["chunking"], "recursive");
        assert_eq!(json["top_k"], 2);
    }
}
