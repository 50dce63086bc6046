//! Context retrieval contract.
//!
//! The index itself lives outside this crate. The engine relies on three
//! properties of any [`ContextRetriever`]: chunks arrive in descending
//! relevance order, an empty result is a valid outcome, and `min_similarity`
//! filters results rather than guaranteeing a count.

mod http;
mod rerank;

pub use http::HttpRetriever;
pub use rerank::{LexicalReranker, Reranker};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the index is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    Vector,
    Keyword,
    Hybrid,
}

impl RetrievalStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "vector" => Some(RetrievalStrategy::Vector),
            "keyword" => Some(RetrievalStrategy::Keyword),
            "hybrid" => Some(RetrievalStrategy::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetrievalStrategy::Vector => "vector",
            RetrievalStrategy::Keyword => "keyword",
            RetrievalStrategy::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// How the indexed documents were chunked. Forwarded to the retriever so it
/// can select the matching index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    Fixed,
    Sentence,
    Recursive,
    Semantic,
}

impl ChunkingStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Some(ChunkingStrategy::Fixed),
            "sentence" => Some(ChunkingStrategy::Sentence),
            "recursive" => Some(ChunkingStrategy::Recursive),
            "semantic" => Some(ChunkingStrategy::Semantic),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkingStrategy::Fixed => "fixed",
            ChunkingStrategy::Sentence => "sentence",
            ChunkingStrategy::Recursive => "recursive",
            ChunkingStrategy::Semantic => "semantic",
        };
        f.write_str(s)
    }
}

/// Parameters for one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub question: String,
    pub top_k: usize,
    pub min_similarity: f64,
    pub strategy: RetrievalStrategy,
    pub chunking: ChunkingStrategy,
}

/// A chunk returned by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub content: String,
    pub score: f64,
}

impl RetrievedChunk {
    pub fn new(chunk_id: impl Into<String>, content: impl Into<String>, score: f64) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            content: content.into(),
            score,
        }
    }
}

/// Ordered chunks plus the strategy the retriever actually applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
    pub effective_strategy: RetrievalStrategy,
}

impl RetrievalResult {
    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk_id.clone()).collect()
    }

    pub fn contents(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.content.clone()).collect()
    }
}

/// Supplies ranked context chunks for a question.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse_and_display() {
        assert_eq!(RetrievalStrategy::parse("Hybrid"), Some(RetrievalStrategy::Hybrid));
        assert_eq!(RetrievalStrategy::parse("bm25"), None);
        assert_eq!(RetrievalStrategy::Keyword.to_string(), "keyword");
        assert_eq!(ChunkingStrategy::parse("semantic"), Some(ChunkingStrategy::Semantic));
        assert_eq!(ChunkingStrategy::Fixed.to_string(), "fixed");
    }

    #[test]
    fn test_result_accessors() {
        let result = RetrievalResult {
            chunks: vec![
                RetrievedChunk::new("c1", "first", 0.9),
                RetrievedChunk::new("c2", "second", 0.5),
            ],
            effective_strategy: RetrievalStrategy::Vector,
        };
        assert_eq!(result.chunk_ids(), vec!["c1", "c2"]);
        assert_eq!(result.contents(), vec!["first", "second"]);
    }
}
