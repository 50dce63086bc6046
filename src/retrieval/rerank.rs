//! Reranking of retrieved chunks.

use super::RetrievedChunk;
use crate::metrics::text;
use async_trait::async_trait;

/// Reorders retrieved chunks for a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_k: usize,
    ) -> Vec<RetrievedChunk>;
}

/// Blends the retriever's score with query-term coverage of each chunk.
pub struct LexicalReranker {
    /// Weight of the lexical coverage score, in [0, 1].
    pub lexical_weight: f64,
}

impl Default for LexicalReranker {
    fn default() -> Self {
        Self {
            lexical_weight: 0.5,
        }
    }
}

#[async_trait]
impl Reranker for LexicalReranker {
    async fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_k: usize,
    ) -> Vec<RetrievedChunk> {
        let weight = self.lexical_weight.clamp(0.0, 1.0);
        let query_terms = text::content_terms(query);

        let mut rescored: Vec<RetrievedChunk> = chunks
            .into_iter()
            .map(|mut chunk| {
                let coverage = text::coverage(&query_terms, &text::content_terms(&chunk.content));
                chunk.score = (1.0 - weight) * chunk.score + weight * coverage;
                chunk
            })
            .collect();

        rescored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rescored.truncate(top_k);
        rescored
    }
}
