//! Core quality metrics: faithfulness, relevancy, context precision/recall
//! and answer correctness.
//!
//! Each metric has a pure scoring formula over judge verdicts and an async
//! wrapper that gathers those verdicts.

use super::judge::Judge;
use super::text;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Fraction of `true` verdicts, or `empty` when there are none.
fn share_true(verdicts: &[bool], empty: f64) -> f64 {
    if verdicts.is_empty() {
        return empty;
    }
    verdicts.iter().filter(|v| **v).count() as f64 / verdicts.len() as f64
}

/// Ground truth that is missing or blank counts as absent.
pub(crate) fn present(ground_truth: Option<&str>) -> Option<&str> {
    ground_truth.filter(|gt| !gt.trim().is_empty())
}

/// Supported claims over extracted claims. An answer without checkable claims
/// is vacuously faithful.
pub fn faithfulness_score(claim_support: &[bool]) -> f64 {
    share_true(claim_support, 1.0)
}

pub async fn faithfulness(judge: &dyn Judge, answer: &str, contexts: &[String]) -> Result<f64> {
    let claims = judge.extract_claims(answer).await?;
    if claims.is_empty() {
        return Ok(1.0);
    }
    let verdicts = judge.verify_claims(&claims, contexts).await?;
    Ok(faithfulness_score(&verdicts))
}

/// Similarity between the question and the question reconstructed from the
/// answer. Correctness plays no part.
pub async fn answer_relevancy(judge: &dyn Judge, question: &str, answer: &str) -> Result<f64> {
    if answer.trim().is_empty() || question.trim().is_empty() {
        return Ok(0.0);
    }
    let ideal = judge.reconstruct_question(answer).await?;
    if ideal.trim().is_empty() {
        return Ok(0.0);
    }
    Ok(judge.similarity(question, &ideal).await?.clamp(0.0, 1.0))
}

/// Relevant retrieved chunks over retrieved chunks; nothing retrieved scores 0.
pub fn context_precision_score(chunk_relevance: &[bool]) -> f64 {
    share_true(chunk_relevance, 0.0)
}

/// `None` without ground truth.
pub async fn context_precision(
    judge: &dyn Judge,
    ground_truth: Option<&str>,
    contexts: &[String],
) -> Result<Option<f64>> {
    let Some(reference) = present(ground_truth) else {
        return Ok(None);
    };
    if contexts.is_empty() {
        return Ok(Some(0.0));
    }
    let relevance = judge.relevant_passages(reference, contexts).await?;
    Ok(Some(context_precision_score(&relevance)))
}

/// Ground-truth claims found in the contexts over ground-truth claims. A ground
/// truth without checkable claims is vacuously recalled.
pub fn context_recall_score(ground_truth_support: &[bool]) -> f64 {
    share_true(ground_truth_support, 1.0)
}

/// `None` without ground truth.
pub async fn context_recall(
    judge: &dyn Judge,
    ground_truth: Option<&str>,
    contexts: &[String],
) -> Result<Option<f64>> {
    let Some(reference) = present(ground_truth) else {
        return Ok(None);
    };
    let claims = judge.extract_claims(reference).await?;
    if claims.is_empty() {
        return Ok(Some(1.0));
    }
    if contexts.is_empty() {
        return Ok(Some(0.0));
    }
    let verdicts = judge.verify_claims(&claims, contexts).await?;
    Ok(Some(context_recall_score(&verdicts)))
}

/// Blend of factual overlap and semantic similarity in answer correctness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectnessWeights {
    pub factual: f64,
    pub semantic: f64,
}

impl Default for CorrectnessWeights {
    fn default() -> Self {
        Self {
            factual: 0.75,
            semantic: 0.25,
        }
    }
}

/// Weighted mean of the two sub-scores; weights are renormalised.
pub fn answer_correctness_score(factual: f64, semantic: f64, weights: CorrectnessWeights) -> f64 {
    let factual_w = weights.factual.max(0.0);
    let semantic_w = weights.semantic.max(0.0);
    let total = factual_w + semantic_w;
    if total <= 0.0 {
        return 0.0;
    }
    ((factual_w * factual + semantic_w * semantic) / total).clamp(0.0, 1.0)
}

/// `None` without ground truth.
pub async fn answer_correctness(
    judge: &dyn Judge,
    answer: &str,
    ground_truth: Option<&str>,
    weights: CorrectnessWeights,
) -> Result<Option<f64>> {
    let Some(reference) = present(ground_truth) else {
        return Ok(None);
    };
    if answer.trim().is_empty() {
        return Ok(Some(0.0));
    }
    let factual = text::token_f1(answer, reference);
    let semantic = judge.similarity(answer, reference).await?;
    Ok(Some(answer_correctness_score(factual, semantic, weights)))
}
