//! Hallucination-family metrics.
//!
//! The rate is judge-backed; consistency, attribution and contradiction are
//! lexical and can each be skipped (`None`) when their signal is missing.

use super::judge::Judge;
use super::text;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Claims about the same subject share at least this much of their subject terms.
const SAME_SUBJECT_JACCARD: f64 = 0.5;

/// Hallucination metric group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HallucinationMetrics {
    pub hallucination_rate: Option<f64>,
    pub factual_consistency: Option<f64>,
    pub source_attribution: Option<f64>,
    /// Share of same-subject claim pairs that contradict each other.
    pub contradiction_score: Option<f64>,
}

/// Fraction of `false` verdicts; `0.0` when there are no claims.
pub fn unsupported_rate(verdicts: &[bool]) -> f64 {
    if verdicts.is_empty() {
        return 0.0;
    }
    verdicts.iter().filter(|v| !**v).count() as f64 / verdicts.len() as f64
}

/// Fraction of answer claims without grounding.
///
/// With contexts, a claim is grounded when a context entails it. Without
/// contexts (always the case for baseline answers) the judge's intrinsic
/// plausibility check stands in, so the rate stays defined.
pub async fn hallucination_rate(
    judge: &dyn Judge,
    question: &str,
    answer: &str,
    contexts: &[String],
) -> Result<f64> {
    let claims = judge.extract_claims(answer).await?;
    hallucination_rate_for_claims(judge, question, &claims, contexts).await
}

/// Hallucination rate over claims already extracted from the answer.
pub async fn hallucination_rate_for_claims(
    judge: &dyn Judge,
    question: &str,
    claims: &[String],
    contexts: &[String],
) -> Result<f64> {
    if claims.is_empty() {
        return Ok(0.0);
    }
    let verdicts = if contexts.is_empty() {
        judge.assess_plausibility(question, claims).await?
    } else {
        judge.verify_claims(claims, contexts).await?
    };
    Ok(unsupported_rate(&verdicts))
}

/// Content terms that identify what a claim is about.
fn subject_terms(claim: &str) -> HashSet<String> {
    let numbers = text::numbers(claim);
    text::content_terms(claim)
        .into_iter()
        .filter(|t| !text::is_negation(t) && !numbers.contains(t))
        .collect()
}

/// Index pairs of claims that talk about the same subject.
fn same_subject_pairs(claims: &[String]) -> Vec<(usize, usize)> {
    let subjects: Vec<HashSet<String>> = claims.iter().map(|c| subject_terms(c)).collect();
    let mut pairs = Vec::new();
    for i in 0..claims.len() {
        for j in (i + 1)..claims.len() {
            if text::jaccard(&subjects[i], &subjects[j]) >= SAME_SUBJECT_JACCARD {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Agreement of repeated numeric facts across same-subject claims.
///
/// `None` with fewer than two claims; `1.0` when no repeated facts exist.
pub fn factual_consistency(claims: &[String]) -> Option<f64> {
    if claims.len() < 2 {
        return None;
    }
    let numbers: Vec<HashSet<String>> = claims.iter().map(|c| text::numbers(c)).collect();
    let comparable: Vec<(usize, usize)> = same_subject_pairs(claims)
        .into_iter()
        .filter(|(i, j)| !numbers[*i].is_empty() && !numbers[*j].is_empty())
        .collect();
    if comparable.is_empty() {
        return Some(1.0);
    }
    let consistent = comparable
        .iter()
        .filter(|(i, j)| numbers[*i] == numbers[*j])
        .count();
    Some(consistent as f64 / comparable.len() as f64)
}

/// Share of same-subject claim pairs with opposite polarity. `0.0` means the
/// answer never contradicts itself; `None` with fewer than two claims.
pub fn contradiction_score(claims: &[String]) -> Option<f64> {
    if claims.len() < 2 {
        return None;
    }
    let pairs = same_subject_pairs(claims);
    if pairs.is_empty() {
        return Some(0.0);
    }
    let negated: Vec<bool> = claims.iter().map(|c| text::is_negated(c)).collect();
    let contradicting = pairs.iter().filter(|(i, j)| negated[*i] != negated[*j]).count();
    Some(contradicting as f64 / pairs.len() as f64)
}

/// Citation markers found in an answer, in order.
pub fn citations(answer: &str) -> Vec<String> {
    text::CITATION
        .captures_iter(answer)
        .filter_map(|cap| cap.get(1))
        .flat_map(|m| {
            m.as_str()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Share of citations that resolve to a supplied chunk, either by 1-based
/// position or by chunk id. `None` when the answer cites nothing.
pub fn source_attribution(answer: &str, chunk_ids: &[String]) -> Option<f64> {
    let cited = citations(answer);
    if cited.is_empty() {
        return None;
    }
    let resolved = cited
        .iter()
        .filter(|c| {
            let by_position = c
                .parse::<usize>()
                .is_ok_and(|n| n >= 1 && n <= chunk_ids.len());
            by_position || chunk_ids.iter().any(|id| id == *c)
        })
        .count();
    Some(resolved as f64 / cited.len() as f64)
}
