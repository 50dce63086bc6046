//! Retrieval ranking quality against known-relevant chunk ids.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Retrieval-ranking metric group. All `None` when relevant ids are unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingScores {
    pub ndcg: Option<f64>,
    pub mrr: Option<f64>,
    pub precision: Option<f64>,
}

/// Binary relevance per rank; repeated ids only count at their first rank.
fn gains(retrieved: &[String], relevant: &HashSet<&str>) -> Vec<f64> {
    let mut seen = HashSet::new();
    retrieved
        .iter()
        .map(|id| {
            if relevant.contains(id.as_str()) && seen.insert(id.as_str()) {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

fn dcg(gains: &[f64]) -> f64 {
    gains
        .iter()
        .enumerate()
        .map(|(i, rel)| rel / (i as f64 + 2.0).log2())
        .sum()
}

/// nDCG over the full retrieved list.
pub fn ndcg(retrieved: &[String], relevant: &HashSet<&str>) -> f64 {
    let actual = dcg(&gains(retrieved, relevant));
    let ideal_hits = relevant.len().min(retrieved.len());
    let ideal = dcg(&vec![1.0; ideal_hits]);
    if ideal == 0.0 {
        return 0.0;
    }
    (actual / ideal).clamp(0.0, 1.0)
}

/// Reciprocal rank of the first relevant chunk; `0.0` when none is retrieved.
pub fn reciprocal_rank(retrieved: &[String], relevant: &HashSet<&str>) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map(|i| 1.0 / (i as f64 + 1.0))
        .unwrap_or(0.0)
}

/// Relevant retrieved chunks over retrieved chunks.
pub fn precision(retrieved: &[String], relevant: &HashSet<&str>) -> f64 {
    if retrieved.is_empty() {
        return 0.0;
    }
    let hits: f64 = gains(retrieved, relevant).iter().sum();
    hits / retrieved.len() as f64
}

/// All three ranking metrics, or all `None` when `relevant_ids` is not supplied.
pub fn ranking_scores(retrieved: &[String], relevant_ids: Option<&[String]>) -> RankingScores {
    let Some(relevant_ids) = relevant_ids else {
        return RankingScores::default();
    };
    let relevant: HashSet<&str> = relevant_ids.iter().map(String::as_str).collect();
    RankingScores {
        ndcg: Some(ndcg(retrieved, &relevant)),
        mrr: Some(reciprocal_rank(retrieved, &relevant)),
        precision: Some(precision(retrieved, &relevant)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_relevant_ids_leaves_scores_null() {
        let scores = ranking_scores(&ids(&["a", "b"]), None);
        assert_eq!(scores, RankingScores::default());
    }

    #[test]
    fn test_perfect_ranking() {
        let scores = ranking_scores(&ids(&["a", "b", "c"]), Some(ids(&["a", "b"]).as_slice()));
        assert_eq!(scores.ndcg, Some(1.0));
        assert_eq!(scores.mrr, Some(1.0));
        assert!((scores.precision.unwrap() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_relevant_at_second_rank() {
        let scores = ranking_scores(&ids(&["x", "a", "y"]), Some(ids(&["a"]).as_slice()));
        assert_eq!(scores.mrr, Some(0.5));
        let expected = (1.0 / 3f64.log2()) / 1.0;
        assert!((scores.ndcg.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs() {
        let empty = ranking_scores(&[], Some(ids(&["a"]).as_slice()));
        assert_eq!(empty.ndcg, Some(0.0));
        assert_eq!(empty.mrr, Some(0.0));
        assert_eq!(empty.precision, Some(0.0));

        let none_relevant = ranking_scores(&ids(&["a"]), Some(&[]));
        assert_eq!(none_relevant.ndcg, Some(0.0));
        assert_eq!(none_relevant.precision, Some(0.0));
    }

    #[test]
    fn test_duplicates_count_once() {
        let relevant: HashSet<&str> = ["a"].into_iter().collect();
        assert_eq!(precision(&ids(&["a", "a"]), &relevant), 0.5);
        assert!(ndcg(&ids(&["a", "a"]), &relevant) <= 1.0);
    }
}
