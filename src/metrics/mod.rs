//! Metric battery for RAG answers.
//!
//! Scoring formulas are pure functions in the submodules. Signals that need
//! judgement (claims, entailment, similarity, rubric scores) come from a
//! [`Judge`], so the formulas can be tested against deterministic stubs.
//!
//! A [`MetricVector`] only exists once its core-quality group has been
//! computed; [`MetricBattery::evaluate`] fails as a whole if that group fails.

mod battery;
pub mod domain;
pub mod hallucination;
pub mod judge;
pub mod quality;
pub mod ranking;
pub mod text;

use crate::tracer::{LatencySummary, Stage};
use serde::{Deserialize, Serialize};

pub use battery::{MetricBattery, MetricInput};
pub use domain::{DomainScores, Rubric, RubricSample};
pub use hallucination::HallucinationMetrics;
pub use judge::{Judge, LexicalJudge, LlmJudge};
pub use quality::CorrectnessWeights;
pub use ranking::RankingScores;

/// Core quality group. Always present on a stored metric vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreMetrics {
    pub faithfulness: f64,
    pub answer_relevancy: f64,
    /// `None` when the question has no ground truth.
    pub context_precision: Option<f64>,
    /// `None` when the question has no ground truth.
    pub context_recall: Option<f64>,
    /// `None` when the question has no ground truth.
    pub answer_correctness: Option<f64>,
}

/// Latency breakdown in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub total_ms: f64,
    pub retrieval_ms: f64,
    pub reranking_ms: f64,
    pub generation_ms: f64,
    pub agent_reasoning_ms: f64,
    pub tool_call_ms: f64,
    pub tokens_per_second: Option<f64>,
}

impl LatencyMetrics {
    /// Build from a tracer summary. Throughput is only defined when the
    /// generator reported completion tokens and generation took measurable time.
    pub fn from_summary(summary: &LatencySummary, completion_tokens: Option<u32>) -> Self {
        let generation_ms = summary.stage_ms(Stage::Generation);
        let tokens_per_second = completion_tokens
            .filter(|tokens| *tokens > 0)
            .filter(|_| generation_ms > 0.0)
            .map(|tokens| tokens as f64 / (generation_ms / 1000.0));

        Self {
            total_ms: summary.total_ms.max(0.0),
            retrieval_ms: summary.stage_ms(Stage::Retrieval),
            reranking_ms: summary.stage_ms(Stage::Reranking),
            generation_ms,
            agent_reasoning_ms: summary.stage_ms(Stage::AgentReasoning),
            tool_call_ms: summary.stage_ms(Stage::ToolCall),
            tokens_per_second,
        }
    }
}

/// Every metric computed for one answer, grouped by family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricVector {
    pub core: CoreMetrics,
    pub domain: DomainScores,
    pub hallucination: HallucinationMetrics,
    pub ranking: RankingScores,
    pub latency: LatencyMetrics,
}
