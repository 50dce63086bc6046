use super::hallucination::{self, HallucinationMetrics};
use super::judge::Judge;
use super::quality::{self, CorrectnessWeights};
use super::ranking;
use super::{CoreMetrics, DomainScores, LatencyMetrics, MetricVector, Rubric, RubricSample};
use crate::config::EvaluationSettings;
use crate::error::Result;
use crate::tracer::LatencySummary;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything the battery needs to score one answer.
#[derive(Debug, Clone, Copy)]
pub struct MetricInput<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    /// Contexts the answer was grounded on; empty for baseline answers.
    pub contexts: &'a [String],
    pub chunk_ids: &'a [String],
    pub ground_truth: Option<&'a str>,
    pub relevant_ids: Option<&'a [String]>,
    pub latency: &'a LatencySummary,
    pub completion_tokens: Option<u32>,
}

/// Runs every metric family over an answer.
#[derive(Clone)]
pub struct MetricBattery {
    judge: Arc<dyn Judge>,
    rubric: Rubric,
    weights: CorrectnessWeights,
}

impl MetricBattery {
    pub fn new(judge: Arc<dyn Judge>, settings: &EvaluationSettings) -> Self {
        Self {
            judge,
            rubric: Rubric::for_domain(&settings.domain),
            weights: CorrectnessWeights {
                factual: settings.factual_weight,
                semantic: settings.semantic_weight,
            },
        }
    }

    pub fn judge_name(&self) -> &str {
        self.judge.name()
    }

    /// Score an answer.
    ///
    /// Errors only when the core-quality group fails; any other metric that
    /// fails is logged and left `None`.
    pub async fn evaluate(&self, input: &MetricInput<'_>) -> Result<MetricVector> {
        let judge = self.judge.as_ref();

        let claims = judge.extract_claims(input.answer).await?;
        // One verification pass feeds both faithfulness and the grounded
        // hallucination rate.
        let support = if claims.is_empty() {
            Vec::new()
        } else {
            judge.verify_claims(&claims, input.contexts).await?
        };
        let core = self.core(input, &support).await?;

        let domain = self.domain(input).await;
        let hallucination = self.hallucination(input, &claims, &support).await;
        let ranking = ranking::ranking_scores(input.chunk_ids, input.relevant_ids);
        let latency = LatencyMetrics::from_summary(input.latency, input.completion_tokens);

        debug!(
            judge = judge.name(),
            claims = claims.len(),
            faithfulness = core.faithfulness,
            "Scored answer"
        );

        Ok(MetricVector {
            core,
            domain,
            hallucination,
            ranking,
            latency,
        })
    }

    async fn core(&self, input: &MetricInput<'_>, support: &[bool]) -> Result<CoreMetrics> {
        let judge = self.judge.as_ref();
        Ok(CoreMetrics {
            faithfulness: quality::faithfulness_score(support),
            answer_relevancy: quality::answer_relevancy(judge, input.question, input.answer)
                .await?,
            context_precision: quality::context_precision(judge, input.ground_truth, input.contexts)
                .await?,
            context_recall: quality::context_recall(judge, input.ground_truth, input.contexts)
                .await?,
            answer_correctness: quality::answer_correctness(
                judge,
                input.answer,
                input.ground_truth,
                self.weights,
            )
            .await?,
        })
    }

    async fn domain(&self, input: &MetricInput<'_>) -> DomainScores {
        let sample = RubricSample {
            question: input.question,
            answer: input.answer,
            contexts: input.contexts,
        };
        match self.judge.score_rubric(&self.rubric, sample).await {
            Ok(scores) => scores.unwrap_or_default(),
            Err(e) => {
                warn!(domain = %self.rubric.domain, error = %e, "Domain metrics failed");
                DomainScores::default()
            }
        }
    }

    async fn hallucination(
        &self,
        input: &MetricInput<'_>,
        claims: &[String],
        support: &[bool],
    ) -> HallucinationMetrics {
        let rate = if input.contexts.is_empty() {
            match hallucination::hallucination_rate_for_claims(
                self.judge.as_ref(),
                input.question,
                claims,
                input.contexts,
            )
            .await
            {
                Ok(rate) => Some(rate),
                Err(e) => {
                    warn!(error = %e, "Hallucination rate failed");
                    None
                }
            }
        } else {
            Some(hallucination::unsupported_rate(support))
        };

        HallucinationMetrics {
            hallucination_rate: rate,
            factual_consistency: hallucination::factual_consistency(claims),
            source_attribution: hallucination::source_attribution(input.answer, input.chunk_ids),
            contradiction_score: hallucination::contradiction_score(claims),
        }
    }
}
