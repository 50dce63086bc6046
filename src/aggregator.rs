//! Aggregation of per-question metrics into run-level statistics.
//!
//! Everything here is a pure function of persisted records, so repeated
//! aggregation over unchanged data yields identical summaries.

use crate::metrics::MetricVector;
use crate::model::{EvaluationQuestion, EvaluationRun, RunStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mean over the valid (present, finite) samples; `0.0` when there are none.
pub fn mean(values: impl IntoIterator<Item = Option<f64>>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Relative improvement of `rag` over `baseline`, in percent.
///
/// A zero baseline yields `100` when the RAG value is positive and `0`
/// otherwise.
pub fn improvement_percent(rag: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        return if rag > 0.0 { 100.0 } else { 0.0 };
    }
    (rag - baseline) / baseline * 100.0
}

/// Relative reduction of a lower-is-better metric, in percent. Nothing to
/// reduce from a zero baseline.
pub fn reduction_percent(rag: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (baseline - rag) / baseline * 100.0
}

/// Means of every metric over a set of metric vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricMeans {
    pub samples: usize,
    pub faithfulness: f64,
    pub answer_relevancy: f64,
    pub context_precision: f64,
    pub context_recall: f64,
    pub answer_correctness: f64,
    pub academic_rigor: f64,
    pub citation_accuracy: f64,
    pub terminology_correctness: f64,
    pub hallucination_rate: f64,
    pub factual_consistency: f64,
    pub source_attribution: f64,
    pub contradiction_score: f64,
    pub ndcg: f64,
    pub mrr: f64,
    pub retrieval_precision: f64,
    pub total_ms: f64,
    pub retrieval_ms: f64,
    pub reranking_ms: f64,
    pub generation_ms: f64,
    pub agent_reasoning_ms: f64,
    pub tokens_per_second: f64,
}

impl MetricMeans {
    pub fn from_vectors(vectors: &[&MetricVector]) -> Self {
        let avg = |f: fn(&MetricVector) -> Option<f64>| mean(vectors.iter().map(|v| f(v)));

        Self {
            samples: vectors.len(),
            faithfulness: avg(|v| Some(v.core.faithfulness)),
            answer_relevancy: avg(|v| Some(v.core.answer_relevancy)),
            context_precision: avg(|v| v.core.context_precision),
            context_recall: avg(|v| v.core.context_recall),
            answer_correctness: avg(|v| v.core.answer_correctness),
            academic_rigor: avg(|v| v.domain.academic_rigor),
            citation_accuracy: avg(|v| v.domain.citation_accuracy),
            terminology_correctness: avg(|v| v.domain.terminology_correctness),
            hallucination_rate: avg(|v| v.hallucination.hallucination_rate),
            factual_consistency: avg(|v| v.hallucination.factual_consistency),
            source_attribution: avg(|v| v.hallucination.source_attribution),
            contradiction_score: avg(|v| v.hallucination.contradiction_score),
            ndcg: avg(|v| v.ranking.ndcg),
            mrr: avg(|v| v.ranking.mrr),
            retrieval_precision: avg(|v| v.ranking.precision),
            total_ms: avg(|v| Some(v.latency.total_ms)),
            retrieval_ms: avg(|v| Some(v.latency.retrieval_ms)),
            reranking_ms: avg(|v| Some(v.latency.reranking_ms)),
            generation_ms: avg(|v| Some(v.latency.generation_ms)),
            agent_reasoning_ms: avg(|v| Some(v.latency.agent_reasoning_ms)),
            tokens_per_second: avg(|v| v.latency.tokens_per_second),
        }
    }
}

/// Percent improvement of RAG over baseline per core metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Improvements {
    pub faithfulness: f64,
    pub answer_relevancy: f64,
    pub context_precision: f64,
    pub context_recall: f64,
    pub answer_correctness: f64,
    /// Lower is better, so this is a reduction rather than a gain.
    pub hallucination_reduction: f64,
}

impl Improvements {
    pub fn between(rag: &MetricMeans, baseline: &MetricMeans) -> Self {
        Self {
            faithfulness: improvement_percent(rag.faithfulness, baseline.faithfulness),
            answer_relevancy: improvement_percent(rag.answer_relevancy, baseline.answer_relevancy),
            context_precision: improvement_percent(
                rag.context_precision,
                baseline.context_precision,
            ),
            context_recall: improvement_percent(rag.context_recall, baseline.context_recall),
            answer_correctness: improvement_percent(
                rag.answer_correctness,
                baseline.answer_correctness,
            ),
            hallucination_reduction: reduction_percent(
                rag.hallucination_rate,
                baseline.hallucination_rate,
            ),
        }
    }
}

/// Run-level comparison of RAG against the baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Option<Uuid>,
    pub run_name: Option<String>,
    pub question_count: usize,
    pub evaluated_count: usize,
    pub failed_count: usize,
    pub rag: MetricMeans,
    pub baseline: MetricMeans,
    pub improvements: Improvements,
    /// RAG answer correctness mean strictly above the baseline's.
    pub rag_better: bool,
}

/// Summarize a run's questions. Questions without metrics are skipped.
pub fn summarize(questions: &[EvaluationQuestion]) -> RunSummary {
    let rag_vectors: Vec<&MetricVector> =
        questions.iter().filter_map(|q| q.rag_metrics.as_ref()).collect();
    let baseline_vectors: Vec<&MetricVector> = questions
        .iter()
        .filter_map(|q| q.baseline_metrics.as_ref())
        .collect();

    let rag = MetricMeans::from_vectors(&rag_vectors);
    let baseline = MetricMeans::from_vectors(&baseline_vectors);
    let improvements = Improvements::between(&rag, &baseline);

    RunSummary {
        run_id: None,
        run_name: None,
        question_count: questions.len(),
        evaluated_count: rag_vectors.len(),
        failed_count: questions.iter().filter(|q| q.error.is_some()).count(),
        rag_better: rag.answer_correctness > baseline.answer_correctness,
        rag,
        baseline,
        improvements,
    }
}

/// Summarize a persisted run.
pub fn summarize_run(run: &EvaluationRun, questions: &[EvaluationQuestion]) -> RunSummary {
    RunSummary {
        run_id: Some(run.id),
        run_name: Some(run.name.clone()),
        ..summarize(questions)
    }
}

impl RunSummary {
    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Evaluation Summary ==========");
        if let Some(name) = &self.run_name {
            println!("Run: {}", name);
        }
        if let Some(id) = &self.run_id {
            println!("Id:  {}", id);
        }
        println!(
            "Questions: {} ({} evaluated, {} failed)",
            self.question_count, self.evaluated_count, self.failed_count
        );
        println!("-----------------------------------------");
        println!("{:<22} {:>8} {:>9} {:>9}", "Metric", "RAG", "Baseline", "Change");
        let rows = [
            (
                "Faithfulness",
                self.rag.faithfulness,
                self.baseline.faithfulness,
                self.improvements.faithfulness,
            ),
            (
                "Answer relevancy",
                self.rag.answer_relevancy,
                self.baseline.answer_relevancy,
                self.improvements.answer_relevancy,
            ),
            (
                "Context precision",
                self.rag.context_precision,
                self.baseline.context_precision,
                self.improvements.context_precision,
            ),
            (
                "Context recall",
                self.rag.context_recall,
                self.baseline.context_recall,
                self.improvements.context_recall,
            ),
            (
                "Answer correctness",
                self.rag.answer_correctness,
                self.baseline.answer_correctness,
                self.improvements.answer_correctness,
            ),
        ];
        for (label, rag, baseline, change) in rows {
            println!("{:<22} {:>8.3} {:>9.3} {:>+8.1}%", label, rag, baseline, change);
        }
        println!(
            "{:<22} {:>8.3} {:>9.3} {:>+8.1}%",
            "Hallucination rate",
            self.rag.hallucination_rate,
            self.baseline.hallucination_rate,
            -self.improvements.hallucination_reduction
        );
        println!("-----------------------------------------");
        println!("Avg latency:      {:.0}ms", self.rag.total_ms);
        println!("  retrieval:      {:.0}ms", self.rag.retrieval_ms);
        println!("  reranking:      {:.0}ms", self.rag.reranking_ms);
        println!("  agent reasoning:{:.0}ms", self.rag.agent_reasoning_ms);
        println!("  generation:     {:.0}ms", self.rag.generation_ms);
        if self.rag.ndcg > 0.0 || self.rag.mrr > 0.0 {
            println!(
                "Ranking: nDCG {:.3}, MRR {:.3}, precision {:.3}",
                self.rag.ndcg, self.rag.mrr, self.rag.retrieval_precision
            );
        }
        println!("-----------------------------------------");
        println!(
            "RAG better than baseline: {}",
            if self.rag_better { "yes" } else { "no" }
        );
        println!("=========================================\n");
    }
}

/// Hallucination statistics across completed runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HallucinationSummary {
    pub run_count: usize,
    pub question_count: usize,
    pub hallucination_rate: f64,
    pub factual_consistency: f64,
    pub source_attribution: f64,
    /// `1 - contradiction_score`: higher means fewer self-contradictions.
    pub contradiction_free: f64,
    pub baseline_hallucination_rate: f64,
}

/// Pool question metrics of all completed runs. Other runs are ignored.
pub fn hallucination_summary(runs: &[(EvaluationRun, Vec<EvaluationQuestion>)]) -> HallucinationSummary {
    let completed: Vec<&Vec<EvaluationQuestion>> = runs
        .iter()
        .filter(|(run, _)| run.status == RunStatus::Completed)
        .map(|(_, questions)| questions)
        .collect();

    let rag: Vec<&MetricVector> = completed
        .iter()
        .flat_map(|qs| qs.iter().filter_map(|q| q.rag_metrics.as_ref()))
        .collect();
    let baseline: Vec<&MetricVector> = completed
        .iter()
        .flat_map(|qs| qs.iter().filter_map(|q| q.baseline_metrics.as_ref()))
        .collect();

    HallucinationSummary {
        run_count: completed.len(),
        question_count: rag.len(),
        hallucination_rate: mean(rag.iter().map(|v| v.hallucination.hallucination_rate)),
        factual_consistency: mean(rag.iter().map(|v| v.hallucination.factual_consistency)),
        source_attribution: mean(rag.iter().map(|v| v.hallucination.source_attribution)),
        contradiction_free: mean(
            rag.iter()
                .map(|v| v.hallucination.contradiction_score.map(|c| 1.0 - c)),
        ),
        baseline_hallucination_rate: mean(
            baseline.iter().map(|v| v.hallucination.hallucination_rate),
        ),
    }
}

impl HallucinationSummary {
    pub fn print_summary(&self) {
        println!("\n========== Hallucination Analysis ==========");
        println!(
            "Completed runs: {} ({} evaluated questions)",
            self.run_count, self.question_count
        );
        println!("---------------------------------------------");
        println!("RAG hallucination rate:      {:.3}", self.hallucination_rate);
        println!("Baseline hallucination rate: {:.3}", self.baseline_hallucination_rate);
        println!("Factual consistency:         {:.3}", self.factual_consistency);
        println!("Source attribution:          {:.3}", self.source_attribution);
        println!("Contradiction-free:          {:.3}", self.contradiction_free);
        println!("=============================================\n");
    }
}
