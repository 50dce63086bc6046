//! Persisted records: evaluation runs, their questions and ablation studies.

use crate::error::{EvalError, Result};
use crate::metrics::MetricVector;
use crate::retrieval::{ChunkingStrategy, RetrievalStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a run or study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether the record is read-only from now on.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Allowed lifecycle edges: `pending -> running -> completed | failed`.
    /// A pending record may also fail directly when setup breaks.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Pipeline configuration a run is evaluated under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    pub retrieval_strategy: RetrievalStrategy,
    pub chunking_strategy: ChunkingStrategy,
    pub reranking: bool,
    pub agentic: bool,
    pub guardrails: bool,
    pub top_k: usize,
    pub min_similarity: f64,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            retrieval_strategy: RetrievalStrategy::Hybrid,
            chunking_strategy: ChunkingStrategy::Recursive,
            reranking: false,
            agentic: false,
            guardrails: false,
            top_k: 5,
            min_similarity: 0.3,
        }
    }
}

impl RunConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(EvalError::Validation("top_k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(EvalError::Validation(format!(
                "min_similarity must be within [0, 1], got {}",
                self.min_similarity
            )));
        }
        Ok(())
    }

    /// Short human-readable description, used in reports.
    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("{} retrieval", self.retrieval_strategy),
            format!("{} chunking", self.chunking_strategy),
            format!("top-{}", self.top_k),
        ];
        if self.reranking {
            parts.push("reranking".to_string());
        }
        if self.agentic {
            parts.push("agentic query planning".to_string());
        }
        if self.guardrails {
            parts.push("guardrails".to_string());
        }
        parts.join(", ")
    }
}

/// One evaluation run over a question set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub configuration: RunConfiguration,
    pub status: RunStatus,
    pub total_questions: usize,
    /// Questions that produced a usable result. Never decreases.
    pub completed_questions: usize,
    /// Questions that were attempted and failed.
    pub failed_questions: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EvaluationRun {
    pub fn new(name: impl Into<String>, configuration: RunConfiguration) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            configuration,
            status: RunStatus::Pending,
            total_questions: 0,
            completed_questions: 0,
            failed_questions: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Questions that have left the per-question boundary, success or not.
    pub fn processed_questions(&self) -> usize {
        self.completed_questions + self.failed_questions
    }

    /// Progress percentage over all questions, counting failures as processed.
    pub fn progress_percent(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        self.processed_questions() as f64 / self.total_questions as f64 * 100.0
    }
}

/// Input for a question, before it is attached to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionInput {
    pub question: String,
    #[serde(default)]
    pub ground_truth: Option<String>,
    /// Chunk ids known to be relevant, enabling ranking metrics.
    #[serde(default)]
    pub relevant_chunk_ids: Option<Vec<String>>,
}

impl QuestionInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ground_truth: None,
            relevant_chunk_ids: None,
        }
    }

    pub fn with_ground_truth(mut self, ground_truth: impl Into<String>) -> Self {
        self.ground_truth = Some(ground_truth.into());
        self
    }

    pub fn with_relevant_ids(mut self, ids: Vec<String>) -> Self {
        self.relevant_chunk_ids = Some(ids);
        self
    }
}

/// A question belonging to exactly one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationQuestion {
    pub id: Uuid,
    pub run_id: Uuid,
    /// Position within the run's question set.
    pub position: usize,
    pub question: String,
    pub ground_truth: Option<String>,
    pub relevant_chunk_ids: Option<Vec<String>>,
    pub rag_answer: Option<String>,
    pub baseline_answer: Option<String>,
    pub retrieved_contexts: Vec<String>,
    pub retrieved_chunk_ids: Vec<String>,
    pub rag_metrics: Option<MetricVector>,
    pub baseline_metrics: Option<MetricVector>,
    pub error: Option<String>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl EvaluationQuestion {
    pub fn new(run_id: Uuid, position: usize, input: QuestionInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            position,
            question: input.question,
            ground_truth: input.ground_truth,
            relevant_chunk_ids: input.relevant_chunk_ids,
            rag_answer: None,
            baseline_answer: None,
            retrieved_contexts: Vec::new(),
            retrieved_chunk_ids: Vec::new(),
            rag_metrics: None,
            baseline_metrics: None,
            error: None,
            evaluated_at: None,
        }
    }

    /// Clear a previous execution's outputs before re-running.
    pub fn reset(&mut self) {
        self.rag_answer = None;
        self.baseline_answer = None;
        self.retrieved_contexts.clear();
        self.retrieved_chunk_ids.clear();
        self.rag_metrics = None;
        self.baseline_metrics = None;
        self.error = None;
        self.evaluated_at = None;
    }
}

/// Everything one successful question evaluation produces.
///
/// Persisted in a single store update so a question is never half-written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub rag_answer: String,
    pub baseline_answer: String,
    pub retrieved_contexts: Vec<String>,
    pub retrieved_chunk_ids: Vec<String>,
    pub rag_metrics: MetricVector,
    pub baseline_metrics: MetricVector,
}

impl QuestionResult {
    pub fn apply_to(self, question: &mut EvaluationQuestion) {
        question.rag_answer = Some(self.rag_answer);
        question.baseline_answer = Some(self.baseline_answer);
        question.retrieved_contexts = self.retrieved_contexts;
        question.retrieved_chunk_ids = self.retrieved_chunk_ids;
        question.rag_metrics = Some(self.rag_metrics);
        question.baseline_metrics = Some(self.baseline_metrics);
        question.error = None;
        question.evaluated_at = Some(Utc::now());
    }
}

/// A named configuration under test in an ablation study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AblationVariant {
    pub name: String,
    #[serde(flatten)]
    pub configuration: RunConfiguration,
}

impl AblationVariant {
    pub fn new(name: impl Into<String>, configuration: RunConfiguration) -> Self {
        Self {
            name: name.into(),
            configuration,
        }
    }
}

/// Outcome of one configuration within a study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationResult {
    pub variant: AblationVariant,
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub snapshot: Option<crate::aggregator::RunSummary>,
    pub error: Option<String>,
}

/// Comparative evaluation across configuration variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AblationStudy {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: RunStatus,
    pub configurations: Vec<AblationVariant>,
    pub results: Vec<ConfigurationResult>,
    pub report: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AblationStudy {
    pub fn new(name: impl Into<String>, configurations: Vec<AblationVariant>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            status: RunStatus::Pending,
            configurations,
            results: Vec::new(),
            report: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
