//! Evaluation run execution.
//!
//! A run moves `pending -> running -> completed | failed`. Questions are
//! processed one at a time; each one retrieves context, produces a grounded
//! and an ungrounded answer, scores both and persists the result before the
//! next question starts.

use crate::config::EvaluationSettings;
use crate::error::{EvalError, Result};
use crate::llm::{Generation, Generator, Prompts};
use crate::metrics::{MetricBattery, MetricInput};
use crate::model::{
    EvaluationQuestion, EvaluationRun, QuestionInput, QuestionResult, RunConfiguration, RunStatus,
};
use crate::persistence::EvaluationStore;
use crate::retrieval::{ContextRetriever, LexicalReranker, Reranker, RetrievalRequest};
use crate::tracer::{LatencyTracer, Stage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Temperature for agentic query planning; planning should be repeatable.
const PLANNING_TEMPERATURE: f32 = 0.0;

/// Runs evaluation runs against a retriever, a generator and the metric battery.
pub struct EvaluationOrchestrator {
    store: Arc<dyn EvaluationStore>,
    retriever: Arc<dyn ContextRetriever>,
    generator: Arc<dyn Generator>,
    reranker: Arc<dyn Reranker>,
    battery: MetricBattery,
    temperature: Option<f32>,
}

impl EvaluationOrchestrator {
    pub fn new(
        store: Arc<dyn EvaluationStore>,
        retriever: Arc<dyn ContextRetriever>,
        generator: Arc<dyn Generator>,
        battery: MetricBattery,
        settings: &EvaluationSettings,
    ) -> Self {
        Self {
            store,
            retriever,
            generator,
            reranker: Arc::new(LexicalReranker::default()),
            battery,
            temperature: settings.temperature,
        }
    }

    pub fn store(&self) -> &Arc<dyn EvaluationStore> {
        &self.store
    }

    /// Validate and persist a pending run with its questions.
    pub async fn create_run(
        &self,
        name: &str,
        description: Option<String>,
        configuration: RunConfiguration,
        questions: Vec<QuestionInput>,
    ) -> Result<EvaluationRun> {
        if name.trim().is_empty() {
            return Err(EvalError::Validation("Run name must not be empty".to_string()));
        }
        configuration.validate()?;
        if questions.is_empty() {
            return Err(EvalError::Validation(
                "A run needs at least one question".to_string(),
            ));
        }
        if let Some(pos) = questions.iter().position(|q| q.question.trim().is_empty()) {
            return Err(EvalError::Validation(format!(
                "Question {} is empty",
                pos + 1
            )));
        }

        let mut run = EvaluationRun::new(name.trim(), configuration);
        run.description = description;
        run.total_questions = questions.len();

        let questions: Vec<EvaluationQuestion> = questions
            .into_iter()
            .enumerate()
            .map(|(position, input)| EvaluationQuestion::new(run.id, position, input))
            .collect();

        self.store.create_run(&run, &questions).await?;
        info!(run_id = %run.id, name = %run.name, questions = run.total_questions, "Created evaluation run");
        Ok(run)
    }

    /// Execute a pending run to completion.
    ///
    /// Question-level failures are recorded on the question and do not stop
    /// the run. Store failures and cancellation mark the run failed and are
    /// returned as errors.
    pub async fn execute(&self, run_id: Uuid, cancel: &CancellationToken) -> Result<EvaluationRun> {
        let run = self.store.get_run(run_id).await?;
        run.configuration.validate()?;
        let questions = self.store.questions(run_id).await?;
        if questions.is_empty() {
            return Err(EvalError::Validation(format!(
                "Run '{}' has no questions",
                run_id
            )));
        }

        let run = self
            .store
            .transition_run(run_id, RunStatus::Pending, RunStatus::Running, None)
            .await?;
        info!(
            run_id = %run.id,
            questions = questions.len(),
            configuration = %run.configuration.describe(),
            judge = self.battery.judge_name(),
            "Starting evaluation run"
        );

        for (idx, mut question) in questions.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(run_id = %run.id, processed = idx, "Evaluation run cancelled");
                self.fail_run(run.id, "cancelled").await;
                return Err(EvalError::Cancelled);
            }

            debug!(run_id = %run.id, question_id = %question.id, position = question.position, "Evaluating question");
            let succeeded = match self.evaluate_question(&run.configuration, &question).await {
                Ok(result) => {
                    result.apply_to(&mut question);
                    true
                }
                Err(e) => {
                    warn!(run_id = %run.id, question_id = %question.id, error = %e, "Question evaluation failed");
                    question.reset();
                    question.error = Some(e.to_string());
                    false
                }
            };

            if let Err(e) = self.persist_outcome(&question, succeeded).await {
                self.fail_run(run.id, &e.to_string()).await;
                return Err(e);
            }
        }

        let run = match self
            .store
            .transition_run(run_id, RunStatus::Running, RunStatus::Completed, None)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                self.fail_run(run_id, &e.to_string()).await;
                return Err(e);
            }
        };
        info!(
            run_id = %run.id,
            completed = run.completed_questions,
            failed = run.failed_questions,
            "Evaluation run completed"
        );
        Ok(run)
    }

    /// Create and execute a run in one call.
    pub async fn run(
        &self,
        name: &str,
        configuration: RunConfiguration,
        questions: Vec<QuestionInput>,
        cancel: &CancellationToken,
    ) -> Result<EvaluationRun> {
        let run = self.create_run(name, None, configuration, questions).await?;
        self.execute(run.id, cancel).await
    }

    async fn persist_outcome(&self, question: &EvaluationQuestion, succeeded: bool) -> Result<()> {
        self.store.save_question(question).await?;
        self.store.record_progress(question.run_id, succeeded).await?;
        Ok(())
    }

    /// Best-effort transition to failed; the original error is what the
    /// caller reports.
    async fn fail_run(&self, run_id: Uuid, reason: &str) {
        if let Err(e) = self
            .store
            .transition_run(
                run_id,
                RunStatus::Running,
                RunStatus::Failed,
                Some(reason.to_string()),
            )
            .await
        {
            warn!(run_id = %run_id, error = %e, "Could not mark run as failed");
        }
    }

    /// Everything inside the per-question failure boundary.
    async fn evaluate_question(
        &self,
        config: &RunConfiguration,
        question: &EvaluationQuestion,
    ) -> Result<QuestionResult> {
        let mut tracer = LatencyTracer::start();

        let search_query = if config.agentic {
            let planned = self.plan_query(&question.question).await?;
            tracer.mark(Stage::AgentReasoning);
            planned
        } else {
            question.question.clone()
        };

        let request = RetrievalRequest {
            question: search_query,
            top_k: config.top_k,
            min_similarity: config.min_similarity,
            strategy: config.retrieval_strategy,
            chunking: config.chunking_strategy,
        };
        let mut retrieved = self.retriever.retrieve(&request).await?;
        tracer.mark(Stage::Retrieval);
        if retrieved.effective_strategy != config.retrieval_strategy {
            debug!(
                requested = %config.retrieval_strategy,
                effective = %retrieved.effective_strategy,
                "Retriever fell back to another strategy"
            );
        }

        if config.reranking {
            let chunks = std::mem::take(&mut retrieved.chunks);
            retrieved.chunks = self
                .reranker
                .rerank(&question.question, chunks, config.top_k)
                .await;
            tracer.mark(Stage::Reranking);
        }
        let contexts = retrieved.contents();
        let chunk_ids = retrieved.chunk_ids();

        let rag = self
            .generate_grounded(&question.question, &contexts, config.guardrails)
            .await?;
        tracer.mark(Stage::Generation);
        let rag_latency = tracer.summary();

        let mut baseline_tracer = LatencyTracer::start();
        let baseline = self.generate_baseline(&question.question).await?;
        baseline_tracer.mark(Stage::Generation);
        let baseline_latency = baseline_tracer.summary();

        let rag_metrics = self
            .battery
            .evaluate(&MetricInput {
                question: &question.question,
                answer: &rag.text,
                contexts: &contexts,
                chunk_ids: &chunk_ids,
                ground_truth: question.ground_truth.as_deref(),
                relevant_ids: question.relevant_chunk_ids.as_deref(),
                latency: &rag_latency,
                completion_tokens: rag.completion_tokens(),
            })
            .await?;
        let baseline_metrics = self
            .battery
            .evaluate(&MetricInput {
                question: &question.question,
                answer: &baseline.text,
                contexts: &[],
                chunk_ids: &[],
                ground_truth: question.ground_truth.as_deref(),
                relevant_ids: None,
                latency: &baseline_latency,
                completion_tokens: baseline.completion_tokens(),
            })
            .await?;

        Ok(QuestionResult {
            rag_answer: rag.text,
            baseline_answer: baseline.text,
            retrieved_contexts: contexts,
            retrieved_chunk_ids: chunk_ids,
            rag_metrics,
            baseline_metrics,
        })
    }

    /// Rewrite the question into a search query. Falls back to the question
    /// when the planner returns nothing usable.
    async fn plan_query(&self, question: &str) -> Result<String> {
        let prompt = Prompts::query_planning().replace("{question}", question);
        let planned = self
            .generator
            .generate(&prompt, None, Some(PLANNING_TEMPERATURE))
            .await?;
        let query = planned.text.trim().trim_matches('"').trim();
        if query.is_empty() {
            return Ok(question.to_string());
        }
        debug!(query = %query, "Planned search query");
        Ok(query.to_string())
    }

    async fn generate_grounded(
        &self,
        question: &str,
        contexts: &[String],
        guardrails: bool,
    ) -> Result<Generation> {
        let prompt = Prompts::rag_answer()
            .replace("{context}", &Prompts::format_passages(contexts))
            .replace("{question}", question);
        let system = if guardrails {
            format!(
                "{}\n\n{}",
                Prompts::system_rag_assistant(),
                Prompts::system_guardrails()
            )
        } else {
            Prompts::system_rag_assistant().to_string()
        };

        let mut generation = self
            .generator
            .generate(&prompt, Some(&system), self.temperature)
            .await?;
        if guardrails && generation.text.trim().is_empty() {
            generation.text = Prompts::guardrail_refusal().to_string();
        }
        Ok(generation)
    }

    async fn generate_baseline(&self, question: &str) -> Result<Generation> {
        let prompt = Prompts::baseline_answer().replace("{question}", question);
        self.generator
            .generate(
                &prompt,
                Some(Prompts::system_baseline_assistant()),
                self.temperature,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::LexicalJudge;
    use crate::persistence::MemoryStore;
    use crate::retrieval::{RetrievalStrategy, RetrievedChunk};
    use crate::testing::{FaultyStore, StaticRetriever, StubGenerator};

    const ANSWER: &str = "Final exams are held in June [1].";

    fn chunks() -> Vec<RetrievedChunk> {
        vec![
            RetrievedChunk::new("c1", "Final exams are held in June.", 0.9),
            RetrievedChunk::new("c2", "Resit exams take place in August.", 0.6),
            RetrievedChunk::new("c3", "The cafeteria serves lunch daily.", 0.1),
        ]
    }

    struct Harness {
        store: Arc<MemoryStore>,
        retriever: Arc<StaticRetriever>,
        generator: Arc<StubGenerator>,
        orchestrator: EvaluationOrchestrator,
    }

    fn harness(retriever: StaticRetriever, generator: StubGenerator) -> Harness {
        let settings = EvaluationSettings::default();
        let store = Arc::new(MemoryStore::new());
        let retriever = Arc::new(retriever);
        let generator = Arc::new(generator);
        let battery = MetricBattery::new(Arc::new(LexicalJudge::default()), &settings);
        let orchestrator = EvaluationOrchestrator::new(
            store.clone(),
            retriever.clone(),
            generator.clone(),
            battery,
            &settings,
        );
        Harness {
            store,
            retriever,
            generator,
            orchestrator,
        }
    }

    fn exam_questions() -> Vec<QuestionInput> {
        vec![
            QuestionInput::new("When are final exams held?")
                .with_ground_truth("Final exams are held in June.")
                .with_relevant_ids(vec!["c1".to_string()]),
            QuestionInput::new("When are the BROKEN resit exams?"),
        ]
    }

    #[tokio::test]
    async fn test_generation_failure_is_isolated() {
        let h = harness(
            StaticRetriever::new(chunks()),
            StubGenerator::answering(ANSWER).failing_on("BROKEN"),
        );
        let run = h
            .orchestrator
            .run(
                "isolation",
                RunConfiguration::default(),
                exam_questions(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.completed_questions, 1);
        assert_eq!(run.failed_questions, 1);
        assert!(run.completed_at.is_some());

        let questions = h.store.questions(run.id).await.unwrap();
        let ok = &questions[0];
        let rag = ok.rag_metrics.as_ref().unwrap();
        assert_eq!(rag.core.faithfulness, 1.0);
        assert_eq!(rag.ranking.mrr, Some(1.0));
        assert!(rag.latency.tokens_per_second.is_none_or(|tps| tps > 0.0));
        assert_eq!(ok.retrieved_chunk_ids, vec!["c1", "c2"]);
        let baseline = ok.baseline_metrics.as_ref().unwrap();
        assert_eq!(baseline.ranking.ndcg, None);
        assert!(baseline.hallucination.hallucination_rate.is_some());

        let failed = &questions[1];
        assert!(failed.rag_metrics.is_none());
        assert!(failed.baseline_metrics.is_none());
        assert!(failed.error.as_deref().unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_retrieval_uses_run_configuration() {
        let h = harness(StaticRetriever::new(chunks()), StubGenerator::answering(ANSWER));
        let config = RunConfiguration {
            top_k: 1,
            min_similarity: 0.5,
            ..Default::default()
        };
        h.orchestrator
            .run(
                "config",
                config,
                vec![QuestionInput::new("When are exams?")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let requests = h.retriever.recorded();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].top_k, 1);
        assert_eq!(requests[0].min_similarity, 0.5);
        assert_eq!(requests[0].strategy, RetrievalStrategy::Hybrid);
    }

    #[tokio::test]
    async fn test_cancellation_fails_run_between_questions() {
        let cancel = CancellationToken::new();
        let h = harness(
            StaticRetriever::new(chunks()).cancelling(cancel.clone()),
            StubGenerator::answering(ANSWER),
        );
        let run = h
            .orchestrator
            .create_run("cancel", None, RunConfiguration::default(), exam_questions())
            .await
            .unwrap();

        let result = h.orchestrator.execute(run.id, &cancel).await;
        assert!(matches!(result, Err(EvalError::Cancelled)));

        let stored = h.store.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("cancelled"));
        assert_eq!(stored.completed_questions, 1);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_transition() {
        let h = harness(StaticRetriever::new(chunks()), StubGenerator::answering(ANSWER));

        let empty = h
            .orchestrator
            .create_run("empty", None, RunConfiguration::default(), Vec::new())
            .await;
        assert!(matches!(empty, Err(EvalError::Validation(_))));

        let bad_k = RunConfiguration {
            top_k: 0,
            ..Default::default()
        };
        let invalid = h
            .orchestrator
            .create_run("bad", None, bad_k, exam_questions())
            .await;
        assert!(matches!(invalid, Err(EvalError::Validation(_))));

        let unnamed = h
            .orchestrator
            .create_run("  ", None, RunConfiguration::default(), exam_questions())
            .await;
        assert!(matches!(unnamed, Err(EvalError::Validation(_))));

        let unknown = h
            .orchestrator
            .execute(Uuid::new_v4(), &CancellationToken::new())
            .await;
        assert!(matches!(unknown, Err(EvalError::NotFound { .. })));
        assert!(h.store.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_executes_only_once() {
        let h = harness(StaticRetriever::new(chunks()), StubGenerator::answering(ANSWER));
        let run = h
            .orchestrator
            .run(
                "once",
                RunConfiguration::default(),
                vec![QuestionInput::new("When are exams?")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let again = h.orchestrator.execute(run.id, &CancellationToken::new()).await;
        assert!(matches!(again, Err(EvalError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_retrieval_failure_recorded_on_question() {
        let h = harness(StaticRetriever::failing(), StubGenerator::answering(ANSWER));
        let run = h
            .orchestrator
            .run(
                "offline",
                RunConfiguration::default(),
                vec![QuestionInput::new("When are exams?")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.completed_questions, 0);
        assert_eq!(run.failed_questions, 1);
        let questions = h.store.questions(run.id).await.unwrap();
        assert!(questions[0].error.as_deref().unwrap().contains("index offline"));
    }

    #[tokio::test]
    async fn test_agentic_guardrailed_reranked_run() {
        let h = harness(StaticRetriever::new(chunks()), StubGenerator::answering("  "));
        let config = RunConfiguration {
            agentic: true,
            guardrails: true,
            reranking: true,
            ..Default::default()
        };
        let run = h
            .orchestrator
            .run(
                "full",
                config,
                vec![QuestionInput::new("When are exams?")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(run.completed_questions, 1);

        // Blank plan falls back to the question itself.
        assert_eq!(h.retriever.recorded()[0].question, "When are exams?");

        let prompts = h.generator.recorded();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].prompt.contains("search query"));
        assert_eq!(prompts[0].temperature, Some(PLANNING_TEMPERATURE));
        // Answer generation defers to the LLM's configured temperature.
        assert_eq!(prompts[1].temperature, None);
        assert_eq!(prompts[2].temperature, None);
        let grounded_system = prompts[1].system_prompt.as_deref().unwrap();
        assert!(grounded_system.contains(Prompts::system_guardrails()));
        assert!(prompts[1].prompt.contains("[1] "));

        let question = &h.store.questions(run.id).await.unwrap()[0];
        assert_eq!(question.rag_answer.as_deref(), Some(Prompts::guardrail_refusal()));
        let latency = &question.rag_metrics.as_ref().unwrap().latency;
        assert!(latency.total_ms >= latency.generation_ms);
    }

    fn on_store(store: Arc<FaultyStore>) -> EvaluationOrchestrator {
        let settings = EvaluationSettings::default();
        let battery = MetricBattery::new(Arc::new(LexicalJudge::default()), &settings);
        EvaluationOrchestrator::new(
            store,
            Arc::new(StaticRetriever::new(chunks())),
            Arc::new(StubGenerator::answering(ANSWER)),
            battery,
            &settings,
        )
    }

    fn answerable_questions() -> Vec<QuestionInput> {
        vec![
            QuestionInput::new("When are final exams held?")
                .with_ground_truth("Final exams are held in June."),
            QuestionInput::new("When are final exams scheduled?")
                .with_ground_truth("Final exams are held in June."),
        ]
    }

    #[tokio::test]
    async fn test_store_failure_mid_run_fails_run() {
        let store = Arc::new(FaultyStore::failing_progress_after(1));
        let orchestrator = on_store(store.clone());
        let run = orchestrator
            .create_run("disk", None, RunConfiguration::default(), answerable_questions())
            .await
            .unwrap();

        let err = orchestrator
            .execute(run.id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Storage(_)));

        let stored = store.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.completed_questions, 1);
        assert_eq!(stored.failed_questions, 0);
        assert!(stored.completed_at.is_some());
        assert!(stored.error.as_deref().unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_failed_completion_fails_run() {
        let store = Arc::new(FaultyStore::failing_completion());
        let orchestrator = on_store(store.clone());
        let run = orchestrator
            .create_run("finish", None, RunConfiguration::default(), answerable_questions())
            .await
            .unwrap();

        let err = orchestrator
            .execute(run.id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Storage(_)));

        let stored = store.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.completed_questions, 2);
        assert!(stored.error.as_deref().unwrap().contains("disk full"));
    }
}
