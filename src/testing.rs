//! Deterministic collaborators for unit tests.

use crate::error::{EvalError, Result};
use crate::llm::{Generation, Generator, TokenUsage};
use crate::metrics::{DomainScores, Judge, LexicalJudge, Rubric, RubricSample};
use crate::model::{AblationStudy, EvaluationQuestion, EvaluationRun, RunStatus};
use crate::persistence::{EvaluationStore, MemoryStore};
use crate::retrieval::{ContextRetriever, RetrievalRequest, RetrievalResult, RetrievedChunk};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Returns canned responses in order; errors once they run out.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _system_prompt: Option<&str>,
        _temperature: Option<f32>,
    ) -> Result<Generation> {
        let next = self.responses.lock().unwrap().pop_front();
        next.map(|text| Generation { text, usage: None })
            .ok_or_else(|| EvalError::LlmApi("script exhausted".to_string()))
    }
}

/// A prompt as seen by [`StubGenerator`].
#[derive(Debug, Clone)]
pub struct RecordedPrompt {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
}

/// Answers every prompt with the same text, failing on prompts that contain
/// a marker.
pub struct StubGenerator {
    answer: String,
    fail_on: Option<String>,
    pub prompts: Mutex<Vec<RecordedPrompt>>,
}

impl StubGenerator {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            fail_on: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    pub fn recorded(&self) -> Vec<RecordedPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<Generation> {
        self.prompts.lock().unwrap().push(RecordedPrompt {
            prompt: prompt.to_string(),
            system_prompt: system_prompt.map(str::to_string),
            temperature,
        });
        if let Some(marker) = &self.fail_on {
            if prompt.contains(marker.as_str()) {
                return Err(EvalError::LlmApi("model unavailable".to_string()));
            }
        }
        Ok(Generation {
            text: self.answer.clone(),
            usage: Some(TokenUsage {
                prompt_tokens: 20,
                completion_tokens: 10,
                total_tokens: 30,
            }),
        })
    }
}

/// Answers with the first numbered passage in the prompt, so the answer
/// depends on retrieval order. Prompts without passages get a fixed reply.
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _temperature: Option<f32>,
    ) -> Result<Generation> {
        let text = prompt
            .lines()
            .find_map(|line| line.strip_prefix("[1] "))
            .unwrap_or("I am not sure.")
            .to_string();
        Ok(Generation { text, usage: None })
    }
}

/// Serves the same chunks for every request.
pub struct StaticRetriever {
    chunks: Vec<RetrievedChunk>,
    fail: bool,
    cancel_on_call: Option<CancellationToken>,
    pub requests: Mutex<Vec<RetrievalRequest>>,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            fail: false,
            cancel_on_call: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// Cancel `token` as soon as the first retrieval happens.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    pub fn recorded(&self) -> Vec<RetrievalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if self.fail {
            return Err(EvalError::Retrieval("index offline".to_string()));
        }
        Ok(RetrievalResult {
            chunks: self
                .chunks
                .iter()
                .filter(|c| c.score >= request.min_similarity)
                .take(request.top_k)
                .cloned()
                .collect(),
            effective_strategy: request.strategy,
        })
    }
}

/// Lexical judge with selected capabilities broken.
pub struct FlakyJudge {
    inner: LexicalJudge,
    fail_claims: bool,
    fail_optional: bool,
}

impl FlakyJudge {
    pub fn failing_claims() -> Self {
        Self {
            inner: LexicalJudge::default(),
            fail_claims: true,
            fail_optional: false,
        }
    }

    pub fn failing_rubric_and_plausibility() -> Self {
        Self {
            inner: LexicalJudge::default(),
            fail_claims: false,
            fail_optional: true,
        }
    }

    fn broken() -> EvalError {
        EvalError::Judge("judge offline".to_string())
    }
}

#[async_trait]
impl Judge for FlakyJudge {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn extract_claims(&self, text: &str) -> Result<Vec<String>> {
        if self.fail_claims {
            return Err(Self::broken());
        }
        self.inner.extract_claims(text).await
    }

    async fn verify_claims(&self, claims: &[String], passages: &[String]) -> Result<Vec<bool>> {
        self.inner.verify_claims(claims, passages).await
    }

    async fn assess_plausibility(&self, question: &str, claims: &[String]) -> Result<Vec<bool>> {
        if self.fail_optional {
            return Err(Self::broken());
        }
        self.inner.assess_plausibility(question, claims).await
    }

    async fn reconstruct_question(&self, answer: &str) -> Result<String> {
        self.inner.reconstruct_question(answer).await
    }

    async fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        self.inner.similarity(a, b).await
    }

    async fn score_rubric(
        &self,
        rubric: &Rubric,
        sample: RubricSample<'_>,
    ) -> Result<Option<DomainScores>> {
        if self.fail_optional {
            return Err(Self::broken());
        }
        self.inner.score_rubric(rubric, sample).await
    }
}

/// Lexical judge that counts claim verification passes.
#[derive(Default)]
pub struct CountingJudge {
    inner: LexicalJudge,
    verify_calls: AtomicUsize,
}

impl CountingJudge {
    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for CountingJudge {
    fn name(&self) -> &str {
        "counting"
    }

    async fn extract_claims(&self, text: &str) -> Result<Vec<String>> {
        self.inner.extract_claims(text).await
    }

    async fn verify_claims(&self, claims: &[String], passages: &[String]) -> Result<Vec<bool>> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_claims(claims, passages).await
    }

    async fn assess_plausibility(&self, question: &str, claims: &[String]) -> Result<Vec<bool>> {
        self.inner.assess_plausibility(question, claims).await
    }

    async fn reconstruct_question(&self, answer: &str) -> Result<String> {
        self.inner.reconstruct_question(answer).await
    }

    async fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        self.inner.similarity(a, b).await
    }

    async fn score_rubric(
        &self,
        rubric: &Rubric,
        sample: RubricSample<'_>,
    ) -> Result<Option<DomainScores>> {
        self.inner.score_rubric(rubric, sample).await
    }
}

/// In-memory store whose writes start failing after a set number of calls.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    study_saves_allowed: Option<usize>,
    progress_allowed: Option<usize>,
    fail_completion: bool,
    study_saves: AtomicUsize,
    progress_calls: AtomicUsize,
}

impl FaultyStore {
    /// Only the first `n` `save_study` calls succeed.
    pub fn failing_study_saves_after(n: usize) -> Self {
        Self {
            study_saves_allowed: Some(n),
            ..Self::default()
        }
    }

    /// Only the first `n` `record_progress` calls succeed.
    pub fn failing_progress_after(n: usize) -> Self {
        Self {
            progress_allowed: Some(n),
            ..Self::default()
        }
    }

    /// Refuses to mark a run completed.
    pub fn failing_completion() -> Self {
        Self {
            fail_completion: true,
            ..Self::default()
        }
    }

    fn disk_full() -> EvalError {
        EvalError::Storage("disk full".to_string())
    }

    fn over_budget(counter: &AtomicUsize, allowed: Option<usize>) -> bool {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        allowed.is_some_and(|n| call >= n)
    }
}

#[async_trait]
impl EvaluationStore for FaultyStore {
    async fn create_run(&self, run: &EvaluationRun, questions: &[EvaluationQuestion]) -> Result<()> {
        self.inner.create_run(run, questions).await
    }

    async fn get_run(&self, id: Uuid) -> Result<EvaluationRun> {
        self.inner.get_run(id).await
    }

    async fn list_runs(&self) -> Result<Vec<EvaluationRun>> {
        self.inner.list_runs().await
    }

    async fn transition_run(
        &self,
        id: Uuid,
        from: RunStatus,
        to: RunStatus,
        error: Option<String>,
    ) -> Result<EvaluationRun> {
        if self.fail_completion && to == RunStatus::Completed {
            return Err(Self::disk_full());
        }
        self.inner.transition_run(id, from, to, error).await
    }

    async fn record_progress(&self, id: Uuid, succeeded: bool) -> Result<EvaluationRun> {
        if Self::over_budget(&self.progress_calls, self.progress_allowed) {
            return Err(Self::disk_full());
        }
        self.inner.record_progress(id, succeeded).await
    }

    async fn questions(&self, run_id: Uuid) -> Result<Vec<EvaluationQuestion>> {
        self.inner.questions(run_id).await
    }

    async fn save_question(&self, question: &EvaluationQuestion) -> Result<()> {
        self.inner.save_question(question).await
    }

    async fn delete_run(&self, id: Uuid) -> Result<()> {
        self.inner.delete_run(id).await
    }

    async fn save_study(&self, study: &AblationStudy) -> Result<()> {
        if Self::over_budget(&self.study_saves, self.study_saves_allowed) {
            return Err(Self::disk_full());
        }
        self.inner.save_study(study).await
    }

    async fn get_study(&self, id: Uuid) -> Result<AblationStudy> {
        self.inner.get_study(id).await
    }

    async fn transition_study(
        &self,
        id: Uuid,
        from: RunStatus,
        to: RunStatus,
        error: Option<String>,
    ) -> Result<AblationStudy> {
        self.inner.transition_study(id, from, to, error).await
    }

    async fn list_studies(&self) -> Result<Vec<AblationStudy>> {
        self.inner.list_studies().await
    }
}
