//! Persistence of runs, questions and ablation studies.
//!
//! Two stores implement [`EvaluationStore`]:
//! - [`MemoryStore`]: in-process, for tests and one-shot CLI runs
//! - [`JsonFileStore`]: one JSON document per record under a data directory
//!
//! Status changes go through [`EvaluationStore::transition_run`] and
//! [`EvaluationStore::transition_study`], compare-and-sets on the current
//! status. That is what keeps a run or study single-writer: a second
//! executor loses the `pending -> running` race.

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::{EvalError, Result};
use crate::model::{AblationStudy, EvaluationQuestion, EvaluationRun, RunStatus};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

/// CRUD over evaluation records. Every method updates a single record
/// atomically.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Insert a run together with its questions.
    async fn create_run(&self, run: &EvaluationRun, questions: &[EvaluationQuestion]) -> Result<()>;

    async fn get_run(&self, id: Uuid) -> Result<EvaluationRun>;

    /// All runs, newest first.
    async fn list_runs(&self) -> Result<Vec<EvaluationRun>>;

    /// Move a run from `from` to `to`, failing if its status is not `from`.
    async fn transition_run(
        &self,
        id: Uuid,
        from: RunStatus,
        to: RunStatus,
        error: Option<String>,
    ) -> Result<EvaluationRun>;

    /// Count one more processed question on a running run.
    async fn record_progress(&self, id: Uuid, succeeded: bool) -> Result<EvaluationRun>;

    /// Questions of a run, ordered by position.
    async fn questions(&self, run_id: Uuid) -> Result<Vec<EvaluationQuestion>>;

    /// Overwrite an existing question.
    async fn save_question(&self, question: &EvaluationQuestion) -> Result<()>;

    /// Delete a run and all of its questions.
    async fn delete_run(&self, id: Uuid) -> Result<()>;

    /// Insert or overwrite a study.
    async fn save_study(&self, study: &AblationStudy) -> Result<()>;

    async fn get_study(&self, id: Uuid) -> Result<AblationStudy>;

    /// Move a study from `from` to `to`, failing if its status is not `from`.
    async fn transition_study(
        &self,
        id: Uuid,
        from: RunStatus,
        to: RunStatus,
        error: Option<String>,
    ) -> Result<AblationStudy>;

    /// All studies, newest first.
    async fn list_studies(&self) -> Result<Vec<AblationStudy>>;
}

/// Compare-and-set a run's status in place.
pub(crate) fn apply_transition(
    run: &mut EvaluationRun,
    from: RunStatus,
    to: RunStatus,
    error: Option<String>,
) -> Result<()> {
    if run.status != from || !from.can_transition_to(to) {
        return Err(EvalError::InvalidTransition {
            kind: "run",
            id: run.id.to_string(),
            from: run.status.to_string(),
            to: to.to_string(),
        });
    }

    run.status = to;
    match to {
        RunStatus::Running => run.started_at = Some(Utc::now()),
        RunStatus::Completed | RunStatus::Failed => run.completed_at = Some(Utc::now()),
        RunStatus::Pending => {}
    }
    if error.is_some() {
        run.error = error;
    }
    Ok(())
}

/// Compare-and-set a study's status in place.
pub(crate) fn apply_study_transition(
    study: &mut AblationStudy,
    from: RunStatus,
    to: RunStatus,
    error: Option<String>,
) -> Result<()> {
    if study.status != from || !from.can_transition_to(to) {
        return Err(EvalError::InvalidTransition {
            kind: "study",
            id: study.id.to_string(),
            from: study.status.to_string(),
            to: to.to_string(),
        });
    }

    study.status = to;
    if to.is_terminal() {
        study.completed_at = Some(Utc::now());
    }
    if error.is_some() {
        study.error = error;
    }
    Ok(())
}

/// Count a processed question. Only running runs make progress.
pub(crate) fn apply_progress(run: &mut EvaluationRun, succeeded: bool) -> Result<()> {
    if run.status != RunStatus::Running {
        return Err(EvalError::Validation(format!(
            "Run '{}' is {}, not running",
            run.id, run.status
        )));
    }
    if run.processed_questions() >= run.total_questions {
        return Err(EvalError::Storage(format!(
            "Run '{}' has already processed all {} questions",
            run.id, run.total_questions
        )));
    }
    if succeeded {
        run.completed_questions += 1;
    } else {
        run.failed_questions += 1;
    }
    Ok(())
}

pub(crate) fn sort_newest_first_runs(runs: &mut [EvaluationRun]) {
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

pub(crate) fn sort_newest_first_studies(studies: &mut [AblationStudy]) {
    studies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Shared behaviour checks, run against every store implementation.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::model::{AblationVariant, QuestionInput, RunConfiguration};

    fn new_run(questions: usize) -> (EvaluationRun, Vec<EvaluationQuestion>) {
        let mut run = EvaluationRun::new("contract", RunConfiguration::default());
        run.total_questions = questions;
        let qs = (0..questions)
            .map(|i| EvaluationQuestion::new(run.id, i, QuestionInput::new(format!("Question {i}?"))))
            .collect();
        (run, qs)
    }

    pub async fn run_lifecycle(store: &dyn EvaluationStore) {
        let (run, questions) = new_run(2);
        store.create_run(&run, &questions).await.unwrap();

        let loaded = store.get_run(run.id).await.unwrap();
        assert_eq!(loaded.status, RunStatus::Pending);
        assert_eq!(loaded.total_questions, 2);

        let running = store
            .transition_run(run.id, RunStatus::Pending, RunStatus::Running, None)
            .await
            .unwrap();
        assert!(running.started_at.is_some());

        // A second executor loses the race.
        let err = store
            .transition_run(run.id, RunStatus::Pending, RunStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidTransition { .. }));

        store.record_progress(run.id, true).await.unwrap();
        let after = store.record_progress(run.id, false).await.unwrap();
        assert_eq!(after.completed_questions, 1);
        assert_eq!(after.failed_questions, 1);
        assert!(store.record_progress(run.id, true).await.is_err());

        let done = store
            .transition_run(run.id, RunStatus::Running, RunStatus::Completed, None)
            .await
            .unwrap();
        assert!(done.completed_at.is_some());
        assert!(store.record_progress(run.id, true).await.is_err());
    }

    pub async fn question_updates(store: &dyn EvaluationStore) {
        let (run, questions) = new_run(3);
        store.create_run(&run, &questions).await.unwrap();

        let mut second = questions[1].clone();
        second.rag_answer = Some("An answer.".to_string());
        second.error = Some("boom".to_string());
        store.save_question(&second).await.unwrap();

        let loaded = store.questions(run.id).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(
            loaded.iter().map(|q| q.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(loaded[1].rag_answer.as_deref(), Some("An answer."));
        assert_eq!(loaded[1].error.as_deref(), Some("boom"));

        let stranger = EvaluationQuestion::new(Uuid::new_v4(), 0, QuestionInput::new("?"));
        assert!(matches!(
            store.save_question(&stranger).await,
            Err(EvalError::NotFound { .. })
        ));
    }

    pub async fn cascade_delete(store: &dyn EvaluationStore) {
        let (run, questions) = new_run(2);
        store.create_run(&run, &questions).await.unwrap();
        let (other, other_questions) = new_run(1);
        store.create_run(&other, &other_questions).await.unwrap();

        store.delete_run(run.id).await.unwrap();

        assert!(matches!(
            store.get_run(run.id).await,
            Err(EvalError::NotFound { .. })
        ));
        assert!(matches!(
            store.questions(run.id).await,
            Err(EvalError::NotFound { .. })
        ));
        assert_eq!(store.list_runs().await.unwrap().len(), 1);
        assert_eq!(store.questions(other.id).await.unwrap().len(), 1);
        assert!(store.delete_run(run.id).await.is_err());
    }

    pub async fn studies(store: &dyn EvaluationStore) {
        let mut study = AblationStudy::new(
            "chunking",
            vec![AblationVariant::new("base", RunConfiguration::default())],
        );
        store.save_study(&study).await.unwrap();
        study.report = Some("# Report".to_string());
        store.save_study(&study).await.unwrap();

        let loaded = store.get_study(study.id).await.unwrap();
        assert_eq!(loaded.report.as_deref(), Some("# Report"));
        assert_eq!(store.list_studies().await.unwrap().len(), 1);
        assert!(store.get_study(Uuid::new_v4()).await.is_err());
    }

    pub async fn study_transitions(store: &dyn EvaluationStore) {
        let study = AblationStudy::new(
            "retrieval",
            vec![AblationVariant::new("base", RunConfiguration::default())],
        );
        store.save_study(&study).await.unwrap();

        let running = store
            .transition_study(study.id, RunStatus::Pending, RunStatus::Running, None)
            .await
            .unwrap();
        assert_eq!(running.status, RunStatus::Running);
        assert_eq!(running.completed_at, None);

        // A second executor loses the race.
        let err = store
            .transition_study(study.id, RunStatus::Pending, RunStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidTransition { kind: "study", .. }));

        let failed = store
            .transition_study(
                study.id,
                RunStatus::Running,
                RunStatus::Failed,
                Some("store offline".to_string()),
            )
            .await
            .unwrap();
        assert!(failed.completed_at.is_some());

        let loaded = store.get_study(study.id).await.unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("store offline"));

        assert!(matches!(
            store
                .transition_study(Uuid::new_v4(), RunStatus::Pending, RunStatus::Running, None)
                .await,
            Err(EvalError::NotFound { .. })
        ));
    }
}
