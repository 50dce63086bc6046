use super::{
    EvaluationStore, apply_progress, apply_study_transition, apply_transition,
    sort_newest_first_runs,
    sort_newest_first_studies,
};
use crate::error::{EvalError, Result};
use crate::model::{AblationStudy, EvaluationQuestion, EvaluationRun, RunStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    runs: HashMap<Uuid, EvaluationRun>,
    questions: HashMap<Uuid, Vec<EvaluationQuestion>>,
    studies: HashMap<Uuid, AblationStudy>,
}

/// In-process store. Contents are lost when it is dropped.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn run_not_found(id: Uuid) -> EvalError {
    EvalError::not_found("run", id)
}

#[async_trait]
impl EvaluationStore for MemoryStore {
    async fn create_run(&self, run: &EvaluationRun, questions: &[EvaluationQuestion]) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.runs.contains_key(&run.id) {
            return Err(EvalError::Storage(format!("Run '{}' already exists", run.id)));
        }
        let mut questions = questions.to_vec();
        questions.sort_by_key(|q| q.position);
        tables.runs.insert(run.id, run.clone());
        tables.questions.insert(run.id, questions);
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<EvaluationRun> {
        let tables = self.tables.read().await;
        tables.runs.get(&id).cloned().ok_or_else(|| run_not_found(id))
    }

    async fn list_runs(&self) -> Result<Vec<EvaluationRun>> {
        let tables = self.tables.read().await;
        let mut runs: Vec<EvaluationRun> = tables.runs.values().cloned().collect();
        sort_newest_first_runs(&mut runs);
        Ok(runs)
    }

    async fn transition_run(
        &self,
        id: Uuid,
        from: RunStatus,
        to: RunStatus,
        error: Option<String>,
    ) -> Result<EvaluationRun> {
        let mut tables = self.tables.write().await;
        let run = tables.runs.get_mut(&id).ok_or_else(|| run_not_found(id))?;
        apply_transition(run, from, to, error)?;
        Ok(run.clone())
    }

    async fn record_progress(&self, id: Uuid, succeeded: bool) -> Result<EvaluationRun> {
        let mut tables = self.tables.write().await;
        let run = tables.runs.get_mut(&id).ok_or_else(|| run_not_found(id))?;
        apply_progress(run, succeeded)?;
        Ok(run.clone())
    }

    async fn questions(&self, run_id: Uuid) -> Result<Vec<EvaluationQuestion>> {
        let tables = self.tables.read().await;
        tables
            .questions
            .get(&run_id)
            .cloned()
            .ok_or_else(|| run_not_found(run_id))
    }

    async fn save_question(&self, question: &EvaluationQuestion) -> Result<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .questions
            .get_mut(&question.run_id)
            .and_then(|qs| qs.iter_mut().find(|q| q.id == question.id))
            .ok_or_else(|| EvalError::not_found("question", question.id))?;
        *slot = question.clone();
        Ok(())
    }

    async fn delete_run(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.runs.remove(&id).ok_or_else(|| run_not_found(id))?;
        tables.questions.remove(&id);
        Ok(())
    }

    async fn save_study(&self, study: &AblationStudy) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.studies.insert(study.id, study.clone());
        Ok(())
    }

    async fn get_study(&self, id: Uuid) -> Result<AblationStudy> {
        let tables = self.tables.read().await;
        tables
            .studies
            .get(&id)
            .cloned()
            .ok_or_else(|| EvalError::not_found("study", id))
    }

    async fn transition_study(
        &self,
        id: Uuid,
        from: RunStatus,
        to: RunStatus,
        error: Option<String>,
    ) -> Result<AblationStudy> {
        let mut tables = self.tables.write().await;
        let study = tables
            .studies
            .get_mut(&id)
            .ok_or_else(|| EvalError::not_found("study", id))?;
        apply_study_transition(study, from, to, error)?;
        Ok(study.clone())
    }

    async fn list_studies(&self) -> Result<Vec<AblationStudy>> {
        let tables = self.tables.read().await;
        let mut studies: Vec<AblationStudy> = tables.studies.values().cloned().collect();
        sort_newest_first_studies(&mut studies);
        Ok(studies)
    }
}
