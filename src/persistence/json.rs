//! One JSON document per record.
//!
//! Layout under the data directory:
//!
//! ```text
//! runs/<run-id>/run.json
//! runs/<run-id>/questions/<question-id>.json
//! studies/<study-id>.json
//! ```
//!
//! Writes go to a temporary file that is renamed over the target, so readers
//! never observe a half-written record.

use super::{
    EvaluationStore, apply_progress, apply_study_transition, apply_transition,
    sort_newest_first_runs,
    sort_newest_first_studies,
};
use crate::error::{EvalError, Result};
use crate::model::{AblationStudy, EvaluationQuestion, EvaluationRun, RunStatus};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const RUN_FILE: &str = "run.json";

/// File-backed store rooted at a data directory.
pub struct JsonFileStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [root.join("runs"), root.join("studies")] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| EvalError::io(&dir, e))?;
        }
        debug!(root = %root.display(), "Opened JSON store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn run_dir(&self, id: Uuid) -> PathBuf {
        self.root.join("runs").join(id.to_string())
    }

    fn run_path(&self, id: Uuid) -> PathBuf {
        self.run_dir(id).join(RUN_FILE)
    }

    fn question_path(&self, run_id: Uuid, question_id: Uuid) -> PathBuf {
        self.run_dir(run_id)
            .join("questions")
            .join(format!("{}.json", question_id))
    }

    fn study_path(&self, id: Uuid) -> PathBuf {
        self.root.join("studies").join(format!("{}.json", id))
    }

    async fn load_run(&self, id: Uuid) -> Result<EvaluationRun> {
        let path = self.run_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EvalError::not_found("run", id));
        }
        read_json(&path).await
    }

    async fn load_study(&self, id: Uuid) -> Result<AblationStudy> {
        let path = self.study_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EvalError::not_found("study", id));
        }
        read_json(&path).await
    }

    /// JSON files directly below `dir` (or at `depth` for nested layouts).
    /// The directory walk runs on the blocking pool.
    async fn json_files(
        dir: PathBuf,
        depth: usize,
        file_name: Option<&'static str>,
    ) -> Result<Vec<PathBuf>> {
        tokio::task::spawn_blocking(move || Self::walk_json_files(&dir, depth, file_name))
            .await
            .map_err(|e| EvalError::Storage(format!("Directory scan aborted: {}", e)))
    }

    fn walk_json_files(dir: &Path, depth: usize, file_name: Option<&str>) -> Vec<PathBuf> {
        if !dir.is_dir() {
            return Vec::new();
        }
        WalkDir::new(dir)
            .min_depth(depth)
            .max_depth(depth)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable store entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| match file_name {
                Some(name) => path.file_name().is_some_and(|f| f == name),
                None => path.extension().is_some_and(|ext| ext == "json"),
            })
            .collect()
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        EvalError::Serialization(format!("Corrupt record {}: {}", path.display(), e))
    })
}

/// Write-then-rename so the target is replaced in one step.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| EvalError::io(parent, e))?;
    }
    let content =
        serde_json::to_string_pretty(value).map_err(|e| EvalError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .await
        .map_err(|e| EvalError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| EvalError::io(path, e))
}

#[async_trait]
impl EvaluationStore for JsonFileStore {
    async fn create_run(&self, run: &EvaluationRun, questions: &[EvaluationQuestion]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.run_path(run.id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EvalError::Storage(format!("Run '{}' already exists", run.id)));
        }
        // Questions first: a run file is only visible once its questions exist.
        for question in questions {
            write_json(&self.question_path(run.id, question.id), question).await?;
        }
        write_json(&path, run).await
    }

    async fn get_run(&self, id: Uuid) -> Result<EvaluationRun> {
        self.load_run(id).await
    }

    async fn list_runs(&self) -> Result<Vec<EvaluationRun>> {
        let mut runs = Vec::new();
        for path in Self::json_files(self.root.join("runs"), 2, Some(RUN_FILE)).await? {
            runs.push(read_json(&path).await?);
        }
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
        let _guard = self.write_lock.lock().await;
        let mut run = self.load_run(id).await?;
        apply_transition(&mut run, from, to, error)?;
        write_json(&self.run_path(id), &run).await?;
        Ok(run)
    }

    async fn record_progress(&self, id: Uuid, succeeded: bool) -> Result<EvaluationRun> {
        let _guard = self.write_lock.lock().await;
        let mut run = self.load_run(id).await?;
        apply_progress(&mut run, succeeded)?;
        write_json(&self.run_path(id), &run).await?;
        Ok(run)
    }

    async fn questions(&self, run_id: Uuid) -> Result<Vec<EvaluationQuestion>> {
        // Existence check keeps unknown runs distinct from runs without questions.
        self.load_run(run_id).await?;
        let mut questions: Vec<EvaluationQuestion> = Vec::new();
        for path in Self::json_files(self.run_dir(run_id).join("questions"), 1, None).await? {
            questions.push(read_json(&path).await?);
        }
        questions.sort_by_key(|q| q.position);
        Ok(questions)
    }

    async fn save_question(&self, question: &EvaluationQuestion) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.question_path(question.run_id, question.id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EvalError::not_found("question", question.id));
        }
        write_json(&path, question).await
    }

    async fn delete_run(&self, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let dir = self.run_dir(id);
        if !fs::try_exists(self.run_path(id)).await.unwrap_or(false) {
            return Err(EvalError::not_found("run", id));
        }
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| EvalError::io(&dir, e))
    }

    async fn save_study(&self, study: &AblationStudy) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.study_path(study.id), study).await
    }

    async fn get_study(&self, id: Uuid) -> Result<AblationStudy> {
        self.load_study(id).await
    }

    async fn transition_study(
        &self,
        id: Uuid,
        from: RunStatus,
        to: RunStatus,
        error: Option<String>,
    ) -> Result<AblationStudy> {
        let _guard = self.write_lock.lock().await;
        let mut study = self.load_study(id).await?;
        apply_study_transition(&mut study, from, to, error)?;
        write_json(&self.study_path(id), &study).await?;
        Ok(study)
    }

    async fn list_studies(&self) -> Result<Vec<AblationStudy>> {
        let mut studies = Vec::new();
        for path in Self::json_files(self.root.join("studies"), 1, None).await? {
            studies.push(read_json(&path).await?);
        }
        sort_newest_first_studies(&mut studies);
        Ok(studies)
    }
}
