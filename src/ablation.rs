//! Ablation studies: the same question set evaluated under several
//! configurations, ranked and written up as a markdown report.

use crate::aggregator::summarize_run;
use crate::error::{EvalError, Result};
use crate::model::{
    AblationStudy, AblationVariant, ConfigurationResult, QuestionInput, RunStatus,
};
use crate::orchestrator::EvaluationOrchestrator;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::Write as _;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Drives one evaluation run per variant through an [`EvaluationOrchestrator`].
pub struct AblationOrchestrator {
    runs: EvaluationOrchestrator,
}

impl AblationOrchestrator {
    pub fn new(runs: EvaluationOrchestrator) -> Self {
        Self { runs }
    }

    pub fn runs(&self) -> &EvaluationOrchestrator {
        &self.runs
    }

    /// Validate and persist a pending study.
    pub async fn create_study(
        &self,
        name: &str,
        description: Option<String>,
        variants: Vec<AblationVariant>,
    ) -> Result<AblationStudy> {
        if name.trim().is_empty() {
            return Err(EvalError::Validation(
                "Study name must not be empty".to_string(),
            ));
        }
        if variants.is_empty() {
            return Err(EvalError::Validation(
                "A study needs at least one configuration".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for variant in &variants {
            if variant.name.trim().is_empty() {
                return Err(EvalError::Validation(
                    "Configuration name must not be empty".to_string(),
                ));
            }
            if !seen.insert(variant.name.as_str()) {
                return Err(EvalError::Validation(format!(
                    "Duplicate configuration name '{}'",
                    variant.name
                )));
            }
            variant.configuration.validate().map_err(|e| {
                EvalError::Validation(format!("Configuration '{}': {}", variant.name, e))
            })?;
        }

        let mut study = AblationStudy::new(name.trim(), variants);
        study.description = description;
        self.runs.store().save_study(&study).await?;
        info!(study_id = %study.id, name = %study.name, configurations = study.configurations.len(), "Created ablation study");
        Ok(study)
    }

    /// Evaluate every configuration of a pending study, in order.
    ///
    /// A configuration whose run fails is recorded as failed and the study
    /// moves on. Cancellation or a store error fails the study, keeping the
    /// results recorded so far.
    pub async fn execute(
        &self,
        study_id: Uuid,
        questions: Vec<QuestionInput>,
        cancel: &CancellationToken,
    ) -> Result<AblationStudy> {
        if questions.is_empty() {
            return Err(EvalError::Validation(
                "A study needs at least one question".to_string(),
            ));
        }

        let mut study = self
            .runs
            .store()
            .transition_study(study_id, RunStatus::Pending, RunStatus::Running, None)
            .await?;
        info!(study_id = %study.id, configurations = study.configurations.len(), questions = questions.len(), "Starting ablation study");

        match self.evaluate_variants(&mut study, &questions, cancel).await {
            Ok(()) => {
                match rank(&study.results).first() {
                    Some(best) => info!(study_id = %study.id, best = %best.variant.name, "Ablation study completed"),
                    None => warn!(study_id = %study.id, "Ablation study completed without a successful configuration"),
                }
                Ok(study)
            }
            Err(e) => {
                self.fail_study(&mut study, &e).await;
                Err(e)
            }
        }
    }

    /// Create and execute a study in one call.
    pub async fn run(
        &self,
        name: &str,
        variants: Vec<AblationVariant>,
        questions: Vec<QuestionInput>,
        cancel: &CancellationToken,
    ) -> Result<AblationStudy> {
        let study = self.create_study(name, None, variants).await?;
        self.execute(study.id, questions, cancel).await
    }

    async fn evaluate_variants(
        &self,
        study: &mut AblationStudy,
        questions: &[QuestionInput],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let store = self.runs.store();
        for variant in study.configurations.clone() {
            if cancel.is_cancelled() {
                return Err(EvalError::Cancelled);
            }

            let result = self.evaluate_variant(study, variant, questions, cancel).await;
            let cancelled = matches!(result.error.as_deref(), Some("cancelled"));
            study.results.push(result);
            store.save_study(study).await?;
            if cancelled {
                return Err(EvalError::Cancelled);
            }
        }

        study.report = Some(render_report(study, questions.len()));
        store.save_study(study).await?;
        *study = store
            .transition_study(study.id, RunStatus::Running, RunStatus::Completed, None)
            .await?;
        Ok(())
    }

    async fn evaluate_variant(
        &self,
        study: &AblationStudy,
        variant: AblationVariant,
        questions: &[QuestionInput],
        cancel: &CancellationToken,
    ) -> ConfigurationResult {
        info!(variant = %variant.name, configuration = %variant.configuration.describe(), "Evaluating configuration");
        let mut result = ConfigurationResult {
            variant,
            run_id: None,
            status: RunStatus::Pending,
            snapshot: None,
            error: None,
        };

        let run_name = format!("{} / {}", study.name, result.variant.name);
        let outcome = async {
            let run = self
                .runs
                .create_run(
                    &run_name,
                    Some(format!("Ablation study {}", study.id)),
                    result.variant.configuration.clone(),
                    questions.to_vec(),
                )
                .await?;
            result.run_id = Some(run.id);
            let run = self.runs.execute(run.id, cancel).await?;
            let evaluated = self.runs.store().questions(run.id).await?;
            Ok::<_, EvalError>(summarize_run(&run, &evaluated))
        }
        .await;

        match outcome {
            Ok(summary) => {
                result.status = RunStatus::Completed;
                result.snapshot = Some(summary);
            }
            Err(EvalError::Cancelled) => {
                result.status = RunStatus::Failed;
                result.error = Some("cancelled".to_string());
            }
            Err(e) => {
                warn!(variant = %result.variant.name, error = %e, "Configuration failed");
                result.status = RunStatus::Failed;
                result.error = Some(e.to_string());
            }
        }
        result
    }

    /// Best-effort move to `failed`. The caller reports the original error.
    async fn fail_study(&self, study: &mut AblationStudy, error: &EvalError) {
        let reason = match error {
            EvalError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        };
        if matches!(error, EvalError::Cancelled) {
            info!(study_id = %study.id, "Ablation study cancelled");
        } else {
            warn!(study_id = %study.id, error = %reason, "Ablation study failed");
        }

        study.status = RunStatus::Failed;
        study.completed_at = Some(Utc::now());
        study.error = Some(reason.clone());

        let store = self.runs.store();
        if let Err(e) = store.save_study(study).await {
            // Keeps whatever results were last saved.
            if let Err(e2) = store
                .transition_study(study.id, RunStatus::Running, RunStatus::Failed, Some(reason))
                .await
            {
                warn!(study_id = %study.id, error = %e, fallback_error = %e2, "Could not mark study as failed");
            }
        }
    }
}

/// Successful configurations, best first: highest answer correctness, then
/// lowest hallucination rate, then name.
pub fn rank(results: &[ConfigurationResult]) -> Vec<&ConfigurationResult> {
    let mut ranked: Vec<&ConfigurationResult> =
        results.iter().filter(|r| r.snapshot.is_some()).collect();
    ranked.sort_by(|a, b| {
        let (sa, sb) = match (&a.snapshot, &b.snapshot) {
            (Some(sa), Some(sb)) => (sa, sb),
            _ => return Ordering::Equal,
        };
        sb.rag
            .answer_correctness
            .total_cmp(&sa.rag.answer_correctness)
            .then_with(|| sa.rag.hallucination_rate.total_cmp(&sb.rag.hallucination_rate))
            .then_with(|| a.variant.name.cmp(&b.variant.name))
    });
    ranked
}

/// Markdown write-up of a finished study.
pub fn render_report(study: &AblationStudy, question_count: usize) -> String {
    let ranked = rank(&study.results);
    let mut out = String::new();

    let _ = writeln!(out, "# Ablation Study: {}\n", study.name);
    if let Some(description) = &study.description {
        let _ = writeln!(out, "{}\n", description);
    }
    let _ = writeln!(out, "- Configurations: {}", study.configurations.len());
    let _ = writeln!(out, "- Questions: {}", question_count);
    let _ = writeln!(out, "- Successful configurations: {}\n", ranked.len());

    let _ = writeln!(out, "## Ranking\n");
    if ranked.is_empty() {
        let _ = writeln!(out, "No configuration completed successfully.\n");
    } else {
        let _ = writeln!(
            out,
            "| Rank | Configuration | Answer correctness | Hallucination rate | Faithfulness | Answer relevancy | Context precision | Mean latency (ms) |"
        );
        let _ = writeln!(out, "|---|---|---|---|---|---|---|---|");
        for (idx, result) in ranked.iter().enumerate() {
            if let Some(summary) = &result.snapshot {
                let rag = &summary.rag;
                let _ = writeln!(
                    out,
                    "| {} | {} | {:.3} | {:.3} | {:.3} | {:.3} | {:.3} | {:.0} |",
                    idx + 1,
                    result.variant.name,
                    rag.answer_correctness,
                    rag.hallucination_rate,
                    rag.faithfulness,
                    rag.answer_relevancy,
                    rag.context_precision,
                    rag.total_ms
                );
            }
        }
        out.push('\n');
    }

    let failed: Vec<&ConfigurationResult> = study
        .results
        .iter()
        .filter(|r| r.status == RunStatus::Failed)
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "## Failed configurations\n");
        for result in failed {
            let _ = writeln!(
                out,
                "- {}: {}",
                result.variant.name,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        out.push('\n');
    }

    if let Some(best) = ranked.first() {
        if let Some(summary) = &best.snapshot {
            let _ = writeln!(out, "## Best configuration\n");
            let _ = write!(
                out,
                "**{}** ({}) reached the highest mean answer correctness ({:.3}) with a hallucination rate of {:.3}.",
                best.variant.name,
                best.variant.configuration.describe(),
                summary.rag.answer_correctness,
                summary.rag.hallucination_rate
            );
            if summary.rag_better {
                let _ = write!(
                    out,
                    " Grounded answers beat the ungrounded baseline on correctness by {:.1}%.",
                    summary.improvements.answer_correctness
                );
            } else {
                let _ = write!(
                    out,
                    " Grounded answers did not beat the ungrounded baseline on correctness."
                );
            }
            if let Some(runner_up) = ranked.get(1).and_then(|r| r.snapshot.as_ref().map(|s| (r, s)))
            {
                let _ = write!(
                    out,
                    " The runner-up, **{}**, trailed by {:.3}.",
                    runner_up.0.variant.name,
                    summary.rag.answer_correctness - runner_up.1.rag.answer_correctness
                );
            }
            out.push('\n');
        }
    }

    out
}
