//! RAG Evaluator - measures whether retrieval-augmented generation beats
//! answering without retrieval.
//!
//! Each question in a run is answered twice: once grounded in retrieved
//! passages and once by the bare model. Both answers are scored by the same
//! metric battery, and the per-question results roll up into run summaries
//! and ablation studies across pipeline configurations.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_evaluator::{
//!     config::Config,
//!     dataset::sample_academic_set,
//!     llm::LlmClient,
//!     metrics::{LexicalJudge, MetricBattery},
//!     orchestrator::EvaluationOrchestrator,
//!     persistence::{EvaluationStore, JsonFileStore},
//!     retrieval::HttpRetriever,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let store = Arc::new(JsonFileStore::open(&config.storage.data_dir).await?);
//!     let battery = MetricBattery::new(Arc::new(LexicalJudge::default()), &config.evaluation);
//!     let orchestrator = EvaluationOrchestrator::new(
//!         store.clone(),
//!         Arc::new(HttpRetriever::new(config.retrieval.clone())),
//!         Arc::new(LlmClient::new(config.llm.clone())),
//!         battery,
//!         &config.evaluation,
//!     );
//!
//!     let questions = sample_academic_set().questions;
//!     let run = orchestrator
//!         .run("smoke", config.evaluation.default_run.clone(), questions, &CancellationToken::new())
//!         .await?;
//!
//!     let evaluated = store.questions(run.id).await?;
//!     rag_evaluator::aggregator::summarize_run(&run, &evaluated).print_summary();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **EvaluationOrchestrator**: runs questions through retrieval, generation and scoring
//! - **AblationOrchestrator**: one run per configuration variant, ranked into a report
//! - **MetricBattery**: core quality, domain, hallucination, ranking and latency metrics
//! - **Judge**: claim extraction, verification and similarity behind the metrics
//! - **EvaluationStore**: persisted runs, questions and studies

pub mod ablation;
pub mod aggregator;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod persistence;
pub mod retrieval;
pub mod tracer;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use ablation::AblationOrchestrator;
pub use aggregator::{HallucinationSummary, RunSummary, summarize_run};
pub use config::Config;
pub use error::{EvalError, Result};
pub use llm::LlmClient;
pub use metrics::{MetricBattery, MetricVector};
pub use model::{AblationStudy, AblationVariant, EvaluationQuestion, EvaluationRun, RunConfiguration, RunStatus};
pub use orchestrator::EvaluationOrchestrator;
pub use persistence::{EvaluationStore, JsonFileStore, MemoryStore};
