//! RAG Evaluator CLI
//!
//! Runs evaluation runs and ablation studies, and reports on stored results.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rag_evaluator::{
    ablation::AblationOrchestrator,
    aggregator::{hallucination_summary, summarize_run},
    config::{Config, JudgeKind},
    dataset::{QuestionSet, sample_academic_set},
    llm::LlmClient,
    metrics::{Judge, LexicalJudge, LlmJudge, MetricBattery},
    model::{AblationVariant, RunConfiguration, RunStatus},
    orchestrator::EvaluationOrchestrator,
    persistence::{EvaluationStore, JsonFileStore},
    retrieval::{
        ChunkingStrategy, ContextRetriever, HttpRetriever, RetrievalRequest, RetrievalStrategy,
    },
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// RAG Evaluator - compare retrieval-augmented answers against an ungrounded baseline
#[derive(Parser)]
#[command(name = "rag-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a question set under one configuration
    Run {
        /// Run name
        #[arg(short, long, default_value = "evaluation")]
        name: String,

        /// Question set (JSON or JSONL). Uses the built-in sample set if omitted
        #[arg(short, long)]
        questions: Option<PathBuf>,

        /// Only evaluate the first N questions
        #[arg(short, long)]
        limit: Option<usize>,

        /// Retrieval strategy (vector, keyword, hybrid)
        #[arg(long, value_parser = parse_retrieval_strategy)]
        strategy: Option<RetrievalStrategy>,

        /// Chunking strategy (fixed, sentence, recursive, semantic)
        #[arg(long, value_parser = parse_chunking_strategy)]
        chunking: Option<ChunkingStrategy>,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum retrieval similarity in [0, 1]
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Rerank retrieved chunks
        #[arg(long)]
        reranking: bool,

        /// Plan a search query before retrieval
        #[arg(long)]
        agentic: bool,

        /// Constrain grounded answers to the retrieved sources
        #[arg(long)]
        guardrails: bool,
    },

    /// Evaluate a question set under several configurations and rank them
    Ablation {
        /// Study name
        #[arg(short, long, default_value = "ablation")]
        name: String,

        /// Configuration variants (YAML or JSON list). Uses a built-in grid if omitted
        #[arg(long)]
        variants: Option<PathBuf>,

        /// Question set (JSON or JSONL). Uses the built-in sample set if omitted
        #[arg(short, long)]
        questions: Option<PathBuf>,

        /// Only evaluate the first N questions
        #[arg(short, long)]
        limit: Option<usize>,

        /// Write the markdown report to this file as well
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the summary of a stored run
    Summary {
        /// Run id
        run_id: Uuid,

        /// Output as JSON instead of a formatted summary
        #[arg(long)]
        json: bool,
    },

    /// List stored runs
    List {
        /// List ablation studies instead of runs
        #[arg(long)]
        studies: bool,
    },

    /// Delete a stored run and its questions
    Delete {
        /// Run id
        run_id: Uuid,
    },

    /// Hallucination analysis across all completed runs
    Hallucinations,

    /// Test LLM and retrieval connections
    Test,
}

fn parse_retrieval_strategy(s: &str) -> std::result::Result<RetrievalStrategy, String> {
    RetrievalStrategy::parse(s).ok_or_else(|| format!("unknown retrieval strategy '{}'", s))
}

fn parse_chunking_strategy(s: &str) -> std::result::Result<ChunkingStrategy, String> {
    ChunkingStrategy::parse(s).ok_or_else(|| format!("unknown chunking strategy '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            name,
            questions,
            limit,
            strategy,
            chunking,
            top_k,
            min_similarity,
            reranking,
            agentic,
            guardrails,
        } => {
            let config = load_config()?;
            let mut run_config = config.evaluation.default_run.clone();
            if let Some(strategy) = strategy {
                run_config.retrieval_strategy = strategy;
            }
            if let Some(chunking) = chunking {
                run_config.chunking_strategy = chunking;
            }
            if let Some(top_k) = top_k {
                run_config.top_k = top_k;
            }
            if let Some(min_similarity) = min_similarity {
                run_config.min_similarity = min_similarity;
            }
            run_config.reranking |= reranking;
            run_config.agentic |= agentic;
            run_config.guardrails |= guardrails;
            cmd_run(config, name, questions, limit, run_config).await
        }
        Commands::Ablation {
            name,
            variants,
            questions,
            limit,
            output,
        } => cmd_ablation(name, variants, questions, limit, output).await,
        Commands::Summary { run_id, json } => cmd_summary(run_id, json).await,
        Commands::List { studies } => cmd_list(studies).await,
        Commands::Delete { run_id } => cmd_delete(run_id).await,
        Commands::Hallucinations => cmd_hallucinations().await,
        Commands::Test => cmd_test().await,
    }
}

/// Logs go to stderr so summaries on stdout stay clean. `RUST_LOG` wins
/// over `-v` when set.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rag_evaluator={},rag_eval={}", level, level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Result<Config> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn open_store(config: &Config) -> Result<Arc<JsonFileStore>> {
    let store = JsonFileStore::open(&config.storage.data_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to open data directory '{}'",
                config.storage.data_dir.display()
            )
        })?;
    Ok(Arc::new(store))
}

fn build_judge(config: &Config, client: &LlmClient) -> Arc<dyn Judge> {
    match config.judge.kind {
        JudgeKind::Lexical => Arc::new(LexicalJudge::new(config.judge.support_threshold)),
        JudgeKind::Llm => Arc::new(LlmJudge::new(Arc::new(client.clone()))),
    }
}

async fn build_orchestrator(config: &Config) -> Result<EvaluationOrchestrator> {
    config
        .validate_retrieval()
        .context("Invalid retrieval configuration")?;
    let store = open_store(config).await?;
    let client = LlmClient::new(config.llm.clone());
    let battery = MetricBattery::new(build_judge(config, &client), &config.evaluation);

    println!("Using model: {}", client.model());
    println!("Judge:       {}", battery.judge_name());
    println!("Data dir:    {}", config.storage.data_dir.display());

    Ok(EvaluationOrchestrator::new(
        store,
        Arc::new(HttpRetriever::new(config.retrieval.clone())),
        Arc::new(client),
        battery,
        &config.evaluation,
    ))
}

fn load_questions(path: Option<&Path>, limit: Option<usize>) -> Result<QuestionSet> {
    let set = match path {
        Some(path) => QuestionSet::load(path)
            .with_context(|| format!("Failed to load questions from '{}'", path.display()))?,
        None => sample_academic_set(),
    };
    let set = match limit {
        Some(n) => set.take(n),
        None => set,
    };
    if set.is_empty() {
        anyhow::bail!("Question set '{}' is empty", set.name);
    }
    println!("Questions:   {} ({})", set.len(), set.name);
    Ok(set)
}

/// Drive `work` to completion, cancelling it cooperatively on Ctrl-C.
async fn until_ctrl_c<F: Future>(work: F, cancel: &CancellationToken) -> F::Output {
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => return output,
        _ = tokio::signal::ctrl_c() => {}
    }
    eprintln!("\nInterrupted, stopping after the current question...");
    cancel.cancel();
    work.await
}

async fn cmd_run(
    config: Config,
    name: String,
    questions: Option<PathBuf>,
    limit: Option<usize>,
    run_config: RunConfiguration,
) -> Result<()> {
    println!("Configuration: {}", run_config.describe());
    let orchestrator = build_orchestrator(&config).await?;
    let set = load_questions(questions.as_deref(), limit)?;

    let start = Instant::now();
    let cancel = CancellationToken::new();
    let run = until_ctrl_c(
        orchestrator.run(&name, run_config, set.questions, &cancel),
        &cancel,
    )
    .await
    .context("Evaluation run failed")?;

    let evaluated = orchestrator.store().questions(run.id).await?;
    summarize_run(&run, &evaluated).print_summary();
    println!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

/// Retrieval-strategy and reranking axes over the default configuration.
fn default_variants(base: &RunConfiguration) -> Vec<AblationVariant> {
    let with = |strategy: RetrievalStrategy, reranking: bool| RunConfiguration {
        retrieval_strategy: strategy,
        reranking,
        ..base.clone()
    };
    vec![
        AblationVariant::new("vector", with(RetrievalStrategy::Vector, false)),
        AblationVariant::new("keyword", with(RetrievalStrategy::Keyword, false)),
        AblationVariant::new("hybrid", with(RetrievalStrategy::Hybrid, false)),
        AblationVariant::new("hybrid-reranked", with(RetrievalStrategy::Hybrid, true)),
    ]
}

fn load_variants(path: &Path) -> Result<Vec<AblationVariant>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read variants from '{}'", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid variants file '{}'", path.display()))
}

async fn cmd_ablation(
    name: String,
    variants: Option<PathBuf>,
    questions: Option<PathBuf>,
    limit: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;
    let variants = match &variants {
        Some(path) => load_variants(path)?,
        None => default_variants(&config.evaluation.default_run),
    };
    let ablation = AblationOrchestrator::new(build_orchestrator(&config).await?);
    let set = load_questions(questions.as_deref(), limit)?;
    println!("Configurations: {}", variants.len());

    let start = Instant::now();
    let cancel = CancellationToken::new();
    let study = until_ctrl_c(ablation.run(&name, variants, set.questions, &cancel), &cancel)
        .await
        .context("Ablation study failed")?;

    let report = study.report.as_deref().unwrap_or_default();
    println!("\n{}", report);
    if let Some(path) = output {
        std::fs::write(&path, report)
            .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
        println!("Report saved to: {}", path.display());
    }
    println!("Study {} finished in {:.2?}", study.id, start.elapsed());
    Ok(())
}

async fn cmd_summary(run_id: Uuid, json: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let store = open_store(&config).await?;
    let run = store.get_run(run_id).await.context("Failed to load run")?;
    let questions = store.questions(run_id).await?;
    let summary = summarize_run(&run, &questions);

    if json {
        let json_str =
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("Status:        {}", run.status);
    println!("Configuration: {}", run.configuration.describe());
    if let Some(error) = &run.error {
        println!("Error:         {}", error);
    }
    summary.print_summary();

    let failed: Vec<_> = questions.iter().filter(|q| q.error.is_some()).collect();
    if !failed.is_empty() {
        println!("Failed questions:");
        for question in failed {
            println!(
                "  #{} {}: {}",
                question.position + 1,
                question.question,
                question.error.as_deref().unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn cmd_list(studies: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let store = open_store(&config).await?;

    if studies {
        let studies = store.list_studies().await?;
        if studies.is_empty() {
            println!("No ablation studies found.");
            return Ok(());
        }
        println!("{:<36}  {:<10}  {:>7}  {:<20}  Name", "Id", "Status", "Configs", "Created");
        println!("{}", "─".repeat(90));
        for study in studies {
            println!(
                "{:<36}  {:<10}  {:>7}  {:<20}  {}",
                study.id,
                study.status,
                study.configurations.len(),
                study.created_at.format("%Y-%m-%d %H:%M:%S"),
                study.name
            );
        }
        return Ok(());
    }

    let runs = store.list_runs().await?;
    if runs.is_empty() {
        println!("No evaluation runs found.");
        return Ok(());
    }
    println!("{:<36}  {:<10}  {:>9}  {:<20}  Name", "Id", "Status", "Progress", "Created");
    println!("{}", "─".repeat(90));
    for run in runs {
        println!(
            "{:<36}  {:<10}  {:>9}  {:<20}  {}",
            run.id,
            run.status,
            format!("{}/{}", run.processed_questions(), run.total_questions),
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.name
        );
    }
    Ok(())
}

async fn cmd_delete(run_id: Uuid) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let store = open_store(&config).await?;
    let run = store.get_run(run_id).await.context("Failed to load run")?;
    if run.status == RunStatus::Running {
        anyhow::bail!("Run '{}' is still running", run_id);
    }
    store.delete_run(run_id).await.context("Failed to delete run")?;
    println!("Deleted run {} ({})", run.id, run.name);
    Ok(())
}

async fn cmd_hallucinations() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let store = open_store(&config).await?;

    let mut runs = Vec::new();
    for run in store.list_runs().await? {
        if run.status != RunStatus::Completed {
            continue;
        }
        let questions = store.questions(run.id).await?;
        runs.push((run, questions));
    }
    if runs.is_empty() {
        println!("No completed runs found.");
        return Ok(());
    }
    hallucination_summary(&runs).print_summary();
    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing connections...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        config.llm.api_key.chars().take(8).collect::<String>()
    );
    println!("  Retrieval: {}", config.retrieval.endpoint);
    println!("  Judge:     {:?}", config.judge.kind);
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm.clone());
    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => println!("LLM connection successful!"),
        Err(e) => println!("LLM connection failed: {}", e),
    }

    if config.validate_retrieval().is_err() {
        println!("Retrieval endpoint not configured, skipping.");
        return Ok(());
    }
    let retriever = HttpRetriever::new(config.retrieval.clone());
    let request = RetrievalRequest {
        question: "test".to_string(),
        top_k: 1,
        min_similarity: 0.0,
        strategy: config.evaluation.default_run.retrieval_strategy,
        chunking: config.evaluation.default_run.chunking_strategy,
    };
    match retriever.retrieve(&request).await {
        Ok(result) => println!(
            "Retrieval connection successful! ({} chunks, {} strategy)",
            result.chunks.len(),
            result.effective_strategy
        ),
        Err(e) => println!("Retrieval connection failed: {}", e),
    }

    Ok(())
}
