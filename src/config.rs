//! Configuration for the evaluation engine.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.
//! The resulting [`Config`] is passed explicitly into the orchestrators;
//! nothing in the engine reads process-wide state.

use crate::error::{EvalError, Result};
use crate::model::RunConfiguration;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4", "claude-3-opus")
    pub model: String,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Default temperature for generation
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "claude-latest".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Which judge implementation backs the model-judged metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeKind {
    /// Deterministic lexical heuristics, no rubric scoring.
    Lexical,
    /// Judge model reached through the configured LLM endpoint.
    Llm,
}

impl JudgeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lexical" => Some(JudgeKind::Lexical),
            "llm" => Some(JudgeKind::Llm),
            _ => None,
        }
    }
}

/// Judge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub kind: JudgeKind,

    /// Minimum share of a claim's content terms that must appear in a passage
    /// for the lexical judge to count it as supported.
    pub support_threshold: f64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            kind: JudgeKind::Lexical,
            support_threshold: 0.5,
        }
    }
}

/// External retrieval service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Endpoint accepting retrieval requests (POST, JSON).
    pub endpoint: String,

    /// Optional bearer token.
    pub api_key: Option<String>,
}

/// Engine-wide evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Temperature for both the grounded and the baseline generation.
    /// Unset means the LLM's configured temperature.
    pub temperature: Option<f32>,

    /// Domain label selecting the rubric for domain metrics.
    pub domain: String,

    /// Weight of token-level factual overlap in answer correctness.
    pub factual_weight: f64,

    /// Weight of semantic similarity in answer correctness.
    pub semantic_weight: f64,

    /// Configuration applied to runs that do not specify their own.
    pub default_run: RunConfiguration,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            temperature: None,
            domain: "university".to_string(),
            factual_weight: 0.75,
            semantic_weight: 0.25,
            default_run: RunConfiguration::default(),
        }
    }
}

impl EvaluationSettings {
    pub fn validate(&self) -> Result<()> {
        if self.factual_weight < 0.0 || self.semantic_weight < 0.0 {
            return Err(EvalError::Config(
                "Answer correctness weights must be non-negative".to_string(),
            ));
        }
        if self.factual_weight + self.semantic_weight <= 0.0 {
            return Err(EvalError::Config(
                "At least one answer correctness weight must be positive".to_string(),
            ));
        }
        self.default_run.validate()
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding persisted runs, questions and studies.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,
    /// Judge settings
    pub judge: JudgeConfig,
    /// Retrieval service settings
    pub retrieval: RetrievalConfig,
    /// Evaluation settings
    pub evaluation: EvaluationSettings,
    /// Storage settings
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (~/.config/rag-evaluator/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

        serde_yaml::from_str(&content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                self.llm.max_tokens = tokens;
            }
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse() {
                self.llm.temperature = temp;
            }
        }

        if let Ok(endpoint) = env::var("RETRIEVAL_ENDPOINT") {
            self.retrieval.endpoint = endpoint;
        }

        if let Ok(key) = env::var("RETRIEVAL_API_KEY") {
            self.retrieval.api_key = Some(key);
        }

        if let Ok(kind) = env::var("RAG_EVAL_JUDGE") {
            if let Some(kind) = JudgeKind::parse(&kind) {
                self.judge.kind = kind;
            }
        }

        if let Ok(dir) = env::var("RAG_EVAL_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Ok(domain) = env::var("RAG_EVAL_DOMAIN") {
            self.evaluation.domain = domain;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-evaluator")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the LLM settings required for generation are present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(EvalError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(EvalError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(EvalError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        self.evaluation.validate()
    }

    /// Validate that a retrieval endpoint is configured.
    pub fn validate_retrieval(&self) -> Result<()> {
        if self.retrieval.endpoint.is_empty() {
            return Err(EvalError::Config(
                "Retrieval endpoint is required. Set RETRIEVAL_ENDPOINT environment variable or add to config file.".to_string()
            ));
        }
        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
