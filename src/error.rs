//! Error types for the evaluation engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while evaluating RAG pipelines.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file error or missing setting.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request rejected before any state transition.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A run, question or study does not exist in the store.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Lifecycle transition not allowed from the current status.
    #[error("Invalid transition for {kind} '{id}': {from} -> {to}")]
    InvalidTransition {
        kind: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Context retrieval failed.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Judge capability failed to produce a signal.
    #[error("Judge error: {0}")]
    Judge(String),

    /// Persistent store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Execution was cancelled between questions.
    #[error("Evaluation cancelled")]
    Cancelled,
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        EvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::LlmParse(err.to_string())
    }
}

impl From<serde_yaml::Error> for EvalError {
    fn from(err: serde_yaml::Error) -> Self {
        EvalError::Config(err.to_string())
    }
}
