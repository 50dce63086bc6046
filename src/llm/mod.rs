//! LLM integration module.
//!
//! Provides the [`Generator`] capability used for answer generation and
//! judging, an OpenAI-compatible client implementing it, and the prompts.

mod client;
mod prompts;

pub use client::{LlmClient, Message, Role};
pub use prompts::Prompts;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token accounting reported by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Text produced by a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn completion_tokens(&self) -> Option<u32> {
        self.usage.map(|u| u.completion_tokens)
    }
}

/// Produces text from a prompt.
///
/// A `None` temperature leaves the choice to the generator's own default.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<Generation>;
}
