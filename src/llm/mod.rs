//! LLM client abstraction.
//!
//! Provides a unified interface over chat-completion providers. All
//! generation calls in the system (extraction, gleaning, resolution,
//! community reports, query answering, traversal scoring) go through
//! [`LlmProvider`], usually wrapped in [`ResilientLlm`] which enforces the
//! request-per-minute budget and retry policy.
//!
//! # Supported Providers
//!
//! | Provider | Client | Environment Variables |
//! |----------|--------|----------------------|
//! | `OpenAI` | [`OpenAiClient`] | `OPENAI_API_KEY` |
//! | Anthropic | [`AnthropicClient`] | `ANTHROPIC_API_KEY` |
//!
//! # Usage
//!
//! ```rust,ignore
//! use graphlore::llm::{CompletionOptions, LlmProvider, OpenAiClient};
//!
//! let client = OpenAiClient::new("gpt-4o-mini");
//! let answer = client.complete(
//!     "You answer concisely.",
//!     "What is a knowledge graph?",
//! )?;
//! ```
//!
//! # Implementing a New Provider
//!
//! Implement [`LlmProvider::name`] and [`LlmProvider::complete_with_options`];
//! the convenience methods have defaults. Map provider errors through the
//! crate taxonomy: auth failures to `Error::Configuration`, timeouts /
//! rate-limit / 5xx responses to `Error::Transient`, the rest to
//! `Error::OperationFailed`. The retry layer depends on that mapping.

mod anthropic;
mod openai;
pub mod prompts;
mod resilience;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
pub use resilience::{RateLimiter, ResilientLlm, RetryPolicy};

use crate::Result;
use std::time::Duration;

/// Per-call generation options.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

impl CompletionOptions {
    /// Options for a short constrained reply (continuation gates).
    #[must_use]
    pub const fn short() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 8,
        }
    }

    /// Options with the given temperature and the default token cap.
    #[must_use]
    pub const fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: 1024,
        }
    }

    /// Raises the output token cap.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Trait for LLM providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails; transient backend failures
    /// must surface as [`crate::Error::Transient`] so the retry layer can
    /// distinguish them.
    fn complete_with_options(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String>;

    /// Generates a completion with default options (temperature 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.complete_with_options(system, user, &CompletionOptions::default())
    }
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(v) = std::env::var("LLM_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                settings.timeout_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("LLM_CONNECT_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                settings.connect_timeout_ms = parsed;
            }
        }
        settings
    }
}

/// Builds a blocking HTTP client with the given timeout configuration.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }
    builder
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

/// Extracts a JSON payload from a response that may be wrapped in prose or a
/// markdown code fence.
///
/// Returns the trimmed response unchanged when no JSON object or array can
/// be located; the caller's serde parse then produces the real error.
#[must_use]
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                return trimmed[start..=end].trim();
            }
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_unwraps_markdown_fences() {
        let response = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(response), "{\"a\": 1}");
    }

    #[test]
    fn extract_json_finds_bare_objects_and_arrays() {
        assert_eq!(extract_json("noise {\"a\": 1} noise"), "{\"a\": 1}");
        assert_eq!(extract_json("[1, 2]"), "[1, 2]");
        assert_eq!(extract_json("no json here"), "no json here");
    }
}
