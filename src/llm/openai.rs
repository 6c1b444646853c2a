//! `OpenAI` chat-completion client.

use super::{CompletionOptions, LlmHttpConfig, LlmProvider, build_http_client};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// `OpenAI` LLM client.
///
/// API keys are stored using `SecretString`, which zeroizes memory on drop.
pub struct OpenAiClient {
    /// API key (zeroized on drop).
    api_key: Option<SecretString>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OpenAiClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Creates a new client for the given model, reading `OPENAI_API_KEY`
    /// from the environment.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").ok().map(SecretString::from);
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            client: build_http_client(LlmHttpConfig::from_env()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Sets the API endpoint (for proxies and compatible servers).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Validates that a usable API key is configured.
    fn validate(&self) -> Result<()> {
        match &self.api_key {
            None => Err(Error::Configuration("OPENAI_API_KEY not set".to_string())),
            Some(key) if !Self::is_valid_api_key_format(key.expose_secret()) => Err(
                Error::Configuration("invalid OPENAI_API_KEY format".to_string()),
            ),
            Some(_) => Ok(()),
        }
    }

    /// `OpenAI` keys are `sk-` (or `sk-proj-`) prefixed with a restricted
    /// character set; anything else is rejected before it reaches a header.
    fn is_valid_api_key_format(key: &str) -> bool {
        let valid_prefix = key.starts_with("sk-");
        let valid_chars = key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid_prefix && valid_chars && key.len() >= 20 && key.len() <= 200
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl LlmProvider for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn complete_with_options(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        self.validate()?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Configuration("OPENAI_API_KEY not set".to_string()))?;

        tracing::debug!(provider = "openai", model = %self.model, "LLM request");

        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user.to_string(),
        });

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header(
                "Authorization",
                format!("Bearer {}", api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::transient("openai_request", e.to_string())
                } else {
                    Error::failed("openai_request", e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(provider = "openai", status = %status, "LLM error status");
            return Err(match status.as_u16() {
                401 | 403 => Error::Configuration(format!("API rejected credentials: {status}")),
                429 | 500..=599 => {
                    Error::transient("openai_request", format!("status {status}: {body}"))
                },
                _ => Error::failed("openai_request", format!("status {status}: {body}")),
            });
        }

        let response: ChatCompletionResponse = response
            .json()
            .map_err(|e| Error::failed("openai_response", e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::failed("openai_response", "no choices in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_api_keys() {
        assert!(OpenAiClient::is_valid_api_key_format(
            "sk-proj-abcdefghijklmnop123456"
        ));
        assert!(!OpenAiClient::is_valid_api_key_format("not-a-key"));
        assert!(!OpenAiClient::is_valid_api_key_format("sk-short"));
        assert!(!OpenAiClient::is_valid_api_key_format(
            "sk-bad key with spaces and enough length"
        ));
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let client = OpenAiClient {
            api_key: None,
            endpoint: OpenAiClient::DEFAULT_ENDPOINT.to_string(),
            model: "gpt-4o-mini".to_string(),
            client: reqwest::blocking::Client::new(),
        };
        let err = client.validate().expect_err("must fail");
        assert!(matches!(err, Error::Configuration(_)));
        assert!(!err.is_retryable());
    }
}
