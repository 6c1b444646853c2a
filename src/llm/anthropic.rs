//! Anthropic Claude client.

use super::{CompletionOptions, LlmHttpConfig, LlmProvider, build_http_client};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Anthropic Claude LLM client.
pub struct AnthropicClient {
    /// API key (zeroized on drop).
    api_key: Option<SecretString>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl AnthropicClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.anthropic.com/v1";

    /// Creates a new client for the given model, reading `ANTHROPIC_API_KEY`
    /// from the environment.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .map(SecretString::from);
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

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl LlmProvider for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn complete_with_options(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Configuration("ANTHROPIC_API_KEY not set".to_string()))?;

        tracing::debug!(provider = "anthropic", model = %self.model, "LLM request");

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system: (!system.is_empty()).then(|| system.to_string()),
            messages: vec![Message {
                role: "user",
                content: user.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::transient("anthropic_request", e.to_string())
                } else {
                    Error::failed("anthropic_request", e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(provider = "anthropic", status = %status, "LLM error status");
            return Err(match status.as_u16() {
                401 | 403 => Error::Configuration(format!("API rejected credentials: {status}")),
                429 | 500..=599 => {
                    Error::transient("anthropic_request", format!("status {status}: {body}"))
                },
                _ => Error::failed("anthropic_request", format!("status {status}: {body}")),
            });
        }

        let response: MessagesResponse = response
            .json()
            .map_err(|e| Error::failed("anthropic_response", e.to_string()))?;

        response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| {
                Error::failed("anthropic_response", "no content in response".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_a_configuration_error() {
        let client = AnthropicClient {
            api_key: None,
            endpoint: AnthropicClient::DEFAULT_ENDPOINT.to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            client: reqwest::blocking::Client::new(),
        };
        let err = client
            .complete("", "hello")
            .expect_err("must fail without a key");
        assert!(matches!(err, Error::Configuration(_)));
    }
}
