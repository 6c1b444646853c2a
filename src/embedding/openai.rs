//! `OpenAI` embeddings client.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::llm::{LlmHttpConfig, RateLimiter, RetryPolicy, build_http_client};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `OpenAI` embeddings client.
///
/// Requests are serialized with a minimum 20 ms inter-call delay,
/// independent of the LLM rate limiter, and retried on transient failures
/// (3 attempts, 1 s base backoff). Empty inputs fail fast with a validation
/// error and are never retried.
pub struct OpenAiEmbedder {
    api_key: Option<SecretString>,
    endpoint: String,
    model: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
    pacer: RateLimiter,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Minimum delay between embedding requests.
    pub const MIN_INTER_REQUEST: Duration = Duration::from_millis(20);

    /// Creates a new embedder from configuration, reading `OPENAI_API_KEY`
    /// from the environment.
    #[must_use]
    pub fn new(config: &EmbeddingConfig) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").ok().map(SecretString::from);
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            client: build_http_client(LlmHttpConfig::from_env()),
            pacer: RateLimiter::with_interval(Self::MIN_INTER_REQUEST),
            retry: RetryPolicy::default(),
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

    fn request(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Configuration("OPENAI_API_KEY not set".to_string()))?;

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_string(),
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.endpoint))
            .header(
                "Authorization",
                format!("Bearer {}", api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::transient("embedding_request", e.to_string())
                } else {
                    Error::failed("embedding_request", e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => Error::Configuration(format!("API rejected credentials: {status}")),
                429 | 500..=599 => {
                    Error::transient("embedding_request", format!("status {status}: {body}"))
                },
                _ => Error::failed("embedding_request", format!("status {status}: {body}")),
            });
        }

        let response: EmbeddingResponse = response
            .json()
            .map_err(|e| Error::failed("embedding_response", e.to_string()))?;

        response
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| Error::failed("embedding_response", "empty data array".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".to_string()));
        }
        self.retry.run("embed", || {
            self.pacer.acquire();
            self.request(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_fails_without_touching_the_network() {
        let embedder = OpenAiEmbedder::new(&EmbeddingConfig::default())
            .with_endpoint("http://127.0.0.1:1/unreachable");
        assert!(matches!(
            embedder.embed(""),
            Err(Error::InvalidInput(_))
        ));
    }
}
