//! Claims query engine.
//!
//! Filters recorded claims by subject, type, and status; when a question is
//! supplied, synthesizes an answer over the matching claims, respecting each
//! claim's status tag.

use crate::llm::{CompletionOptions, LlmProvider, extract_json, prompts};
use crate::models::ClaimsQueryResult;
use crate::storage::{ClaimFilter, GraphStore};
use crate::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ClaimsAnswer {
    answer: String,
}

/// Claims query engine.
pub struct ClaimsQueryEngine {
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn LlmProvider>,
}

impl ClaimsQueryEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(graph: Arc<dyn GraphStore>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { graph, llm }
    }

    /// Runs a claims query. Without a question, this is a pure filter.
    ///
    /// # Errors
    ///
    /// Returns an error on store failures; a failed synthesis degrades to the
    /// bare claim list.
    pub fn run(&self, question: Option<&str>, filter: &ClaimFilter) -> Result<ClaimsQueryResult> {
        let claims = self.graph.query_claims(filter)?;

        let answer = match question {
            Some(question) if !claims.is_empty() && !question.trim().is_empty() => {
                let rendered: String = claims
                    .iter()
                    .map(|c| {
                        format!(
                            "- [{}] {} {} {}: {} (source: \"{}\")",
                            c.status,
                            c.subject,
                            c.claim_type,
                            c.object.as_deref().unwrap_or("-"),
                            c.description,
                            c.source_text,
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let outcome = self
                    .llm
                    .complete_with_options(
                        prompts::CLAIMS_ANSWER_SYSTEM,
                        &prompts::claims_answer_user(question, &rendered),
                        &CompletionOptions::default(),
                    )
                    .and_then(|response| {
                        serde_json::from_str::<ClaimsAnswer>(extract_json(&response)).map_err(
                            |e| Error::Parse {
                                operation: "claims_answer".to_string(),
                                cause: e.to_string(),
                            },
                        )
                    });
                match outcome {
                    Ok(parsed) => Some(parsed.answer),
                    Err(e) => {
                        tracing::warn!(error = %e, "claims synthesis failed, returning raw claims");
                        None
                    },
                }
            },
            _ => None,
        };

        Ok(ClaimsQueryResult { answer, claims })
    }
}
