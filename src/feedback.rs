//! Corrective feedback between attempts.
//!
//! A failed attempt is summarized by [`format_error_details`] and handed to
//! a [`FeedbackGenerator`], whose text becomes the `feedback` variable of
//! the next attempt's prompt.

use crate::backend::{with_backoff, Backend, LlmRequest, OllamaBackend};
use crate::config::OracleConfig;
use crate::error::{AttemptError, Result};
use crate::prompt::{render, FEEDBACK_TEMPLATE};
use crate::validate::FieldError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::warn;

/// Characters of the schema shown alongside parse and transport errors.
const SCHEMA_PREVIEW_CHARS: usize = 500;

/// Returned when the feedback model fails or answers with nothing.
pub const GENERIC_FEEDBACK: &str = "Could not generate specific feedback. Make sure the output is only a valid JSON object that strictly follows the schema.";

/// What went wrong in an attempt.
#[derive(Debug, Clone)]
pub enum ErrorDetails {
    /// Validation errors, each carrying its schema snippet.
    Fields(Vec<FieldError>),
    /// A parse or transport failure.
    Message(String),
}

impl From<&AttemptError> for ErrorDetails {
    fn from(err: &AttemptError) -> Self {
        match err {
            AttemptError::Validation(errors) => ErrorDetails::Fields(errors.clone()),
            other => ErrorDetails::Message(other.to_string()),
        }
    }
}

/// Render error details for the feedback generator.
///
/// Field errors are numbered with their path, message, kind and indented
/// schema snippet. Messages are followed by the start of `schema_text`.
pub fn format_error_details(details: &ErrorDetails, schema_text: &str) -> String {
    match details {
        ErrorDetails::Fields(errors) => {
            let total = errors.len();
            let mut parts = vec![
                format!("Validation errors ({} found):", total),
                "-".repeat(20),
            ];
            for (i, error) in errors.iter().enumerate() {
                parts.push(format!("--- Error {}/{} ---", i + 1, total));
                parts.push(format!("Path: {}", error.path_string()));
                parts.push(format!("Message: {} (Type: {})", error.message, error.kind.as_str()));
                parts.push("Relevant schema snippet:".to_string());
                parts.push("```json".to_string());
                let snippet = serde_json::to_string_pretty(&error.snippet_value())
                    .unwrap_or_else(|_| error.snippet_value().to_string());
                parts.extend(snippet.lines().map(|l| format!("  {}", l)));
                parts.push("```".to_string());
                if i + 1 < total {
                    parts.push("-".repeat(10));
                }
            }
            parts.push("-".repeat(20));
            parts.join("\n")
        }
        ErrorDetails::Message(message) => {
            let preview: String = schema_text.chars().take(SCHEMA_PREVIEW_CHARS).collect();
            format!(
                "Error detail:\n{}\n\nThe expected JSON structure starts like:\n```json\n{}...\n```",
                message, preview
            )
        }
    }
}

/// Inputs for one round of feedback.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackRequest<'a> {
    pub component: &'a str,
    pub report: &'a str,
    /// The oracle's raw text for the failed attempt (empty on transport failure).
    pub raw_output: &'a str,
    pub details: &'a ErrorDetails,
    /// The component schema as pretty JSON.
    pub schema_text: &'a str,
}

/// Turns a failed attempt into guidance for the next one. Infallible.
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, request: &FeedbackRequest<'_>) -> String;
}

/// Deterministic feedback built from the error details; no model call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateFeedback;

#[async_trait]
impl FeedbackGenerator for TemplateFeedback {
    async fn generate(&self, request: &FeedbackRequest<'_>) -> String {
        let details = format_error_details(request.details, request.schema_text);
        let previous = if request.raw_output.trim().is_empty() {
            "(no output)"
        } else {
            request.raw_output
        };
        format!(
            "Your previous output for {} was rejected.\n\n{}\n\nPrevious output:\n```\n{}\n```\n\nReturn only a JSON object for {} that fixes every error above.",
            request.component, details, previous, request.component
        )
    }
}

/// Feedback written by a model from [`FEEDBACK_TEMPLATE`].
pub struct LlmFeedback {
    backend: Arc<dyn Backend>,
    client: Client,
    config: OracleConfig,
}

impl LlmFeedback {
    pub fn new(config: OracleConfig) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(OllamaBackend),
            client: config.build_client()?,
            config,
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    fn render_prompt(request: &FeedbackRequest<'_>) -> String {
        let details = format_error_details(request.details, request.schema_text);
        render(
            FEEDBACK_TEMPLATE,
            &[
                ("report", request.report),
                ("raw_llm_output", request.raw_output),
                ("error_details", &details),
            ],
        )
    }
}

#[async_trait]
impl FeedbackGenerator for LlmFeedback {
    async fn generate(&self, request: &FeedbackRequest<'_>) -> String {
        let llm_request = LlmRequest::from_config(&self.config, Self::render_prompt(request));
        match with_backoff(
            &self.backend,
            &self.client,
            &self.config.base_url,
            &llm_request,
            &self.config.backoff,
        )
        .await
        {
            Ok(resp) if !resp.text.trim().is_empty() => resp.text.trim().to_string(),
            Ok(_) => {
                warn!(component = request.component, "feedback model returned nothing");
                GENERIC_FEEDBACK.to_string()
            }
            Err(e) => {
                warn!(component = request.component, error = %e, "feedback model call failed");
                GENERIC_FEEDBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::schema::{navigator::NavError, PathStep};
    use crate::validate::FieldErrorKind;
    use serde_json::json;

    fn field_errors() -> Vec<FieldError> {
        vec![
            FieldError {
                path: vec![PathStep::from("measurements"), PathStep::from("thickness")],
                message: "value 42 is outside the permitted range [0.5, 10]".into(),
                kind: FieldErrorKind::OutOfRange,
                snippet: Ok(json!({"minimum": 0.5, "maximum": 10.0})),
            },
            FieldError {
                path: vec![PathStep::from("extra")],
                message: "field required".into(),
                kind: FieldErrorKind::Missing,
                snippet: Err(NavError::ExternalRef("other.json".into())),
            },
        ]
    }

    fn request<'a>(details: &'a ErrorDetails) -> FeedbackRequest<'a> {
        FeedbackRequest {
            component: "Pericardium",
            report: "Pericardium 4.2 cm.",
            raw_output: "{\"measurements\": {\"thickness\": 42}}",
            details,
            schema_text: "{\"title\": \"Pericardium\"}",
        }
    }

    #[test]
    fn test_formats_numbered_field_errors_with_snippets() {
        let text = format_error_details(&ErrorDetails::Fields(field_errors()), "");
        assert!(text.starts_with("Validation errors (2 found):"));
        assert!(text.contains("--- Error 1/2 ---\nPath: measurements.thickness"));
        assert!(text.contains("(Type: out_of_range)"));
        assert!(text.contains("  \"maximum\": 10.0"));
        assert!(text.contains("--- Error 2/2 ---\nPath: extra"));
        assert!(text.contains("\"error\":"));
    }

    #[test]
    fn test_message_details_include_schema_preview() {
        let schema = "x".repeat(800);
        let text = format_error_details(&ErrorDetails::Message("bad json".into()), &schema);
        assert!(text.starts_with("Error detail:\nbad json"));
        assert!(text.contains(&format!("{}...", "x".repeat(500))));
        assert!(!text.contains(&"x".repeat(501)));
    }

    #[test]
    fn test_details_from_attempt_error() {
        let parse = AttemptError::Parse("expected value at line 1".into());
        assert!(matches!(ErrorDetails::from(&parse), ErrorDetails::Message(m) if m.contains("line 1")));
        let validation = AttemptError::Validation(field_errors());
        assert!(matches!(ErrorDetails::from(&validation), ErrorDetails::Fields(e) if e.len() == 2));
    }

    #[tokio::test]
    async fn test_template_feedback_includes_errors_and_output() {
        let details = ErrorDetails::Fields(field_errors());
        let text = TemplateFeedback.generate(&request(&details)).await;
        assert!(text.contains("Pericardium"));
        assert!(text.contains("measurements.thickness"));
        assert!(text.contains("\"thickness\": 42"));
    }

    #[test]
    fn test_llm_feedback_prompt_carries_all_inputs() {
        let details = ErrorDetails::Message("bad json".into());
        let prompt = LlmFeedback::render_prompt(&request(&details));
        assert!(prompt.contains("Pericardium 4.2 cm."));
        assert!(prompt.contains("{\"measurements\": {\"thickness\": 42}}"));
        assert!(prompt.contains("Error detail:\nbad json"));
    }

    #[tokio::test]
    async fn test_llm_feedback_uses_model_text() {
        let feedback = LlmFeedback::new(OracleConfig::default())
            .unwrap()
            .with_backend(Arc::new(MockBackend::fixed("  - thickness is in cm, convert to mm\n")));
        let details = ErrorDetails::Fields(field_errors());
        assert_eq!(
            feedback.generate(&request(&details)).await,
            "- thickness is in cm, convert to mm"
        );
    }

    #[tokio::test]
    async fn test_llm_feedback_falls_back_on_failure_or_empty_text() {
        let details = ErrorDetails::Message("bad json".into());
        let failing = LlmFeedback::new(OracleConfig::default())
            .unwrap()
            .with_backend(Arc::new(MockBackend::replies(vec![MockReply::Status(500)])));
        assert_eq!(failing.generate(&request(&details)).await, GENERIC_FEEDBACK);

        let silent = LlmFeedback::new(OracleConfig::default())
            .unwrap()
            .with_backend(Arc::new(MockBackend::fixed("   ")));
        assert_eq!(silent.generate(&request(&details)).await, GENERIC_FEEDBACK);
    }
}
