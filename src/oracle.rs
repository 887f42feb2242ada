//! The generation oracle: one prompt in, raw text out.

use crate::backend::{with_backoff, Backend, LlmRequest, OllamaBackend};
use crate::config::OracleConfig;
use crate::error::Result;
use crate::prompt::{render, EXTRACTION_TEMPLATE};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Everything the oracle sees for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromptVariables {
    /// Report text after preprocessing.
    pub report: String,
    /// Feedback from the previous attempt only; empty on the first.
    pub feedback: String,
    /// The component's schema document as pretty JSON.
    pub schema: String,
    pub schema_name: String,
}

impl PromptVariables {
    pub fn as_pairs(&self) -> [(&str, &str); 4] {
        [
            ("report", self.report.as_str()),
            ("feedback", self.feedback.as_str()),
            ("schema", self.schema.as_str()),
            ("schema_name", self.schema_name.as_str()),
        ]
    }
}

/// Produces candidate output for a component.
///
/// Errors are treated as transport failures by the retry loop, as is
/// empty output.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, vars: &PromptVariables) -> Result<String>;
}

/// Oracle backed by a model [`Backend`] (Ollama unless replaced).
///
/// Renders [`EXTRACTION_TEMPLATE`] (or a custom template with the same
/// variables) and calls the backend with transport backoff.
pub struct LlmOracle {
    backend: Arc<dyn Backend>,
    client: Client,
    config: OracleConfig,
    template: String,
}

impl LlmOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(OllamaBackend),
            client: config.build_client()?,
            config,
            template: EXTRACTION_TEMPLATE.to_string(),
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// The prompt sent for `vars`.
    pub fn render_prompt(&self, vars: &PromptVariables) -> String {
        render(&self.template, &vars.as_pairs())
    }
}

impl std::fmt::Debug for LlmOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmOracle")
            .field("backend", &self.backend.name())
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn generate(&self, vars: &PromptVariables) -> Result<String> {
        let request = LlmRequest::from_config(&self.config, self.render_prompt(vars));
        debug!(
            component = %vars.schema_name,
            backend = self.backend.name(),
            prompt_len = request.prompt.len(),
            "calling oracle"
        );
        let response = with_backoff(
            &self.backend,
            &self.client,
            &self.config.base_url,
            &request,
            &self.config.backoff,
        )
        .await?;
        Ok(response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockReply};
    use crate::error::ExtractError;

    fn vars() -> PromptVariables {
        PromptVariables {
            report: "Trivial pericardial effusion.".into(),
            feedback: "Use 'Small' for trivial.".into(),
            schema: "{\"type\": \"object\"}".into(),
            schema_name: "Pericardium".into(),
        }
    }

    #[test]
    fn test_renders_every_variable() {
        let oracle = LlmOracle::new(OracleConfig::default())
            .unwrap()
            .with_template("{schema_name}|{report}|{feedback}|{schema}");
        assert_eq!(
            oracle.render_prompt(&vars()),
            "Pericardium|Trivial pericardial effusion.|Use 'Small' for trivial.|{\"type\": \"object\"}"
        );
    }

    #[tokio::test]
    async fn test_returns_backend_text() {
        let mock = Arc::new(MockBackend::fixed("{\"a\": 1}"));
        let oracle = LlmOracle::new(OracleConfig::default())
            .unwrap()
            .with_backend(mock.clone());
        assert_eq!(oracle.generate(&vars()).await.unwrap(), "{\"a\": 1}");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_surfaces_backend_errors() {
        let oracle = LlmOracle::new(OracleConfig::default())
            .unwrap()
            .with_backend(Arc::new(MockBackend::replies(vec![MockReply::Status(500)])));
        let err = oracle.generate(&vars()).await.unwrap_err();
        assert!(matches!(err, ExtractError::HttpError { status: 500, .. }));
    }
}
