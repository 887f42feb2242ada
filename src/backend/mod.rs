//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over model providers, translating between
//! normalized [`LlmRequest`]/[`LlmResponse`] types and a provider's HTTP API.
//! [`OllamaBackend`] is the built-in implementation; [`MockBackend`] serves
//! scripted responses for tests and demos.
//!
//! ```text
//! LlmOracle / LlmFeedback ──► LlmRequest ──► with_backoff ──► Backend::complete() ──► LlmResponse
//! ```

pub mod backoff;
pub mod mock;
pub mod ollama;

pub use backoff::BackoffConfig;
pub use mock::{MockBackend, MockReply};
pub use ollama::OllamaBackend;

use crate::config::OracleConfig;
use crate::error::{ExtractError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// A provider-agnostic generation request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"llama3.2:3b"`).
    pub model: String,

    /// Fully rendered prompt text.
    pub prompt: String,

    pub temperature: f64,

    pub max_tokens: u32,

    /// Ask the provider to constrain output to JSON.
    pub json_mode: bool,

    /// Extra provider options merged into the request.
    pub options: Option<Value>,
}

impl LlmRequest {
    /// Build a request for `prompt` from an [`OracleConfig`].
    pub fn from_config(config: &OracleConfig, prompt: impl Into<String>) -> Self {
        Self {
            model: config.model.clone(),
            prompt: prompt.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            json_mode: config.json_mode,
            options: config.options.clone(),
        }
    }
}

/// A normalized provider response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, timing, model info).
    pub metadata: Option<Value>,
}

/// Abstraction over model providers.
///
/// Object-safe; used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute one non-streaming generation call.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Whether `error` is a transient transport failure worth retrying.
///
/// Retryable: [`ExtractError::HttpError`] with a status in
/// `config.retryable_statuses`, and [`ExtractError::Request`].
pub fn is_retryable(error: &ExtractError, config: &BackoffConfig) -> bool {
    match error {
        ExtractError::HttpError { status, .. } => config.retryable_statuses.contains(status),
        ExtractError::Request(_) => true,
        _ => false,
    }
}

/// Execute a backend call with transport-level retry and exponential backoff.
///
/// Returns the first successful response, or the last error once retries
/// are exhausted or a non-retryable error occurs. This sits below the
/// extraction retry loop: a call that fails here counts as a single
/// transport failure there.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &LlmRequest,
    config: &BackoffConfig,
) -> Result<LlmResponse> {
    let mut attempt = 0;
    loop {
        match backend.complete(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) if attempt < config.max_retries && is_retryable(&e, config) => {
                let delay = match &e {
                    ExtractError::HttpError {
                        retry_after: Some(ra),
                        ..
                    } if config.respect_retry_after => *ra,
                    _ => config.delay_for_attempt(attempt),
                };
                attempt += 1;
                warn!(
                    backend = backend.name(),
                    retry = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient backend failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
