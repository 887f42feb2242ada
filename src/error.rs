use std::time::Duration;
use thiserror::Error;

use crate::validate::FieldError;

/// Errors produced by the extraction engine and its collaborators.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON (de)serialization failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure while reading schemas or lookup tables.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The component's schema document could not be located or loaded.
    ///
    /// Fatal: raised before any oracle call is made.
    #[error("Schema setup failed for '{component}': {message}")]
    Setup { component: String, message: String },

    /// Every attempt for a component failed.
    #[error("Extraction for '{component}' failed after {attempts} attempts. Last error: {last}")]
    Exhausted {
        component: String,
        attempts: u32,
        /// The failure of the final attempt.
        last: AttemptError,
    },

    /// Invalid configuration detected before work started.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the provider returns a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl ExtractError {
    pub(crate) fn setup(component: impl Into<String>, message: impl Into<String>) -> Self {
        ExtractError::Setup {
            component: component.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ExtractError {
    fn from(err: anyhow::Error) -> Self {
        ExtractError::Other(err.to_string())
    }
}

/// Why a single attempt failed. Every variant is recoverable inside the
/// retry loop.
#[derive(Error, Debug, Clone)]
pub enum AttemptError {
    /// The oracle call errored or returned nothing.
    #[error("oracle call failed: {0}")]
    Transport(String),

    /// The oracle output was not valid JSON.
    #[error("failed to parse output as valid JSON: {0}")]
    Parse(String),

    /// Well-formed JSON that violated the schema.
    #[error("{} validation error(s): {}", .0.len(), summarize(.0))]
    Validation(Vec<FieldError>),
}

impl AttemptError {
    /// Short label used in logs and attempt events.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Transport(_) => "transport",
            AttemptError::Parse(_) => "parse",
            AttemptError::Validation(_) => "validation",
        }
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.path_string(), e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ExtractError>;
