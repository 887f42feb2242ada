//! Runtime configuration for the extractor and the default oracle.
//!
//! Both configs build with `with_*` methods or load from environment
//! variables. Loading a `.env` file is left to the embedding program.

use crate::backend::BackoffConfig;
use crate::error::{ExtractError, Result};
use crate::schema::navigator::{FEEDBACK_SNIPPET_DEPTH, RECORD_SNIPPET_DEPTH};
use crate::validate::ValidationPolicy;
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Settings for the extraction loop.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Directory holding `<Component>.json` schema documents.
    pub schema_dir: Option<PathBuf>,

    /// Oracle attempts per component. Must be at least 1.
    pub max_attempts: u32,

    /// `$ref` hops inlined into snippets shown to the feedback generator.
    pub feedback_snippet_depth: usize,

    /// `$ref` hops inlined into snippets attached to attempt events.
    pub record_snippet_depth: usize,

    pub policy: ValidationPolicy,

    /// JSON object file of `{abbreviation: full form}` for report preprocessing.
    pub abbreviation_path: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            schema_dir: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            feedback_snippet_depth: FEEDBACK_SNIPPET_DEPTH,
            record_snippet_depth: RECORD_SNIPPET_DEPTH,
            policy: ValidationPolicy::default(),
            abbreviation_path: None,
        }
    }
}

impl ExtractorConfig {
    /// Read `SCHEMA_DIR`, `MAX_ATTEMPTS` and `ABBREVIATION_PATH`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(dir) = lookup("SCHEMA_DIR") {
            config.schema_dir = Some(PathBuf::from(dir));
        }
        if let Some(n) = parse_var(&lookup, "MAX_ATTEMPTS")? {
            config.max_attempts = n;
        }
        if let Some(path) = lookup("ABBREVIATION_PATH") {
            config.abbreviation_path = Some(PathBuf::from(path));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = Some(dir.into());
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_snippet_depths(mut self, feedback: usize, record: usize) -> Self {
        self.feedback_snippet_depth = feedback;
        self.record_snippet_depth = record;
        self
    }

    pub fn with_abbreviation_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.abbreviation_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for model calls made by [`LlmOracle`](crate::oracle::LlmOracle)
/// and [`LlmFeedback`](crate::feedback::LlmFeedback).
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Provider base URL (e.g. `http://localhost:11434`).
    pub base_url: String,

    pub model: String,

    /// 0.0 keeps extraction deterministic.
    pub temperature: f64,

    pub max_tokens: u32,

    /// Request JSON-constrained output from the provider.
    pub json_mode: bool,

    /// Extra provider options merged into each request.
    pub options: Option<Value>,

    /// HTTP request timeout.
    pub timeout: Option<Duration>,

    /// Transport retry; defaults to none for a local server.
    pub backoff: BackoffConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            json_mode: false,
            options: None,
            timeout: Some(Duration::from_secs(300)),
            backoff: BackoffConfig::none(),
        }
    }
}

impl OracleConfig {
    /// Read `OLLAMA_BASE_URL` and `OLLAMA_MODEL_NAME`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("OLLAMA_BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.base_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL_NAME").filter(|m| !m.trim().is_empty()) {
            config.model = model;
        }
        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// An HTTP client honoring `timeout`.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ExtractError::InvalidConfig(format!("{} must be a number, got '{}'", key, raw))),
    }
}
