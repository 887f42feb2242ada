//! The self-correcting extraction loop.
//!
//! For one schema component, [`Extractor::extract`] asks the oracle for a
//! candidate, parses it, remaps its keys, and validates it. On failure the
//! feedback generator explains what went wrong and the next attempt sees
//! that explanation, and only that one: feedback is replaced each attempt,
//! never accumulated. The first valid candidate ends the loop.
//!
//! ```text
//! oracle ──► parse ──► remap ──► validate ──► Ok(ValidatedRecord)
//!    ▲                               │
//!    └──── feedback (next only) ◄────┘ AttemptError
//! ```

use crate::config::ExtractorConfig;
use crate::error::{AttemptError, ExtractError, Result};
use crate::events::{AttemptEvent, AttemptRecorder, AttemptStatus, RecordedError, TracingRecorder};
use crate::feedback::{ErrorDetails, FeedbackGenerator, FeedbackRequest, TemplateFeedback};
use crate::oracle::{Oracle, PromptVariables};
use crate::parsing::parse_json_value;
use crate::preprocess::AbbreviationCache;
use crate::remap::remap;
use crate::schema::{SchemaComponent, SchemaStore};
use crate::validate::{Degradation, FieldError, Validated, Validator};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// The record of one attempt.
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    /// 1-based and strictly increasing.
    pub index: u32,
    pub input: PromptVariables,
    pub raw_output: String,
    pub status: AttemptStatus,
    pub error: Option<AttemptError>,
    /// Feedback produced for the next attempt.
    pub feedback: Option<String>,
}

impl ExtractionAttempt {
    fn new(index: u32, input: PromptVariables) -> Self {
        Self {
            index,
            input,
            raw_output: String::new(),
            status: AttemptStatus::Processing,
            error: None,
            feedback: None,
        }
    }

    /// Validation errors of this attempt, in walk order.
    pub fn field_errors(&self) -> &[FieldError] {
        match &self.error {
            Some(AttemptError::Validation(errors)) => errors,
            _ => &[],
        }
    }
}

/// A component record that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub component: String,
    /// Fields in schema order.
    pub value: Value,
    pub attempts: Vec<ExtractionAttempt>,
    /// Leaf values replaced with their fallback during validation.
    pub degradations: Vec<Degradation>,
}

/// Drives extraction for schema components against one oracle.
///
/// Holds only shared, read-only collaborators, so one extractor can serve
/// many documents.
pub struct Extractor {
    pub(crate) oracle: Arc<dyn Oracle>,
    pub(crate) feedback: Arc<dyn FeedbackGenerator>,
    pub(crate) recorder: Arc<dyn AttemptRecorder>,
    pub(crate) store: SchemaStore,
    pub(crate) config: ExtractorConfig,
    pub(crate) abbreviations: Option<Arc<AbbreviationCache>>,
}

impl Extractor {
    pub fn builder(oracle: Arc<dyn Oracle>) -> ExtractorBuilder {
        ExtractorBuilder {
            oracle,
            feedback: None,
            recorder: None,
            store: None,
            config: ExtractorConfig::default(),
            abbreviations: None,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    /// Load the component `name` from the store and extract it with the
    /// configured attempt budget.
    ///
    /// A schema that cannot be loaded fails with [`ExtractError::Setup`]
    /// before the oracle is called.
    pub async fn extract_named(&self, name: &str, report: &str) -> Result<ValidatedRecord> {
        let component = self.store.load(name)?;
        self.extract(&component, report, self.config.max_attempts).await
    }

    /// Run up to `max_attempts` attempts for `component`.
    ///
    /// Returns the first validated record, or [`ExtractError::Exhausted`]
    /// carrying the last attempt's error. `max_attempts == 0` is rejected.
    pub async fn extract(
        &self,
        component: &SchemaComponent,
        report: &str,
        max_attempts: u32,
    ) -> Result<ValidatedRecord> {
        if max_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }

        let name = component.name();
        let schema_text = component.schema_text()?;
        let validator = Validator::new(component, self.config.policy)
            .with_snippet_depth(self.config.feedback_snippet_depth);

        info!(component = name, max_attempts, "starting component");

        let mut attempts: Vec<ExtractionAttempt> = Vec::new();
        let mut feedback = String::new();
        let mut last_error: Option<AttemptError> = None;

        for index in 1..=max_attempts {
            let input = PromptVariables {
                report: report.to_string(),
                feedback: std::mem::take(&mut feedback),
                schema: schema_text.clone(),
                schema_name: name.to_string(),
            };
            let mut attempt = ExtractionAttempt::new(index, input);

            let outcome = match self.oracle.generate(&attempt.input).await {
                Ok(text) if !text.trim().is_empty() => {
                    let outcome = check_candidate(&validator, component, &text);
                    attempt.raw_output = text;
                    outcome
                }
                Ok(_) => Err(AttemptError::Transport("oracle returned empty output".into())),
                Err(e) => Err(AttemptError::Transport(e.to_string())),
            };

            match outcome {
                Ok(validated) => {
                    attempt.status = AttemptStatus::Successful;
                    self.record(component, max_attempts, &attempt, Vec::new());
                    info!(
                        component = name,
                        attempt = index,
                        degraded = validated.degradations.len(),
                        "component extracted"
                    );
                    attempts.push(attempt);
                    return Ok(ValidatedRecord {
                        component: name.to_string(),
                        value: validated.value,
                        attempts,
                        degradations: validated.degradations,
                    });
                }
                Err(err) => {
                    warn!(
                        component = name,
                        attempt = index,
                        max_attempts,
                        kind = err.kind(),
                        error = %err,
                        "attempt failed"
                    );
                    attempt.status = AttemptStatus::Failed;
                    if index < max_attempts {
                        let details = ErrorDetails::from(&err);
                        let text = self
                            .feedback
                            .generate(&FeedbackRequest {
                                component: name,
                                report,
                                raw_output: &attempt.raw_output,
                                details: &details,
                                schema_text: &schema_text,
                            })
                            .await;
                        feedback = text.clone();
                        attempt.feedback = Some(text);
                    }
                    let recorded =
                        RecordedError::from_attempt(&err, component, self.config.record_snippet_depth);
                    self.record(component, max_attempts, &attempt, recorded);
                    attempt.error = Some(err.clone());
                    attempts.push(attempt);
                    last_error = Some(err);
                }
            }
        }

        warn!(component = name, attempts = max_attempts, "extraction exhausted");
        match last_error {
            Some(last) => Err(ExtractError::Exhausted {
                component: name.to_string(),
                attempts: max_attempts,
                last,
            }),
            None => Err(ExtractError::Other(format!(
                "no attempts were made for '{}'",
                name
            ))),
        }
    }

    fn record(
        &self,
        component: &SchemaComponent,
        max_attempts: u32,
        attempt: &ExtractionAttempt,
        errors: Vec<RecordedError>,
    ) {
        self.recorder.record(AttemptEvent {
            component_name: component.name().to_string(),
            attempt_index: attempt.index,
            max_attempts,
            status: attempt.status,
            input_snapshot: attempt.input.clone(),
            raw_output: attempt.raw_output.clone(),
            errors,
            feedback: attempt.feedback.clone(),
        });
    }
}

/// Parse, remap and validate one candidate.
fn check_candidate(
    validator: &Validator<'_>,
    component: &SchemaComponent,
    text: &str,
) -> std::result::Result<Validated, AttemptError> {
    let parsed = parse_json_value(text).map_err(|e| AttemptError::Parse(e.to_string()))?;
    let remapped = remap(&parsed, Some(component.fields()));
    validator.validate(&remapped).map_err(AttemptError::Validation)
}

/// Builder for [`Extractor`].
pub struct ExtractorBuilder {
    oracle: Arc<dyn Oracle>,
    feedback: Option<Arc<dyn FeedbackGenerator>>,
    recorder: Option<Arc<dyn AttemptRecorder>>,
    store: Option<SchemaStore>,
    config: ExtractorConfig,
    abbreviations: Option<Arc<AbbreviationCache>>,
}

impl ExtractorBuilder {
    /// Default: [`TemplateFeedback`].
    pub fn feedback(mut self, feedback: Arc<dyn FeedbackGenerator>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Default: [`TracingRecorder`].
    pub fn recorder(mut self, recorder: Arc<dyn AttemptRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Default: a store over `config.schema_dir`, or an empty in-memory store.
    pub fn store(mut self, store: SchemaStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: a cache over `config.abbreviation_path`, if set.
    pub fn abbreviations(mut self, cache: Arc<AbbreviationCache>) -> Self {
        self.abbreviations = Some(cache);
        self
    }

    pub fn build(self) -> Result<Extractor> {
        self.config.validate()?;
        let store = match (self.store, &self.config.schema_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => SchemaStore::from_dir(dir.clone()),
            (None, None) => SchemaStore::in_memory(),
        };
        let abbreviations = self.abbreviations.or_else(|| {
            self.config
                .abbreviation_path
                .as_ref()
                .map(|path| Arc::new(AbbreviationCache::new(path.clone())))
        });
        Ok(Extractor {
            oracle: self.oracle,
            feedback: self.feedback.unwrap_or_else(|| Arc::new(TemplateFeedback)),
            recorder: self.recorder.unwrap_or_else(|| Arc::new(TracingRecorder)),
            store,
            config: self.config,
            abbreviations,
        })
    }
}
