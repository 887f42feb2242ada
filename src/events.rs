//! Attempt recording.
//!
//! The extractor emits exactly one [`AttemptEvent`] per attempt, success or
//! failure, before moving on. Implement [`AttemptRecorder`] to persist them
//! (an audit log, a report book); [`TracingRecorder`] logs them, and
//! [`MemoryRecorder`] keeps them for inspection.

use crate::error::AttemptError;
use crate::oracle::PromptVariables;
use crate::schema::{format_path, snippet_for, SchemaComponent};
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{info, warn};

/// Lifecycle state of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Processing,
    Successful,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Processing => "processing",
            AttemptStatus::Successful => "successful",
            AttemptStatus::Failed => "failed",
        }
    }
}

/// An error as it appears in the attempt log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedError {
    /// `V1..` for validation errors, `E1` otherwise.
    pub id: String,
    pub message: String,
    /// Governing schema (or a note when there is none).
    pub snippet: Value,
}

impl RecordedError {
    /// Log entries for a failed attempt, with validation snippets resolved
    /// to `depth` `$ref` hops.
    pub fn from_attempt(err: &AttemptError, component: &SchemaComponent, depth: usize) -> Vec<Self> {
        match err {
            AttemptError::Validation(errors) => errors
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    let snippet = snippet_for(component.document(), &e.path, depth)
                        .unwrap_or_else(|nav| nav.to_value());
                    RecordedError {
                        id: format!("V{}", i + 1),
                        message: format!(
                            "Path: {}.{} - Message: {} (Type: {})",
                            component.name(),
                            format_path(&e.path),
                            e.message,
                            e.kind.as_str()
                        ),
                        snippet,
                    }
                })
                .collect(),
            AttemptError::Parse(_) => vec![RecordedError {
                id: "E1".into(),
                message: err.to_string(),
                snippet: Value::String(
                    "N/A for JSON parsing error. Check the raw output for syntax issues.".into(),
                ),
            }],
            AttemptError::Transport(_) => vec![RecordedError {
                id: "E1".into(),
                message: err.to_string(),
                snippet: Value::String("N/A for transport error.".into()),
            }],
        }
    }
}

/// One attempt, as reported to an [`AttemptRecorder`].
#[derive(Debug, Clone, Serialize)]
pub struct AttemptEvent {
    pub component_name: String,
    /// 1-based.
    pub attempt_index: u32,
    pub max_attempts: u32,
    pub status: AttemptStatus,
    /// Exactly what the oracle was given.
    pub input_snapshot: PromptVariables,
    pub raw_output: String,
    pub errors: Vec<RecordedError>,
    /// Feedback produced by this attempt for the next one.
    pub feedback: Option<String>,
}

/// Receives attempt events. Called synchronously inside the retry loop.
pub trait AttemptRecorder: Send + Sync {
    fn record(&self, event: AttemptEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl AttemptRecorder for TracingRecorder {
    fn record(&self, event: AttemptEvent) {
        match event.status {
            AttemptStatus::Failed => {
                let errors: Vec<&str> = event.errors.iter().map(|e| e.message.as_str()).collect();
                warn!(
                    component = %event.component_name,
                    attempt = event.attempt_index,
                    max_attempts = event.max_attempts,
                    status = event.status.as_str(),
                    errors = ?errors,
                    "attempt failed"
                );
            }
            _ => info!(
                component = %event.component_name,
                attempt = event.attempt_index,
                max_attempts = event.max_attempts,
                status = event.status.as_str(),
                "attempt recorded"
            ),
        }
    }
}

/// An [`AttemptRecorder`] backed by a closure.
///
/// ```
/// use report_extract::events::{AttemptEvent, FnRecorder};
///
/// let recorder = FnRecorder(|event: AttemptEvent| {
///     println!("{} #{}: {:?}", event.component_name, event.attempt_index, event.status);
/// });
/// ```
pub struct FnRecorder<F: Fn(AttemptEvent) + Send + Sync>(pub F);

impl<F: Fn(AttemptEvent) + Send + Sync> AttemptRecorder for FnRecorder<F> {
    fn record(&self, event: AttemptEvent) {
        (self.0)(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<AttemptEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the events recorded so far, in order.
    pub fn events(&self) -> Vec<AttemptEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Events as a JSON array.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }
}

impl AttemptRecorder for MemoryRecorder {
    fn record(&self, event: AttemptEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
