//! # Report Extract
//!
//! Schema-guided, self-correcting extraction of structured records from
//! free-text reports using an LLM.
//!
//! A report is split into **components** (one JSON Schema document each).
//! For every component the [`Extractor`] asks an [`Oracle`] for a JSON
//! object, repairs its key spelling against the schema, validates it, and
//! on failure feeds precise, schema-anchored corrections into the next
//! attempt, until the record validates or the attempt budget runs out.
//!
//! ## Core Concepts
//!
//! - **[`SchemaComponent`]**: a schema document plus its declarative
//!   field tree, loaded once from a [`SchemaStore`].
//! - **[`Oracle`]**: anything that turns [`PromptVariables`] into text.
//!   [`LlmOracle`] talks to Ollama through a [`Backend`](backend::Backend).
//! - **[`Extractor`]**: the retry loop: oracle, tolerant parse, key
//!   remap, validation, feedback.
//! - **[`FeedbackGenerator`]**: writes the corrections for the next
//!   attempt ([`TemplateFeedback`] or [`LlmFeedback`]).
//! - **[`AttemptRecorder`]**: receives one [`AttemptEvent`] per attempt.
//! - **[`DocumentPlan`]**: the components of a whole report and where
//!   each lands in the final record.
//!
//! ## Quick Start
//!
//! ```no_run
//! use report_extract::{DocumentPlan, Extractor, ExtractorConfig, LlmOracle, OracleConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let oracle = LlmOracle::new(OracleConfig::from_env())?;
//!     let extractor = Extractor::builder(Arc::new(oracle))
//!         .config(ExtractorConfig::from_env()?)
//!         .build()?;
//!
//!     let record = extractor
//!         .extract_document(&DocumentPlan::echo_report(), "LVEF 55%. Mild MR.")
//!         .await?;
//!     println!("{}", record.to_json_pretty()?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod extractor;
pub mod feedback;
pub mod oracle;
pub mod parsing;
pub mod preprocess;
pub mod prompt;
pub mod remap;
pub mod schema;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackoffConfig, MockBackend, MockReply, OllamaBackend};
pub use config::{ExtractorConfig, OracleConfig};
pub use document::{ComponentOutcome, ComponentStatus, DocumentPlan, DocumentRecord, PlanEntry};
pub use error::{AttemptError, ExtractError, Result};
pub use events::{AttemptEvent, AttemptRecorder, AttemptStatus, FnRecorder, MemoryRecorder, TracingRecorder};
pub use extractor::{ExtractionAttempt, Extractor, ExtractorBuilder, ValidatedRecord};
pub use feedback::{ErrorDetails, FeedbackGenerator, LlmFeedback, TemplateFeedback};
pub use oracle::{LlmOracle, Oracle, PromptVariables};
pub use preprocess::{AbbreviationCache, AbbreviationTable};
pub use schema::{FieldKind, FieldNode, FieldTree, PathStep, SchemaComponent, SchemaStore};
pub use validate::{FieldError, FieldErrorKind, ValidationPolicy, ViolationPolicy};
