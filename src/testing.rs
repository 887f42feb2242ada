//! Shared fixtures for unit tests.

use crate::error::{ExtractError, Result};
use crate::oracle::{Oracle, PromptVariables};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;

/// A small echo component: a required assessment with an enum, free text
/// and a list of scored findings, plus one bounded measurement.
pub(crate) fn pericardium_schema() -> Value {
    json!({
        "title": "Pericardium",
        "type": "object",
        "properties": {
            "assessment": {"$ref": "#/$defs/PericardiumAssessment"},
            "measurements": {"$ref": "#/$defs/PericardiumMeasurements"}
        },
        "required": ["assessment"],
        "$defs": {
            "PericardiumAssessment": {
                "type": "object",
                "properties": {
                    "effusion_size": {
                        "enum": ["Small", "Moderate", "Large", "Not Assessed"],
                        "default": "Not Assessed",
                        "description": "Size of the pericardial effusion"
                    },
                    "comments": {"type": "string"},
                    "findings": {
                        "type": "array",
                        "items": {"$ref": "#/$defs/Finding"}
                    }
                }
            },
            "Finding": {
                "type": "object",
                "properties": {
                    "location": {"type": "string"},
                    "score": {"type": "number", "minimum": 1, "maximum": 5}
                }
            },
            "PericardiumMeasurements": {
                "type": "object",
                "properties": {
                    "thickness": {
                        "anyOf": [
                            {"type": "number"},
                            {"const": "Not Measured", "type": "string"}
                        ],
                        "minimum": 0.5,
                        "maximum": 10.0,
                        "default": "Not Measured",
                        "description": "Pericardial thickness in mm"
                    }
                }
            }
        }
    })
}

/// One scripted oracle reply.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Text(String),
    Fail(String),
}

impl Reply {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }
}

/// Oracle that replays a script (repeating the last reply) and remembers
/// every set of prompt variables it received.
#[derive(Debug, Default)]
pub(crate) struct ScriptedOracle {
    replies: Vec<Reply>,
    seen: Mutex<Vec<PromptVariables>>,
}

impl ScriptedOracle {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<PromptVariables> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, vars: &PromptVariables) -> Result<String> {
        let index = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(vars.clone());
            seen.len() - 1
        };
        let reply = self
            .replies
            .get(index)
            .or(self.replies.last())
            .cloned()
            .unwrap_or_else(|| Reply::text(""));
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(message) => Err(ExtractError::Other(message)),
        }
    }
}
