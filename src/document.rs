//! Whole-document extraction.
//!
//! A [`DocumentPlan`] lists the components of a report in extraction order
//! and where each one lands in the final record. Components run one after
//! another; a component that exhausts its attempts is replaced by its
//! default record so the rest of the document still comes through.

use crate::error::Result;
use crate::extractor::Extractor;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One component and its placement, e.g. `Cardiac_Chambers/Left_Ventricle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub component: String,
    pub path: Vec<String>,
}

impl PlanEntry {
    /// `path` is split on `/`.
    pub fn new(component: impl Into<String>, path: &str) -> Self {
        Self {
            component: component.into(),
            path: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Components of a document and the layout of its record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPlan {
    /// Top-level keys of the record, in output order.
    pub sections: Vec<String>,
    /// Components in extraction order.
    pub entries: Vec<PlanEntry>,
}

impl DocumentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, name: impl Into<String>) -> Self {
        self.sections.push(name.into());
        self
    }

    pub fn entry(mut self, component: impl Into<String>, path: &str) -> Self {
        self.entries.push(PlanEntry::new(component, path));
        self
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.component.as_str()).collect()
    }

    /// The echocardiography report layout: valves first, then the
    /// pericardium, chambers, defects and great vessels.
    pub fn echo_report() -> Self {
        Self::new()
            .section("Cardiac_Chambers")
            .section("Valvular_Apparatus")
            .section("GreatVessels_and_VenousReturn")
            .section("Congenital_and_Structural_Defects")
            .section("pericardium")
            .entry("MitralValve", "Valvular_Apparatus/Mitral_Valve")
            .entry("AorticValve", "Valvular_Apparatus/Aortic_Valve")
            .entry("PulmonaryValve", "Valvular_Apparatus/Pulmonary_Valve")
            .entry("TricuspidValve", "Valvular_Apparatus/Tricuspid_Valve")
            .entry("Pericardium", "pericardium")
            .entry("LeftVentricle", "Cardiac_Chambers/Left_Ventricle")
            .entry("RightVentricle", "Cardiac_Chambers/Right_Ventricle")
            .entry("LeftAtrium", "Cardiac_Chambers/Left_Atrium")
            .entry("RightAtrium", "Cardiac_Chambers/Right_Atrium")
            .entry("VSD", "Congenital_and_Structural_Defects/vsd")
            .entry("ASD", "Congenital_and_Structural_Defects/asd")
            .entry("PFO", "Congenital_and_Structural_Defects/pfo")
            .entry("Aorta", "GreatVessels_and_VenousReturn/aorta")
            .entry("PulmonicVein", "GreatVessels_and_VenousReturn/pulmonic_vein")
            .entry("IVC", "GreatVessels_and_VenousReturn/ivc")
    }
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComponentStatus {
    Extracted { attempts: u32, degradations: usize },
    /// Extraction failed; the default record was used.
    Defaulted { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentOutcome {
    pub component: String,
    pub path: String,
    #[serde(flatten)]
    pub status: ComponentStatus,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
}

/// The assembled record of one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub value: Value,
    pub components: Vec<ComponentOutcome>,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
}

impl DocumentRecord {
    pub fn succeeded(&self) -> usize {
        self.components
            .iter()
            .filter(|c| matches!(c.status, ComponentStatus::Extracted { .. }))
            .count()
    }

    /// The record alone, pretty-printed in layout order.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.value)?)
    }
}

/// Place `value` at `path`, creating (or replacing non-object) parents.
fn insert_at(root: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for key in parents {
        let slot = node
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(map) = slot else {
            return;
        };
        node = map;
    }
    node.insert(last.clone(), value);
}

impl Extractor {
    /// Expand abbreviations and normalize spacing in `report`.
    ///
    /// Without a configured (or loadable) table the text is returned as is.
    pub fn preprocess(&self, report: &str) -> String {
        let table = self.abbreviations.as_ref().map(|cache| cache.table());
        match table {
            Some(table) if !table.is_empty() => table.normalize(report),
            _ => {
                warn!("no abbreviation table available, skipping preprocessing");
                report.to_string()
            }
        }
    }

    /// Extract every component of `plan` from `report`, in order.
    ///
    /// All schemas are loaded before the first oracle call; a missing one is
    /// a [`crate::ExtractError::Setup`]. Per-component failures never abort
    /// the document.
    pub async fn extract_document(&self, plan: &DocumentPlan, report: &str) -> Result<DocumentRecord> {
        let started = Instant::now();
        let components = self.store.load_all(&plan.component_names())?;
        let processed = self.preprocess(report);

        let mut root = Map::new();
        for section in &plan.sections {
            root.insert(section.clone(), Value::Object(Map::new()));
        }

        info!(components = plan.entries.len(), "starting document");
        let mut outcomes = Vec::with_capacity(plan.entries.len());
        for (entry, component) in plan.entries.iter().zip(components) {
            let component_started = Instant::now();
            let (value, status) = match self
                .extract(&component, &processed, self.config.max_attempts)
                .await
            {
                Ok(record) => {
                    let status = ComponentStatus::Extracted {
                        attempts: record.attempts.len() as u32,
                        degradations: record.degradations.len(),
                    };
                    (record.value, status)
                }
                Err(e) => {
                    error!(component = component.name(), error = %e, "component failed, using defaults");
                    (
                        component.default_record(),
                        ComponentStatus::Defaulted {
                            error: e.to_string(),
                        },
                    )
                }
            };
            insert_at(&mut root, &entry.path, value);
            outcomes.push(ComponentOutcome {
                component: entry.component.clone(),
                path: entry.path.join("/"),
                status,
                elapsed: component_started.elapsed(),
            });
        }

        let record = DocumentRecord {
            value: Value::Object(root),
            components: outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            succeeded = record.succeeded(),
            total = record.components.len(),
            elapsed_secs = record.elapsed.as_secs_f64(),
            "document complete"
        );
        Ok(record)
    }
}
