//! Example: extracting a two-component report against a scripted backend.
//!
//! Run with: `RUST_LOG=info cargo run --example mock_extraction`

use report_extract::{
    AbbreviationCache, AbbreviationTable, DocumentPlan, Extractor, ExtractorConfig, LlmOracle,
    MemoryRecorder, MockBackend, OracleConfig, SchemaStore,
};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let left_ventricle = json!({
        "title": "LeftVentricle",
        "type": "object",
        "properties": {
            "assessment": {
                "type": "object",
                "properties": {
                    "systolic_function": {
                        "enum": ["Normal", "Mildly Reduced", "Severely Reduced", "Not Assessed"],
                        "default": "Not Assessed"
                    }
                }
            },
            "measurements": {
                "type": "object",
                "properties": {
                    "ejection_fraction": {"type": "number", "minimum": 5, "maximum": 90, "default": "Not Measured"}
                }
            }
        },
        "required": ["assessment"]
    });
    let pericardium = json!({
        "title": "Pericardium",
        "type": "object",
        "properties": {
            "effusion_present": {"type": "boolean"},
            "comments": {"type": "string"}
        }
    });

    // The first reply is prose, so the loop feeds a correction into attempt 2.
    let mock = MockBackend::new(vec![
        "The left ventricle is normal.".to_string(),
        r#"{"Assessment": {"Systolic Function": "Normal"}, "measurements": {"EjectionFraction": 55}}"#.to_string(),
        r#"```json
{"effusion-present": false, "comments": "no pericardial effusion"}
```"#
            .to_string(),
    ]);
    let oracle = LlmOracle::new(OracleConfig::from_env())?.with_backend(Arc::new(mock));

    let abbreviations = AbbreviationTable::from_pairs([
        ("LVEF", "left ventricular ejection fraction"),
        ("PE", "pericardial effusion"),
    ])?;
    let recorder = Arc::new(MemoryRecorder::new());

    let extractor = Extractor::builder(Arc::new(oracle))
        .store(
            SchemaStore::in_memory()
                .with_document("LeftVentricle", left_ventricle)
                .with_document("Pericardium", pericardium),
        )
        .config(ExtractorConfig::default().with_max_attempts(3))
        .abbreviations(Arc::new(AbbreviationCache::from_table(abbreviations)))
        .recorder(recorder.clone())
        .build()?;

    let plan = DocumentPlan::new()
        .section("Cardiac_Chambers")
        .section("pericardium")
        .entry("LeftVentricle", "Cardiac_Chambers/Left_Ventricle")
        .entry("Pericardium", "pericardium");

    let record = extractor
        .extract_document(&plan, "Normal LV size and function, LVEF55%.\\nNo PE.")
        .await?;

    println!("\nFinal record:");
    println!("{}", record.to_json_pretty()?);

    println!("\nComponents ({}/{} extracted):", record.succeeded(), record.components.len());
    for outcome in &record.components {
        println!("  {} -> {:?}", outcome.path, outcome.status);
    }

    println!("\nAttempts:");
    for event in recorder.events() {
        println!(
            "  {} #{}/{}: {}",
            event.component_name,
            event.attempt_index,
            event.max_attempts,
            event.status.as_str()
        );
    }

    Ok(())
}
