//! Prompt templates and placeholder rendering.

/// Extraction prompt. Variables: `report`, `feedback`, `schema`, `schema_name`.
///
/// Ends by opening the JSON object, so a completion model continues from
/// inside it; the parser restores the brace when the output omits it.
pub const EXTRACTION_TEMPLATE: &str = r#"You are a cardiology and echocardiography specialist. Extract only the information belonging to the {schema_name} component from the echo report below into a single JSON object.
The object must follow the JSON schema given for {schema_name}. Write nothing before or after the JSON.
Do not infer values the report does not state (an "EF: 50%" does not mean systolic function is normal).
Check units: when the report's units differ from the schema's, convert the value to the schema's units.

Echo report:
```
{report}
```

---
JSON schema for {schema_name} (descriptions and minimum/maximum are hints):
```json
{schema}
```
---
Feedback on the previous attempt (empty on the first attempt):
{feedback}
---

Using the report, the schema and any feedback above, produce the JSON for {schema_name}. If feedback is present, fix every issue it names.
Output JSON:
```json
{{"#;

/// Feedback prompt. Variables: `report`, `raw_llm_output`, `error_details`.
pub const FEEDBACK_TEMPLATE: &str = r#"You review the output of an assistant that turns echo reports into JSON. Using the report, the assistant's previous output and the errors found in it, write short, actionable corrections for its next attempt.

Echo report:
```
{report}
```

Previous output:
```
{raw_llm_output}
```

Errors, each with the schema snippet that governs it:
```
{error_details}
```

For every error:
- Say what is wrong and where, quoting the path.
- Point at the snippet's description, enum values, default and type.
- For range errors, say whether a unit conversion fixes it (a report value in cm against a schema in mm is multiplied by 10).
- Fields that cannot be filled usually take "Not Measured" or "Not Assessed" unless the schema says otherwise.
Answer as a list that covers every error."#;

/// Substitute `{name}` placeholders from `vars` in a single pass.
///
/// `{{` and `}}` produce literal braces. Unknown placeholders are kept
/// verbatim. Substituted values are never re-scanned, so a report that
/// happens to contain `{schema}` stays as written.
///
/// ```
/// use report_extract::prompt::render;
///
/// let out = render("Hi {name}: {{\"k\": 1}}", &[("name", "echo")]);
/// assert_eq!(out, r#"Hi echo: {"k": 1}"#);
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let key = &tail[1..end];
                if let Some((_, value)) = vars.iter().find(|(k, _)| *k == key) {
                    out.push_str(value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic() {
        let result = render("Hello {name}, process {input}", &[("name", "Alice"), ("input", "data")]);
        assert_eq!(result, "Hello Alice, process data");
    }

    #[test]
    fn test_render_escaped_braces() {
        let result = render("Output format: {{\"result\": {{\"value\": 42}}}}", &[]);
        assert_eq!(result, r#"Output format: {"result": {"value": 42}}"#);
    }

    #[test]
    fn test_render_unknown_placeholder_kept() {
        assert_eq!(render("keep {other} as is", &[("name", "x")]), "keep {other} as is");
        assert_eq!(render("dangling { brace", &[]), "dangling { brace");
    }

    #[test]
    fn test_render_values_not_rescanned() {
        let result = render("{report} / {schema}", &[("report", "see {schema}"), ("schema", "S")]);
        assert_eq!(result, "see {schema} / S");
    }

    #[test]
    fn test_extraction_template_fills_all_variables() {
        let out = render(
            EXTRACTION_TEMPLATE,
            &[
                ("report", "Small pericardial effusion."),
                ("feedback", ""),
                ("schema", "{\"type\": \"object\"}"),
                ("schema_name", "Pericardium"),
            ],
        );
        assert!(out.contains("Small pericardial effusion."));
        assert!(out.contains("{\"type\": \"object\"}"));
        assert!(out.contains("the Pericardium component"));
        assert!(out.ends_with("```json\n{"));
        assert!(!out.contains("{schema_name}"));
    }

    #[test]
    fn test_feedback_template_fills_all_variables() {
        let out = render(
            FEEDBACK_TEMPLATE,
            &[("report", "R"), ("raw_llm_output", "O"), ("error_details", "E")],
        );
        for placeholder in ["{report}", "{raw_llm_output}", "{error_details}"] {
            assert!(!out.contains(placeholder));
        }
    }
}
