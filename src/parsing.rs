//! Tolerant JSON extraction from raw oracle output.
//!
//! Oracle text is rarely clean JSON: reasoning models wrap it in
//! `<think>` blocks, chat models fence it in markdown, and completion
//! models continue a prompt that already opened the object. The functions
//! here recover the JSON value without ever asking the model again.

use serde_json::Value;

/// Split `<think>...</think>` out of a response.
///
/// Returns `(thinking, cleaned)`, `cleaned` trimmed. An unterminated
/// `<think>` drops everything after it.
pub fn extract_thinking(text: &str) -> (Option<String>, String) {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let Some(start) = text.find(OPEN) else {
        return (None, text.trim().to_string());
    };
    let body_start = start + OPEN.len();
    let (thinking, after) = match text[body_start..].find(CLOSE) {
        Some(end) => (
            &text[body_start..body_start + end],
            &text[body_start + end + CLOSE.len()..],
        ),
        None => (&text[body_start..], ""),
    };
    let cleaned = format!("{}{}", &text[..start], after).trim().to_string();
    let thinking = thinking.trim();
    let thinking = (!thinking.is_empty()).then(|| thinking.to_string());
    (thinking, cleaned)
}

/// Contents of the first markdown code fence (```` ```json ```` or bare).
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip the info string (e.g. `json`) up to the end of the line.
    let body_start = after
        .find('\n')
        .filter(|nl| after[..*nl].chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|nl| nl + 1)
        .unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// The last top-level balanced `{...}` or `[...]` span in `text`.
///
/// Brackets inside JSON strings are ignored.
pub fn last_balanced(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut last = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' | '[' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' | ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        last = Some(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    last
}

/// Drop commas that directly precede `}` or `]`, outside of strings.
pub fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn parse_candidate(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate)
        .ok()
        .or_else(|| serde_json::from_str(&remove_trailing_commas(candidate)).ok())
}

/// Parse raw oracle output into a JSON value.
///
/// Tries, in order: the think-stripped text; the first fenced block; the
/// text with the opening `{` restored (output that continues a prompt
/// ending in `{`); the last balanced object or array. Each candidate is
/// retried with trailing commas removed. On failure the error from parsing
/// the cleaned text as-is is returned.
pub fn parse_json_value(text: &str) -> Result<Value, serde_json::Error> {
    let (_, cleaned) = extract_thinking(text);

    let direct = match serde_json::from_str::<Value>(&cleaned) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    let mut candidates: Vec<String> = Vec::new();
    if let Some(block) = extract_json_block(&cleaned) {
        candidates.push(block.to_string());
    }
    if !cleaned.starts_with(['{', '[']) && !cleaned.starts_with("```") {
        let body = cleaned.split("```").next().unwrap_or_default().trim_end();
        candidates.push(format!("{{{}", body));
    }
    if let Some(span) = last_balanced(&cleaned) {
        candidates.push(span.to_string());
    }

    candidates
        .iter()
        .find_map(|c| parse_candidate(c))
        .ok_or(direct)
}
