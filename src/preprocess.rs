//! Report text normalization and abbreviation expansion.
//!
//! Echo reports are dense with shorthand ("LVEF55%", "mod-sev MR"). Before
//! extraction, every non-empty line goes through five deterministic stages:
//!
//! 1. expand abbreviations that contain a dash,
//! 2. space out punctuation (and dashes that stand alone),
//! 3. rejoin decimals split by stage 2 (`2 . 5` -> `2.5`),
//! 4. separate numbers from adjacent letters,
//! 5. expand the remaining abbreviations.
//!
//! Matching is case-insensitive on word boundaries, longest abbreviation
//! first. Literal `\n` sequences become newlines; empty lines are kept.

use crate::error::{ExtractError, Result};
use anyhow::Context;
use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([.,!?;:()=+&{}\[\]])").expect("valid punctuation regex"))
}

fn numeric_dot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d)\s*\.\s*(\d)").expect("valid numeric dot regex"))
}

fn number_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(\.\d+)?)([A-Za-z])").expect("valid number-word regex"))
}

fn word_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z])(\d+(\.\d+)?)").expect("valid word-number regex"))
}

fn spaces_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" +").expect("valid spaces regex"))
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    full_form: String,
}

impl Rule {
    fn apply(&self, line: &str) -> String {
        self.pattern
            .replace_all(line, NoExpand(&self.full_form))
            .into_owned()
    }
}

/// Compiled abbreviation dictionary.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationTable {
    dashed: Vec<Rule>,
    standard: Vec<Rule>,
}

impl AbbreviationTable {
    /// Build from `(abbreviation, full form)` pairs. Abbreviations are
    /// trimmed and lowercased; a later duplicate wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let entries: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_lowercase(), v.as_ref().trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();

        let mut ordered: Vec<(String, String)> = entries.into_iter().collect();
        ordered.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

        let mut table = Self::default();
        for (abbr, full_form) in ordered {
            let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&abbr))).map_err(|e| {
                ExtractError::InvalidConfig(format!("abbreviation '{}': {}", abbr, e))
            })?;
            let rule = Rule { pattern, full_form };
            if abbr.contains('-') {
                table.dashed.push(rule);
            } else {
                table.standard.push(rule);
            }
        }
        Ok(table)
    }

    /// Parse a JSON object of `{"abbreviation": "full form"}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let map: BTreeMap<String, String> = serde_json::from_str(json)?;
        Self::from_pairs(map)
    }

    /// Read a table file. Errors name the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading abbreviation table {}", path.display()))?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&text)
            .with_context(|| format!("parsing abbreviation table {}", path.display()))?;
        Self::from_pairs(entries)
    }

    pub fn len(&self) -> usize {
        self.dashed.len() + self.standard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the five-stage pipeline over `text`.
    ///
    /// An empty table leaves the text untouched.
    pub fn normalize(&self, text: &str) -> String {
        if self.is_empty() {
            warn!("abbreviation table is empty, skipping preprocessing");
            return text.to_string();
        }

        text.replace("\\n", "\n")
            .split('\n')
            .map(|line| {
                if line.trim().is_empty() {
                    String::new()
                } else {
                    self.normalize_line(line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn normalize_line(&self, line: &str) -> String {
        let mut line = self
            .dashed
            .iter()
            .fold(line.to_string(), |acc, rule| rule.apply(&acc));
        line = space_punctuation(&line);
        line = numeric_dot_re().replace_all(&line, "${1}.${2}").into_owned();
        line = number_word_re().replace_all(&line, "${1} ${3}").into_owned();
        line = word_number_re().replace_all(&line, "${1} ${2}").into_owned();
        line = self.standard.iter().fold(line, |acc, rule| rule.apply(&acc));
        collapse_spaces(&line)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Stage 2: pad punctuation with spaces; pad a dash only when neither
/// neighbour is a word character.
fn space_punctuation(line: &str) -> String {
    let padded = punctuation_re().replace_all(line, " ${1} ");
    let chars: Vec<char> = padded.chars().collect();
    let mut out = String::with_capacity(padded.len());
    for (i, &c) in chars.iter().enumerate() {
        let standalone = c == '-'
            && !i.checked_sub(1).is_some_and(|p| is_word_char(chars[p]))
            && !chars.get(i + 1).is_some_and(|n| is_word_char(*n));
        if standalone {
            out.push_str(" - ");
        } else {
            out.push(c);
        }
    }
    collapse_spaces(&out)
}

fn collapse_spaces(line: &str) -> String {
    spaces_re().replace_all(line, " ").trim().to_string()
}

/// Lazily loaded, shared [`AbbreviationTable`].
///
/// The file is read on first use. A missing or malformed file is logged
/// and yields an empty table, so preprocessing is skipped rather than
/// failing the document.
#[derive(Debug)]
pub struct AbbreviationCache {
    path: Option<PathBuf>,
    table: OnceLock<Arc<AbbreviationTable>>,
}

impl AbbreviationCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            table: OnceLock::new(),
        }
    }

    /// A cache already holding `table`.
    pub fn from_table(table: AbbreviationTable) -> Self {
        Self {
            path: None,
            table: OnceLock::from(Arc::new(table)),
        }
    }

    pub fn table(&self) -> Arc<AbbreviationTable> {
        self.table
            .get_or_init(|| {
                let Some(path) = &self.path else {
                    return Arc::new(AbbreviationTable::default());
                };
                match AbbreviationTable::load(path) {
                    Ok(table) => {
                        info!(path = %path.display(), entries = table.len(), "abbreviation table loaded");
                        Arc::new(table)
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "failed to load abbreviation table");
                        Arc::new(AbbreviationTable::default())
                    }
                }
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AbbreviationTable {
        AbbreviationTable::from_pairs([
            ("LV", "left ventricle"),
            ("LVEF", "left ventricular ejection fraction"),
            ("mod-sev", "moderate to severe"),
            ("MR", "mitral regurgitation"),
            ("cm", "centimeter"),
        ])
        .unwrap()
    }

    #[test]
    fn test_expands_longest_abbreviation_first_case_insensitively() {
        assert_eq!(
            table().normalize("lvef normal, LV dilated"),
            "left ventricular ejection fraction normal , left ventricle dilated"
        );
    }

    #[test]
    fn test_dashed_abbreviations_expand_before_spacing() {
        assert_eq!(table().normalize("Mod-Sev MR"), "moderate to severe mitral regurgitation");
    }

    #[test]
    fn test_separates_numbers_and_keeps_decimals() {
        assert_eq!(table().normalize("LVEF55% , LV 4.5cm"), "left ventricular ejection fraction 55% , left ventricle 4.5 centimeter");
        assert_eq!(table().normalize("ratio 2.5:1"), "ratio 2.5 : 1");
    }

    #[test]
    fn test_standalone_dashes_are_padded_but_word_dashes_kept() {
        assert_eq!(space_punctuation("a -b"), "a -b");
        assert_eq!(space_punctuation("well-known"), "well-known");
        assert_eq!(space_punctuation("x - y"), "x - y");
        assert_eq!(space_punctuation("(-)"), "( - )");
    }

    #[test]
    fn test_preserves_empty_lines_and_literal_newlines() {
        assert_eq!(table().normalize("LV ok\\n\\nMR trace"), "left ventricle ok\n\nmitral regurgitation trace");
        assert_eq!(table().normalize("  \nMR"), "\nmitral regurgitation");
    }

    #[test]
    fn test_does_not_match_inside_words() {
        assert_eq!(table().normalize("LVOT"), "LVOT");
    }

    #[test]
    fn test_replacement_text_is_literal() {
        let t = AbbreviationTable::from_pairs([("pg", "$1 gradient")]).unwrap();
        assert_eq!(t.normalize("pg"), "$1 gradient");
    }

    #[test]
    fn test_empty_table_leaves_text_alone() {
        let t = AbbreviationTable::default();
        assert_eq!(t.normalize("LV 4.5cm\\n"), "LV 4.5cm\\n");
    }

    #[test]
    fn test_loads_json_files_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abbreviations.json");
        std::fs::write(&path, r#"{" TR ": "tricuspid regurgitation"}"#).unwrap();

        let cache = AbbreviationCache::new(&path);
        let first = cache.table();
        assert_eq!(first.normalize("mild TR"), "mild tricuspid regurgitation");
        std::fs::remove_file(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &cache.table()));
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        match AbbreviationTable::load(&path) {
            Err(ExtractError::Other(message)) => {
                assert!(message.starts_with("parsing abbreviation table"));
                assert!(message.contains("broken.json"));
            }
            other => panic!("expected a contextual error, got {other:?}"),
        }
        let missing = AbbreviationTable::load(dir.path().join("absent.json")).unwrap_err();
        assert!(missing.to_string().contains("reading abbreviation table"));
    }

    #[test]
    fn test_unreadable_file_yields_empty_table() {
        let cache = AbbreviationCache::new("/nonexistent/abbreviations.json");
        assert!(cache.table().is_empty());
        assert!(AbbreviationTable::from_json_str("[1, 2]").is_err());
    }
}
