//! Defensive parsing of external-model output.
//!
//! Model responses are *expected* to be a bare JSON array, but in practice
//! arrive wrapped in code fences, prefixed with prose ("Here is the
//! extracted data:"), or occasionally truncated. Every parser here follows
//! the same contract: best-effort extraction, and an **empty result instead
//! of an error** on anything unparseable — a malformed response must never
//! take down a run that other pages contributed good data to.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::catalog::NutrientCatalog;
use crate::output::{Direction, NutrientChange, TestResult};

// Leading fence with optional language tag, and trailing fence.
static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(?:json)?\s*").unwrap());
static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").unwrap());

/// Slice the first JSON array out of free-form model text.
///
/// Strips leading/trailing code-fence markers, then cuts between the first
/// `[` and the last `]`. Returns `None` when no plausible array is present.
pub fn extract_json_array(text: &str) -> Option<String> {
    let cleaned = text.trim();
    let cleaned = RE_LEADING_FENCE.replace(cleaned, "");
    let cleaned = RE_TRAILING_FENCE.replace(&cleaned, "");

    let start = cleaned.find('[')?;
    let end = cleaned.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(cleaned[start..=end].trim().to_string())
}

/// Parse extraction/consolidation output into test rows.
///
/// Lenient on two levels: the array is located defensively, and each row
/// tolerates missing fields (serde defaults). A completely unparseable
/// response yields an empty list.
pub fn parse_test_results(text: &str) -> Vec<TestResult> {
    let Some(payload) = extract_json_array(text) else {
        warn!("No JSON array found in model response ({} bytes)", text.len());
        return Vec::new();
    };

    match serde_json::from_str::<Vec<TestResult>>(&payload) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(
                "Failed to parse test results: {e}; response starts: {:.120}",
                payload
            );
            Vec::new()
        }
    }
}

/// Parse recommendation output into dosage-change directives.
///
/// An element survives only when its `dosage_change` trims to exactly `"+"`
/// or `"-"`. The nutrient name is resolved against the catalog; directives
/// naming anything outside the 34 canonical names are kept (they are model
/// output worth surfacing) but carry `nutrient_id = None` and are skipped at
/// apply time.
pub fn parse_directives(text: &str, catalog: &NutrientCatalog) -> Vec<NutrientChange> {
    let Some(payload) = extract_json_array(text) else {
        warn!("No JSON array found in recommendation response");
        return Vec::new();
    };

    let parsed: Value = match serde_json::from_str(&payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                "Failed to parse recommendations: {e}; response starts: {:.120}",
                payload
            );
            return Vec::new();
        }
    };

    let Some(elements) = parsed.as_array() else {
        return Vec::new();
    };

    elements
        .iter()
        .filter_map(|element| {
            let nutrient = element.get("nutrient")?.as_str()?.trim().to_string();
            let dosage_change = match element.get("dosage_change")?.as_str()?.trim() {
                "+" => Direction::Increase,
                "-" => Direction::Decrease,
                other => {
                    warn!("Dropping directive with invalid dosage_change {other:?}");
                    return None;
                }
            };
            let nutrient_id = catalog.resolve_id_by_name(&nutrient);
            if nutrient_id.is_none() {
                warn!("Directive names unknown nutrient {nutrient:?}; it will not be applied");
            }
            Some(NutrientChange {
                nutrient,
                dosage_change,
                nutrient_id,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> NutrientCatalog {
        NutrientCatalog::new()
    }

    #[test]
    fn extracts_array_from_fenced_response() {
        let text = "```json\n[{\"a\":1}]\n```";
        assert_eq!(extract_json_array(text).unwrap(), "[{\"a\":1}]");
    }

    #[test]
    fn extracts_array_surrounded_by_prose() {
        let text = "Here are the results:\n[1, 2, 3]\nLet me know if you need more.";
        assert_eq!(extract_json_array(text).unwrap(), "[1, 2, 3]");
    }

    #[test]
    fn no_array_yields_none() {
        assert!(extract_json_array("no json here").is_none());
        assert!(extract_json_array("").is_none());
        assert!(extract_json_array("] backwards [").is_none());
    }

    #[test]
    fn parses_test_rows() {
        let text = r#"```json
[
  {"test": "Hemoglobin", "value": "14.2", "unit": "g/dL", "range": "12.0-15.5"},
  {"test": "Glucose", "value": "105"}
]
```"#;
        let rows = parse_test_results(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].test, "Hemoglobin");
        assert_eq!(rows[1].range, "");
    }

    #[test]
    fn malformed_rows_yield_empty_without_panicking() {
        assert!(parse_test_results("[{not json").is_empty());
        assert!(parse_test_results("The page was blank.").is_empty());
    }

    #[test]
    fn fenced_iron_directive_resolves() {
        let text = "```json\n[{\"nutrient\":\"Iron\",\"dosage_change\":\"+\"}]\n```";
        let directives = parse_directives(text, &catalog());
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].nutrient_id, Some(25));
        assert!(directives[0].should_increase());
    }

    #[test]
    fn unknown_nutrient_stays_unresolved() {
        let text = r#"[{"nutrient":"Unobtainium","dosage_change":"+"}]"#;
        let directives = parse_directives(text, &catalog());
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].nutrient_id, None);
    }

    #[test]
    fn invalid_symbols_and_shapes_are_dropped() {
        let text = r#"[
            {"nutrient": "Iron", "dosage_change": "++"},
            {"nutrient": "Zinc", "dosage_change": "increase"},
            {"nutrient": "Calcium"},
            {"dosage_change": "+"},
            {"nutrient": "Vitamin C", "dosage_change": " - "}
        ]"#;
        let directives = parse_directives(text, &catalog());
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].nutrient, "Vitamin C");
        assert_eq!(directives[0].dosage_change, Direction::Decrease);
    }

    #[test]
    fn malformed_recommendation_json_yields_empty() {
        assert!(parse_directives("[{oops", &catalog()).is_empty());
        assert!(parse_directives("no directives", &catalog()).is_empty());
    }
}
