//! Prompts for the three external-model calls.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing what the model is asked to
//!    extract or how directives are constrained requires editing exactly one
//!    place, never the retry or transport code.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    spinning up a real model, making prompt regressions easy to catch.
//!
//! The recommendation prompt embeds the allowed nutrient list straight from
//! the catalog, so the constraint can never drift from what
//! [`crate::catalog::NutrientCatalog::resolve_id_by_name`] will accept.

/// Prompt for the per-image extraction call. The page image is attached to
/// the same message.
pub const EXTRACTION_PROMPT: &str = r#"Analyze this medical test results page and extract ONLY the test data from any tables.

Return the data as a valid JSON array where each test result follows this exact format:
{
  "test": "test name",
  "value": "measured value",
  "unit": "unit of measurement",
  "range": "reference range"
}

Important rules:
- Extract ONLY test results from tables (ignore headers, patient info, dates, etc.)
- If a value has no unit, use an empty string for "unit"
- If there's no reference range, use an empty string for "range"
- Return an empty array [] if no test tables are found
- Ensure the response is valid JSON that can be parsed

Example format:
[
  {
    "test": "Hemoglobin",
    "value": "14.2",
    "unit": "g/dL",
    "range": "12.0-15.5"
  },
  {
    "test": "White Blood Cell Count",
    "value": "7.8",
    "unit": "K/uL",
    "range": "4.5-11.0"
  }
]"#;

/// Build the consolidation prompt around the raw extracted rows
/// (pretty-printed JSON).
pub fn postprocess_prompt(raw_rows_json: &str) -> String {
    format!(
        r#"The parsing of a PDF medical results table resulted in this JSON data. Please review and correct this data to ensure:

1. All test names are properly formatted and standardized
2. All values are clean and properly formatted numbers (remove any extra text)
3. All units are consistent and properly formatted
4. All ranges are properly formatted and consistent
5. Remove any duplicate entries
6. Fix any obvious parsing errors or inconsistencies

Here's the raw extracted data:
{raw_rows_json}

Please output the corrected and properly formatted JSON in the exact same structure:
[
  {{
    "test": "standardized test name",
    "value": "clean numeric value",
    "unit": "standardized unit",
    "range": "properly formatted range"
  }}
]

Rules:
- Keep the same 4-field structure (test, value, unit, range)
- KEEP ALL TEST NAMES IN THEIR ORIGINAL LANGUAGE - do not translate them
- Clean numeric values (remove extra text, keep only the number)
- Standardize units (use common medical abbreviations)
- Format ranges consistently
- If a test result is qualitative (like "Negativ" or "Nu s-au evidentiat"), keep the descriptive value unchanged
- Return valid JSON only, no explanation text"#
    )
}

/// Build the recommendation prompt around the abnormal rows
/// (pretty-printed JSON) and the catalog's canonical nutrient names.
pub fn recommendation_prompt(abnormal_rows_json: &str, nutrient_names: &[&str]) -> String {
    let allowed = nutrient_names.join(", ");
    format!(
        r#"Analyze these abnormal medical test results and provide specific nutrient recommendations to help normalize the values.

Abnormal test results:
{abnormal_rows_json}

You must ONLY use these exact nutrient names in your response:
{allowed}

For each abnormal value, determine what nutrients from the above list could help improve it. Return a JSON array in this exact format:
[
  {{
    "nutrient": "exact nutrient name from the list above",
    "dosage_change": "+" or "-"
  }}
]

IMPORTANT RULES:
- ONLY use the exact nutrient names provided above - no variations or abbreviations
- ONLY include nutrients that need dosage changes ("+" for increase, "-" for decrease)
- DO NOT include nutrients that should be maintained at current levels
- If a test value suggests a nutrient need that's not in the approved list, skip it
- Focus on direct relationships between test results and nutrients
- Consider these common relationships:
  * Low hemoglobin/RBC -> Iron +, Vitamin C +, Vitamin B12 +, Folate (B9) +
  * Low/High cholesterol -> Total Fat -, Saturated Fat -, Fiber +
  * Low vitamin levels -> corresponding vitamin +
  * Electrolyte imbalances -> Potassium, Sodium, Magnesium adjustments
  * Poor immune markers -> Vitamin C +, Vitamin D +, Zinc +
- Return valid JSON only, no explanation text
- Return empty array [] if no approved nutrients need dosage changes

Examples of correct format:
[
  {{"nutrient": "Iron", "dosage_change": "+"}},
  {{"nutrient": "Vitamin C", "dosage_change": "+"}},
  {{"nutrient": "Saturated Fat", "dosage_change": "-"}}
]"#
    )
}
