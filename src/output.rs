//! Result types produced by the ingestion pipeline.
//!
//! Everything here is ephemeral, scoped to one document run: extracted test
//! rows, dosage-change directives, per-page anonymization outcomes, and the
//! top-level report handed back to the caller. Requirement rows are the only
//! durable state the pipeline touches, and those live behind
//! [`crate::requirements::RequirementStore`].

use serde::{Deserialize, Serialize};

use crate::catalog::NutrientId;

/// One lab test row extracted from a document page.
///
/// Field names mirror the wire format the extraction prompt requests, so
/// model output deserialises directly. All fields are lenient: a row with a
/// missing unit or range still carries information worth reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(default)]
    pub test: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub range: String,
}

/// Direction of a dosage-change directive. Serialises as the wire symbols
/// `"+"` / `"-"` the recommendation prompt mandates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "+")]
    Increase,
    #[serde(rename = "-")]
    Decrease,
}

/// A validated instruction to nudge one nutrient's daily requirement.
///
/// `nutrient_id` is `None` when the model named something outside the
/// 34-name catalog; such directives are surfaced in the report but skipped
/// when adjustments are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientChange {
    pub nutrient: String,
    pub dosage_change: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutrient_id: Option<NutrientId>,
}

impl NutrientChange {
    pub fn should_increase(&self) -> bool {
        self.dosage_change == Direction::Increase
    }
}

/// Per-page outcome of the anonymization gate, for reporting and audit logs.
#[derive(Debug, Clone, Serialize)]
pub struct AnonymizationOutcome {
    /// 1-indexed page number.
    pub page: usize,
    /// Whether a redacted artifact replaced the original page image.
    pub anonymized: bool,
    /// Whether personal-information markers were found on the page.
    pub personal_info_detected: bool,
    /// Issuing provider, when one was recognised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Wall-clock accounting for one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub total_pages: usize,
    pub render_duration_ms: u64,
    pub model_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The top-level result of processing one document.
///
/// Always returned — a fatal pipeline error becomes `success = false` plus a
/// human-readable `error_message`, never a panic or a bare `Err` the caller
/// has to pattern-match for partial data. Partial extraction success (some
/// pages yielded nothing) is still `success = true` with fewer rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingReport {
    pub success: bool,
    pub test_results: Vec<TestResult>,
    pub nutrient_recommendations: Vec<NutrientChange>,
    pub total_results: usize,
    pub anonymized_images: usize,
    pub anonymization_outcomes: Vec<AnonymizationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub stats: RunStats,
}

impl ProcessingReport {
    /// A failed report carrying only the error message and whatever stats
    /// were accumulated before the run aborted.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_deserialises_with_missing_fields() {
        let row: TestResult = serde_json::from_str(r#"{"test":"Hemoglobin","value":"14.2"}"#)
            .expect("lenient parse");
        assert_eq!(row.test, "Hemoglobin");
        assert_eq!(row.unit, "");
        assert_eq!(row.range, "");
    }

    #[test]
    fn direction_round_trips_wire_symbols() {
        assert_eq!(serde_json::to_string(&Direction::Increase).unwrap(), "\"+\"");
        let d: Direction = serde_json::from_str("\"-\"").unwrap();
        assert_eq!(d, Direction::Decrease);
    }

    #[test]
    fn failure_report_shape() {
        let r = ProcessingReport::failure("boom");
        assert!(!r.success);
        assert_eq!(r.error_message.as_deref(), Some("boom"));
        assert_eq!(r.total_results, 0);
    }
}
