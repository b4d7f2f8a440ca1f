//! Abnormal-value detection and nutrient recommendation.
//!
//! The abnormal filter is pure string/number work and runs locally; only
//! rows that actually fall outside their stated reference range are worth an
//! external call. The recommendation call is constrained to the catalog's 34
//! canonical names and returns `{nutrient, dosage_change}` directives, which
//! the parser validates before anything reaches the requirement store.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::NutrientCatalog;
use crate::config::PipelineConfig;
use crate::model::{ModelClient, ModelRequest};
use crate::output::{NutrientChange, TestResult};
use crate::parser;
use crate::prompts::recommendation_prompt;
use crate::retry::RetryPolicy;

/// Whether a test value lies outside its stated reference range.
///
/// The range grammar is whatever labs print: `12.0-15.5`, `[4.5 - 11.0]`,
/// `<20`, `>5`. Anything unparseable — a qualitative value ("Negativ"), a
/// missing range, a three-part range — is *not abnormal*: this function
/// classifies, it never errors.
pub fn is_abnormal(result: &TestResult) -> bool {
    if result.range.is_empty() || result.value.is_empty() {
        return false;
    }
    let Ok(value) = result.value.trim().parse::<f64>() else {
        return false;
    };

    // Strip brackets and inner whitespace so "[4.5 - 11.0]" parses.
    let range: String = result
        .range
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '[' && *c != ']')
        .collect();

    if let Some(limit) = range.strip_prefix('<') {
        return match limit.parse::<f64>() {
            Ok(upper) => value >= upper,
            Err(_) => false,
        };
    }
    if let Some(limit) = range.strip_prefix('>') {
        return match limit.parse::<f64>() {
            Ok(lower) => value <= lower,
            Err(_) => false,
        };
    }

    let parts: Vec<&str> = range.split('-').collect();
    if parts.len() != 2 {
        return false;
    }
    match (parts[0].parse::<f64>(), parts[1].parse::<f64>()) {
        (Ok(min), Ok(max)) => value < min || value > max,
        _ => false,
    }
}

/// Rows whose value falls outside the stated reference range.
pub fn abnormal_rows(rows: &[TestResult]) -> Vec<TestResult> {
    rows.iter().filter(|r| is_abnormal(r)).cloned().collect()
}

/// Derive dosage-change directives from abnormal rows.
///
/// No abnormal rows means no call and an empty change set. A call that
/// exhausts its retries also yields an empty change set — recommendations
/// are an enhancement, never worth failing a run that already extracted
/// good data.
pub async fn recommend(
    model: &dyn ModelClient,
    rows: &[TestResult],
    catalog: &NutrientCatalog,
    config: &PipelineConfig,
) -> Vec<NutrientChange> {
    let abnormal = abnormal_rows(rows);
    if abnormal.is_empty() {
        debug!("No abnormal values; skipping recommendation call");
        return Vec::new();
    }
    info!(
        "Analyzing {} abnormal values for nutrient recommendations",
        abnormal.len()
    );

    let abnormal_json = match serde_json::to_string_pretty(&abnormal) {
        Ok(json) => json,
        Err(e) => {
            warn!("Could not serialise abnormal rows: {e}");
            return Vec::new();
        }
    };

    let request = ModelRequest::text(
        recommendation_prompt(&abnormal_json, &catalog.names()),
        config.recommendation_max_tokens,
    );
    let policy = RetryPolicy::new(
        config.max_attempts,
        Duration::from_millis(config.retry_backoff_ms),
    );

    match policy.run("recommendation", |_| model.complete(&request)).await {
        Ok(text) => {
            let directives = parser::parse_directives(&text, catalog);
            info!(
                "Generated {} valid nutrient recommendations",
                directives.len()
            );
            directives
        }
        Err(e) => {
            warn!("Recommendation call failed after retries ({e}); no adjustments");
            Vec::new()
        }
    }
}
