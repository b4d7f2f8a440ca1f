//! Consolidation of raw extracted rows through one cleanup call.
//!
//! Per-image extraction is deliberately literal — it transcribes whatever
//! the table says, so the same analyte can appear with inconsistent names,
//! units with stray characters, or duplicated across a summary page. One
//! consolidating call standardises names/units/ranges and deduplicates
//! across the whole document.
//!
//! This stage must never lose data: if the call fails after retries, or the
//! model returns something unparseable, the raw rows pass through unchanged.
//! Degraded formatting downstream beats an empty report.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::model::{ModelClient, ModelRequest};
use crate::output::TestResult;
use crate::parser;
use crate::prompts::postprocess_prompt;
use crate::retry::RetryPolicy;

/// Standardise and deduplicate raw rows; fall back to them on any failure.
pub async fn consolidate(
    model: &dyn ModelClient,
    raw_rows: Vec<TestResult>,
    config: &PipelineConfig,
) -> Vec<TestResult> {
    if raw_rows.is_empty() {
        return raw_rows;
    }

    let rows_json = match serde_json::to_string_pretty(&raw_rows) {
        Ok(json) => json,
        Err(e) => {
            warn!("Could not serialise rows for consolidation: {e}");
            return raw_rows;
        }
    };

    let request = ModelRequest::text(
        postprocess_prompt(&rows_json),
        config.postprocess_max_tokens,
    );
    let policy = RetryPolicy::new(
        config.max_attempts,
        Duration::from_millis(config.retry_backoff_ms),
    );

    match policy.run("consolidation", |_| model.complete(&request)).await {
        Ok(text) => {
            let cleaned = parser::parse_test_results(&text);
            if cleaned.is_empty() {
                warn!("Consolidation returned no parseable rows; using raw data");
                raw_rows
            } else {
                info!("Consolidation cleaned {} test results", cleaned.len());
                cleaned
            }
        }
        Err(e) => {
            warn!("Consolidation failed after retries ({e}); using raw data");
            raw_rows
        }
    }
}
