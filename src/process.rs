//! Document-processing entry point: the pipeline state machine.
//!
//! One [`DocumentProcessor`] holds the collaborators a run needs — external
//! model, OCR engine, requirement store, catalog — and drives a document
//! through every stage:
//!
//! ```text
//! Converting -> Anonymizing -> Extracting -> PostProcessing -> Analyzing -> Applying -> Done
//!       \____________________________ Failed _____________________________/
//! ```
//!
//! The stage list is sequential per document; only per-image work inside a
//! stage may overlap. Two failure classes exist (see [`crate::error`]):
//! fatal errors abort into `Failed`, everything else degrades stage-locally.
//! Either way the run's temp workspace — the rasterised pages and any
//! redacted artifacts — is deleted when the run ends: the artifacts live in
//! a `TempDir` whose `Drop` runs on every exit path.

use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tracing::{info, warn};

use crate::catalog::NutrientCatalog;
use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::model::ModelClient;
use crate::ocr::OcrEngine;
use crate::output::{ProcessingReport, RunStats};
use crate::pipeline::{analyze, anonymize, extract, postprocess, render};
use crate::requirements::RequirementStore;

/// Orchestrates one document's journey from raw bytes to applied
/// requirement adjustments.
pub struct DocumentProcessor {
    model: Arc<dyn ModelClient>,
    ocr: Arc<dyn OcrEngine>,
    store: Arc<RequirementStore>,
    catalog: Arc<NutrientCatalog>,
    config: PipelineConfig,
}

impl DocumentProcessor {
    pub fn new(
        model: Arc<dyn ModelClient>,
        ocr: Arc<dyn OcrEngine>,
        store: Arc<RequirementStore>,
        catalog: Arc<NutrientCatalog>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            model,
            ocr,
            store,
            catalog,
            config,
        }
    }

    /// Process one uploaded document for one user.
    ///
    /// Always returns a report: fatal pipeline errors become
    /// `success = false` with a human-readable message. Partial extraction
    /// success (some pages yielded nothing) is reported as success with
    /// fewer rows.
    pub async fn process_document(
        &self,
        pdf_bytes: &[u8],
        filename: &str,
        user_id: u32,
    ) -> ProcessingReport {
        info!("Processing document '{filename}' for user {user_id}");
        match self.run(pdf_bytes, filename, user_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Run failed: {e}");
                ProcessingReport::failure(e.to_string())
            }
        }
    }

    async fn run(
        &self,
        pdf_bytes: &[u8],
        filename: &str,
        user_id: u32,
    ) -> Result<ProcessingReport, IngestError> {
        let total_start = Instant::now();

        // Every artifact this run creates lives under `workdir`; dropping it
        // at any exit below removes them all.
        let workdir = TempDir::new()
            .map_err(|e| IngestError::Workspace(format!("creating run workspace: {e}")))?;

        // ── Converting ───────────────────────────────────────────────────
        let render_start = Instant::now();
        let pages =
            render::render_document(pdf_bytes, filename, workdir.path(), &self.config).await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        // ── Anonymizing ──────────────────────────────────────────────────
        let gate = anonymize::run_gate(
            self.ocr.as_ref(),
            &pages,
            &self.config,
            workdir.path(),
        )
        .await?;

        // ── Extracting ───────────────────────────────────────────────────
        let model_start = Instant::now();
        let raw_rows =
            extract::extract_all(self.model.as_ref(), &gate.images, &self.config).await;

        // ── PostProcessing ───────────────────────────────────────────────
        let rows = postprocess::consolidate(self.model.as_ref(), raw_rows, &self.config).await;

        // ── Analyzing ────────────────────────────────────────────────────
        let changes = if rows.is_empty() {
            Vec::new()
        } else {
            analyze::recommend(self.model.as_ref(), &rows, &self.catalog, &self.config).await
        };
        let model_duration_ms = model_start.elapsed().as_millis() as u64;

        // ── Applying ─────────────────────────────────────────────────────
        self.store.apply_bounded_adjustments(user_id, &changes).await?;

        info!(
            "Extracted {} test results and {} nutrient recommendations for user {user_id}",
            rows.len(),
            changes.len()
        );

        Ok(ProcessingReport {
            success: true,
            total_results: rows.len(),
            test_results: rows,
            nutrient_recommendations: changes,
            anonymized_images: gate.anonymized_count,
            anonymization_outcomes: gate.outcomes,
            error_message: None,
            stats: RunStats {
                total_pages: pages.len(),
                render_duration_ms,
                model_duration_ms,
                total_duration_ms: total_start.elapsed().as_millis() as u64,
            },
        })
        // `workdir` drops here — and on every `?` above — deleting all
        // temporary image artifacts.
    }

    /// Restore every requirement of a user to the EFSA defaults.
    pub async fn restore_defaults(&self, user_id: u32) -> Result<(), IngestError> {
        Ok(self.store.restore_to_default(user_id).await?)
    }

    /// Apply externally supplied dosage-change directives for a user.
    pub async fn apply_recommendations(
        &self,
        user_id: u32,
        changes: &[crate::output::NutrientChange],
    ) -> Result<(), IngestError> {
        Ok(self.store.apply_bounded_adjustments(user_id, changes).await?)
    }
}
