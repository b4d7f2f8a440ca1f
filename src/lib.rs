//! # nutrilab
//!
//! Turn uploaded medical lab-report PDFs into validated nutrient-requirement
//! adjustments, using a Vision Language Model for extraction and an OCR-gated
//! anonymization step to keep personal data out of external calls.
//!
//! ## Why this crate?
//!
//! Lab reports arrive as scanned, table-heavy PDFs that classic text
//! extraction garbles. Instead, each page is rasterised to an image and a
//! VLM reads it as a human would, returning structured test rows. Abnormal
//! rows drive a constrained recommendation step whose output — bounded
//! per-nutrient dosage nudges — updates the user's daily targets, clamped to
//! hard safety limits.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Render      rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Anonymize   OCR gate: redact known provider headers, fail closed
//!  ├─ 3. Extract     per-page vision calls -> {test, value, unit, range} rows
//!  ├─ 4. Consolidate one cleanup call, falls back to raw rows
//!  ├─ 5. Analyze     abnormal-range filter -> dosage-change directives
//!  └─ 6. Apply       bounded, clamped requirement updates (atomic batch)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nutrilab::{
//!     AnthropicClient, DocumentProcessor, MemoryRepository, NoopOcr,
//!     NutrientCatalog, PipelineConfig, RequirementStore, Sex,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let catalog = Arc::new(NutrientCatalog::new());
//!     let repository = Arc::new(MemoryRepository::new());
//!     let store = Arc::new(RequirementStore::new(repository, catalog.clone()));
//!     store.initialize_for_user(1, Sex::Female, 34).await?;
//!
//!     let model = Arc::new(AnthropicClient::from_env(
//!         config.model.clone(),
//!         config.api_timeout_secs,
//!     )?);
//!     let processor =
//!         DocumentProcessor::new(model, Arc::new(NoopOcr), store, catalog, config);
//!
//!     let bytes = std::fs::read("lab-report.pdf")?;
//!     let report = processor.process_document(&bytes, "lab-report.pdf", 1).await;
//!     println!(
//!         "{} tests, {} recommendations",
//!         report.total_results,
//!         report.nutrient_recommendations.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `nutrilab` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! nutrilab = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod ocr;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod process;
pub mod prompts;
pub mod requirements;
pub mod retry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{NutrientCatalog, NutrientId, Sex, NUTRIENT_COUNT};
pub use config::{PipelineConfig, PipelineConfigBuilder, RedactionProfile};
pub use error::{IngestError, RepositoryError, StoreError};
pub use model::{AnthropicClient, ImageAttachment, ModelClient, ModelError, ModelRequest};
pub use ocr::{NoopOcr, OcrEngine, OcrError};
pub use output::{
    AnonymizationOutcome, Direction, NutrientChange, ProcessingReport, RunStats, TestResult,
};
pub use process::DocumentProcessor;
pub use requirements::{
    age_on, MemoryRepository, Requirement, RequirementRepository, RequirementStore, UserProfile,
};
pub use retry::{RetryPolicy, Transient};
