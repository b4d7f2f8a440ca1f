//! Integration tests for the post-render pipeline stages.
//!
//! These drive the anonymization gate, extraction, consolidation, analysis,
//! and requirement application together, with a scripted model client and
//! OCR engine standing in for the external services. No network, no pdfium —
//! the full-document path (which needs a pdfium binary) lives in `e2e.rs`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use nutrilab::pipeline::render::PageImage;
use nutrilab::pipeline::{analyze, anonymize, extract, postprocess};
use nutrilab::{
    Direction, IngestError, MemoryRepository, ModelClient, ModelError, ModelRequest,
    NutrientCatalog, NutrientChange, OcrEngine, OcrError, PipelineConfig, RequirementStore, Sex,
};

// ── Test doubles ─────────────────────────────────────────────────────────

/// Scripted model: picks a canned response by request shape, optionally
/// failing the first N calls to exercise the retry policy.
struct ScriptedModel {
    extraction: String,
    consolidation: String,
    recommendation: String,
    fail_first: AtomicU32,
    failure: fn() -> ModelError,
    calls: AtomicU32,
}

impl ScriptedModel {
    fn new(extraction: &str, consolidation: &str, recommendation: &str) -> Self {
        Self {
            extraction: extraction.to_string(),
            consolidation: consolidation.to_string(),
            recommendation: recommendation.to_string(),
            fail_first: AtomicU32::new(0),
            failure: || ModelError::Overloaded,
            calls: AtomicU32::new(0),
        }
    }

    fn failing_first(mut self, n: u32, failure: fn() -> ModelError) -> Self {
        self.fail_first = AtomicU32::new(n);
        self.failure = failure;
        self
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err((self.failure)());
        }

        if request.image.is_some() {
            Ok(self.extraction.clone())
        } else if request.prompt.contains("nutrient recommendations") {
            Ok(self.recommendation.clone())
        } else {
            Ok(self.consolidation.clone())
        }
    }
}

/// OCR double keyed by image file name; `Err` entries simulate engine
/// crashes, `fallback` is what the lightweight check would see.
#[derive(Default)]
struct ScriptedOcr {
    texts: HashMap<String, String>,
    errors: HashMap<String, String>,
    fallback: String,
}

impl ScriptedOcr {
    fn with_text(mut self, file: &str, text: &str) -> Self {
        self.texts.insert(file.to_string(), text.to_string());
        self
    }

    fn with_error(mut self, file: &str, detail: &str) -> Self {
        self.errors.insert(file.to_string(), detail.to_string());
        self
    }

    fn with_fallback(mut self, text: &str) -> Self {
        self.fallback = text.to_string();
        self
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    async fn recognize(&self, image: &Path, _language: &str) -> Result<String, OcrError> {
        let name = image.file_name().unwrap().to_string_lossy().to_string();
        if let Some(detail) = self.errors.get(&name) {
            return Err(OcrError::Engine(detail.clone()));
        }
        Ok(self.texts.get(&name).cloned().unwrap_or_default())
    }

    async fn fallback_text(&self, _image: &Path) -> Result<String, OcrError> {
        Ok(self.fallback.clone())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn write_page(dir: &Path, page: usize) -> PageImage {
    let path = dir.join(format!("medical_page_{page}.png"));
    RgbImage::from_pixel(60, 80, Rgb([255, 255, 255]))
        .save_with_format(&path, image::ImageFormat::Png)
        .unwrap();
    PageImage { page, path }
}

fn fast_config() -> PipelineConfig {
    PipelineConfig::builder().retry_backoff_ms(0).build().unwrap()
}

async fn seeded_store() -> (Arc<RequirementStore>, Arc<MemoryRepository>, Arc<NutrientCatalog>) {
    let repository = Arc::new(MemoryRepository::new());
    let catalog = Arc::new(NutrientCatalog::new());
    let store = Arc::new(RequirementStore::new(repository.clone(), catalog.clone()));
    store.initialize_for_user(1, Sex::Male, 30).await.unwrap();
    (store, repository, catalog)
}

const EXTRACTION_RESPONSE: &str = r#"```json
[
  {"test": "Hemoglobina", "value": "10.9", "unit": "g/dL", "range": "12.0-15.5"},
  {"test": "Glucoza", "value": "92", "unit": "mg/dL", "range": "70-110"}
]
```"#;

const CONSOLIDATION_RESPONSE: &str = r#"[
  {"test": "Hemoglobina", "value": "10.9", "unit": "g/dL", "range": "12.0-15.5"},
  {"test": "Glucoza", "value": "92", "unit": "mg/dL", "range": "70-110"}
]"#;

const RECOMMENDATION_RESPONSE: &str = r#"```json
[
  {"nutrient": "Iron", "dosage_change": "+"},
  {"nutrient": "Vitamin C", "dosage_change": "+"},
  {"nutrient": "Unobtainium", "dosage_change": "+"}
]
```"#;

// ── Gate ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn gate_redacts_known_provider_and_passes_clean_pages() {
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![write_page(dir.path(), 1), write_page(dir.path(), 2)];
    let config = fast_config();

    let ocr = ScriptedOcr::default()
        .with_text(
            "medical_page_1.png",
            "MedLife SA  CNP: 1900101  Cod pacient: 44",
        )
        .with_text("medical_page_2.png", "doar rezultate, nimic personal");

    let report = anonymize::run_gate(&ocr, &pages, &config, dir.path())
        .await
        .unwrap();

    assert_eq!(report.anonymized_count, 1);
    assert_eq!(report.images.len(), 2);
    // Page order preserved; page 1 replaced by the redacted JPEG artifact.
    assert_eq!(report.images[0].page, 1);
    assert!(report.images[0]
        .path
        .to_string_lossy()
        .ends_with("medical_page_1_redacted.jpg"));
    assert!(report.images[0].path.exists());
    assert_eq!(report.images[1].path, pages[1].path);

    assert!(report.outcomes[0].anonymized);
    assert_eq!(report.outcomes[0].provider.as_deref(), Some("Medlife"));
    assert!(!report.outcomes[1].anonymized);
    assert!(!report.outcomes[1].personal_info_detected);
}

#[tokio::test]
async fn gate_skips_unsupported_provider_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![write_page(dir.path(), 1)];
    let config = fast_config();

    let ocr = ScriptedOcr::default().with_text(
        "medical_page_1.png",
        "Laborator Necunoscut SRL  cnp 123  cod pacient 9",
    );

    let report = anonymize::run_gate(&ocr, &pages, &config, dir.path())
        .await
        .unwrap();

    assert_eq!(report.anonymized_count, 0);
    assert_eq!(report.images[0].path, pages[0].path);
    assert!(report.outcomes[0].personal_info_detected);
    assert!(!report.outcomes[0].anonymized);
    assert_eq!(report.outcomes[0].provider, None);
}

#[tokio::test]
async fn gate_hard_fails_when_ocr_dies_on_known_provider() {
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![write_page(dir.path(), 1)];
    let config = fast_config();

    let ocr = ScriptedOcr::default()
        .with_error("medical_page_1.png", "tessdata corrupted")
        .with_fallback("header says medlife");

    let err = anonymize::run_gate(&ocr, &pages, &config, dir.path())
        .await
        .unwrap_err();

    match err {
        IngestError::AnonymizationFailed { ref provider, .. } => {
            assert_eq!(provider, "Medlife");
        }
        other => panic!("expected AnonymizationFailed, got {other:?}"),
    }
    assert!(err.to_string().contains("anonymize"));
}

#[tokio::test]
async fn gate_degrades_when_ocr_dies_and_fallback_is_inconclusive() {
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![write_page(dir.path(), 1)];
    let config = fast_config();

    let ocr = ScriptedOcr::default().with_error("medical_page_1.png", "engine crash");

    let report = anonymize::run_gate(&ocr, &pages, &config, dir.path())
        .await
        .unwrap();
    assert_eq!(report.anonymized_count, 0);
    assert!(!report.outcomes[0].personal_info_detected);
}

// ── Extraction / retry ───────────────────────────────────────────────────

#[tokio::test]
async fn extraction_recovers_from_overload_within_attempt_budget() {
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![write_page(dir.path(), 1)];
    let config = fast_config();

    let model = ScriptedModel::new(EXTRACTION_RESPONSE, "[]", "[]")
        .failing_first(2, || ModelError::Overloaded);

    let rows = extract::extract_all(&model, &pages, &config).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn extraction_abandons_page_on_permanent_api_error() {
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![write_page(dir.path(), 1), write_page(dir.path(), 2)];
    let config = fast_config();

    // First call (page 1) fails permanently; page 2 succeeds.
    let model = ScriptedModel::new(EXTRACTION_RESPONSE, "[]", "[]").failing_first(1, || {
        ModelError::Api {
            status: 400,
            message: "invalid image".into(),
        }
    });

    let rows = extract::extract_all(&model, &pages, &config).await;
    // Page 1 contributed nothing, page 2 contributed both rows.
    assert_eq!(rows.len(), 2);
    // No retry was spent on the permanent failure: 1 failed + 1 successful call.
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn extraction_exhausting_retries_yields_empty_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![write_page(dir.path(), 1)];
    let config = fast_config();

    let model =
        ScriptedModel::new(EXTRACTION_RESPONSE, "[]", "[]").failing_first(99, || ModelError::Overloaded);

    let rows = extract::extract_all(&model, &pages, &config).await;
    assert!(rows.is_empty());
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn extraction_preserves_page_order_at_higher_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let pages: Vec<_> = (1..=4).map(|p| write_page(dir.path(), p)).collect();
    let config = PipelineConfig::builder()
        .retry_backoff_ms(0)
        .concurrency(4)
        .build()
        .unwrap();

    // One distinct row per page is impossible with a single scripted
    // response, but ordering is still observable through row multiplicity:
    // every page contributes the same 2 rows, in page order.
    let model = ScriptedModel::new(EXTRACTION_RESPONSE, "[]", "[]");
    let rows = extract::extract_all(&model, &pages, &config).await;
    assert_eq!(rows.len(), 8);
    assert_eq!(model.call_count(), 4);
}

// ── Consolidation ────────────────────────────────────────────────────────

#[tokio::test]
async fn consolidation_falls_back_to_raw_rows_on_exhausted_retries() {
    let config = fast_config();
    let raw = vec![nutrilab::TestResult {
        test: "Hemoglobina".into(),
        value: "10.9".into(),
        unit: "g/dL".into(),
        range: "12.0-15.5".into(),
    }];

    let model = ScriptedModel::new("[]", CONSOLIDATION_RESPONSE, "[]")
        .failing_first(99, || ModelError::Overloaded);

    let rows = postprocess::consolidate(&model, raw.clone(), &config).await;
    assert_eq!(rows, raw);
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn consolidation_skips_the_call_entirely_for_empty_input() {
    let config = fast_config();
    let model = ScriptedModel::new("[]", CONSOLIDATION_RESPONSE, "[]");
    let rows = postprocess::consolidate(&model, Vec::new(), &config).await;
    assert!(rows.is_empty());
    assert_eq!(model.call_count(), 0);
}

// ── Analysis + application ───────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_from_rows_to_adjusted_requirements() {
    let config = fast_config();
    let (store, _repository, catalog) = seeded_store().await;

    let model = ScriptedModel::new(
        EXTRACTION_RESPONSE,
        CONSOLIDATION_RESPONSE,
        RECOMMENDATION_RESPONSE,
    );

    // Rows with one abnormal value drive the recommendation call.
    let rows = nutrilab::parser::parse_test_results(EXTRACTION_RESPONSE);
    let changes = analyze::recommend(&model, &rows, &catalog, &config).await;

    // All three directives survive parsing; the unknown one is unresolved.
    assert_eq!(changes.len(), 3);
    assert_eq!(changes[0].nutrient_id, Some(25));
    assert_eq!(changes[1].nutrient_id, Some(14));
    assert_eq!(changes[2].nutrient_id, None);

    store.apply_bounded_adjustments(1, &changes).await.unwrap();
    let after = store.requirements_for_user(1).await.unwrap();

    // Iron 8.0 * 1.2, Vitamin C 90 * 1.2; Unobtainium applied nowhere.
    let iron = after.iter().find(|r| r.nutrient_id == 25).unwrap().quantity;
    let vitamin_c = after.iter().find(|r| r.nutrient_id == 14).unwrap().quantity;
    assert!((iron - 9.6).abs() < 1e-4);
    assert!((vitamin_c - 108.0).abs() < 1e-3);
}

#[tokio::test]
async fn no_abnormal_rows_means_no_call_and_no_changes() {
    let config = fast_config();
    let (_, _, catalog) = seeded_store().await;

    let normal_rows = vec![nutrilab::TestResult {
        test: "Glucoza".into(),
        value: "92".into(),
        unit: "mg/dL".into(),
        range: "70-110".into(),
    }];

    let model = ScriptedModel::new("[]", "[]", RECOMMENDATION_RESPONSE);
    let changes = analyze::recommend(&model, &normal_rows, &catalog, &config).await;
    assert!(changes.is_empty());
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn zero_extracted_rows_leave_requirements_untouched() {
    let config = fast_config();
    let (store, _, _) = seeded_store().await;
    let dir = tempfile::tempdir().unwrap();
    let pages = vec![write_page(dir.path(), 1)];

    let model = ScriptedModel::new("[]", "[]", "[]");
    let rows = extract::extract_all(&model, &pages, &config).await;
    assert!(rows.is_empty());

    let before = store.requirements_for_user(1).await.unwrap();
    store.apply_bounded_adjustments(1, &[]).await.unwrap();
    let after = store.requirements_for_user(1).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn recommendation_failure_degrades_to_empty_change_set() {
    let config = fast_config();
    let (_, _, catalog) = seeded_store().await;

    let abnormal = vec![nutrilab::TestResult {
        test: "Hemoglobina".into(),
        value: "10.9".into(),
        unit: "g/dL".into(),
        range: "12.0-15.5".into(),
    }];

    let model = ScriptedModel::new("[]", "[]", RECOMMENDATION_RESPONSE)
        .failing_first(99, || ModelError::Overloaded);
    let changes = analyze::recommend(&model, &abnormal, &catalog, &config).await;
    assert!(changes.is_empty());
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn manual_directives_apply_through_the_store() {
    let (store, _, _) = seeded_store().await;

    let changes = vec![NutrientChange {
        nutrient: "Vitamin D".into(),
        dosage_change: Direction::Decrease,
        nutrient_id: Some(15),
    }];
    store.apply_bounded_adjustments(1, &changes).await.unwrap();

    let after = store.requirements_for_user(1).await.unwrap();
    let vitamin_d = after.iter().find(|r| r.nutrient_id == 15).unwrap().quantity;
    // 15 * 0.8 = 12
    assert!((vitamin_d - 12.0).abs() < 1e-4);
}
