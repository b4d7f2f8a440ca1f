//! The anonymization gate: per-image decision to redact, pass through, or
//! fail the run.
//!
//! ## Why fail-closed?
//!
//! Every downstream stage ships the page image to an external service. A
//! page that provably belongs to a *recognised* provider carries a patient
//! identity block in a known position — if that block cannot be blacked out
//! (OCR crashed mid-redaction, the image would not re-encode), sending the
//! image anyway would leak personal data. That one situation aborts the
//! whole run. Every other uncertainty degrades: no markers means nothing to
//! redact, and an unrecognised provider is skipped for redaction but still
//! processed.
//!
//! The decision is a tagged [`GateOutcome`], not an exception chain: the
//! orchestrator's abort-vs-continue branch is explicit.

use std::path::{Path, PathBuf};

use image::Rgb;
use tracing::{info, warn};

use crate::config::{PipelineConfig, RedactionProfile};
use crate::error::IngestError;
use crate::ocr::OcrEngine;
use crate::output::AnonymizationOutcome;
use crate::pipeline::render::PageImage;

/// Per-image gate decision.
#[derive(Debug)]
pub enum GateOutcome {
    /// No personal-information markers found; image passes through unmodified.
    Clean,
    /// Top region blacked out; a new JPEG artifact replaces the original.
    Redacted { path: PathBuf, provider: String },
    /// Markers present but the issuing provider is not recognised; the image
    /// is skipped for redaction and passes through unmodified.
    UnsupportedProvider,
    /// OCR or redaction failed on a page the fallback check attributes to a
    /// recognised provider. The only outcome that aborts the run.
    HardFailure { provider: String, detail: String },
}

/// Result of gating every page image, in page order.
#[derive(Debug)]
pub struct GateReport {
    /// Final image per page (redacted artifact where one was produced).
    pub images: Vec<PageImage>,
    pub outcomes: Vec<AnonymizationOutcome>,
    pub anonymized_count: usize,
}

/// Run the gate over every page image.
///
/// Images are processed in page order; a [`GateOutcome::HardFailure`]
/// converts to [`IngestError::AnonymizationFailed`] immediately.
pub async fn run_gate(
    ocr: &dyn OcrEngine,
    pages: &[PageImage],
    config: &PipelineConfig,
    workdir: &Path,
) -> Result<GateReport, IngestError> {
    info!("Scanning {} images for personal information", pages.len());

    let mut images = Vec::with_capacity(pages.len());
    let mut outcomes = Vec::with_capacity(pages.len());
    let mut anonymized_count = 0;

    for page in pages {
        match gate_image(ocr, page, config, workdir).await {
            GateOutcome::Clean => {
                outcomes.push(AnonymizationOutcome {
                    page: page.page,
                    anonymized: false,
                    personal_info_detected: false,
                    provider: None,
                });
                images.push(page.clone());
            }
            GateOutcome::UnsupportedProvider => {
                warn!(
                    "Page {}: personal info detected but provider is unsupported; \
                     skipping redaction",
                    page.page
                );
                outcomes.push(AnonymizationOutcome {
                    page: page.page,
                    anonymized: false,
                    personal_info_detected: true,
                    provider: None,
                });
                images.push(page.clone());
            }
            GateOutcome::Redacted { path, provider } => {
                info!("Page {}: anonymized ({provider})", page.page);
                outcomes.push(AnonymizationOutcome {
                    page: page.page,
                    anonymized: true,
                    personal_info_detected: true,
                    provider: Some(provider),
                });
                anonymized_count += 1;
                images.push(PageImage {
                    page: page.page,
                    path,
                });
            }
            GateOutcome::HardFailure { provider, detail } => {
                return Err(IngestError::AnonymizationFailed { provider, detail });
            }
        }
    }

    info!(
        "Anonymization summary: {} images total, {} anonymized, {} untouched",
        pages.len(),
        anonymized_count,
        pages.len() - anonymized_count
    );

    Ok(GateReport {
        images,
        outcomes,
        anonymized_count,
    })
}

/// Gate a single page image.
pub async fn gate_image(
    ocr: &dyn OcrEngine,
    page: &PageImage,
    config: &PipelineConfig,
    workdir: &Path,
) -> GateOutcome {
    let text = match ocr.recognize(&page.path, &config.ocr_language).await {
        Ok(text) => text.to_lowercase(),
        Err(e) => {
            return escalate_or_degrade(ocr, page, config, format!("OCR failed: {e}")).await;
        }
    };

    if !(text.contains(&config.national_id_marker) && text.contains(&config.patient_code_marker)) {
        return GateOutcome::Clean;
    }

    let Some(profile) = match_provider(&text, &config.redaction_profiles) else {
        return GateOutcome::UnsupportedProvider;
    };

    let redacted_path = workdir.join(format!("medical_page_{}_redacted.jpg", page.page));
    match redact_top_region(&page.path, &redacted_path, profile.crop_height).await {
        Ok(()) => GateOutcome::Redacted {
            path: redacted_path,
            provider: profile.label.clone(),
        },
        Err(detail) => {
            escalate_or_degrade(ocr, page, config, format!("redaction failed: {detail}")).await
        }
    }
}

/// After an OCR/redaction failure, decide between hard failure and degrade.
///
/// The fallback text check is deliberately lightweight and may be
/// inconclusive (empty). Only positive evidence of a recognised provider
/// escalates; anything else degrades to pass-through.
async fn escalate_or_degrade(
    ocr: &dyn OcrEngine,
    page: &PageImage,
    config: &PipelineConfig,
    detail: String,
) -> GateOutcome {
    warn!("Page {}: {detail}", page.page);

    let fallback = match ocr.fallback_text(&page.path).await {
        Ok(text) => text.to_lowercase(),
        Err(_) => return GateOutcome::Clean,
    };

    if let Some(profile) = match_provider(&fallback, &config.redaction_profiles) {
        return GateOutcome::HardFailure {
            provider: profile.label.clone(),
            detail,
        };
    }

    GateOutcome::Clean
}

/// First profile whose any marker occurs in the (lower-cased) text.
fn match_provider<'a>(
    text: &str,
    profiles: &'a [RedactionProfile],
) -> Option<&'a RedactionProfile> {
    profiles
        .iter()
        .find(|p| p.markers.iter().any(|marker| text.contains(marker)))
}

/// Black out the top `crop_height` pixel rows and write a JPEG artifact.
///
/// Image decode/encode is CPU-bound, so it runs under `spawn_blocking` like
/// rendering does.
async fn redact_top_region(
    source: &Path,
    target: &Path,
    crop_height: u32,
) -> Result<(), String> {
    let source = source.to_path_buf();
    let target = target.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let image = image::open(&source).map_err(|e| e.to_string())?;
        // JPEG output requires RGB8.
        let mut rgb = image.to_rgb8();
        let rows = crop_height.min(rgb.height());
        for y in 0..rows {
            for x in 0..rgb.width() {
                rgb.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        rgb.save_with_format(&target, image::ImageFormat::Jpeg)
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("redaction task panicked: {e}"))?
}
