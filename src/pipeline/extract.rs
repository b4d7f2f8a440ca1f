//! Per-image test-row extraction through the vision model.
//!
//! Each page image becomes one vision call asking for a structured JSON
//! array of `{test, value, unit, range}` rows. Failure granularity is the
//! single image: a page that exhausts its retries logs a warning and
//! contributes an empty row set — the rest of the document still produces
//! results, which the caller sees as success with fewer rows.

use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::model::{ImageAttachment, ModelClient, ModelRequest};
use crate::output::TestResult;
use crate::parser;
use crate::pipeline::render::PageImage;
use crate::prompts::EXTRACTION_PROMPT;
use crate::retry::RetryPolicy;

/// Read a page artifact and wrap it for the vision request.
///
/// PNG artifacts come from the renderer; JPEG artifacts from the redaction
/// step. The MIME type follows the extension the pipeline itself chose.
pub async fn encode_image(path: &Path) -> std::io::Result<ImageAttachment> {
    let bytes = tokio::fs::read(path).await?;
    let media_type = if path.extension().is_some_and(|e| e == "png") {
        "image/png"
    } else {
        "image/jpeg"
    };
    Ok(ImageAttachment {
        media_type: media_type.to_string(),
        data: STANDARD.encode(&bytes),
    })
}

/// Extract test rows from every page image, preserving page order.
///
/// Concurrency is bounded by `config.concurrency` using *ordered* buffering,
/// so the flattened result always follows page order no matter how calls
/// interleave.
pub async fn extract_all(
    model: &dyn ModelClient,
    images: &[PageImage],
    config: &PipelineConfig,
) -> Vec<TestResult> {
    let per_page: Vec<Vec<TestResult>> = stream::iter(images.iter())
        .map(|image| extract_from_image(model, image, config))
        .buffered(config.concurrency)
        .collect()
        .await;

    per_page.into_iter().flatten().collect()
}

/// Extract test rows from one page image.
///
/// Never propagates an error upward: retry exhaustion or a permanent API
/// failure yields an empty row set for this page only.
pub async fn extract_from_image(
    model: &dyn ModelClient,
    image: &PageImage,
    config: &PipelineConfig,
) -> Vec<TestResult> {
    let attachment = match encode_image(&image.path).await {
        Ok(a) => a,
        Err(e) => {
            warn!("Page {}: could not read image artifact: {e}", image.page);
            return Vec::new();
        }
    };

    let request = ModelRequest::with_image(
        EXTRACTION_PROMPT,
        attachment,
        config.extraction_max_tokens,
    );
    let policy = RetryPolicy::new(
        config.max_attempts,
        Duration::from_millis(config.retry_backoff_ms),
    );
    let context = format!("extraction page {}", image.page);

    match policy.run(&context, |_| model.complete(&request)).await {
        Ok(text) => {
            let rows = parser::parse_test_results(&text);
            info!("Extracted {} tests from page {}", rows.len(), image.page);
            rows
        }
        Err(e) => {
            warn!(
                "Page {}: extraction abandoned ({e}); continuing with remaining pages",
                image.page
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[tokio::test]
    async fn encode_image_detects_mime_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("p.png");
        let jpg = dir.path().join("p.jpg");
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        img.save_with_format(&png, image::ImageFormat::Png).unwrap();
        img.save_with_format(&jpg, image::ImageFormat::Jpeg).unwrap();

        assert_eq!(encode_image(&png).await.unwrap().media_type, "image/png");
        assert_eq!(encode_image(&jpg).await.unwrap().media_type, "image/jpeg");
    }

    #[tokio::test]
    async fn encoded_payload_is_valid_base64() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("p.png");
        RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]))
            .save_with_format(&png, image::ImageFormat::Png)
            .unwrap();

        let attachment = encode_image(&png).await.unwrap();
        let decoded = STANDARD.decode(attachment.data).unwrap();
        assert!(!decoded.is_empty());
    }
}
