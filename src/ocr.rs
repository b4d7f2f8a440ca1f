//! OCR engine seam.
//!
//! The anonymization gate needs plain text from a page image to look for
//! personal-information markers. Which OCR backend produces that text —
//! Tesseract with Romanian traineddata, a cloud OCR API, a test double — is
//! the host application's decision, so the crate only defines the contract.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from an OCR backend.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine failure: {0}")]
    Engine(String),

    #[error("Could not read image '{path}': {detail}")]
    ImageUnreadable { path: String, detail: String },
}

/// Text recognition over page images.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognise the text on an image, given a language hint (e.g. "ron").
    async fn recognize(&self, image: &Path, language: &str) -> Result<String, OcrError>;

    /// Lightweight fallback check used only after [`recognize`] has failed,
    /// to decide whether the image belongs to a known provider despite the
    /// OCR error. The default is inconclusive (empty text), which the gate
    /// treats as "degrade, do not abort".
    ///
    /// [`recognize`]: OcrEngine::recognize
    async fn fallback_text(&self, image: &Path) -> Result<String, OcrError> {
        let _ = image;
        Ok(String::new())
    }
}

/// An OCR engine that recognises nothing.
///
/// With no text, the gate never sees personal-info markers and every page
/// passes through unredacted. Only suitable for documents already known to
/// carry no personal information (or for demos and tests).
pub struct NoopOcr;

#[async_trait]
impl OcrEngine for NoopOcr {
    async fn recognize(&self, _image: &Path, _language: &str) -> Result<String, OcrError> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_engine_returns_empty_text() {
        let engine = NoopOcr;
        let text = engine
            .recognize(Path::new("page.png"), "ron")
            .await
            .unwrap();
        assert!(text.is_empty());
        let fallback = engine.fallback_text(Path::new("page.png")).await.unwrap();
        assert!(fallback.is_empty());
    }
}
