//! Configuration for the document ingestion pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use serde::{Deserialize, Serialize};

/// A lab provider whose page header layout is known well enough to redact.
///
/// The gate identifies the issuing provider by substring match over OCR text
/// and blacks out a fixed number of pixel rows from the top of the page,
/// where these providers print patient identity blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionProfile {
    /// Display label, e.g. "Medlife".
    pub label: String,
    /// Lower-cased substrings that identify the provider in OCR text.
    pub markers: Vec<String>,
    /// Pixel rows to black out from the top of the page image.
    pub crop_height: u32,
}

/// Configuration for one [`crate::process::DocumentProcessor`].
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use nutrilab::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .model("claude-3-5-haiku-20241022")
///     .max_attempts(3)
///     .concurrency(1)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–600. Default: 300.
    ///
    /// Lab reports carry small print — reference ranges, footnote flags —
    /// that both the OCR pass and the vision model must read reliably.
    /// 300 DPI is the scanner-grade sweet spot; below ~200 the digit/letter
    /// confusions ("5"/"S") that corrupt extracted values start appearing.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2500.
    ///
    /// A safety cap independent of DPI. A poster-sized page at 300 DPI could
    /// produce a 10 000+ px image and exhaust memory; this caps either
    /// dimension, scaling the other proportionally. 2500 px is roughly an A4
    /// page's short edge at 300 DPI, so ordinary lab reports are unaffected.
    pub max_rendered_pixels: u32,

    /// Model identifier sent with every external call.
    /// Default: "claude-3-5-haiku-20241022".
    pub model: String,

    /// Token budget for the per-image extraction call. Default: 4000.
    ///
    /// A dense results table can run past 2 000 output tokens; setting this
    /// too low silently truncates the JSON array mid-row and the whole
    /// response is then discarded by the parser.
    pub extraction_max_tokens: u32,

    /// Token budget for the consolidation call. Default: 4000.
    pub postprocess_max_tokens: u32,

    /// Token budget for the recommendation call. Default: 3000.
    ///
    /// Directives are two short fields each; 3 000 covers any realistic
    /// abnormal-row set while bounding the cost of the most speculative call.
    pub recommendation_max_tokens: u32,

    /// Total attempts per external call (first try included). Default: 3.
    ///
    /// Overload responses and transport blips are transient and frequent;
    /// three attempts catches the vast majority. Permanent API failures are
    /// not retried — they degrade that stage immediately.
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 2000.
    ///
    /// The wait sequence at defaults is 2 s → 4 s, totalling 6 s of backoff
    /// per call site. Overloaded backends need seconds, not milliseconds, to
    /// recover — a sub-second base just burns attempts.
    pub retry_backoff_ms: u64,

    /// Number of concurrent extraction calls. Default: 1.
    ///
    /// Per-image extraction is independent and *could* fan out, but a burst
    /// of concurrent vision calls from one document amplifies rate-limit
    /// pressure on the shared API quota. One outstanding call per stage is
    /// the deliberate default; raising it keeps page order in the output
    /// regardless (ordered buffering, not completion order).
    pub concurrency: usize,

    /// Language hint passed to the OCR engine. Default: "ron".
    ///
    /// The supported lab providers issue Romanian-language reports; the
    /// personal-info markers below are matched against OCR output in that
    /// language.
    pub ocr_language: String,

    /// Per-external-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Lower-cased national-id marker that, together with
    /// `patient_code_marker`, signals personal information on a page.
    /// Default: "cnp".
    pub national_id_marker: String,

    /// Lower-cased patient-code marker. Default: "cod pacient".
    pub patient_code_marker: String,

    /// Providers whose headers the gate knows how to redact.
    pub redaction_profiles: Vec<RedactionProfile>,
}

fn default_redaction_profiles() -> Vec<RedactionProfile> {
    vec![
        RedactionProfile {
            label: "Medlife".to_string(),
            markers: vec!["medlife".to_string()],
            crop_height: 1350,
        },
        RedactionProfile {
            label: "Regina Maria".to_string(),
            markers: vec!["regina maria".to_string(), "reginamaria".to_string()],
            crop_height: 1100,
        },
    ]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 2500,
            model: "claude-3-5-haiku-20241022".to_string(),
            extraction_max_tokens: 4000,
            postprocess_max_tokens: 4000,
            recommendation_max_tokens: 3000,
            max_attempts: 3,
            retry_backoff_ms: 2000,
            concurrency: 1,
            ocr_language: "ron".to_string(),
            api_timeout_secs: 60,
            national_id_marker: "cnp".to_string(),
            patient_code_marker: "cod pacient".to_string(),
            redaction_profiles: default_redaction_profiles(),
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn extraction_max_tokens(mut self, n: u32) -> Self {
        self.config.extraction_max_tokens = n;
        self
    }

    pub fn postprocess_max_tokens(mut self, n: u32) -> Self {
        self.config.postprocess_max_tokens = n;
        self
    }

    pub fn recommendation_max_tokens(mut self, n: u32) -> Self {
        self.config.recommendation_max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn national_id_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.national_id_marker = marker.into();
        self
    }

    pub fn patient_code_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.patient_code_marker = marker.into();
        self
    }

    pub fn redaction_profiles(mut self, profiles: Vec<RedactionProfile>) -> Self {
        self.config.redaction_profiles = profiles;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, crate::error::IngestError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(crate::error::IngestError::Internal(
                "Model id must not be empty".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(crate::error::IngestError::Internal(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(crate::error::IngestError::Internal(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = PipelineConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.retry_backoff_ms, 2000);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.redaction_profiles.len(), 2);
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let c = PipelineConfig::builder()
            .dpi(10_000)
            .concurrency(0)
            .max_attempts(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 600);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_attempts, 1);
    }

    #[test]
    fn build_rejects_empty_model() {
        let result = PipelineConfig::builder().model("  ").build();
        assert!(result.is_err());
    }
}
