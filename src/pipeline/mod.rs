//! Pipeline stages for medical-document ingestion.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations (e.g. switch rendering backend) without touching other
//! stages.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ anonymize ──▶ extract ──▶ postprocess ──▶ analyze
//! (pdfium)   (OCR gate)    (vision)    (consolidate)   (abnormal + directives)
//! ```
//!
//! 1. [`render`]      — rasterise every page to a PNG artifact; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`anonymize`]   — per-image redaction gate; the only stage that can
//!    abort the whole run (fail-closed on unredactable personal data)
//! 3. [`extract`]     — per-image vision call with retry; soft-fails to an
//!    empty row set so one bad page never loses the document
//! 4. [`postprocess`] — one consolidating call to standardise and
//!    deduplicate rows; falls back to raw rows on failure
//! 5. [`analyze`]     — pure abnormal-range filter, then one constrained
//!    call that proposes dosage-change directives

pub mod analyze;
pub mod anonymize;
pub mod extract;
pub mod postprocess;
pub mod render;
