//! Error types for the nutrilab library.
//!
//! Two distinct severities reflect two distinct failure modes:
//!
//! * [`IngestError`] — **Fatal**: the ingestion run cannot proceed at all
//!   (document rasterisation failed, a recognised-provider page could not be
//!   anonymized, the requirement batch failed to commit). Returned as
//!   `Err(IngestError)` from the internal run and surfaced to callers as a
//!   failed [`crate::output::ProcessingReport`].
//!
//! * Soft, per-image degradation — a single page's extraction failing after
//!   retries, or a consolidation call that never succeeds. These never carry
//!   an error type upward: the stage logs a warning and yields an empty or
//!   pass-through result so the rest of the document still produces output.
//!
//! The separation keeps the pipeline's abort-vs-continue decision an explicit
//! branch on a typed value rather than exception-style control flow.

use thiserror::Error;

use crate::catalog::NutrientId;

/// All fatal errors raised by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The document could not be rasterised into page images.
    #[error("Failed to convert document '{filename}' to images: {detail}")]
    ConversionFailed { filename: String, detail: String },

    /// Personal information was detected on a page from a recognised
    /// provider, but redaction could not be performed. This is the single
    /// highest-severity failure: continuing would feed an unredacted
    /// diagnostic image to an external service.
    #[error("Cannot process document: failed to anonymize supported provider '{provider}': {detail}")]
    AnonymizationFailed { provider: String, detail: String },

    /// Applying the run's directives to the requirement store failed;
    /// nothing was committed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Temp-artifact management failed (workspace creation, page write).
    #[error("Temporary artifact error: {0}")]
    Workspace(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors from [`crate::requirements::RequirementStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Restore-to-default was called for a user with no requirement rows,
    /// so there is no sex/age source to recompute from.
    #[error("User {user_id} has no nutrient requirements to restore")]
    NoRequirements { user_id: u32 },

    /// The user row backing a requirement operation is missing.
    #[error("Unknown user {user_id}")]
    UnknownUser { user_id: u32 },

    /// The underlying repository rejected the operation.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors surfaced by a [`crate::requirements::RequirementRepository`]
/// implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Requirement row ({user_id}, {nutrient_id}) not found")]
    RowNotFound { user_id: u32, nutrient_id: NutrientId },

    #[error("Repository backend error: {0}")]
    Backend(String),
}
