//! Error types shared across ChainWatch crates.

use thiserror::Error;

/// Errors returned by an [`EntityExtractor`](crate::EntityExtractor).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The signature did not resolve to a record. Callers treat this as an
    /// empty result rather than a failure.
    #[error("transaction not found")]
    NotFound,

    /// Network or node-side failure; the extractor has already exhausted its
    /// own bounded retries.
    #[error("transient extraction error: {0}")]
    Transient(String),
}

/// Errors returned by an [`EntityStore`](crate::EntityStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("store rejected append ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
