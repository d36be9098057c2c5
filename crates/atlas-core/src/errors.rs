//! Error types for the CodeAtlas core library.
//!
//! Only configuration problems are fatal: a rules file that is missing or
//! unparsable surfaces as [`AtlasError::Config`]. Everything that can go
//! wrong while scanning a single file (malformed source, failed metric
//! computation, an external tool timing out) degrades inside the pipeline
//! and never reaches this enum.

/// Top-level error enum for the CodeAtlas core library.
#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AtlasResult<T> = Result<T, AtlasError>;
