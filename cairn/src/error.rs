//! Error types for cairn

use thiserror::Error;

/// Main error type for the cairn library
///
/// Only configuration errors are surfaced to callers during normal
/// operation; delivery and persistence failures are converted into
/// result values or logged no-ops by the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at construction)
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/delivery error
    #[error("transport error: {0}")]
    Transport(String),

    /// Durable queue storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for cairn
pub type Result<T> = std::result::Result<T, Error>;
