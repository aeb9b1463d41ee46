//! Common error types for mosaic

use thiserror::Error;

/// Common result type for mosaic operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by client and server.
///
/// Only `Validation` and `Transcode` abort the operation that raised
/// them; the degradable failures (`Upload`, `Distribution`,
/// `Persistence`) are handled at the point of detection and logged,
/// never propagated past it.
#[derive(Error, Debug)]
pub enum Error {
    /// Wrong input shape or count; rejected before any state mutates
    #[error("Validation error: {0}")]
    Validation(String),

    /// Media upload to durable storage failed (caller degrades to the
    /// raw reference)
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Transcoding or composition failed; fatal to the pipeline run
    #[error("Transcode failed: {0}")]
    Transcode(String),

    /// Distribution (storage publish / notification send) failed;
    /// non-fatal to the pipeline run
    #[error("Distribution failed: {0}")]
    Distribution(String),

    /// Persisted grid state could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server or client error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
