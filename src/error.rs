//! # Error Types
//!
//! This module defines error types used throughout the cardpress library.

use thiserror::Error;

/// Main error type for cardpress operations
#[derive(Debug, Error)]
pub enum CardError {
    /// Malformed account number (never retried)
    #[error("Input error: {0}")]
    Input(String),

    /// Barcode symbology or composition failure
    #[error("Render error: {0}")]
    Render(String),

    /// Composition requested before a barcode image exists
    #[error("No barcode image: generate the barcode first")]
    NoImage,

    /// Unrecognized layout mode
    #[error("Invalid layout mode: {0}")]
    InvalidMode(String),

    /// Printer could not be opened (unknown name, offline, access denied)
    #[error("Connection error: {0}")]
    Connection(String),

    /// A draw or document step failed mid-document
    #[error("Draw error: {0}")]
    Draw(String),

    /// The printer did not finish within the job timeout
    #[error("Printer is not responding: {0}")]
    Timeout(String),

    /// A print was requested while another job is in flight
    #[error("A print job is already in progress")]
    Busy,

    /// Invalid configuration or profile
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CardError {
    /// Whether the operator should be offered a retry for this failure.
    ///
    /// A retry re-runs the full dispatch, not just the failed step.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CardError::Connection(_) | CardError::Draw(_))
    }
}

/// Result alias for cardpress operations
pub type CardResult<T> = Result<T, CardError>;
