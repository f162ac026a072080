//! Error types for overlap-core operations.
//!
//! Read-side failures (`LocalStateCorrupt`) are produced internally and absorbed by
//! the store; everything else propagates to the hook, which logs it and exits 0.

use std::path::PathBuf;

/// All errors that can occur in overlap-core operations.
#[derive(Debug, thiserror::Error)]
pub enum OverlapError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Overlap server URL not configured")]
    NotConfigured,

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Connection error: {reason}")]
    Connection { reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("{message}")]
    Server { message: String },

    // ─────────────────────────────────────────────────────────────────────
    // Local State Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Local state corrupt: {path}: {details}")]
    LocalStateCorrupt { path: PathBuf, details: String },

    #[error("Local state write failed: {path}: {source}")]
    LocalStateWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Hook Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid hook input: {0}")]
    InvalidHookInput(String),
}

impl OverlapError {
    pub fn server(message: impl Into<String>) -> Self {
        OverlapError::Server {
            message: message.into(),
        }
    }

    /// True for errors raised by the transport layer (the server may see the request again later).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OverlapError::NotConfigured
                | OverlapError::Connection { .. }
                | OverlapError::Timeout
                | OverlapError::Server { .. }
        )
    }
}

/// Convenience type alias for Results using OverlapError.
pub type Result<T> = std::result::Result<T, OverlapError>;
