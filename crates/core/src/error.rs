//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.

use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Prompt errors ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Document errors ---
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure reported by a backend adapter.
///
/// Adapters never let a raw transport or decode error escape; everything is
/// mapped into one of these variants at the adapter boundary.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing field in response: {0}")]
    MissingField(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Network, timeout, HTTP status and credential failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ApiError { .. }
                | Self::RateLimited { .. }
                | Self::AuthenticationFailed(_)
                | Self::Timeout(_)
                | Self::Network(_)
                | Self::StreamInterrupted(_)
        )
    }

    /// The backend answered, but with data the adapter could not use.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse(_) | Self::MissingField(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Template is missing the required {{{0}}} slot")]
    MissingSlot(&'static str),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    /// Displayed verbatim to the user.
    #[error("Only .pdf and .txt files are admitted")]
    UnsupportedType,

    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to extract text from {path}: {reason}")]
    Extraction { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_correctly() {
        let err = Error::Backend(BackendError::ApiError {
            status_code: 502,
            message: "Bad gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad gateway"));
    }

    #[test]
    fn backend_error_categories() {
        assert!(BackendError::Network("refused".into()).is_transport());
        assert!(BackendError::Timeout("60s".into()).is_transport());
        assert!(!BackendError::Timeout("60s".into()).is_malformed());
        assert!(BackendError::MissingField("results.answer".into()).is_malformed());
        assert!(BackendError::MalformedResponse("eof".into()).is_malformed());
    }

    #[test]
    fn unsupported_document_message_is_fixed() {
        assert_eq!(
            DocumentError::UnsupportedType.to_string(),
            "Only .pdf and .txt files are admitted"
        );
    }

    #[test]
    fn missing_slot_names_the_slot() {
        let err = PromptError::MissingSlot("history");
        assert_eq!(err.to_string(), "Template is missing the required {history} slot");
    }
}
