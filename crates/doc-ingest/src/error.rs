//! Error types for the ingestion pipeline

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed document bytes for the declared format
    #[error("Failed to decode '{filename}': {message}")]
    Decode { filename: String, message: String },

    /// No extractor is registered for this MIME type
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// OCR or text-generation backend failure
    #[error("{service} error: {message}")]
    RemoteService { service: String, message: String },

    /// A remote operation did not complete in time
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Cooperative cancellation was requested
    #[error("Operation cancelled")]
    Cancelled,

    /// A pipeline references a step nobody registered
    #[error("No handler registered for step '{0}'")]
    HandlerNotFound(String),

    /// Artifact not present in the document store
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a decode error
    pub fn decode(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create a remote service error
    pub fn remote(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error was caused by a cancellation request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether retrying the same operation later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RemoteService { .. } | Self::Timeout(_) | Self::Io(_) | Self::Cancelled
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_message() {
        let err = Error::decode("deck.pptx", "missing presentation part");
        assert_eq!(
            err.to_string(),
            "Failed to decode 'deck.pptx': missing presentation part"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_remote_errors_are_transient() {
        assert!(Error::remote("ocr", "503").is_transient());
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::UnsupportedFormat("image/png".into()).is_transient());
    }
}
