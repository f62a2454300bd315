//! Error types for event delivery.

use thiserror::Error;

/// Delivery error type.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Connection, TLS or request timeout reported by the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector answered with a non-2xx status.
    #[error("Collector rejected event: {status} - {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, kept for diagnostics.
        body: String,
    },

    /// Transport failure that is not tied to a specific HTTP status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The attempt did not resolve within the attempt timeout.
    #[error("Delivery attempt timed out after {0} seconds")]
    Timeout(u64),

    /// A persisted record could not be decoded back into an event.
    #[error("Corrupt record {record}: {source}")]
    Decode {
        /// Record identifier.
        record: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// IO error (queue directory, record files, settings file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL could not be parsed or normalized.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeliveryError {
    /// Whether this error is a transport failure and therefore worth retrying.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            DeliveryError::Http(_)
                | DeliveryError::Rejected { .. }
                | DeliveryError::Transport(_)
                | DeliveryError::Timeout(_)
        )
    }
}

impl From<url::ParseError> for DeliveryError {
    fn from(err: url::ParseError) -> Self {
        DeliveryError::InvalidUrl(err.to_string())
    }
}

/// Result type alias using DeliveryError.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
