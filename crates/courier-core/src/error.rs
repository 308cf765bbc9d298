use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level infrastructure error for Courier.
///
/// Covers everything that is not part of the delivery taxonomy: reading
/// configuration, talking to the durable store, (de)serializing persisted
/// state. Component crates wrap it in their own error types.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for CourierError {
    fn from(err: toml::de::Error) -> Self {
        CourierError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CourierError {
    fn from(err: toml::ser::Error) -> Self {
        CourierError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Courier infrastructure operations.
pub type Result<T> = std::result::Result<T, CourierError>;

/// Failure of a single remote call, as seen by the rest of the pipeline.
///
/// Exactly one variant is produced per failed call. The variant decides
/// whether the network client retries and which notification copy the
/// user sees.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiError {
    /// Transport-level failure (connection refused, DNS, reset).
    #[error("network error: {message}")]
    NetworkError { message: String },

    /// The attempt did not complete within the configured timeout.
    #[error("request timed out after {duration_ms} ms")]
    Timeout {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },

    /// The service answered with a non-success status.
    #[error("server error {status}: {details}")]
    ServerError { status: u16, details: String },
}

impl ApiError {
    /// Only transport failures are retried; timeouts and server rejections
    /// are surfaced after a single attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::NetworkError { .. })
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NetworkError { .. } => "NETWORK_ERROR",
            ApiError::Timeout { .. } => "TIMEOUT",
            ApiError::ServerError { .. } => "SERVER_ERROR",
        }
    }
}

/// Everything that can end a delivery attempt without a reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Local precondition failure; no network attempt was made.
    #[error("offline queue is full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// Secondary side effect failed. Never surfaced as a primary error.
    #[error("speech synthesis failed: {0}")]
    SpeechFailed(String),
}

impl DeliveryError {
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::Api(api) => api.code(),
            DeliveryError::QueueFull { .. } => "QUEUE_FULL",
            DeliveryError::SpeechFailed(_) => "SPEECH_FAILED",
        }
    }

    /// Whether offering the user a retry action makes sense.
    pub fn is_user_retryable(&self) -> bool {
        !matches!(self, DeliveryError::SpeechFailed(_))
    }
}
