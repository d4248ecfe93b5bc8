//! Solr client error types.

use thiserror::Error;

/// Result type for Solr client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Solr client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection profile could not be validated.
    #[error("invalid connection profile: {0}")]
    InvalidProfile(String),

    /// The HTTP request itself failed (connect, timeout, TLS).
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Solr answered with a non-success status.
    #[error("solr returned status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The response body could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Creates an invalid profile error.
    pub fn invalid_profile(msg: impl Into<String>) -> Self {
        Self::InvalidProfile(msg.into())
    }

    /// Creates an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a malformed response error.
    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Whether a retry with backoff may succeed.
    ///
    /// Covers transient transport failures and the status codes Solr nodes
    /// emit while overloaded or restarting.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            Self::InvalidProfile(_) | Self::MalformedResponse(_) => false,
        }
    }

    /// Whether the server rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api { status, .. } if matches!(status, 401 | 403))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed_response(err.to_string())
    }
}
