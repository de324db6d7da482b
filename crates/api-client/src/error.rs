//! Error types for the HTTP adapters

use fixmyarea_sync::RemoteError;
use thiserror::Error;

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP adapter errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing environment variable
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Service answered with a non-success status
    #[error("API error ({status}): {message}")]
    ApiResponse {
        /// HTTP status code
        status: u16,
        /// Error message from the service
        message: String,
    },

    /// Service answered 2xx with a body we could not use
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Circuit breaker is open
    #[error("Circuit breaker is open - service temporarily unavailable")]
    CircuitOpen,

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing env var error
    pub fn missing_env(var: impl Into<String>) -> Self {
        Self::MissingEnvVar(var.into())
    }

    /// Create an API response error
    pub fn api_response(status: u16, message: impl Into<String>) -> Self {
        Self::ApiResponse {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_timeout() || e.is_request() || e.is_body(),
            Self::ApiResponse { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            // an open breaker means "not now", not "never"
            Self::CircuitOpen => true,
            Self::Config(_)
            | Self::MissingEnvVar(_)
            | Self::Json(_)
            | Self::UnexpectedResponse(_)
            | Self::InvalidUrl(_) => false,
        }
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiResponse { status, .. } if (400..500).contains(status))
    }

    /// Check if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiResponse { status, .. } if *status >= 500)
    }
}

impl From<ApiError> for RemoteError {
    fn from(err: ApiError) -> Self {
        if err.is_retryable() {
            RemoteError::Transient(err.to_string())
        } else {
            RemoteError::Permanent(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ApiError::api_response(503, "unavailable").is_retryable());
        assert!(ApiError::api_response(429, "slow down").is_retryable());
        assert!(ApiError::api_response(408, "timeout").is_retryable());
        assert!(!ApiError::api_response(400, "bad field").is_retryable());
        assert!(!ApiError::api_response(403, "denied").is_retryable());

        assert!(ApiError::api_response(404, "missing").is_client_error());
        assert!(ApiError::api_response(502, "gateway").is_server_error());
    }

    #[test]
    fn test_maps_to_remote_error() {
        let remote: RemoteError = ApiError::api_response(500, "boom").into();
        assert!(remote.is_transient());

        let remote: RemoteError = ApiError::api_response(400, "Invalid upload preset").into();
        assert!(!remote.is_transient());
        assert!(remote.to_string().contains("Invalid upload preset"));

        let remote: RemoteError = ApiError::CircuitOpen.into();
        assert!(remote.is_transient());

        let remote: RemoteError = ApiError::UnexpectedResponse("no secure_url".into()).into();
        assert!(!remote.is_transient());
    }
}
