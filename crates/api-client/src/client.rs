//! Shared HTTP client

use crate::config::ClientConfig;
use crate::endpoints::{CloudinaryStorage, FirestoreReports};
use crate::error::{ApiError, ApiResult};
use fixmyarea_core::retry::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Request correlation ID header
const X_REQUEST_ID: &str = "X-Request-ID";

/// Longest error body kept in an [`ApiError::ApiResponse`]
const MAX_ERROR_BODY: usize = 512;

/// HTTP client shared by the Cloudinary and Firestore adapters
///
/// Each call is a single attempt. Retrying is the sync coordinator's job, so
/// a failed request surfaces immediately, classified by
/// [`ApiError::is_retryable`]. A circuit breaker stops hammering a service
/// that keeps failing.
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    config: Arc<ClientConfig>,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl ApiClient {
    /// Create a new client with configuration from the environment
    pub fn new() -> ApiResult<Self> {
        Self::with_config(ClientConfig::from_env()?)
    }

    /// Create a new client with specific configuration
    pub fn with_config(config: ClientConfig) -> ApiResult<Self> {
        config.validate()?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("fixmyarea/", env!("CARGO_PKG_VERSION"))),
        );

        let inner = Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers)
            .build()
            .map_err(ApiError::Request)?;

        Ok(Self {
            inner,
            config: Arc::new(config),
            circuit_breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
        })
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get circuit breaker state
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    /// Photo hosting adapter
    pub fn cloudinary(&self) -> ApiResult<CloudinaryStorage> {
        CloudinaryStorage::new(self.clone())
    }

    /// Issue document adapter
    pub fn firestore(&self) -> ApiResult<FirestoreReports> {
        FirestoreReports::new(self.clone())
    }

    /// Start a request to an absolute URL, with the bearer token when one is
    /// configured
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.inner.request(method, url);
        match &self.config.id_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Send a request once, through the circuit breaker
    ///
    /// Any HTTP status is returned as a response; only transport failures are
    /// errors here. Use [`ApiClient::check_status`] to turn error statuses
    /// into [`ApiError::ApiResponse`].
    pub async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let request_id = Uuid::new_v4().to_string();

        if !self.circuit_breaker.can_execute() {
            warn!(request_id = %request_id, "Circuit breaker is open, rejecting request");
            return Err(ApiError::CircuitOpen);
        }

        let start = Instant::now();
        let result = request.header(X_REQUEST_ID, &request_id).send().await;
        let elapsed_ms = start.elapsed().as_millis();

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() || status.as_u16() == 429 {
                    self.circuit_breaker.record_failure();
                } else {
                    self.circuit_breaker.record_success();
                }
                debug!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    elapsed_ms,
                    "Request completed"
                );
                Ok(response)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                debug!(request_id = %request_id, elapsed_ms, error = %e, "Request failed");
                Err(ApiError::Request(e))
            }
        }
    }

    /// Pass a success response through; convert anything else into an error
    /// carrying the service's message
    pub async fn check_status(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::api_response(status.as_u16(), error_message(&body)))
    }
}

/// Pull `error.message` out of a Google/Cloudinary style error body, falling
/// back to the (truncated) raw body
pub(crate) fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(serde_json::Value::as_str);

    match message {
        Some(message) => message.to_string(),
        None if body.trim().is_empty() => "no response body".to_string(),
        None => body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extraction() {
        let firestore = r#"{"error":{"code":403,"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(error_message(firestore), "Missing or insufficient permissions.");

        let cloudinary = r#"{"error":{"message":"Upload preset not found"}}"#;
        assert_eq!(error_message(cloudinary), "Upload preset not found");

        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(""), "no response body");
        assert_eq!(error_message(&"x".repeat(2000)).len(), MAX_ERROR_BODY);
    }

    #[test]
    fn test_client_creation() {
        let client = ApiClient::with_config(ClientConfig::development()).unwrap();
        assert_eq!(client.circuit_state(), CircuitState::Closed);
        assert!(client.firestore().is_ok());
        // no Cloudinary credentials in the development preset
        assert!(client.cloudinary().is_err());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ClientConfig::default().with_firestore_url("not-a-url");
        assert!(ApiClient::with_config(config).is_err());
    }
}
