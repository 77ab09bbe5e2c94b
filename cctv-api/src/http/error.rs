// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use cctv_proxy::ProxyError;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            detail: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Convert cctv_core errors to HTTP errors
impl From<cctv_core::Error> for AppError {
    fn from(err: cctv_core::Error) -> Self {
        use cctv_core::Error;

        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::InvalidInput(msg) => Self::bad_request(msg),
            Error::Database(e) => {
                tracing::error!("Database error: {}", e);
                Self::internal_server_error("Database error")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                Self::internal_server_error("Data processing error")
            }
            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                Self::internal_server_error("Internal server error")
            }
            Error::Config(msg) | Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                Self::internal_server_error("Internal server error")
            }
        }
    }
}

/// Upstream status is preserved for failed fetches
impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!(error = %err, "Proxy request failed");
        } else {
            tracing::debug!(error = %err, "Proxy request rejected");
        }
        Self::new(status, err.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cctv_proxy::FetchError;

    #[test]
    fn test_core_errors_map_to_status() {
        let err: AppError = cctv_core::Error::NotFound("Zone not found".to_string()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Zone not found");

        let err: AppError = cctv_core::Error::Internal("boom".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn test_upstream_status_is_kept() {
        let err: AppError = ProxyError::Fetch(FetchError::Upstream {
            status: StatusCode::NOT_FOUND,
            url: "https://origin/missing.m3u8".to_string(),
        })
        .into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Failed to fetch stream");
    }

    #[test]
    fn test_missing_url_is_bad_request() {
        let err: AppError = ProxyError::MissingUrl.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
