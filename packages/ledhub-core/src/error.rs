//! Centralized error types for the lighting hub core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::plans::PlanError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "config_read_failed",
            Self::Parse { .. } => "config_parse_failed",
        }
    }
}

impl ErrorCode for PlanError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "plan_not_found",
            Self::Invalid(_) => "plan_invalid",
            Self::Io(_) => "plan_io_error",
        }
    }
}

/// Application-wide error type for the lighting hub server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum HubError {
    /// Requested device id does not exist.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Requested room name does not exist.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Requested plan id does not exist.
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The MQTT pub/sub client is not currently connected.
    #[error("pub/sub transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Reading from or writing to the plan store failed.
    #[error("plan store error: {0}")]
    PlanStore(String),

    /// Server configuration error (missing or malformed config file).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal server error, not attributable to caller input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceNotFound(_) => "device_not_found",
            Self::RoomNotFound(_) => "room_not_found",
            Self::PlanNotFound(_) => "plan_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::TransportUnavailable(_) => "transport_unavailable",
            Self::PlanStore(_) => "plan_store_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DeviceNotFound(_) | Self::RoomNotFound(_) | Self::PlanNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::TransportUnavailable(_) | Self::Configuration(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::PlanStore(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PlanError> for HubError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::NotFound(id) => Self::PlanNotFound(id),
            other => Self::PlanStore(other.to_string()),
        }
    }
}

impl From<ConfigError> for HubError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Convenient Result alias for application-wide operations.
pub type HubResult<T> = Result<T, HubError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_not_found_returns_correct_code() {
        let err = HubError::DeviceNotFound("x".into());
        assert_eq!(err.code(), "device_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn transport_unavailable_returns_service_unavailable() {
        let err = HubError::TransportUnavailable("mqtt disconnected".into());
        assert_eq!(err.code(), "transport_unavailable");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
