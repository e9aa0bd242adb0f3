//! Error Types for the Brokerlist API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Every error body carries `"success": false` next to the code and message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use brokerlist_core::BrokerError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to one HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Request lacks a valid admin token
    Unauthorized,

    // ========================================================================
    // Request Errors (400, 405)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request body could not be parsed
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Action name is not recognized
    UnknownAction,

    MethodNotAllowed,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    InternalError,

    /// Cache warmup could not complete
    WarmupFailed,

    /// An upstream store is unavailable and nothing usable is cached
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::UnknownAction => StatusCode::BAD_REQUEST,

            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::WarmupFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid request body",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::UnknownAction => "Unknown action",
            ErrorCode::MethodNotAllowed => "Method not allowed",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::WarmupFailed => "Cache warmup failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable, try again",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized() -> Self {
        Self::from_code(ErrorCode::Unauthorized)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing or empty", field),
        )
    }

    pub fn unknown_action(action: &str) -> Self {
        Self::new(ErrorCode::UnknownAction, format!("Unknown action '{}'", action))
    }

    pub fn method_not_allowed() -> Self {
        Self::from_code(ErrorCode::MethodNotAllowed)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn warmup_failed(reason: impl fmt::Display) -> Self {
        Self::new(ErrorCode::WarmupFailed, format!("Cache warmup failed: {}", reason))
    }

    pub fn service_unavailable() -> Self {
        Self::from_code(ErrorCode::ServiceUnavailable)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    #[serde(flatten)]
    error: &'a ApiError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            success: false,
            error: &self,
        });
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Validation errors are the caller's fault (400). Upstream and ranking
/// failures mean "unavailable, try again" (503). Everything else is a 500
/// without internal detail.
impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Validation(e) => ApiError::validation_failed(e.to_string()),
            e if e.is_unavailable() => {
                tracing::warn!(error = %e, "Upstream unavailable");
                ApiError::service_unavailable()
            }
            e => {
                tracing::error!(error = %e, "Internal error");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
