//! # Error Handling and Response Types
//!
//! Standardized error handling for the registry engine and its HTTP binding.
//!
//! ## Key Types
//!
//! - [`AppError`]: main error enum covering all failure classes
//! - [`ApiErrorResponse`]: standardized JSON error response format
//! - [`ErrorCode`]: machine-readable error classification
//! - [`AppResult<T>`]: convenience alias for Results using `AppError`
//!
//! ## Error Classifications
//!
//! Errors are classified into categories that map to HTTP status codes:
//!
//! - **Route Not Found** (404): no route pattern/method combination matched
//! - **Validation Errors** (400): malformed payloads, name mismatches
//! - **Not Found** (404): missing packages or artifacts
//! - **Upstream Errors** (502): proxy transport failures, unparsable bodies
//! - **Storage Errors** (500): backend read/write/delete failures
//!
//! The engine performs no local recovery: any storage or proxy failure aborts
//! the handler and propagates here, where the binding renders it as a single
//! non-2xx response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,          // Human-readable error message
    pub code: String,           // Machine-readable error code
    pub details: Option<Value>, // Additional error details
    pub timestamp: String,      // ISO 8601 timestamp
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCode {
    RouteNotFound,   // No operation for the verb+path
    ValidationError, // For input validation failures
    NotFound,        // For missing packages/artifacts
    UpstreamError,   // For proxy transport or parse failures
    StorageError,    // For backend failures
    InternalError,   // For everything else server-side
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RouteNotFound => "route_not_found",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::UpstreamError => "upstream_error",
            ErrorCode::StorageError => "storage_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::RouteNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("No operation found for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Upstream registry error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::RouteNotFound { .. } => ErrorCode::RouteNotFound,
            AppError::Validation(_) | AppError::Json(_) | AppError::Base64(_) => {
                ErrorCode::ValidationError
            }
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Upstream(_) => ErrorCode::UpstreamError,
            AppError::Storage(_) | AppError::Io(_) => ErrorCode::StorageError,
            AppError::Internal(_) | AppError::Anyhow(_) => ErrorCode::InternalError,
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        let code = self.error_code();
        ApiErrorResponse {
            error: self.to_string(),
            code: code.as_str().to_string(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");

        let error_response = self.to_error_response();
        let status = self.error_code().http_status();

        tracing::debug!(status = %status, code = %error_response.code, "Returning standardized error response");

        (status, axum::Json(error_response)).into_response()
    }
}

/// Convenient result type for application operations.
///
/// This type alias provides a standard Result type using [`AppError`] for all
/// application-level operations, reducing boilerplate in function signatures.
pub type AppResult<T> = Result<T, AppError>;
