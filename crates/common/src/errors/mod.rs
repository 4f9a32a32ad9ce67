//! Error types for Audience Forge services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for caller mistakes vs upstream failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,
    PayloadTooLarge,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    UpstreamError,
    IndexError,
    IndexTimeout,
    ExtractionError,
    ExtractionTimeout,
    ExtractionUnreachable,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,
            ErrorCode::PayloadTooLarge => 1004,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::IndexError => 8002,
            ErrorCode::IndexTimeout => 8003,
            ErrorCode::ExtractionError => 8004,
            ErrorCode::ExtractionTimeout => 8005,
            ErrorCode::ExtractionUnreachable => 8006,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Payload too large: {size} items exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Search index errors
    #[error("Search index error: {message}")]
    IndexError { message: String },

    #[error("Search index timeout after {timeout_ms}ms")]
    IndexTimeout { timeout_ms: u64 },

    // Extraction collaborator errors
    #[error("Extraction service error: {message}")]
    ExtractionError { message: String },

    #[error("Extraction timeout after {timeout_ms}ms")]
    ExtractionTimeout { timeout_ms: u64 },

    /// Connection-level failure before any response arrived
    #[error("Extraction service unreachable: {message}")]
    ExtractionUnreachable { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a validation failure on a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::IndexError { .. } => ErrorCode::IndexError,
            AppError::IndexTimeout { .. } => ErrorCode::IndexTimeout,
            AppError::ExtractionError { .. } => ErrorCode::ExtractionError,
            AppError::ExtractionTimeout { .. } => ErrorCode::ExtractionTimeout,
            AppError::ExtractionUnreachable { .. } => ErrorCode::ExtractionUnreachable,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::IndexError { .. }
            | AppError::ExtractionError { .. }
            | AppError::ExtractionUnreachable { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::IndexTimeout { .. } | AppError::ExtractionTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Upstream failures are recovered locally by the reconcile pipeline
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::IndexError { .. }
                | AppError::IndexTimeout { .. }
                | AppError::ExtractionError { .. }
                | AppError::ExtractionTimeout { .. }
                | AppError::ExtractionUnreachable { .. }
                | AppError::HttpClient(_)
        )
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            AppError::MissingField { field } => Some(serde_json::json!({ "field": field })),
            _ => None,
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: errors.to_string(),
            field,
        }
    }
}

impl From<::config::ConfigError> for AppError {
    fn from(err: ::config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
