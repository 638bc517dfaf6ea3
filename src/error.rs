//! Error types for the TourGuide engine
//!
//! This module provides the error hierarchy shared by every component:
//! - `thiserror` for ergonomic error definitions
//! - Domain-specific variants so callers can isolate per-user and per-pair failures
//! - Source chaining for oracle failures
//! - HTTP status code mapping for API responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for TourGuide operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by oracle failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the TourGuide engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: &'static str },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // User Errors
    // ========================================================================
    #[error("User with userName {user_name} was not found")]
    UserNotFound { user_name: String },

    #[error("User with userName {user_name} already exists")]
    UserAlreadyExists { user_name: String },

    #[error("Reward calculation already in progress for {user_name}")]
    RewardsInProgress { user_name: String },

    // ========================================================================
    // Reward Oracle Errors
    // ========================================================================
    #[error("Reward points oracle unavailable for attraction {attraction} and user {user_id}")]
    OracleUnavailable {
        attraction: String,
        user_id: Uuid,
        #[source]
        source: BoxError,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: Cow<'static, str> },

    #[error("Internal server error")]
    Internal {
        #[source]
        source: Option<BoxError>,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a configuration error caused by `source`
    pub fn config(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a user not found error
    pub fn user_not_found(user_name: impl Into<String>) -> Self {
        Self::UserNotFound {
            user_name: user_name.into(),
        }
    }

    /// Create an oracle error carrying the underlying cause
    pub fn oracle_unavailable(
        attraction: impl Into<String>,
        user_id: Uuid,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::OracleUnavailable {
            attraction: attraction.into(),
            user_id,
            source: source.into(),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if the operation may succeed on a later pass
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::OracleUnavailable { .. }
                | Error::RewardsInProgress { .. }
                | Error::Timeout { .. }
        )
    }

    /// Returns true if this error should be logged at error level
    pub fn is_error_level(&self) -> bool {
        matches!(
            self,
            Error::Internal { .. } | Error::Config { .. } | Error::Other(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArgument { .. } | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::UserNotFound { .. } => StatusCode::NOT_FOUND,
            Error::UserAlreadyExists { .. } | Error::RewardsInProgress { .. } => {
                StatusCode::CONFLICT
            }
            Error::OracleUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::MissingEnvVar { .. } | Error::InvalidConfig { .. } => {
                "CONFIG_ERROR"
            }
            Error::UserNotFound { .. } => "USER_NOT_FOUND",
            Error::UserAlreadyExists { .. } => "USER_ALREADY_EXISTS",
            Error::RewardsInProgress { .. } => "REWARDS_IN_PROGRESS",
            Error::OracleUnavailable { .. } => "ORACLE_UNAVAILABLE",
            Error::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Error::Json(_) => "SERIALIZATION_ERROR",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_error_level() {
            tracing::error!("Request failed: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        // Don't expose internal error details
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let oracle = Error::oracle_unavailable("Disneyland", Uuid::nil(), "connection reset");
        assert!(oracle.is_retryable());
        assert!(!Error::user_not_found("jon").is_retryable());
        assert!(!Error::invalid_argument("n must be >= 0").is_retryable());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::user_not_found("jon").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::invalid_argument("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Internal { source: None }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_oracle_error_keeps_cause() {
        use std::error::Error as _;

        let err = Error::oracle_unavailable("Disneyland", Uuid::nil(), "upstream 502");
        let source = err.source().expect("oracle error carries its cause");
        assert_eq!(source.to_string(), "upstream 502");
        assert_eq!(err.error_code(), "ORACLE_UNAVAILABLE");
    }

    #[test]
    fn test_config_error_keeps_cause() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::config("Failed to read attraction catalog", io);
        assert_eq!(err.source().unwrap().to_string(), "no such file");
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.is_error_level());
    }
}
