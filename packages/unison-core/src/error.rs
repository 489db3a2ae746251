//! Centralized error types for the Unison core library.
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

use crate::catalog::CatalogError;
use crate::services::media_resolver::ResolveError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for CatalogError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_, _) => "catalog_error_status",
            Self::Unauthorized(_) => "catalog_unauthorized",
            Self::NotFound(_) => "track_not_found",
            Self::InvalidId(_) => "invalid_track_id",
            Self::Io(_) => "media_write_failed",
        }
    }
}

impl ErrorCode for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::AllSourcesFailed { .. } => "all_sources_failed",
            Self::Timeout { .. } => "resolve_timeout",
            Self::Io(_) => "media_write_failed",
            Self::Cancelled { .. } => "resolve_cancelled",
        }
    }
}

/// Application-wide error type for the Unison server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum UnisonError {
    /// Catalog collaborator failed (unreachable, rejected, malformed).
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Track audio could not be made available locally.
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// Requested catalog account is not configured.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (missing required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl UnisonError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Catalog(_) => "catalog_error",
            Self::Resolution(_) => "resolution_failed",
            Self::AccountNotFound(_) => "account_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AccountNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Catalog(_) | Self::Resolution(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type UnisonResult<T> = Result<T, UnisonError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for UnisonError {
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

impl From<CatalogError> for UnisonError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err.to_string())
    }
}

impl From<ResolveError> for UnisonError {
    fn from(err: ResolveError) -> Self {
        Self::Resolution(err.to_string())
    }
}
