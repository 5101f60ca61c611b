//! API error handling

use crate::auth::jwt::TokenError;
use crate::session::StoreError;
use agora_core::AgoraError;
use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    /// The one body every authentication failure renders
    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Authentication required")
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "Insufficient permissions")
    }

    pub fn unavailable() -> Self {
        Self::new("SERVICE_UNAVAILABLE", "Service temporarily unavailable")
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Conflict,
    /// Unknown identity or wrong secret; the two are never told apart
    InvalidCredentials,
    /// Malformed, forged, expired, revoked or rotated-out credential
    InvalidToken,
    Forbidden,
    NotFound(String),
    StoreUnavailable,
    Internal(String),
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Conflict => (
                StatusCode::CONFLICT,
                ApiError::new("CONFLICT", "Identity already exists"),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("INVALID_CREDENTIALS", "Invalid email or password"),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("INVALID_TOKEN", "Invalid or expired token"),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, ApiError::forbidden()),
            AppError::NotFound(resource) => (StatusCode::NOT_FOUND, ApiError::not_found(&resource)),
            AppError::StoreUnavailable => (StatusCode::SERVICE_UNAVAILABLE, ApiError::unavailable()),
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
            AppError::Database(detail) => {
                tracing::error!(error = %detail, "Identity store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("DATABASE_ERROR", "Database operation failed"),
                )
            }
        };

        if status == StatusCode::UNAUTHORIZED {
            return (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(error),
            )
                .into_response();
        }
        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<AgoraError> for AppError {
    fn from(err: AgoraError) -> Self {
        match err {
            AgoraError::NotFound(msg) => AppError::NotFound(msg),
            AgoraError::Conflict(_) => AppError::Conflict,
            AgoraError::ValidationError(msg) => AppError::Validation(msg),
            AgoraError::DatabaseError(msg) => AppError::Database(msg),
            AgoraError::NotificationError(msg) => {
                AppError::Internal(format!("Notification error: {msg}"))
            }
            AgoraError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
            AgoraError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::warn!(error = %err, "Failing closed on session store error");
        AppError::StoreUnavailable
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(e) => AppError::Internal(format!("Failed to sign token: {e}")),
            _ => AppError::InvalidToken,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation failed: {errors}"))
    }
}
