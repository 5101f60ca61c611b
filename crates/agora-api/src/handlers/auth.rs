//! Authentication API handlers
//!
//! Register, login, refresh, logout and profile endpoints. Bodies are
//! taken as `Result<Json<_>, JsonRejection>` so a malformed body is a 400
//! with the usual error shape rather than axum's plain-text rejection.

use crate::audit::AuditContext;
use crate::auth::{
    AuthResponse, AuthenticatedUser, LoginRequest, MessageResponse, RefreshRequest,
    RefreshResponse, RegisterRequest, UserSummary,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Register a new identity
///
/// Creates the identity and opens its first session. The role defaults to
/// `citizen`; `admin` cannot be requested.
///
/// # Responses
///
/// * `201 Created` - Identity summary and credential pair
/// * `400 Bad Request` - Invalid input
/// * `409 Conflict` - Email already registered
/// * `503 Service Unavailable` - Session or identity store unreachable
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity registered", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let ctx = AuditContext::from_headers(&headers);
    let response = state.auth.register(request, &ctx).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with email and password
///
/// A successful login replaces any session the identity already had, so a
/// refresh credential issued to another device stops working.
///
/// # Responses
///
/// * `200 OK` - Identity summary and credential pair
/// * `400 Bad Request` - Missing fields
/// * `401 Unauthorized` - Invalid credentials
/// * `503 Service Unavailable` - Store unreachable
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing fields", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let ctx = AuditContext::from_headers(&headers);
    let response = state.auth.login(request, &ctx).await?;

    Ok(Json(response))
}

/// Rotate the refresh credential
///
/// The presented refresh credential must be the identity's current one.
/// It is replaced by the new one and cannot be used again.
///
/// # Responses
///
/// * `200 OK` - New credential pair
/// * `400 Bad Request` - Missing refresh credential
/// * `401 Unauthorized` - Invalid, expired or superseded credential
/// * `503 Service Unavailable` - Store unreachable
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Credentials rotated", body = RefreshResponse),
        (status = 400, description = "Missing refresh credential", body = crate::error::ApiError),
        (status = 401, description = "Invalid refresh credential", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let ctx = AuditContext::from_headers(&headers);
    let tokens = state.auth.refresh(request, &ctx).await?;

    Ok(Json(RefreshResponse { tokens }))
}

/// Logout the current session
///
/// Closes the session and deny-lists the presented access credential for
/// the rest of its lifetime.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let ctx = AuditContext::from_headers(&headers);
    state.auth.logout(&user, &ctx).await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Get the caller's identity
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current identity", body = UserSummary),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "Identity no longer exists", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.auth.me(user.subject_id).await?;

    Ok(Json(summary))
}
