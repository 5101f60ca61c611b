//! Admin session control
//!
//! Path parameters are taken as `Result<Path<_>, PathRejection>` so a bad
//! identity id gets the usual error body.

use crate::audit::AuditContext;
use crate::auth::{AuthenticatedUser, MessageResponse, SessionStatus};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Whether an identity currently holds a session
#[utoipa::path(
    get,
    path = "/admin/sessions/{subject_id}",
    tag = "admin",
    params(("subject_id" = Uuid, Path, description = "Identity ID")),
    responses(
        (status = 200, description = "Session status", body = SessionStatus),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Admin role required", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn session_status_handler(
    State(state): State<Arc<AppState>>,
    subject_id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(subject_id) = subject_id?;
    let status = state.auth.session_status(subject_id).await?;

    Ok(Json(status))
}

/// Force-revoke an identity's session
///
/// The identity's refresh credential stops working immediately. Access
/// credentials already handed out stay valid until they expire.
#[utoipa::path(
    delete,
    path = "/admin/sessions/{subject_id}",
    tag = "admin",
    params(("subject_id" = Uuid, Path, description = "Identity ID")),
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Admin role required", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn revoke_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthenticatedUser>,
    subject_id: Result<Path<Uuid>, PathRejection>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let Path(subject_id) = subject_id?;
    let ctx = AuditContext::from_headers(&headers);
    state.auth.revoke_session(subject_id, &admin, &ctx).await?;

    Ok(Json(MessageResponse::new("Session revoked")))
}
