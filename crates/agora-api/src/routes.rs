//! API route definitions

use crate::auth::middleware::{auth_middleware, require_role};
use crate::handlers::{admin, auth, health};
use crate::state::AppState;
use agora_core::Role;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Liveness, readiness and metrics
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::prometheus_metrics))
}

/// Auth and admin routes
///
/// `route_layer` runs the last-added layer first, so on admin routes the
/// gateway runs before the role check.
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler));

    // Protected routes (access credential required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/admin/sessions/:subject_id",
            get(admin::session_status_handler).delete(admin::revoke_session_handler),
        )
        .route_layer(middleware::from_fn(require_role(&[Role::Admin])))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
}
