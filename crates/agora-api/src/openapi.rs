//! OpenAPI document

use crate::auth::{
    AuthResponse, CredentialPair, LoginRequest, MessageResponse, RefreshRequest, RefreshResponse,
    RegisterRequest, SessionStatus, UserSummary,
};
use crate::error::ApiError;
use crate::handlers::{admin, auth, health};
use agora_core::Role;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::me_handler,
        admin::session_status_handler,
        admin::revoke_session_handler,
        health::health_check,
        health::readiness_check,
        health::prometheus_metrics,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            AuthResponse,
            RefreshResponse,
            CredentialPair,
            UserSummary,
            SessionStatus,
            MessageResponse,
            Role,
            ApiError,
            health::HealthResponse,
            health::ReadinessResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and credential lifecycle"),
        (name = "admin", description = "Session control for administrators"),
        (name = "health", description = "Liveness, readiness and metrics"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
