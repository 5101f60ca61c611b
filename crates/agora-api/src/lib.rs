//! Agora API - session and credential-lifecycle service
//!
//! Registration, login, refresh-credential rotation, logout with
//! deny-listing, and a per-request gateway with role checks.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notify;
pub mod openapi;
pub mod routes;
pub mod session;
pub mod state;

use crate::middleware::{metrics_middleware, security_headers_middleware};
use crate::openapi::ApiDoc;
use crate::state::AppState;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the application router with all layers
pub fn create_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(security_headers_middleware))
                .layer(cors_layer(&state.config.server.cors_origins))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                )),
        )
        .with_state(state)
}

/// CORS for the configured origins; no origin is allowed when none is configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Router over in-memory stores, for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    testing::TestContext::new().router()
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! In-memory wiring with a manually advanced clock

    use crate::notify::TracingNotifier;
    use crate::session::MemorySessionStore;
    use crate::state::AppState;
    use agora_core::{AppConfig, HashingConfig, ManualClock, MemoryIdentityStore, Notifier};
    use axum::Router;
    use std::sync::Arc;

    /// Configuration with test secrets and cheap hashing
    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.tokens.access_secret = "test-access-secret-0123456789abcdef".to_string();
        config.tokens.refresh_secret = "test-refresh-secret-0123456789abcdef".to_string();
        config.hashing = HashingConfig {
            memory_cost_kib: 4096,
            time_cost: 1,
            parallelism: 1,
        };
        config
    }

    pub struct TestContext {
        pub state: Arc<AppState>,
        pub clock: Arc<ManualClock>,
        pub sessions: Arc<MemorySessionStore>,
        pub identities: Arc<MemoryIdentityStore>,
    }

    impl TestContext {
        pub fn new() -> Self {
            Self::with_notifier(Arc::new(TracingNotifier))
        }

        pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
            let clock = Arc::new(ManualClock::new(1_700_000_000));
            let sessions = Arc::new(MemorySessionStore::new(clock.clone()));
            let identities = Arc::new(MemoryIdentityStore::new());
            let state = Arc::new(AppState::new(
                test_config(),
                identities.clone(),
                sessions.clone(),
                notifier,
                clock.clone(),
            ));

            Self {
                state,
                clock,
                sessions,
                identities,
            }
        }

        pub fn router(&self) -> Router {
            crate::create_router(self.state.clone())
        }
    }

    impl Default for TestContext {
        fn default() -> Self {
            Self::new()
        }
    }
}
