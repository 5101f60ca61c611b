//! Authentication gateway for protected routes
//!
//! Every protected request walks the same states:
//! no credential, then deny-list check, then signature and expiry check.
//! Only a credential that passes all three reaches the handler, as an
//! [`AuthenticatedUser`] in the request extensions.

use super::jwt::{credential_id, TokenError, TokenIssuer};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::ApiError;
use crate::middleware::metrics::AuthMetrics;
use crate::session::SessionStore;
use crate::state::AppState;
use agora_core::Role;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identity attached to a request that passed the gateway
///
/// Extract in handlers with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub subject_id: Uuid,
    pub role: Role,
    /// Fingerprint of the presented access credential
    pub credential_id: String,
    /// Expiry of the presented access credential, Unix seconds
    pub expires_at: u64,
}

impl AuthenticatedUser {
    /// Flat membership test; no role implies another
    pub fn has_role(&self, allowed: &[Role]) -> bool {
        self.role.is_in(allowed)
    }
}

/// Gateway rejections
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingCredential,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Session store unavailable")]
    StoreUnavailable,
}

impl AuthError {
    /// Reason label for metrics and audit
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing",
            AuthError::InvalidAuthHeader => "malformed",
            AuthError::Revoked => "revoked",
            AuthError::InvalidToken(e) => e.reason(),
            AuthError::Forbidden => "forbidden",
            AuthError::StoreUnavailable => "store_unavailable",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Forbidden => {
                (StatusCode::FORBIDDEN, Json(ApiError::forbidden())).into_response()
            }
            AuthError::StoreUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ApiError::unavailable())).into_response()
            }
            // Identical response whatever the reason
            _ => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(ApiError::unauthorized()),
            )
                .into_response(),
        }
    }
}

/// Checks bearer credentials against the deny-list and the token issuer
pub struct AuthGateway {
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn SessionStore>,
    metrics: Arc<AuthMetrics>,
}

impl AuthGateway {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        store: Arc<dyn SessionStore>,
        metrics: Arc<AuthMetrics>,
    ) -> Self {
        Self {
            issuer,
            store,
            metrics,
        }
    }

    /// Authenticate the value of an `Authorization` header
    ///
    /// A missing header is rejected before the store is touched. A
    /// deny-listed credential is rejected whatever its signature says.
    pub async fn authenticate(
        &self,
        authorization: Option<&HeaderValue>,
    ) -> Result<AuthenticatedUser, AuthError> {
        let result = self.check(authorization).await;
        if let Err(e) = &result {
            match e {
                AuthError::StoreUnavailable => AuthMetrics::incr(&self.metrics.store_unavailable),
                _ => self.metrics.record_rejection(e.reason()),
            }
        }
        result
    }

    async fn check(
        &self,
        authorization: Option<&HeaderValue>,
    ) -> Result<AuthenticatedUser, AuthError> {
        let token = bearer_token(authorization.ok_or(AuthError::MissingCredential)?)?;
        let fingerprint = credential_id(token);

        let denied = self.store.is_denylisted(&fingerprint).await.map_err(|e| {
            tracing::warn!(error = %e, "Deny-list lookup failed");
            AuthError::StoreUnavailable
        })?;
        if denied {
            return Err(AuthError::Revoked);
        }

        let claims = self.issuer.verify_access(token)?;

        Ok(AuthenticatedUser {
            subject_id: claims.sub,
            role: claims.role,
            credential_id: fingerprint,
            expires_at: claims.exp,
        })
    }
}

fn bearer_token(value: &HeaderValue) -> Result<&str, AuthError> {
    let token = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Authentication middleware that requires a valid access credential
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use agora_api::auth::middleware::auth_middleware;
///
/// let app = Router::new()
///     .route("/auth/me", get(me_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let authorization = request.headers().get(header::AUTHORIZATION).cloned();

    match state.gateway.authenticate(authorization.as_ref()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(e) => {
            let ctx = AuditContext::from_headers(request.headers());
            let event = match &e {
                AuthError::StoreUnavailable => AuditEvent::StoreUnavailable {
                    operation: "is_denylisted".to_string(),
                },
                other => AuditEvent::InvalidToken {
                    reason: other.reason().to_string(),
                },
            };
            audit_log(&event, &ctx);
            Err(e)
        }
    }
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Must run after [`auth_middleware`]. Passes the request on only when the
/// caller's role is one of `allowed`.
///
/// # Example
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use agora_api::auth::middleware::{auth_middleware, require_role};
/// use agora_core::Role;
///
/// let app = Router::new()
///     .route("/admin/sessions/:subject_id", get(session_status))
///     .route_layer(middleware::from_fn(require_role(&[Role::Admin])))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub fn require_role(
    allowed: &'static [Role],
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let user = request
                .extensions()
                .get::<AuthenticatedUser>()
                .ok_or(AuthError::MissingCredential)?
                .clone();

            if !user.has_role(allowed) {
                audit_log(
                    &AuditEvent::AccessDenied {
                        user_id: user.subject_id,
                        role: user.role,
                        allowed: allowed.to_vec(),
                        resource: request.uri().path().to_string(),
                    },
                    &AuditContext::from_headers(request.headers()),
                );
                return Err(AuthError::Forbidden);
            }

            Ok(next.run(request).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::testing::test_config;
    use agora_core::{IdentityClaims, ManualClock};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemorySessionStore>,
        issuer: Arc<TokenIssuer>,
        metrics: Arc<AuthMetrics>,
        gateway: AuthGateway,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = Arc::new(MemorySessionStore::new(clock.clone()));
        let issuer = Arc::new(TokenIssuer::new(&test_config().tokens, clock.clone()));
        let metrics = Arc::new(AuthMetrics::default());
        let gateway = AuthGateway::new(issuer.clone(), store.clone(), metrics.clone());
        Fixture {
            clock,
            store,
            issuer,
            metrics,
            gateway,
        }
    }

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }

    fn claims(role: Role) -> IdentityClaims {
        IdentityClaims {
            subject_id: Uuid::new_v4(),
            role,
        }
    }

    #[tokio::test]
    async fn test_valid_credential_passes() {
        let f = fixture();
        let claims = claims(Role::Representative);
        let pair = f.issuer.issue_pair(&claims).unwrap();

        let user = f
            .gateway
            .authenticate(Some(&bearer(&pair.access_token)))
            .await
            .unwrap();

        assert_eq!(user.subject_id, claims.subject_id);
        assert_eq!(user.role, Role::Representative);
        assert_eq!(user.credential_id, credential_id(&pair.access_token));
    }

    #[tokio::test]
    async fn test_missing_header() {
        let f = fixture();
        let result = f.gateway.authenticate(None).await;

        assert!(matches!(result, Err(AuthError::MissingCredential)));
        assert_eq!(f.metrics.rejected_missing.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_non_bearer_header_is_malformed() {
        let f = fixture();
        for value in ["Basic abc", "Bearer ", "bearer abc", "abc"] {
            let result = f
                .gateway
                .authenticate(Some(&HeaderValue::from_static(value)))
                .await;
            assert!(
                matches!(result, Err(AuthError::InvalidAuthHeader)),
                "header {value:?}"
            );
        }
        assert_eq!(f.metrics.rejected_malformed.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_denylisted_credential_is_revoked() {
        let f = fixture();
        let pair = f.issuer.issue_pair(&claims(Role::Citizen)).unwrap();
        f.store
            .denylist(&credential_id(&pair.access_token), Duration::from_secs(900))
            .await
            .unwrap();

        // Rejected on every attempt although signature and expiry are fine
        for _ in 0..3 {
            let result = f.gateway.authenticate(Some(&bearer(&pair.access_token))).await;
            assert!(matches!(result, Err(AuthError::Revoked)));
        }
        assert!(f.issuer.verify_access(&pair.access_token).is_ok());
        assert_eq!(f.metrics.rejected_revoked.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_expired_credential() {
        let f = fixture();
        let pair = f.issuer.issue_pair(&claims(Role::Citizen)).unwrap();
        f.clock.advance(pair.expires_in);

        let result = f.gateway.authenticate(Some(&bearer(&pair.access_token))).await;
        assert!(matches!(
            result,
            Err(AuthError::InvalidToken(TokenError::Expired))
        ));
        assert_eq!(f.metrics.rejected_expired.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_refresh_credential_is_not_an_access_credential() {
        let f = fixture();
        let pair = f.issuer.issue_pair(&claims(Role::Citizen)).unwrap();

        let result = f
            .gateway
            .authenticate(Some(&bearer(&pair.refresh_token)))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_all_authentication_failures_look_the_same() {
        let mut bodies = Vec::new();
        for error in [
            AuthError::MissingCredential,
            AuthError::InvalidAuthHeader,
            AuthError::Revoked,
            AuthError::InvalidToken(TokenError::BadSignature),
            AuthError::InvalidToken(TokenError::Expired),
        ] {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            bodies.push(body);
        }
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));

        assert_eq!(
            AuthError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::StoreUnavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_has_role_is_membership() {
        let user = AuthenticatedUser {
            subject_id: Uuid::new_v4(),
            role: Role::Admin,
            credential_id: String::new(),
            expires_at: 0,
        };

        assert!(user.has_role(&[Role::Admin]));
        assert!(user.has_role(&[Role::Citizen, Role::Admin]));
        assert!(!user.has_role(&[Role::Citizen, Role::Representative]));
    }
}
