//! Authentication service layer
//!
//! Register, login, refresh and logout orchestration over the identity
//! store, the token issuer and the session store. Every store failure is
//! turned into `StoreUnavailable`; nothing here treats an unreachable store
//! as a pass.

use super::jwt::{CredentialPair, TokenIssuer};
use super::middleware::AuthenticatedUser;
use super::models::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, SessionStatus, UserSummary};
use super::password::{
    burn_verification, default_dummy_hash, dummy_hash, hash_password_blocking,
    verify_password_blocking,
};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::AppError;
use crate::middleware::metrics::AuthMetrics;
use crate::notify::{spawn_notification, NotificationKind};
use crate::session::{SessionStore, StoreError};
use agora_core::{
    normalize_email, HashingConfig, IdentityRecord, IdentityStore, NewIdentity, Notifier, Role,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Authentication service
pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
    issuer: Arc<TokenIssuer>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<AuthMetrics>,
    hashing: HashingConfig,
    /// Built from `hashing`; `None` while the default cost is in use
    dummy_hash: Option<String>,
    identity_timeout: Duration,
}

impl AuthService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        issuer: Arc<TokenIssuer>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<AuthMetrics>,
    ) -> Self {
        Self {
            identities,
            sessions,
            issuer,
            notifier,
            metrics,
            hashing: HashingConfig::default(),
            dummy_hash: None,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
        }
    }

    pub fn with_hashing(mut self, hashing: HashingConfig) -> Self {
        self.dummy_hash = Some(dummy_hash(&hashing));
        self.hashing = hashing;
        self
    }

    fn unknown_identity_hash(&self) -> String {
        self.dummy_hash.clone().unwrap_or_else(default_dummy_hash)
    }

    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.issuer.refresh_ttl_secs())
    }

    /// Run an identity-store call under the configured timeout
    async fn identity_call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = agora_core::Result<T>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.identity_timeout, fut).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => {
                tracing::warn!(
                    store = self.identities.name(),
                    op,
                    "Identity store call timed out"
                );
                AuthMetrics::incr(&self.metrics.store_unavailable);
                Err(AppError::StoreUnavailable)
            }
        }
    }

    fn store_failed(&self, op: &str, err: StoreError, ctx: &AuditContext) -> AppError {
        AuthMetrics::incr(&self.metrics.store_unavailable);
        audit_log(
            &AuditEvent::StoreUnavailable {
                operation: op.to_string(),
            },
            ctx,
        );
        AppError::from(err)
    }

    /// Mint a pair and make its refresh credential the current session
    async fn start_session(
        &self,
        record: &IdentityRecord,
        ctx: &AuditContext,
    ) -> Result<CredentialPair, AppError> {
        let pair = self.issuer.issue_pair(&record.claims())?;
        self.sessions
            .put_session(record.id, &pair.refresh_token, self.refresh_ttl())
            .await
            .map_err(|e| self.store_failed("put_session", e, ctx))?;
        Ok(pair)
    }

    /// Register a new identity and open its first session
    ///
    /// # Returns
    ///
    /// * `Ok(AuthResponse)` - Identity summary and credential pair
    /// * `Err(AppError::Validation)` - Bad input or an `admin` role request
    /// * `Err(AppError::Conflict)` - Email already registered
    pub async fn register(
        &self,
        request: RegisterRequest,
        ctx: &AuditContext,
    ) -> Result<AuthResponse, AppError> {
        request.validate()?;

        let email = normalize_email(&request.email);
        let reject = |reason: &str| {
            audit_log(
                &AuditEvent::RegistrationFailure {
                    email: email.clone(),
                    reason: reason.to_string(),
                },
                ctx,
            );
        };

        let role = request.role.unwrap_or(Role::Citizen);
        if role == Role::Admin {
            reject("admin role requested");
            return Err(AppError::Validation(
                "Self-registration as admin is not allowed".to_string(),
            ));
        }

        // Checked up front to skip hashing; create() still enforces it
        if self
            .identity_call("find_by_email", self.identities.find_by_email(&email))
            .await?
            .is_some()
        {
            reject("email already registered");
            return Err(AppError::Conflict);
        }

        let password_hash = hash_password_blocking(request.password, self.hashing.clone())
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let new_identity = NewIdentity {
            email: email.clone(),
            name: request.name.trim().to_string(),
            phone: request.phone,
            password_hash,
            role,
            state: request.state,
            lga: request.lga,
        };
        let record = match self
            .identity_call("create", self.identities.create(new_identity))
            .await
        {
            Ok(record) => record,
            Err(AppError::Conflict) => {
                reject("email already registered");
                return Err(AppError::Conflict);
            }
            Err(e) => return Err(e),
        };

        let tokens = self.start_session(&record, ctx).await?;

        AuthMetrics::incr(&self.metrics.registrations);
        audit_log(
            &AuditEvent::RegistrationSuccess {
                user_id: record.id,
                email: record.email.clone(),
                role: record.role,
            },
            ctx,
        );
        spawn_notification(self.notifier.clone(), NotificationKind::Welcome, record.clone());

        Ok(AuthResponse {
            user: UserSummary::from(&record),
            tokens,
        })
    }

    /// Login with email and password
    ///
    /// Unknown email and wrong password produce the same error and cost
    /// one hash verification each. A successful login replaces any session
    /// the identity already had.
    pub async fn login(
        &self,
        request: LoginRequest,
        ctx: &AuditContext,
    ) -> Result<AuthResponse, AppError> {
        request.validate()?;

        let email = normalize_email(&request.email);
        let found = self
            .identity_call("find_by_email", self.identities.find_by_email(&email))
            .await?;

        let mut record = match found {
            Some(record) => {
                let matches =
                    verify_password_blocking(request.password, record.password_hash.clone()).await;
                if !matches {
                    return Err(self.login_failed(&email, "wrong password", ctx));
                }
                record
            }
            None => {
                burn_verification(request.password, self.unknown_identity_hash()).await;
                return Err(self.login_failed(&email, "unknown identity", ctx));
            }
        };

        let tokens = self.start_session(&record, ctx).await?;

        let now = Utc::now();
        match self
            .identity_call(
                "touch_last_authenticated",
                self.identities.touch_last_authenticated(record.id, now),
            )
            .await
        {
            Ok(()) => record.last_authenticated_at = Some(now),
            Err(e) => {
                tracing::warn!(user_id = %record.id, error = ?e, "Failed to record login time")
            }
        }

        AuthMetrics::incr(&self.metrics.logins_ok);
        audit_log(
            &AuditEvent::LoginSuccess {
                user_id: record.id,
                email: record.email.clone(),
            },
            ctx,
        );

        Ok(AuthResponse {
            user: UserSummary::from(&record),
            tokens,
        })
    }

    fn login_failed(&self, email: &str, reason: &str, ctx: &AuditContext) -> AppError {
        AuthMetrics::incr(&self.metrics.logins_failed);
        audit_log(
            &AuditEvent::LoginFailure {
                email: email.to_string(),
                reason: reason.to_string(),
            },
            ctx,
        );
        AppError::InvalidCredentials
    }

    /// Exchange the current refresh credential for a new pair
    ///
    /// The presented credential must be exactly the one in the store; the
    /// swap to the new one is a single compare-and-swap, so of several
    /// concurrent refreshes with the same credential at most one wins.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        ctx: &AuditContext,
    ) -> Result<CredentialPair, AppError> {
        request.validate()?;
        let presented = request.refresh_token;

        let claims = self
            .issuer
            .verify_refresh(&presented)
            .map_err(|e| self.refresh_rejected(None, e.reason(), ctx))?;

        // Role comes from the identity store, not the old credential
        let record = self
            .identity_call("find_by_id", self.identities.find_by_id(claims.sub))
            .await?
            .ok_or_else(|| self.refresh_rejected(Some(claims.sub), "unknown identity", ctx))?;

        let pair = self.issuer.issue_pair(&record.claims())?;
        let swapped = self
            .sessions
            .replace_session(record.id, &presented, &pair.refresh_token, self.refresh_ttl())
            .await
            .map_err(|e| self.store_failed("replace_session", e, ctx))?;

        if !swapped {
            return Err(self.refresh_rejected(Some(record.id), "not the current session", ctx));
        }

        AuthMetrics::incr(&self.metrics.refreshes_ok);
        audit_log(&AuditEvent::TokenRefresh { user_id: record.id }, ctx);

        Ok(pair)
    }

    fn refresh_rejected(&self, user_id: Option<Uuid>, reason: &str, ctx: &AuditContext) -> AppError {
        AuthMetrics::incr(&self.metrics.refreshes_rejected);
        audit_log(
            &AuditEvent::RefreshRejected {
                user_id,
                reason: reason.to_string(),
            },
            ctx,
        );
        AppError::InvalidToken
    }

    /// Close the caller's session and deny-list the credential it presented
    ///
    /// Other access credentials issued earlier stay valid until they expire.
    pub async fn logout(&self, user: &AuthenticatedUser, ctx: &AuditContext) -> Result<(), AppError> {
        self.sessions
            .delete_session(user.subject_id)
            .await
            .map_err(|e| self.store_failed("delete_session", e, ctx))?;

        let remaining = user.expires_at.saturating_sub(self.issuer.now());
        self.sessions
            .denylist(&user.credential_id, Duration::from_secs(remaining))
            .await
            .map_err(|e| self.store_failed("denylist", e, ctx))?;

        AuthMetrics::incr(&self.metrics.logouts);
        audit_log(
            &AuditEvent::Logout {
                user_id: user.subject_id,
                credential_id: user.credential_id.clone(),
            },
            ctx,
        );

        let identities = self.identities.clone();
        let notifier = self.notifier.clone();
        let subject_id = user.subject_id;
        let timeout = self.identity_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, identities.find_by_id(subject_id)).await {
                Ok(Ok(Some(record))) => {
                    spawn_notification(notifier, NotificationKind::LoggedOut, record)
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(user_id = %subject_id, error = %e, "Skipping logout notification")
                }
                Err(_) => {
                    tracing::warn!(user_id = %subject_id, "Identity lookup for logout notification timed out")
                }
            }
        });

        Ok(())
    }

    /// Identity summary of the caller
    pub async fn me(&self, subject_id: Uuid) -> Result<UserSummary, AppError> {
        self.identity_call("find_by_id", self.identities.find_by_id(subject_id))
            .await?
            .map(|record| UserSummary::from(&record))
            .ok_or_else(|| AppError::NotFound("Identity".to_string()))
    }

    pub async fn session_status(&self, subject_id: Uuid) -> Result<SessionStatus, AppError> {
        let active = self
            .sessions
            .get_session(subject_id)
            .await
            .map_err(|e| self.store_failed("get_session", e, &AuditContext::default()))?
            .is_some();

        Ok(SessionStatus { subject_id, active })
    }

    /// Force-close a session; the next refresh of that identity fails
    pub async fn revoke_session(
        &self,
        subject_id: Uuid,
        admin: &AuthenticatedUser,
        ctx: &AuditContext,
    ) -> Result<(), AppError> {
        self.sessions
            .delete_session(subject_id)
            .await
            .map_err(|e| self.store_failed("delete_session", e, ctx))?;

        audit_log(
            &AuditEvent::SessionRevoked {
                subject_id,
                revoked_by: admin.subject_id,
            },
            ctx,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::credential_id;
    use crate::session::MemorySessionStore;
    use crate::testing::{test_config, TestContext};
    use agora_core::{ManualClock, MemoryIdentityStore};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    const PASSWORD: &str = "SecureP@ssw0rd!";

    fn ctx() -> AuditContext {
        AuditContext::default()
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            name: "Alice".to_string(),
            phone: Some("+2348012345678".to_string()),
            password: PASSWORD.to_string(),
            role: Some(Role::Citizen),
            state: Some("Lagos".to_string()),
            lga: Some("Ikeja".to_string()),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn refresh_request(token: &str) -> RefreshRequest {
        RefreshRequest {
            refresh_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_opens_session() {
        let t = TestContext::new();
        let response = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();

        assert_eq!(response.user.role, Role::Citizen);
        assert_eq!(response.tokens.token_type, "Bearer");
        let stored = t.sessions.get_session(response.user.id).await.unwrap();
        assert_eq!(stored.as_deref(), Some(response.tokens.refresh_token.as_str()));
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let t = TestContext::new();
        t.state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();

        // Same identity after normalisation
        let result = t
            .state
            .auth
            .register(register_request("  Alice@Example.COM "), &ctx())
            .await;
        assert!(matches!(result, Err(AppError::Conflict)));
        assert_eq!(t.identities.len().await, 1);
    }

    #[tokio::test]
    async fn test_admin_self_registration_rejected() {
        let t = TestContext::new();
        let mut request = register_request("eve@example.com");
        request.role = Some(Role::Admin);

        let result = t.state.auth.register(request, &ctx()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(t.identities.is_empty().await);
    }

    #[tokio::test]
    async fn test_role_defaults_to_citizen() {
        let t = TestContext::new();
        let mut request = register_request("carol@example.com");
        request.role = None;

        let response = t.state.auth.register(request, &ctx()).await.unwrap();
        assert_eq!(response.user.role, Role::Citizen);
    }

    #[tokio::test]
    async fn test_login_with_correct_and_wrong_secret() {
        let t = TestContext::new();
        t.state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();

        let ok = t
            .state
            .auth
            .login(login_request("ALICE@example.com", PASSWORD), &ctx())
            .await
            .unwrap();
        assert!(ok.user.last_authenticated_at.is_some());

        for wrong in ["SecureP@ssw0rd?", "SecureP@ssw0rd", "secureP@ssw0rd!"] {
            let result = t
                .state
                .auth
                .login(login_request("alice@example.com", wrong), &ctx())
                .await;
            assert!(matches!(result, Err(AppError::InvalidCredentials)));
        }

        let unknown = t
            .state
            .auth
            .login(login_request("nobody@example.com", PASSWORD), &ctx())
            .await;
        assert!(matches!(unknown, Err(AppError::InvalidCredentials)));

        assert_eq!(t.state.auth_metrics.logins_ok.load(Ordering::Relaxed), 1);
        assert_eq!(t.state.auth_metrics.logins_failed.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_refresh_rotates_on_every_use() {
        let t = TestContext::new();
        let login = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();
        let first = login.tokens.refresh_token;

        let second = t
            .state
            .auth
            .refresh(refresh_request(&first), &ctx())
            .await
            .unwrap()
            .refresh_token;
        let third = t
            .state
            .auth
            .refresh(refresh_request(&second), &ctx())
            .await
            .unwrap()
            .refresh_token;

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);

        // Rotated-out credentials are dead
        for stale in [&first, &second] {
            let result = t.state.auth.refresh(refresh_request(stale), &ctx()).await;
            assert!(matches!(result, Err(AppError::InvalidToken)));
        }
        let stored = t.sessions.get_session(login.user.id).await.unwrap();
        assert_eq!(stored.as_deref(), Some(third.as_str()));
    }

    #[tokio::test]
    async fn test_second_login_invalidates_first_device() {
        let t = TestContext::new();
        t.state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();

        let device_a = t
            .state
            .auth
            .login(login_request("alice@example.com", PASSWORD), &ctx())
            .await
            .unwrap();
        let device_b = t
            .state
            .auth
            .login(login_request("alice@example.com", PASSWORD), &ctx())
            .await
            .unwrap();

        let result = t
            .state
            .auth
            .refresh(refresh_request(&device_a.tokens.refresh_token), &ctx())
            .await;
        assert!(matches!(result, Err(AppError::InvalidToken)));

        assert!(t
            .state
            .auth
            .refresh(refresh_request(&device_b.tokens.refresh_token), &ctx())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_expired_refresh_credential_rejected() {
        let t = TestContext::new();
        let login = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();

        t.clock.advance(login.tokens.refresh_expires_in);
        let result = t
            .state
            .auth
            .refresh(refresh_request(&login.tokens.refresh_token), &ctx())
            .await;
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_access_credential_cannot_refresh() {
        let t = TestContext::new();
        let login = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();

        let result = t
            .state
            .auth
            .refresh(refresh_request(&login.tokens.access_token), &ctx())
            .await;
        assert!(matches!(result, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_single_winner() {
        let t = TestContext::new();
        let login = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();
        let presented = login.tokens.refresh_token.clone();

        let attempts = (0..8).map(|_| {
            let state = t.state.clone();
            let token = presented.clone();
            async move { state.auth.refresh(refresh_request(&token), &ctx()).await }
        });
        let results = futures::future::join_all(attempts).await;

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(AppError::InvalidToken))));

        // Only the winner's credential is in the store
        let stored = t.sessions.get_session(login.user.id).await.unwrap();
        assert_eq!(stored.as_deref(), Some(winners[0].refresh_token.as_str()));
    }

    #[tokio::test]
    async fn test_logout_closes_session_and_denylists_credential() {
        let t = TestContext::new();
        let login = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();
        let header =
            HeaderValue::from_str(&format!("Bearer {}", login.tokens.access_token)).unwrap();

        let user = t.state.gateway.authenticate(Some(&header)).await.unwrap();
        t.state.auth.logout(&user, &ctx()).await.unwrap();

        assert!(t
            .sessions
            .is_denylisted(&credential_id(&login.tokens.access_token))
            .await
            .unwrap());
        assert!(t.sessions.get_session(login.user.id).await.unwrap().is_none());
        assert!(t.state.gateway.authenticate(Some(&header)).await.is_err());

        let refresh = t
            .state
            .auth
            .refresh(refresh_request(&login.tokens.refresh_token), &ctx())
            .await;
        assert!(matches!(refresh, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_denylist_entry_expires_with_credential() {
        let t = TestContext::new();
        let login = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();
        let header =
            HeaderValue::from_str(&format!("Bearer {}", login.tokens.access_token)).unwrap();
        let user = t.state.gateway.authenticate(Some(&header)).await.unwrap();

        t.clock.advance(100);
        t.state.auth.logout(&user, &ctx()).await.unwrap();
        let fingerprint = credential_id(&login.tokens.access_token);

        t.clock.advance(login.tokens.expires_in - 101);
        assert!(t.sessions.is_denylisted(&fingerprint).await.unwrap());
        t.clock.advance(1);
        assert!(!t.sessions.is_denylisted(&fingerprint).await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_revocation() {
        let t = TestContext::new();
        let login = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();
        let admin = AuthenticatedUser {
            subject_id: Uuid::new_v4(),
            role: Role::Admin,
            credential_id: String::new(),
            expires_at: 0,
        };

        let status = t.state.auth.session_status(login.user.id).await.unwrap();
        assert!(status.active);

        t.state
            .auth
            .revoke_session(login.user.id, &admin, &ctx())
            .await
            .unwrap();
        assert!(!t.state.auth.session_status(login.user.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_me_reports_missing_identity() {
        let t = TestContext::new();
        let result = t.state.auth.me(Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    struct ChannelNotifier(mpsc::UnboundedSender<(NotificationKind, Uuid)>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn welcome(&self, identity: &IdentityRecord) -> agora_core::Result<()> {
            let _ = self.0.send((NotificationKind::Welcome, identity.id));
            Ok(())
        }

        async fn logged_out(&self, identity: &IdentityRecord) -> agora_core::Result<()> {
            let _ = self.0.send((NotificationKind::LoggedOut, identity.id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notifications_sent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let t = TestContext::with_notifier(Arc::new(ChannelNotifier(tx)));

        let login = t
            .state
            .auth
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some((NotificationKind::Welcome, login.user.id))
        );

        let header =
            HeaderValue::from_str(&format!("Bearer {}", login.tokens.access_token)).unwrap();
        let user = t.state.gateway.authenticate(Some(&header)).await.unwrap();
        t.state.auth.logout(&user, &ctx()).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some((NotificationKind::LoggedOut, login.user.id))
        );
    }

    /// Session store that is always down
    struct DownStore;

    #[async_trait]
    impl SessionStore for DownStore {
        async fn put_session(&self, _: Uuid, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn get_session(&self, _: Uuid) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn replace_session(
            &self,
            _: Uuid,
            _: &str,
            _: &str,
            _: Duration,
        ) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn delete_session(&self, _: Uuid) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn denylist(&self, _: &str, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn is_denylisted(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        fn name(&self) -> &str {
            "down"
        }
    }

    fn service_with(
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> (AuthService, Arc<AuthMetrics>) {
        let config = test_config();
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let metrics = Arc::new(AuthMetrics::default());
        let service = AuthService::new(
            identities,
            sessions,
            Arc::new(TokenIssuer::new(&config.tokens, clock)),
            Arc::new(crate::notify::TracingNotifier),
            metrics.clone(),
        )
        .with_hashing(config.hashing)
        .with_identity_timeout(Duration::from_millis(50));
        (service, metrics)
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed() {
        let identities = Arc::new(MemoryIdentityStore::new());
        let (seeding, _) = service_with(
            identities.clone(),
            Arc::new(MemorySessionStore::default()),
        );
        seeding
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();

        let (service, metrics) = service_with(identities, Arc::new(DownStore));
        let result = service
            .login(login_request("alice@example.com", PASSWORD), &ctx())
            .await;

        assert!(matches!(result, Err(AppError::StoreUnavailable)));
        assert_eq!(metrics.store_unavailable.load(Ordering::Relaxed), 1);
    }

    /// Identity store whose lookups never finish
    struct StalledIdentities;

    #[async_trait]
    impl IdentityStore for StalledIdentities {
        async fn find_by_email(&self, _: &str) -> agora_core::Result<Option<IdentityRecord>> {
            futures::future::pending().await
        }
        async fn find_by_id(&self, _: Uuid) -> agora_core::Result<Option<IdentityRecord>> {
            futures::future::pending().await
        }
        async fn create(&self, _: NewIdentity) -> agora_core::Result<IdentityRecord> {
            futures::future::pending().await
        }
        async fn touch_last_authenticated(
            &self,
            _: Uuid,
            _: chrono::DateTime<Utc>,
        ) -> agora_core::Result<()> {
            futures::future::pending().await
        }
        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_stalled_identity_store_times_out() {
        let (service, _) = service_with(
            Arc::new(StalledIdentities),
            Arc::new(MemorySessionStore::default()),
        );

        let result = service
            .login(login_request("alice@example.com", PASSWORD), &ctx())
            .await;
        assert!(matches!(result, Err(AppError::StoreUnavailable)));
    }

    #[tokio::test]
    async fn test_unknown_identity_check_matches_configured_cost() {
        let identities = Arc::new(MemoryIdentityStore::new());
        let (service, _) = service_with(
            identities.clone(),
            Arc::new(MemorySessionStore::default()),
        );
        let response = service
            .register(register_request("alice@example.com"), &ctx())
            .await
            .unwrap();
        let stored = identities
            .find_by_id(response.user.id)
            .await
            .unwrap()
            .unwrap();

        // $argon2id$v=19$m=..,t=..,p=..$salt$hash
        let cost = |hash: &str| hash.split('$').nth(3).map(str::to_string);
        assert_eq!(
            cost(&service.unknown_identity_hash()),
            cost(&stored.password_hash)
        );
        assert_eq!(cost(&stored.password_hash).as_deref(), Some("m=4096,t=1,p=1"));
    }

    struct DropSignal(mpsc::UnboundedSender<Uuid>, Uuid);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            let _ = self.0.send(self.1);
        }
    }

    /// Identity store whose id lookups hang and report when abandoned
    struct AbandonedLookups(mpsc::UnboundedSender<Uuid>);

    #[async_trait]
    impl IdentityStore for AbandonedLookups {
        async fn find_by_email(&self, _: &str) -> agora_core::Result<Option<IdentityRecord>> {
            futures::future::pending().await
        }
        async fn find_by_id(&self, id: Uuid) -> agora_core::Result<Option<IdentityRecord>> {
            let _signal = DropSignal(self.0.clone(), id);
            futures::future::pending().await
        }
        async fn create(&self, _: NewIdentity) -> agora_core::Result<IdentityRecord> {
            futures::future::pending().await
        }
        async fn touch_last_authenticated(
            &self,
            _: Uuid,
            _: chrono::DateTime<Utc>,
        ) -> agora_core::Result<()> {
            futures::future::pending().await
        }
        fn name(&self) -> &str {
            "abandoned"
        }
    }

    #[tokio::test]
    async fn test_logout_notification_lookup_is_bounded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (service, _) = service_with(
            Arc::new(AbandonedLookups(tx)),
            Arc::new(MemorySessionStore::default()),
        );
        let user = AuthenticatedUser {
            subject_id: Uuid::new_v4(),
            role: Role::Citizen,
            credential_id: "fingerprint".to_string(),
            expires_at: 1_700_000_900,
        };

        service.logout(&user, &ctx()).await.unwrap();

        // The background lookup is dropped once the identity timeout passes
        let abandoned = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("lookup was never abandoned");
        assert_eq!(abandoned, Some(user.subject_id));
    }
}
